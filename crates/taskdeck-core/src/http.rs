use std::time::Duration;

use anyhow::{
  Context,
  anyhow
};
use reqwest::header::{
  ACCEPT,
  CONTENT_TYPE
};
use reqwest::{
  Client,
  Method,
  StatusCode,
  Url
};
use serde::Serialize;
use serde_json::Value;
use taskdeck_shared::{
  TaskCreate,
  TaskUpdate
};
use tracing::{
  debug,
  warn
};

use crate::api::{
  ApiError,
  Credential,
  TaskApi
};
use crate::config::ClientConfig;

const RESOURCE_PATH: &str = "api/tasks";
const ROUTE_SUFFIX: &str = "gp";
const JSON_MIME: &str =
  "application/json";

/// `TaskApi` over the task service's
/// REST routes.
#[derive(Debug, Clone)]
pub struct HttpTaskApi {
  client: Client,
  root:   Url
}

impl HttpTaskApi {
  pub fn from_config(
    cfg: &ClientConfig
  ) -> anyhow::Result<Self> {
    let client = Client::builder()
      .timeout(Duration::from_secs(
        cfg.request_timeout_secs
      ))
      .build()
      .context(
        "failed building HTTP client \
         for the task service"
      )?;
    Self::with_client(
      client,
      &cfg.api_url
    )
  }

  pub fn with_client(
    client: Client,
    base: &str
  ) -> anyhow::Result<Self> {
    let root = resource_root(base)?;
    debug!(root = %root, "task service endpoint resolved");
    Ok(Self {
      client,
      root
    })
  }

  pub fn root(&self) -> &Url {
    &self.root
  }

  /// `{root}/gp` or `{root}/{id}/gp`.
  pub fn endpoint(
    &self,
    id: Option<&str>
  ) -> Result<Url, ApiError> {
    let mut url = self.root.clone();
    {
      let mut segments = url
        .path_segments_mut()
        .map_err(|()| {
          ApiError::Network(format!(
            "cannot route requests \
             under {}",
            self.root
          ))
        })?;
      segments.pop_if_empty();
      if let Some(id) = id {
        segments.push(id);
      }
      segments.push(ROUTE_SUFFIX);
    }
    Ok(url)
  }

  #[tracing::instrument(
    skip(self, credential, body, url),
    fields(url = %url)
  )]
  async fn send<B: Serialize>(
    &self,
    method: Method,
    url: Url,
    credential: &Credential,
    body: Option<&B>
  ) -> Result<Value, ApiError> {
    let mut request = self
      .client
      .request(method, url)
      .bearer_auth(credential.token())
      .header(ACCEPT, JSON_MIME);
    if let Some(body) = body {
      let bytes = serde_json::to_vec(
        body
      )
      .map_err(|err| {
        ApiError::Network(format!(
          "failed encoding request \
           body: {err}"
        ))
      })?;
      request = request
        .header(CONTENT_TYPE, JSON_MIME)
        .body(bytes);
    }

    let response = request
      .send()
      .await
      .map_err(|err| {
        warn!(error = %err, "task service request failed");
        ApiError::Network(err.to_string())
      })?;

    let status = response.status();
    // The body of a rejected credential
    // is never needed.
    if status == StatusCode::UNAUTHORIZED
    {
      return Err(ApiError::Unauthorized);
    }

    let bytes =
      response.bytes().await.map_err(
        |err| {
          ApiError::Network(format!(
            "failed reading response \
             body: {err}"
          ))
        }
      )?;

    if !status.is_success() {
      return Err(ApiError::Server {
        status:  status.as_u16(),
        message: error_message(
          status, &bytes
        )
      });
    }

    debug!(
      status = status.as_u16(),
      len = bytes.len(),
      "task service responded"
    );
    Ok(
      serde_json::from_slice(&bytes)
        .unwrap_or(Value::Null)
    )
  }
}

impl TaskApi for HttpTaskApi {
  async fn list_tasks(
    &self,
    credential: &Credential
  ) -> Result<Value, ApiError> {
    let url = self.endpoint(None)?;
    self
      .send::<()>(
        Method::GET,
        url,
        credential,
        None
      )
      .await
  }

  async fn update_task(
    &self,
    credential: &Credential,
    id: &str,
    update: &TaskUpdate
  ) -> Result<Value, ApiError> {
    let url = self.endpoint(Some(id))?;
    self
      .send(
        Method::PUT,
        url,
        credential,
        Some(update)
      )
      .await
  }

  async fn delete_task(
    &self,
    credential: &Credential,
    id: &str
  ) -> Result<(), ApiError> {
    let url = self.endpoint(Some(id))?;
    self
      .send::<()>(
        Method::DELETE,
        url,
        credential,
        None
      )
      .await
      .map(drop)
  }

  async fn create_task(
    &self,
    credential: &Credential,
    create: &TaskCreate
  ) -> Result<Value, ApiError> {
    let url = self.endpoint(None)?;
    self
      .send(
        Method::POST,
        url,
        credential,
        Some(create)
      )
      .await
  }
}

fn resource_root(
  base: &str
) -> anyhow::Result<Url> {
  let trimmed = base.trim();
  let with_slash =
    if trimmed.ends_with('/') {
      trimmed.to_string()
    } else {
      format!("{trimmed}/")
    };
  let base = Url::parse(&with_slash)
    .with_context(|| {
      format!(
        "invalid task service URL: \
         {trimmed}"
      )
    })?;
  if base.cannot_be_a_base() {
    return Err(anyhow!(
      "task service URL cannot carry \
       a path: {trimmed}"
    ));
  }
  base.join(RESOURCE_PATH).with_context(
    || {
      format!(
        "failed joining {RESOURCE_PATH} \
         onto {base}"
      )
    }
  )
}

/// The server's `message` field when it
/// sent one, else the raw body, else the
/// status reason.
fn error_message(
  status: StatusCode,
  body: &[u8]
) -> String {
  if let Ok(value) =
    serde_json::from_slice::<Value>(body)
    && let Some(message) = value
      .get("message")
      .and_then(Value::as_str)
  {
    return message.to_string();
  }

  let text = String::from_utf8_lossy(body);
  let text = text.trim();
  if !text.is_empty() {
    return text.to_string();
  }
  status
    .canonical_reason()
    .unwrap_or("unknown error")
    .to_string()
}
