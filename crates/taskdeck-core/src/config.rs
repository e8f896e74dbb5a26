use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow
};
use chrono_tz::Tz;
use serde::{
  Deserialize,
  Serialize
};
use tracing::{
  debug,
  info,
  warn
};

use crate::datetime::parse_timezone;
use crate::views::DEFAULT_RECENT_LIMIT;

pub const CONFIG_ENV_VAR: &str =
  "TASKDECK_CONFIG";
pub const API_URL_ENV_VAR: &str =
  "TASKDECK_API_URL";
pub const TIMEZONE_ENV_VAR: &str =
  "TASKDECK_TIMEZONE";
pub const TOKEN_ENV_VAR: &str =
  "TASKDECK_TOKEN";

const DEFAULT_API_URL: &str =
  "http://localhost:4000/";
const DEFAULT_TIMEZONE: &str = "UTC";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(
  Debug,
  Clone,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
)]
#[serde(default)]
pub struct ClientConfig {
  pub api_url:              String,
  pub timezone:             String,
  pub request_timeout_secs: u64,
  pub recent_limit:         usize,
  #[serde(skip)]
  pub loaded_file: Option<PathBuf>
}

impl Default for ClientConfig {
  fn default() -> Self {
    Self {
      api_url:              DEFAULT_API_URL
        .to_string(),
      timezone:             DEFAULT_TIMEZONE
        .to_string(),
      request_timeout_secs:
        DEFAULT_TIMEOUT_SECS,
      recent_limit:
        DEFAULT_RECENT_LIMIT,
      loaded_file:          None
    }
  }
}

impl ClientConfig {
  /// Defaults, then the config file,
  /// then environment overrides.
  #[tracing::instrument(skip(
    path_override
  ))]
  pub fn load(
    path_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg =
      match resolve_config_path(
        path_override
      )? {
        | Some(path) => {
          info!(config = %path.display(), "loading config");
          Self::load_file(&path)?
        }
        | None => {
          warn!(
            "no config file found; \
             using defaults"
          );
          Self::default()
        }
      };

    cfg.apply_env_with(|key| {
      std::env::var(key).ok()
    });
    Ok(cfg)
  }

  pub fn load_file(
    path: &Path
  ) -> anyhow::Result<Self> {
    let text =
      fs::read_to_string(path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;
    let mut cfg = Self::from_toml_str(
      &text
    )
    .with_context(|| {
      format!(
        "failed to parse {}",
        path.display()
      )
    })?;
    cfg.loaded_file =
      Some(path.to_path_buf());
    Ok(cfg)
  }

  pub fn from_toml_str(
    text: &str
  ) -> anyhow::Result<Self> {
    let cfg: Self = toml::from_str(text)
      .map_err(|err| {
        anyhow!(
          "invalid config: {err}"
        )
      })?;
    Ok(cfg)
  }

  pub fn apply_env_with<F>(
    &mut self,
    lookup: F
  ) where
    F: Fn(&str) -> Option<String>
  {
    if let Some(url) =
      non_blank(lookup(API_URL_ENV_VAR))
    {
      debug!(key = API_URL_ENV_VAR, value = %url, "applying env override");
      self.api_url = url;
    }
    if let Some(tz) = non_blank(lookup(
      TIMEZONE_ENV_VAR
    )) {
      debug!(key = TIMEZONE_ENV_VAR, value = %tz, "applying env override");
      self.timezone = tz;
    }
  }

  /// Invalid names fall back to UTC.
  pub fn timezone(&self) -> Tz {
    parse_timezone(
      &self.timezone,
      "config.timezone"
    )
    .unwrap_or_else(|| {
      warn!(
        timezone = %self.timezone,
        "unusable timezone; using UTC"
      );
      chrono_tz::UTC
    })
  }
}

#[tracing::instrument(skip(
  override_path
))]
fn resolve_config_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    let path = expand_tilde(path);
    if !path.exists() {
      return Err(anyhow!(
        "config file {} does not \
         exist",
        path.display()
      ));
    }
    return Ok(Some(path));
  }

  if let Some(raw) =
    non_blank(std::env::var(
      CONFIG_ENV_VAR
    )
    .ok())
  {
    return Ok(Some(expand_tilde(
      Path::new(&raw)
    )));
  }

  let candidate = dirs::config_dir()
    .map(|dir| {
      dir
        .join("taskdeck")
        .join("config.toml")
    });
  Ok(candidate.filter(|path| {
    path.exists()
  }))
}

fn non_blank(
  value: Option<String>
) -> Option<String> {
  value
    .map(|raw| raw.trim().to_string())
    .filter(|raw| !raw.is_empty())
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use std::collections::HashMap;
  use std::io::Write;

  use tempfile::NamedTempFile;

  use super::{
    API_URL_ENV_VAR,
    ClientConfig,
    TIMEZONE_ENV_VAR
  };

  #[test]
  fn file_values_override_defaults() {
    let mut file = NamedTempFile::new()
      .expect("temp file");
    writeln!(
      file,
      "api_url = \"https://tasks.example.com/\"\n\
       timezone = \"Europe/Berlin\""
    )
    .expect("write config");

    let cfg = ClientConfig::load_file(
      file.path()
    )
    .expect("load config");
    assert_eq!(
      cfg.api_url,
      "https://tasks.example.com/"
    );
    assert_eq!(
      cfg.timezone(),
      chrono_tz::Europe::Berlin
    );
    assert_eq!(
      cfg.request_timeout_secs,
      30
    );
    assert_eq!(
      cfg.loaded_file.as_deref(),
      Some(file.path())
    );
  }

  #[test]
  fn env_overrides_file() {
    let mut cfg =
      ClientConfig::from_toml_str(
        "api_url = \"https://file/\""
      )
      .expect("parse config");
    let env = HashMap::from([
      (
        API_URL_ENV_VAR,
        "https://env/".to_string()
      ),
      (
        TIMEZONE_ENV_VAR,
        "  ".to_string()
      ),
    ]);

    cfg.apply_env_with(|key| {
      env.get(key).cloned()
    });
    assert_eq!(cfg.api_url, "https://env/");
    assert_eq!(cfg.timezone, "UTC");
  }

  #[test]
  fn bad_timezone_falls_back_to_utc() {
    let cfg =
      ClientConfig::from_toml_str(
        "timezone = \"Mars/Olympus\""
      )
      .expect("parse config");
    assert_eq!(
      cfg.timezone(),
      chrono_tz::UTC
    );
  }

  #[test]
  fn missing_override_file_is_an_error()
  {
    let dir =
      tempfile::tempdir().expect("dir");
    let missing =
      dir.path().join("nope.toml");
    assert!(
      ClientConfig::load(Some(&missing))
        .is_err()
    );
  }
}
