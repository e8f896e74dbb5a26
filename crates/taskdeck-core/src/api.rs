use std::fmt;
use std::future::Future;

use serde_json::Value;
use taskdeck_shared::{TaskCreate, TaskUpdate};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("no auth token available")]
    MissingCredential,

    #[error("server rejected the credential")]
    Unauthorized,

    #[error("network error: {0}")]
    Network(String),

    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },
}

impl ApiError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }

    /// Failures the user can retry without signing in again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Server { .. })
    }
}

/// Bearer token handed explicitly to every API call.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Blank tokens are treated as no credential at all.
    pub fn new(token: impl Into<String>) -> Option<Self> {
        let token = token.into();
        let trimmed = token.trim();
        (!trimmed.is_empty()).then(|| Self(trimmed.to_string()))
    }

    pub fn token(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Remote task resource. Payloads come back untyped and go through the
/// normalizer before anything else reads them.
pub trait TaskApi {
    fn list_tasks(
        &self,
        credential: &Credential,
    ) -> impl Future<Output = Result<Value, ApiError>>;

    fn update_task(
        &self,
        credential: &Credential,
        id: &str,
        update: &TaskUpdate,
    ) -> impl Future<Output = Result<Value, ApiError>>;

    fn delete_task(
        &self,
        credential: &Credential,
        id: &str,
    ) -> impl Future<Output = Result<(), ApiError>>;

    fn create_task(
        &self,
        credential: &Credential,
        create: &TaskCreate,
    ) -> impl Future<Output = Result<Value, ApiError>>;
}

#[cfg(test)]
mod tests {
    use super::{ApiError, Credential};

    #[test]
    fn blank_tokens_are_not_credentials() {
        assert!(Credential::new("   ").is_none());
        let credential = Credential::new(" abc ").expect("credential");
        assert_eq!(credential.token(), "abc");
        assert_eq!(format!("{credential:?}"), "Credential(<redacted>)");
    }

    #[test]
    fn only_transport_failures_are_retryable() {
        assert!(ApiError::Network("reset".into()).is_retryable());
        assert!(
            ApiError::Server {
                status: 500,
                message: "boom".into()
            }
            .is_retryable()
        );
        assert!(!ApiError::Unauthorized.is_retryable());
        assert!(!ApiError::MissingCredential.is_retryable());
        assert!(ApiError::Unauthorized.is_unauthorized());
    }
}
