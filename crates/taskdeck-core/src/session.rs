use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::api::{ApiError, Credential};

type TerminateHook = Box<dyn Fn() + Send + Sync>;

/// Credential holder plus the one-shot session-termination path.
pub struct Session {
    credential: Mutex<Option<Credential>>,
    terminated: AtomicBool,
    on_terminate: Option<TerminateHook>,
}

impl Session {
    pub fn new(credential: Option<Credential>) -> Self {
        Self {
            credential: Mutex::new(credential),
            terminated: AtomicBool::new(false),
            on_terminate: None,
        }
    }

    /// Runs when the server rejects the credential, at most once per
    /// sign-in.
    pub fn with_terminate_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_terminate = Some(Box::new(hook));
        self
    }

    pub fn credential(&self) -> Result<Credential, ApiError> {
        self.credential.lock().clone().ok_or(ApiError::MissingCredential)
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    /// Replaces the credential and re-arms termination.
    pub fn sign_in(&self, credential: Credential) {
        *self.credential.lock() = Some(credential);
        self.terminated.store(false, Ordering::SeqCst);
        info!("session signed in");
    }

    /// Drops the credential. Returns `true` only for the call that actually
    /// ended the session; the hook fires on that call alone.
    pub fn terminate(&self) -> bool {
        if self.terminated.swap(true, Ordering::SeqCst) {
            return false;
        }

        self.credential.lock().take();
        warn!("session terminated: credential rejected");
        if let Some(hook) = &self.on_terminate {
            hook();
        }
        true
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("has_credential", &self.credential.lock().is_some())
            .field("terminated", &self.is_terminated())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::Session;
    use crate::api::{ApiError, Credential};

    #[test]
    fn missing_credential_is_reported() {
        let session = Session::new(None);
        assert_eq!(session.credential(), Err(ApiError::MissingCredential));
    }

    #[test]
    fn terminate_fires_hook_once() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let session = Session::new(Credential::new("tok"))
            .with_terminate_hook(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });

        assert!(session.terminate());
        assert!(!session.terminate());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(session.credential().is_err());

        session.sign_in(Credential::new("fresh").expect("credential"));
        assert!(!session.is_terminated());
        assert!(session.terminate());
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }
}
