//! Session gate
//!
//! Tracks whether an authenticated identity is available for remote calls.
//! The gate is the only source of truth for readiness: every query and
//! mutation consults it at dispatch time, so no call runs against an identity
//! that has since been logged out.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

/// Authenticated caller identity
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    /// Textual principal of the caller
    pub principal: String,
    /// Bearer credential presented to the backend
    pub token: String,
}

impl Identity {
    pub fn new(principal: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
            token: token.into(),
        }
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("principal", &self.principal)
            .field("token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginStatus {
    LoggedOut,
    /// Login started but not completed; informational only, not ready
    LoggingIn,
    Ready(Identity),
}

impl LoginStatus {
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            LoginStatus::Ready(identity) => Some(identity),
            _ => None,
        }
    }
}

/// Shared readiness flag for remote calls
///
/// Cloning yields another handle to the same session.
#[derive(Clone)]
pub struct SessionGate {
    tx: Arc<watch::Sender<LoginStatus>>,
}

impl Default for SessionGate {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionGate {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(LoginStatus::LoggedOut);
        Self { tx: Arc::new(tx) }
    }

    /// Gate that starts out ready with `identity`
    pub fn with_identity(identity: Identity) -> Self {
        let gate = Self::new();
        gate.complete_login(identity);
        gate
    }

    pub fn ready(&self) -> bool {
        matches!(*self.tx.borrow(), LoginStatus::Ready(_))
    }

    pub fn identity(&self) -> Option<Identity> {
        self.tx.borrow().identity().cloned()
    }

    pub fn status(&self) -> LoginStatus {
        self.tx.borrow().clone()
    }

    pub fn is_logging_in(&self) -> bool {
        matches!(*self.tx.borrow(), LoginStatus::LoggingIn)
    }

    /// Enter the logging-in state; returns the identity that was dropped, if any
    ///
    /// Any current identity is dropped first, so calls cannot race the new
    /// login against the old credentials.
    pub fn begin_login(&self) -> Option<Identity> {
        match self.tx.send_replace(LoginStatus::LoggingIn) {
            LoginStatus::Ready(identity) => {
                info!(principal = %identity.principal, "Re-authenticating, previous session dropped");
                Some(identity)
            }
            _ => None,
        }
    }

    /// Mark the session ready; returns the identity it replaced, if any
    pub fn complete_login(&self, identity: Identity) -> Option<Identity> {
        info!(principal = %identity.principal, "Session ready");
        match self.tx.send_replace(LoginStatus::Ready(identity)) {
            LoginStatus::Ready(previous) => Some(previous),
            _ => None,
        }
    }

    pub fn fail_login(&self) {
        warn!("Login failed");
        self.tx.send_replace(LoginStatus::LoggedOut);
    }

    /// End the session; returns the identity that was logged out, if any
    pub fn logout(&self) -> Option<Identity> {
        match self.tx.send_replace(LoginStatus::LoggedOut) {
            LoginStatus::Ready(identity) => {
                info!(principal = %identity.principal, "Logged out");
                Some(identity)
            }
            _ => None,
        }
    }

    /// Watch login status transitions
    pub fn subscribe(&self) -> watch::Receiver<LoginStatus> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Identity {
        Identity::new("alice-principal", "token-a")
    }

    #[test]
    fn test_starts_logged_out() {
        let gate = SessionGate::new();
        assert!(!gate.ready());
        assert!(gate.identity().is_none());
        assert_eq!(gate.status(), LoginStatus::LoggedOut);
    }

    #[test]
    fn test_login_lifecycle() {
        let gate = SessionGate::new();

        gate.begin_login();
        assert!(gate.is_logging_in());
        assert!(!gate.ready());

        assert!(gate.complete_login(alice()).is_none());
        assert!(gate.ready());
        assert_eq!(gate.identity(), Some(alice()));

        assert_eq!(gate.logout(), Some(alice()));
        assert!(!gate.ready());
        assert!(gate.logout().is_none());
    }

    #[test]
    fn test_failed_login_is_not_ready() {
        let gate = SessionGate::new();
        gate.begin_login();
        gate.fail_login();
        assert!(!gate.ready());
        assert!(!gate.is_logging_in());
    }

    #[test]
    fn test_relogin_drops_previous_identity() {
        let gate = SessionGate::with_identity(alice());
        assert_eq!(gate.begin_login(), Some(alice()));
        assert!(!gate.ready());
        assert!(gate.identity().is_none());
    }

    #[test]
    fn test_clones_share_state() {
        let gate = SessionGate::new();
        let other = gate.clone();
        gate.complete_login(alice());
        assert!(other.ready());
    }

    #[test]
    fn test_identity_debug_redacts_token() {
        let rendered = format!("{:?}", alice());
        assert!(rendered.contains("alice-principal"));
        assert!(!rendered.contains("token-a"));
    }

    #[tokio::test]
    async fn test_subscribers_observe_transitions() {
        let gate = SessionGate::new();
        let mut rx = gate.subscribe();

        gate.complete_login(alice());
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().identity(), Some(&alice()));

        gate.logout();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), LoginStatus::LoggedOut);
    }
}
