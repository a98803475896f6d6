//! Session lifecycle state.
//!
//! A client is either unauthenticated or holds exactly one live session
//! artifact (a token, key, or cookie jar depending on the device). All
//! transitions go through `&mut self` on the owning client, so there is
//! never a second artifact in flight for the same connection.

/// Authentication state of a client, generic over the artifact the device
/// hands back at login.
#[derive(Debug, Clone, Default)]
pub enum SessionState<A> {
    /// No session artifact is held.
    #[default]
    Unauthenticated,
    /// A session artifact is held and attached to outgoing requests.
    Active(A),
}

impl<A> SessionState<A> {
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Active(_))
    }

    /// The current artifact, if any.
    pub fn artifact(&self) -> Option<&A> {
        match self {
            SessionState::Unauthenticated => None,
            SessionState::Active(artifact) => Some(artifact),
        }
    }

    /// Install a new artifact, replacing whatever was held before.
    pub fn activate(&mut self, artifact: A) {
        *self = SessionState::Active(artifact);
    }

    /// Drop the held artifact. Calling this while unauthenticated is a no-op.
    pub fn deactivate(&mut self) {
        *self = SessionState::Unauthenticated;
    }

    /// Remove and return the held artifact, leaving the state unauthenticated.
    pub fn take(&mut self) -> Option<A> {
        match std::mem::replace(self, SessionState::Unauthenticated) {
            SessionState::Unauthenticated => None,
            SessionState::Active(artifact) => Some(artifact),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_unauthenticated() {
        let state: SessionState<String> = SessionState::default();
        assert!(!state.is_active());
        assert!(state.artifact().is_none());
    }

    #[test]
    fn test_activate_replaces_previous_artifact() {
        let mut state = SessionState::Unauthenticated;
        state.activate("first".to_string());
        state.activate("second".to_string());
        assert_eq!(state.artifact().map(String::as_str), Some("second"));
    }

    #[test]
    fn test_deactivate_is_idempotent() {
        let mut state = SessionState::Active(42);
        state.deactivate();
        state.deactivate();
        assert!(!state.is_active());
    }

    #[test]
    fn test_take_leaves_unauthenticated() {
        let mut state = SessionState::Active("token".to_string());
        assert_eq!(state.take(), Some("token".to_string()));
        assert!(!state.is_active());
        assert_eq!(state.take(), None);
    }
}
