//! Connection state machine.

use std::fmt;

/// The lifecycle state of a client's connection.
///
/// ```text
/// Disconnected → Connecting → Authenticating → Ready ──→ Closed
///                                  │    ↑
///                                  ↓    │ (auth answered again)
///                             Disconnected
/// ```
///
/// - **Disconnected**: not yet initialized, or the service rejected the
///   API key. After a rejection the socket is still open but nothing
///   further will happen on it.
/// - **Connecting**: `init` is opening the transport.
/// - **Authenticating**: the auth command has been sent. There is no
///   timeout; a service that never answers leaves the client here.
/// - **Ready**: authenticated.
/// - **Closed**: the transport closed. Terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Authenticating,
    Ready,
    Closed,
}

impl ConnectionState {
    /// Returns `true` if moving to `target` is a valid transition.
    pub fn can_transition_to(self, target: Self) -> bool {
        use ConnectionState::*;
        match (self, target) {
            (Closed, _) => false,
            (_, Closed) => true,
            (Disconnected, Connecting) => true,
            (Connecting, Authenticating) => true,
            (Authenticating | Ready, Ready | Disconnected) => true,
            (Disconnected, Ready) => true,
            _ => false,
        }
    }

    /// Returns `true` once authentication succeeded and the transport is
    /// still open.
    pub fn is_ready(self) -> bool {
        self == Self::Ready
    }

    /// Returns `true` if the transport has closed.
    pub fn is_closed(self) -> bool {
        self == Self::Closed
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Authenticating => write!(f, "Authenticating"),
            Self::Ready => write!(f, "Ready"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConnectionState::*;

    #[test]
    fn test_default_is_disconnected() {
        assert_eq!(ConnectionState::default(), Disconnected);
    }

    #[test]
    fn test_happy_path_transitions() {
        assert!(Disconnected.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Authenticating));
        assert!(Authenticating.can_transition_to(Ready));
        assert!(Ready.can_transition_to(Closed));
    }

    #[test]
    fn test_auth_rejection_goes_back_to_disconnected() {
        assert!(Authenticating.can_transition_to(Disconnected));
        // A rejected client can still be accepted by a later auth answer.
        assert!(Disconnected.can_transition_to(Ready));
    }

    #[test]
    fn test_no_skipping_the_handshake() {
        assert!(!Disconnected.can_transition_to(Authenticating));
        assert!(!Connecting.can_transition_to(Ready));
        assert!(!Disconnected.can_transition_to(Disconnected));
    }

    #[test]
    fn test_any_open_state_can_close() {
        for state in [Disconnected, Connecting, Authenticating, Ready] {
            assert!(state.can_transition_to(Closed), "{state} -> Closed");
        }
    }

    #[test]
    fn test_closed_is_terminal() {
        for state in [Disconnected, Connecting, Authenticating, Ready, Closed] {
            assert!(!Closed.can_transition_to(state));
        }
    }

    #[test]
    fn test_predicates_and_display() {
        assert!(Ready.is_ready());
        assert!(!Authenticating.is_ready());
        assert!(Closed.is_closed());
        assert_eq!(Authenticating.to_string(), "Authenticating");
    }
}
