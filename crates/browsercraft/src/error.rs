//! Unified error type for the Browsercraft server.

use browsercraft_lobby::{LobbyError, LobbyFailure};
use browsercraft_protocol::ProtocolError;
use browsercraft_session::{IdentityError, IntakeError, RegistryError};
use browsercraft_tick::TickError;
use browsercraft_transport::TransportError;

/// Top-level error wrapping every crate-specific error.
///
/// Each variant has a `From` impl, so `?` converts sub-crate errors.
#[derive(Debug, thiserror::Error)]
pub enum BrowsercraftError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Intake(#[from] IntakeError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Tick(#[from] TickError),

    #[error(transparent)]
    Lobby(#[from] LobbyError),

    /// A lobby task crashed. The server stops when this happens.
    #[error("{0}")]
    LobbyFailed(LobbyFailure),
}

#[cfg(test)]
mod tests {
    use super::*;
    use browsercraft_protocol::LobbyId;
    use browsercraft_transport::ConnectionId;

    #[test]
    fn test_from_transport_error() {
        let err: BrowsercraftError = TransportError::ConnectionClosed("gone".into()).into();
        assert!(matches!(err, BrowsercraftError::Transport(_)));
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_registry_error() {
        let err: BrowsercraftError = RegistryError::UnknownConnection(ConnectionId::new(4)).into();
        assert!(matches!(err, BrowsercraftError::Registry(_)));
        assert_eq!(err.to_string(), "connection conn-4 is not registered");
    }

    #[test]
    fn test_from_lobby_error() {
        let err: BrowsercraftError = LobbyError::NotFound(LobbyId(1)).into();
        assert!(matches!(err, BrowsercraftError::Lobby(_)));
    }

    #[test]
    fn test_lobby_failure_message() {
        let err = BrowsercraftError::LobbyFailed(LobbyFailure {
            lobby_id: LobbyId(2),
            reason: "boom".into(),
        });
        assert_eq!(err.to_string(), "lobby L-2 crashed: boom");
    }
}
