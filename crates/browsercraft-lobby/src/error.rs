use browsercraft_protocol::LobbyId;
use browsercraft_session::RegistryError;
use browsercraft_transport::ConnectionId;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LobbyError {
    #[error("lobby {0} not found")]
    NotFound(LobbyId),

    #[error("lobby {0} is full")]
    Full(LobbyId),

    /// The lobby task is gone or its command queue is closed.
    #[error("lobby {0} is unavailable")]
    Unavailable(LobbyId),

    #[error("{0} already belongs to lobby {1}")]
    AlreadyInLobby(ConnectionId, LobbyId),

    /// The connection's outbound queue had no room for the join ack, or is
    /// closed. Nothing was registered.
    #[error("outbound queue of {0} cannot take the join ack")]
    Congested(ConnectionId),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl LobbyError {
    /// Code for the wire `error` message, HTTP style.
    pub fn code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::Full(_) => 503,
            Self::Unavailable(_) | Self::Congested(_) => 503,
            Self::AlreadyInLobby(..) => 409,
            Self::Registry(RegistryError::DuplicateBinding(..)) => 409,
            Self::Registry(RegistryError::UnknownConnection(_)) => 400,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use browsercraft_protocol::PlayerId;

    #[test]
    fn test_duplicate_binding_is_conflict() {
        let err = LobbyError::from(RegistryError::DuplicateBinding(
            ConnectionId::new(1),
            PlayerId(1),
        ));
        assert_eq!(err.code(), 409);
    }

    #[test]
    fn test_congested_is_unavailable() {
        assert_eq!(LobbyError::Congested(ConnectionId::new(3)).code(), 503);
    }

    #[test]
    fn test_display() {
        assert_eq!(LobbyError::Full(LobbyId(2)).to_string(), "lobby L-2 is full");
    }
}
