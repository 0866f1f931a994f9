//! Error types for the session layer.

use browsercraft_protocol::PlayerId;
use browsercraft_transport::ConnectionId;

/// Errors raised by the [`ConnectionRegistry`](crate::ConnectionRegistry).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// The connection was never registered, or has already been removed.
    #[error("connection {0} is not registered")]
    UnknownConnection(ConnectionId),

    /// The connection already owns a player. The existing binding is left
    /// untouched and the connection stays usable.
    #[error("connection {0} is already bound to player {1}")]
    DuplicateBinding(ConnectionId, PlayerId),
}

/// Errors raised by the [`InputIntake`](crate::InputIntake).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntakeError {
    /// Input arrived for a connection that isn't bound to a player. The
    /// intent is dropped.
    #[error("input from unbound connection {0}")]
    UnknownConnection(ConnectionId),
}

/// Reasons a join request can't produce a display name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    /// The session token doesn't map to a logged-in user.
    #[error("unknown session")]
    UnknownSession,

    /// The account service rejected the username/password.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// A bare display name was supplied but guests are disabled.
    #[error("guest players are not allowed")]
    GuestsNotAllowed,

    /// The request carried no way to identify the player.
    #[error("a display name is required")]
    MissingName,

    /// The resolved display name breaks the naming rules.
    #[error("invalid display name: {0}")]
    InvalidName(String),
}
