//! Messages that travel over a client connection.
//!
//! Every frame is adjacently tagged: `{"event": <name>, "data": <payload>}`.
//! Event names are the browser client's socket event names, so an existing
//! client only needs a thin adapter from socket events to frames.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{LobbyId, PlayerId};

// ---------------------------------------------------------------------------
// Client → server
// ---------------------------------------------------------------------------

/// Messages a client sends to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientMessage {
    /// Ask to join the game with a display name.
    #[serde(rename = "new-player")]
    Join(JoinRequest),

    /// The client's current input intent. Sent every client frame.
    #[serde(rename = "player-action")]
    Action(RawIntent),

    /// A chat line typed by the player.
    #[serde(rename = "chat-client-to-server")]
    Chat(String),

    /// Keep-alive ping. `client_time` is echoed back for RTT estimation.
    #[serde(rename = "heartbeat", rename_all = "camelCase")]
    Heartbeat { client_time: u64 },

    /// The client is leaving.
    #[serde(rename = "disconnect")]
    Disconnect {
        #[serde(default)]
        reason: String,
    },
}

/// Payload of a join request.
///
/// The display name is resolved in this order: `session_token` through the
/// identity-session collaborator, then `credentials` through the account
/// service, then `name` as a guest name (if the server allows guests).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct JoinRequest {
    pub name: Option<String>,
    pub session_token: Option<String>,
    pub credentials: Option<Credentials>,
}

/// Username/password pair checked by the account service.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// An input intent exactly as the client sent it.
///
/// Nothing here is trusted. Every field decodes on its own: a field of the
/// wrong shape becomes [`Lenient::Invalid`] instead of failing the frame, and
/// the session layer sanitizes the rest into an `InputIntent`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawIntent {
    /// Held keys, as a list (`["up", "left"]`) or as a map
    /// (`{"up": true, "down": false}`).
    #[serde(alias = "keys")]
    pub keyboard_state: Lenient<RawKeys>,
    /// Facing direction, in radians or as a vector.
    pub orientation: Lenient<Option<RawOrientation>>,
    pub shot: Lenient<bool>,
    pub build: Lenient<bool>,
    /// Client clock in milliseconds. Informational only.
    #[serde(alias = "ts")]
    pub timestamp: Lenient<Option<u64>>,
}

/// A field value that either decoded as `T` or was out of shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lenient<T> {
    Valid(T),
    Invalid,
}

impl<T> Lenient<T> {
    pub fn valid(&self) -> Option<&T> {
        match self {
            Self::Valid(value) => Some(value),
            Self::Invalid => None,
        }
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, Self::Invalid)
    }
}

impl<T: Default> Default for Lenient<T> {
    fn default() -> Self {
        Self::Valid(T::default())
    }
}

impl<T> From<T> for Lenient<T> {
    fn from(value: T) -> Self {
        Self::Valid(value)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Lenient<T> {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Shape<T> {
            Valid(T),
            Invalid(serde::de::IgnoredAny),
        }

        Ok(match Shape::<T>::deserialize(deserializer)? {
            Shape::Valid(value) => Self::Valid(value),
            Shape::Invalid(_) => Self::Invalid,
        })
    }
}

impl<T: Serialize> Serialize for Lenient<T> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Valid(value) => value.serialize(serializer),
            Self::Invalid => serializer.serialize_none(),
        }
    }
}

/// The two key-state encodings browser clients use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawKeys {
    List(Vec<String>),
    Map(BTreeMap<String, bool>),
}

impl Default for RawKeys {
    fn default() -> Self {
        Self::List(Vec::new())
    }
}

impl RawKeys {
    /// Names of the keys reported as held, in wire order.
    pub fn held(&self) -> Vec<&str> {
        match self {
            Self::List(keys) => keys.iter().map(String::as_str).collect(),
            Self::Map(keys) => keys
                .iter()
                .filter(|(_, down)| **down)
                .map(|(key, _)| key.as_str())
                .collect(),
        }
    }
}

impl From<&[&str]> for RawKeys {
    fn from(keys: &[&str]) -> Self {
        Self::List(keys.iter().map(|k| (*k).to_owned()).collect())
    }
}

/// Facing direction as sent: an angle in radians or a direction vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawOrientation {
    Angle(f64),
    Vector { x: f64, y: f64 },
}

impl RawOrientation {
    /// The direction as an angle, `atan2(y, x)` for vectors. A zero vector
    /// has no direction and yields `None`.
    pub fn radians(self) -> Option<f64> {
        match self {
            Self::Angle(angle) => Some(angle),
            Self::Vector { x, y } if x == 0.0 && y == 0.0 => None,
            Self::Vector { x, y } => Some(y.atan2(x)),
        }
    }
}

// ---------------------------------------------------------------------------
// Server → client
// ---------------------------------------------------------------------------

/// Messages the server sends to a client.
///
/// `S` is the simulation's snapshot type; it only appears in
/// [`StateUpdate`](Self::StateUpdate).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerMessage<S = ()> {
    /// The join was processed and the connection now owns a player.
    #[serde(rename = "received-new-player", rename_all = "camelCase")]
    JoinAck { player_id: PlayerId, lobby_id: LobbyId },

    /// A chat line relayed to every connection in the lobby.
    #[serde(rename = "chat-server-to-clients")]
    Chat(ChatLine),

    /// The world after one tick.
    #[serde(rename = "state-update")]
    StateUpdate { tick: u64, state: S },

    /// Reply to a heartbeat.
    #[serde(rename = "heartbeat-ack", rename_all = "camelCase")]
    HeartbeatAck { client_time: u64, server_time: u64 },

    /// A request was rejected. `code` follows HTTP conventions.
    #[serde(rename = "error")]
    Error { code: u16, message: String },
}

/// A relayed chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatLine {
    /// Sender's display name, resolved when the server received the line.
    pub name: String,
    pub message: String,
    /// Receipt order within the lobby, starting at 1.
    pub order: u64,
}
