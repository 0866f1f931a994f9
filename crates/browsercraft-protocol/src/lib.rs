//! Wire protocol for the Browsercraft session engine.
//!
//! - **Messages** ([`ClientMessage`], [`ServerMessage`]): what travels
//!   over a connection.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how messages become frames.
//! - **Identity** ([`PlayerId`], [`LobbyId`]).
//!
//! ```text
//! Transport (frames) → Protocol (messages) → Session (registry, intake)
//! ```

mod codec;
mod error;
mod messages;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use messages::{
    ChatLine, ClientMessage, Credentials, JoinRequest, Lenient, RawIntent, RawKeys, RawOrientation,
    ServerMessage,
};
pub use types::{LobbyId, PlayerId};
