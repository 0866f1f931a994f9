//! Lobbies for Browsercraft.
//!
//! Each lobby runs as its own Tokio task (actor model) with its own
//! connection registry, input intake, simulation and tick loop.
//!
//! # Key types
//!
//! - [`LobbyManager`]: creates lobbies and places connections in them
//! - [`LobbyHandle`]: send commands to a running lobby
//! - [`BroadcastDispatcher`]: encodes once, fans out with `try_send`
//! - [`LobbyConfig`]: player cap, tick rate, queue sizes

mod config;
mod dispatch;
mod error;
mod lobby;
mod manager;

pub use config::{DEFAULT_TICK_RATE_HZ, LobbyConfig, SERVER_CHAT_NAME};
pub use dispatch::{BroadcastDispatcher, DispatchReport};
pub use error::LobbyError;
pub use lobby::{LobbyHandle, LobbyInfo};
pub use manager::{LobbyFailure, LobbyManager, Placement};
