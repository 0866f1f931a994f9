//! # Browsercraft
//!
//! Server-authoritative multiplayer session engine for a browser
//! block-building shooter.
//!
//! Clients connect over WebSocket, join a lobby and stream input intents.
//! Each lobby runs a fixed-rate simulation and broadcasts the resulting
//! world state to every member after every tick.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use browsercraft::prelude::*;
//!
//! # async fn start() -> Result<(), BrowsercraftError> {
//! let server = BrowsercraftServerBuilder::new()
//!     .bind("0.0.0.0:5000")
//!     .build::<World>(InMemoryAccounts::new(), InMemorySessions::new())
//!     .await?;
//! server.run().await
//! # }
//! ```

mod config;
mod error;
mod handler;
mod server;

pub use config::ServerConfig;
pub use error::BrowsercraftError;
pub use server::{
    BrowsercraftServer, BrowsercraftServerBuilder, DEFAULT_HANDSHAKE_TIMEOUT, REAP_INTERVAL,
};

pub use browsercraft_lobby as lobby;
pub use browsercraft_protocol as protocol;
pub use browsercraft_session as session;
pub use browsercraft_sim as sim;
pub use browsercraft_tick as tick;
pub use browsercraft_transport as transport;

pub mod prelude {
    pub use crate::{BrowsercraftError, BrowsercraftServer, BrowsercraftServerBuilder, ServerConfig};
    pub use browsercraft_lobby::{LobbyConfig, LobbyManager};
    pub use browsercraft_protocol::{ClientMessage, JsonCodec, LobbyId, PlayerId, ServerMessage};
    pub use browsercraft_session::{
        AccountService, IdentitySession, InMemoryAccounts, InMemorySessions,
    };
    pub use browsercraft_sim::{Simulation, StateSnapshot, World, WorldConfig};
}
