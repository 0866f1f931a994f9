//! Connection registry, input intake and identity hooks for Browsercraft.
//!
//! - [`ConnectionRegistry`]: which live connection owns which player.
//! - [`InputIntake`]: the most recent [`InputIntent`] per player, drained
//!   into an [`InputFrame`] once per tick.
//! - [`AccountService`] / [`IdentitySession`]: the external identity
//!   collaborators consulted when a player joins.
//!
//! ```text
//! Lobby (above)    ← owns one registry + intake per lobby
//!     ↕
//! Session (this crate)
//!     ↕
//! Protocol / Transport (below) ← RawIntent, PlayerId, ConnectionId
//! ```

mod error;
mod identity;
mod intake;
mod intent;
mod registry;

pub use error::{IdentityError, IntakeError, RegistryError};
pub use identity::{
    AccountService, IdentitySession, InMemoryAccounts, InMemorySessions, MAX_NAME_LEN,
    resolve_display_name, validate_display_name,
};
pub use intake::{InputFrame, InputIntake, PlayerInput};
pub use intent::{InputIntent, KeyState, MAX_ORIENTATION, MalformedIntent};
pub use registry::{Binding, ConnectionHandle, ConnectionRegistry, Frame, OutboundTx};
