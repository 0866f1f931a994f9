//! Authoritative simulation for Browsercraft lobbies.
//!
//! A lobby owns exactly one [`Simulation`] and calls
//! [`advance`](Simulation::advance) once per tick with the drained
//! [`InputFrame`]. The simulation never talks to the network; it only turns
//! a frame of intents into the next snapshot.
//!
//! [`World`] is the shipped implementation.

mod arena;
mod config;
mod snapshot;
mod world;

use std::fmt::Debug;
use std::time::Duration;

use browsercraft_session::InputFrame;
use serde::Serialize;

pub use arena::{Arena, Handle};
pub use config::{MIN_WORLD_EXTENT, WorldConfig};
pub use snapshot::{BlockView, PlayerView, ProjectileView, StateSnapshot};
pub use world::World;

/// Fixed-step game logic driven by a lobby.
///
/// `advance` is deterministic: the same sequence of frames and `dt` values
/// starting from the same config always yields the same snapshots. It must
/// not read the wall clock or any other ambient state, and it cannot fail;
/// malformed input has already been sanitized away by the intake.
///
/// The roster is whatever the frame says it is. A player present in the
/// frame but unknown to the simulation is spawned before intents apply; a
/// known player missing from the frame is removed.
pub trait Simulation: Send + 'static {
    type Config: Clone + Debug + Default + Send + Sync + 'static;
    type Snapshot: Serialize + Clone + Debug + Send + Sync + 'static;

    fn new(config: &Self::Config) -> Self;

    fn advance(&mut self, inputs: &InputFrame, dt: Duration) -> Self::Snapshot;
}
