//! Lobby configuration.

use std::time::Duration;

use browsercraft_tick::{MAX_INTERVAL, MIN_INTERVAL, TickConfig, interval_from_hz};

/// Default tick rate of a lobby.
pub const DEFAULT_TICK_RATE_HZ: u32 = 60;

/// Settings shared by every lobby a manager creates.
#[derive(Debug, Clone)]
pub struct LobbyConfig {
    /// Bound players per lobby. `join_or_create` opens a new lobby once
    /// every existing one is at this count.
    pub max_players: usize,

    /// Fixed simulation step.
    pub tick_interval: Duration,

    /// Budget thresholds and startup jitter for the lobby's scheduler.
    pub tick: TickConfig,

    /// Capacity of each connection's outbound frame queue. A connection
    /// whose queue is full misses frames until its writer catches up.
    pub outbound_capacity: usize,

    /// Capacity of the lobby's command queue.
    pub command_capacity: usize,

    /// Chat lines longer than this (in characters) are truncated.
    pub max_chat_len: usize,

    /// Relay a server chat line, from [`SERVER_CHAT_NAME`], whenever a
    /// player joins or leaves.
    pub announce_joins: bool,
}

/// Sender name of chat lines the server writes itself.
pub const SERVER_CHAT_NAME: &str = "[Browsercraft]";

impl Default for LobbyConfig {
    fn default() -> Self {
        Self {
            max_players: 16,
            tick_interval: interval_from_hz(DEFAULT_TICK_RATE_HZ),
            tick: TickConfig::default(),
            outbound_capacity: 64,
            command_capacity: 256,
            max_chat_len: 200,
            announce_joins: false,
        }
    }
}

impl LobbyConfig {
    pub fn with_tick_rate(mut self, tick_rate_hz: u32) -> Self {
        self.tick_interval = interval_from_hz(tick_rate_hz);
        self
    }

    /// Clamps every field into a usable range.
    pub fn validated(mut self) -> Self {
        self.max_players = self.max_players.max(1);
        self.tick_interval = self.tick_interval.clamp(MIN_INTERVAL, MAX_INTERVAL);
        self.tick = self.tick.validated();
        self.outbound_capacity = self.outbound_capacity.max(1);
        self.command_capacity = self.command_capacity.max(1);
        self.max_chat_len = self.max_chat_len.max(1);
        self
    }
}
