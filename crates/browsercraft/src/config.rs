//! Process configuration: command-line flags with environment fallbacks.

use std::time::Duration;

use browsercraft_lobby::{DEFAULT_TICK_RATE_HZ, LobbyConfig};
use clap::{ArgAction, Parser};

pub const DEFAULT_IP: &str = "localhost";
pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Server settings. Every flag can also come from the environment (or a
/// `.env` file loaded at startup).
#[derive(Debug, Clone, Parser)]
#[command(name = "browsercraft", version, about = "Browsercraft multiplayer game server")]
pub struct ServerConfig {
    /// Interface to listen on
    #[arg(long, env = "IP", default_value = DEFAULT_IP)]
    pub ip: String,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Simulation ticks per second in every lobby
    #[arg(long, env = "TICK_RATE_HZ", default_value_t = DEFAULT_TICK_RATE_HZ)]
    pub tick_rate_hz: u32,

    /// Players per lobby before a new lobby is opened
    #[arg(long, env = "MAX_PLAYERS_PER_LOBBY", default_value_t = 16)]
    pub max_players_per_lobby: usize,

    /// Accept a bare display name without login
    #[arg(long, env = "ALLOW_GUESTS", default_value_t = true, action = ArgAction::Set)]
    pub allow_guests: bool,

    /// Seconds without any client frame before the connection is dropped
    #[arg(long, env = "IDLE_TIMEOUT_SECS", default_value_t = 30)]
    pub idle_timeout_secs: u64,

    /// Post a server chat line when a player joins or leaves
    #[arg(long, env = "ANNOUNCE_JOINS")]
    pub announce_joins: bool,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, env = "LOG_LEVEL", default_value = DEFAULT_LOG_LEVEL)]
    pub log_level: String,

    /// Development mode: verbose logging and a demo account (dev / dev)
    #[arg(long, env = "DEV")]
    pub dev: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ip: DEFAULT_IP.to_owned(),
            port: DEFAULT_PORT,
            tick_rate_hz: DEFAULT_TICK_RATE_HZ,
            max_players_per_lobby: 16,
            allow_guests: true,
            idle_timeout_secs: 30,
            announce_joins: false,
            log_level: DEFAULT_LOG_LEVEL.to_owned(),
            dev: false,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs.max(1))
    }

    pub fn lobby_config(&self) -> LobbyConfig {
        LobbyConfig {
            max_players: self.max_players_per_lobby,
            announce_joins: self.announce_joins,
            ..LobbyConfig::default()
        }
        .with_tick_rate(self.tick_rate_hz)
        .validated()
    }

    /// `--dev` turns the default level up to debug; an explicit level wins.
    pub fn log_filter(&self) -> String {
        if self.dev && self.log_level == DEFAULT_LOG_LEVEL {
            "debug,tungstenite=info,tokio_tungstenite=info".to_owned()
        } else {
            self.log_level.clone()
        }
    }
}
