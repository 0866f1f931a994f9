use browsercraft_protocol::PlayerId;
use serde::{Deserialize, Serialize};

/// The state broadcast to clients after a tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    pub tick: u64,
    pub players: Vec<PlayerView>,
    pub blocks: Vec<BlockView>,
    pub projectiles: Vec<ProjectileView>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub id: PlayerId,
    pub name: String,
    pub x: f32,
    pub y: f32,
    pub orientation: f32,
    pub health: u32,
    pub score: u32,
    pub deaths: u32,
    pub shot: bool,
    pub build: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub last_input_ts: Option<u64>,
}

/// A placed block, by grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockView {
    pub col: i32,
    pub row: i32,
    pub owner: PlayerId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectileView {
    pub id: u64,
    pub owner: PlayerId,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
}

impl StateSnapshot {
    pub fn player(&self, id: PlayerId) -> Option<&PlayerView> {
        self.players.iter().find(|p| p.id == id)
    }
}
