//! The Browsercraft world: players walk a bounded grid, place blocks, and
//! shoot projectiles that break blocks and damage other players.

use std::collections::BTreeMap;
use std::f32::consts::FRAC_1_SQRT_2;
use std::sync::Arc;
use std::time::Duration;

use browsercraft_protocol::PlayerId;
use browsercraft_session::{InputFrame, InputIntent};
use browsercraft_transport::ConnectionId;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::arena::{Arena, Handle};
use crate::config::WorldConfig;
use crate::snapshot::{BlockView, PlayerView, ProjectileView, StateSnapshot};
use crate::Simulation;

/// Random spawn candidates tried before scanning the grid for a free cell.
const SPAWN_ATTEMPTS: usize = 32;

/// `(col, row)` of a block cell.
type Cell = (i32, i32);

#[derive(Debug, Clone)]
struct Player {
    id: PlayerId,
    connection: ConnectionId,
    name: Arc<str>,
    x: f32,
    y: f32,
    orientation: f32,
    health: u32,
    score: u32,
    deaths: u32,
    shot: bool,
    build: bool,
    last_input_ts: Option<u64>,
    /// First tick at which the player may shoot again.
    shot_ready_at: u64,
    build_ready_at: u64,
}

#[derive(Debug, Clone)]
struct Projectile {
    id: u64,
    owner: PlayerId,
    x: f32,
    y: f32,
    vx: f32,
    vy: f32,
    ticks_left: u32,
}

/// Authoritative Browsercraft state for one lobby.
///
/// Players live in a generational [`Arena`]; `index` maps ids to handles and
/// fixes the iteration order, so the same inputs always produce the same
/// snapshot.
#[derive(Debug)]
pub struct World {
    config: WorldConfig,
    tick: u64,
    players: Arena<Player>,
    index: BTreeMap<PlayerId, Handle>,
    blocks: BTreeMap<Cell, PlayerId>,
    projectiles: Vec<Projectile>,
    next_projectile_id: u64,
}

impl World {
    pub fn new(config: WorldConfig) -> Self {
        Self {
            config: config.validated(),
            tick: 0,
            players: Arena::new(),
            index: BTreeMap::new(),
            blocks: BTreeMap::new(),
            projectiles: Vec::new(),
            next_projectile_id: 1,
        }
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Number of completed ticks.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn projectile_count(&self) -> usize {
        self.projectiles.len()
    }

    /// Owning connection of a player currently in the world.
    pub fn connection_of(&self, player_id: PlayerId) -> Option<ConnectionId> {
        let handle = self.index.get(&player_id)?;
        self.players.get(*handle).map(|p| p.connection)
    }

    fn step(&mut self, inputs: &InputFrame, dt: f32) -> StateSnapshot {
        self.reconcile(inputs);

        let mut shooters = Vec::new();
        let mut builders = Vec::new();
        for input in inputs {
            let Some(&handle) = self.index.get(&input.player_id) else {
                continue;
            };
            let (shoot, build) = self.apply_intent(handle, &input.intent, dt);
            if build {
                builders.push(handle);
            }
            if shoot {
                shooters.push(handle);
            }
        }
        for handle in builders {
            self.try_build(handle);
        }
        for handle in shooters {
            self.fire(handle);
        }

        self.step_projectiles(dt);
        self.tick += 1;
        self.snapshot()
    }

    /// Spawns players new to the frame and removes players missing from it.
    fn reconcile(&mut self, inputs: &InputFrame) {
        let departed: Vec<(PlayerId, Handle)> = self
            .index
            .iter()
            .filter(|(id, _)| !inputs.contains(**id))
            .map(|(id, handle)| (*id, *handle))
            .collect();
        for (id, handle) in departed {
            self.index.remove(&id);
            self.players.remove(handle);
            debug!(player_id = %id, tick = self.tick, "player removed from world");
        }

        for input in inputs {
            if self.index.contains_key(&input.player_id) {
                continue;
            }
            let (x, y) = self.spawn_point(input.player_id, 0);
            let handle = self.players.insert(Player {
                id: input.player_id,
                connection: input.connection,
                name: Arc::clone(&input.name),
                x,
                y,
                orientation: 0.0,
                health: self.config.max_health,
                score: 0,
                deaths: 0,
                shot: false,
                build: false,
                last_input_ts: None,
                shot_ready_at: 0,
                build_ready_at: 0,
            });
            self.index.insert(input.player_id, handle);
            debug!(player_id = %input.player_id, x, y, tick = self.tick, "player spawned");
        }
    }

    /// Applies orientation, movement and action flags. Returns whether the
    /// player may shoot and build this tick.
    fn apply_intent(&mut self, handle: Handle, intent: &InputIntent, dt: f32) -> (bool, bool) {
        let config = &self.config;
        let blocks = &self.blocks;
        let tick = self.tick;
        let Some(player) = self.players.get_mut(handle) else {
            return (false, false);
        };

        if let Some(orientation) = intent.orientation {
            player.orientation = orientation;
        }

        let (ax, ay) = intent.keys.axis();
        if ax != 0 || ay != 0 {
            let mut step = config.player_speed * dt;
            if ax != 0 && ay != 0 {
                step *= FRAC_1_SQRT_2;
            }
            let (x, y) = move_with_collision(
                config,
                blocks,
                player.x,
                player.y,
                f32::from(ax) * step,
                f32::from(ay) * step,
            );
            player.x = x;
            player.y = y;
        }

        player.shot = intent.shot;
        player.build = intent.build;
        if intent.client_ts.is_some() {
            player.last_input_ts = intent.client_ts;
        }

        (
            intent.shot && tick >= player.shot_ready_at,
            intent.build && tick >= player.build_ready_at,
        )
    }

    /// Places a block on the cell the player faces, if that cell is free.
    fn try_build(&mut self, handle: Handle) {
        let Some(player) = self.players.get(handle) else {
            return;
        };
        if self.blocks.len() >= self.config.max_blocks {
            return;
        }

        let tile = self.config.tile_size;
        let cell = cell_at(
            &self.config,
            player.x + player.orientation.cos() * tile,
            player.y + player.orientation.sin() * tile,
        );
        let (cols, rows) = self.config.grid();
        let in_grid = (0..cols).contains(&cell.0) && (0..rows).contains(&cell.1);
        if !in_grid || self.blocks.contains_key(&cell) {
            return;
        }
        let occupied = self
            .players
            .iter()
            .any(|(_, p)| cells_covered(&self.config, p.x, p.y).any(|c| c == cell));
        if occupied {
            return;
        }

        let owner = player.id;
        self.blocks.insert(cell, owner);
        let ready_at = self.tick + u64::from(self.config.build_cooldown_ticks);
        if let Some(player) = self.players.get_mut(handle) {
            player.build_ready_at = ready_at;
        }
        debug!(player_id = %owner, col = cell.0, row = cell.1, "block placed");
    }

    fn fire(&mut self, handle: Handle) {
        let ready_at = self.tick + u64::from(self.config.shot_cooldown_ticks);
        let Some(player) = self.players.get_mut(handle) else {
            return;
        };
        player.shot_ready_at = ready_at;

        let (dx, dy) = (player.orientation.cos(), player.orientation.sin());
        let offset = self.config.player_half_extent + 1.0;
        let speed = self.config.projectile_speed;
        self.projectiles.push(Projectile {
            id: self.next_projectile_id,
            owner: player.id,
            x: player.x + dx * offset,
            y: player.y + dy * offset,
            vx: dx * speed,
            vy: dy * speed,
            ticks_left: self.config.projectile_lifetime_ticks,
        });
        self.next_projectile_id += 1;
    }

    fn step_projectiles(&mut self, dt: f32) {
        let in_flight = std::mem::take(&mut self.projectiles);
        let mut survivors = Vec::with_capacity(in_flight.len());

        for mut projectile in in_flight {
            projectile.x += projectile.vx * dt;
            projectile.y += projectile.vy * dt;
            projectile.ticks_left = projectile.ticks_left.saturating_sub(1);
            if projectile.ticks_left == 0 {
                continue;
            }
            let inside = (0.0..self.config.width).contains(&projectile.x)
                && (0.0..self.config.height).contains(&projectile.y);
            if !inside {
                continue;
            }

            let cell = cell_at(&self.config, projectile.x, projectile.y);
            if self.blocks.remove(&cell).is_some() {
                debug!(projectile = projectile.id, col = cell.0, row = cell.1, "block destroyed");
                continue;
            }

            if let Some(victim) = self.player_hit_by(&projectile) {
                self.apply_hit(victim, projectile.owner);
                continue;
            }
            survivors.push(projectile);
        }

        self.projectiles = survivors;
    }

    /// First player (in id order) other than the owner whose hitbox holds the
    /// projectile.
    fn player_hit_by(&self, projectile: &Projectile) -> Option<Handle> {
        let half = self.config.player_half_extent;
        self.index
            .iter()
            .filter(|(id, _)| **id != projectile.owner)
            .find_map(|(_, handle)| {
                let player = self.players.get(*handle)?;
                let hit = (projectile.x - player.x).abs() <= half
                    && (projectile.y - player.y).abs() <= half;
                hit.then_some(*handle)
            })
    }

    fn apply_hit(&mut self, victim: Handle, shooter: PlayerId) {
        let damage = self.config.projectile_damage;
        let Some(player) = self.players.get_mut(victim) else {
            return;
        };
        player.health = player.health.saturating_sub(damage);
        if player.health > 0 {
            return;
        }

        player.deaths += 1;
        player.health = self.config.max_health;
        let (victim_id, deaths) = (player.id, player.deaths);
        let (x, y) = self.spawn_point(victim_id, u64::from(deaths));
        if let Some(player) = self.players.get_mut(victim) {
            player.x = x;
            player.y = y;
        }

        if let Some(shooter) = self.index.get(&shooter).and_then(|h| self.players.get_mut(*h)) {
            shooter.score += 1;
        }
        debug!(victim = %victim_id, shooter = %shooter, deaths, "player eliminated");
    }

    /// Deterministic spawn point for `player_id`. `salt` varies the point
    /// between respawns.
    fn spawn_point(&self, player_id: PlayerId, salt: u64) -> (f32, f32) {
        let seed = self.config.seed
            ^ player_id.0.wrapping_mul(0x9E37_79B9_7F4A_7C15)
            ^ salt.rotate_left(32);
        let mut rng = StdRng::seed_from_u64(seed);
        let half = self.config.player_half_extent;

        for _ in 0..SPAWN_ATTEMPTS {
            let x = rng.random_range(half..self.config.width - half);
            let y = rng.random_range(half..self.config.height - half);
            if !overlaps_block(&self.config, &self.blocks, x, y) {
                return (x, y);
            }
        }

        // Crowded grid: take the first free cell centre.
        let (cols, rows) = self.config.grid();
        let tile = self.config.tile_size;
        for row in 0..rows {
            for col in 0..cols {
                let (x, y) = ((col as f32 + 0.5) * tile, (row as f32 + 0.5) * tile);
                if !overlaps_block(&self.config, &self.blocks, x, y) {
                    return (x, y);
                }
            }
        }
        (self.config.width / 2.0, self.config.height / 2.0)
    }

    fn snapshot(&self) -> StateSnapshot {
        let players = self
            .index
            .values()
            .filter_map(|handle| self.players.get(*handle))
            .map(|p| PlayerView {
                id: p.id,
                name: p.name.to_string(),
                x: p.x,
                y: p.y,
                orientation: p.orientation,
                health: p.health,
                score: p.score,
                deaths: p.deaths,
                shot: p.shot,
                build: p.build,
                last_input_ts: p.last_input_ts,
            })
            .collect();
        let blocks = self
            .blocks
            .iter()
            .map(|(&(col, row), &owner)| BlockView { col, row, owner })
            .collect();
        let projectiles = self
            .projectiles
            .iter()
            .map(|p| ProjectileView {
                id: p.id,
                owner: p.owner,
                x: p.x,
                y: p.y,
                vx: p.vx,
                vy: p.vy,
            })
            .collect();

        StateSnapshot {
            tick: self.tick,
            players,
            blocks,
            projectiles,
        }
    }
}

impl Simulation for World {
    type Config = WorldConfig;
    type Snapshot = StateSnapshot;

    fn new(config: &WorldConfig) -> Self {
        World::new(config.clone())
    }

    fn advance(&mut self, inputs: &InputFrame, dt: Duration) -> StateSnapshot {
        self.step(inputs, dt.as_secs_f32())
    }
}

fn cell_at(config: &WorldConfig, x: f32, y: f32) -> Cell {
    (
        (x / config.tile_size).floor() as i32,
        (y / config.tile_size).floor() as i32,
    )
}

/// Cells touched by a player hitbox centred at `(x, y)`.
fn cells_covered(config: &WorldConfig, x: f32, y: f32) -> impl Iterator<Item = Cell> {
    let half = config.player_half_extent;
    let (c0, r0) = cell_at(config, x - half, y - half);
    let (c1, r1) = cell_at(config, x + half, y + half);
    (c0..=c1).flat_map(move |col| (r0..=r1).map(move |row| (col, row)))
}

fn overlaps_block(config: &WorldConfig, blocks: &BTreeMap<Cell, PlayerId>, x: f32, y: f32) -> bool {
    cells_covered(config, x, y).any(|cell| blocks.contains_key(&cell))
}

/// Moves one axis at a time so a blocked axis does not stop sliding along
/// the other.
fn move_with_collision(
    config: &WorldConfig,
    blocks: &BTreeMap<Cell, PlayerId>,
    x: f32,
    y: f32,
    dx: f32,
    dy: f32,
) -> (f32, f32) {
    let half = config.player_half_extent;

    let mut nx = (x + dx).clamp(half, config.width - half);
    if overlaps_block(config, blocks, nx, y) {
        nx = x;
    }
    let mut ny = (y + dy).clamp(half, config.height - half);
    if overlaps_block(config, blocks, nx, ny) {
        ny = y;
    }
    (nx, ny)
}
