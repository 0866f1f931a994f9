//! World tuning.

/// Smallest world edge the world accepts, in world units.
pub const MIN_WORLD_EXTENT: f32 = 128.0;

/// Rules and dimensions of a [`World`](crate::World).
///
/// Distances are world units (one unit is one pixel of the reference
/// client). Speeds are units per second and are scaled by the tick `dt`.
/// Cooldowns and lifetimes count ticks.
#[derive(Debug, Clone, PartialEq)]
pub struct WorldConfig {
    pub width: f32,
    pub height: f32,
    /// Edge length of one block cell.
    pub tile_size: f32,
    /// Half the edge of the square player hitbox.
    pub player_half_extent: f32,
    pub player_speed: f32,
    pub max_health: u32,
    pub projectile_speed: f32,
    pub projectile_damage: u32,
    pub projectile_lifetime_ticks: u32,
    pub shot_cooldown_ticks: u32,
    pub build_cooldown_ticks: u32,
    pub max_blocks: usize,
    /// Seed for spawn points. Worlds with equal seeds spawn identically.
    pub seed: u64,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            width: 1600.0,
            height: 1200.0,
            tile_size: 32.0,
            player_half_extent: 12.0,
            player_speed: 200.0,
            max_health: 100,
            projectile_speed: 600.0,
            projectile_damage: 25,
            projectile_lifetime_ticks: 90,
            shot_cooldown_ticks: 15,
            build_cooldown_ticks: 10,
            max_blocks: 2048,
            seed: 0x0b10_c4a7,
        }
    }
}

impl WorldConfig {
    /// Returns a copy with every value clamped into a usable range.
    ///
    /// Non-finite or non-positive dimensions fall back to the defaults, the
    /// hitbox is kept smaller than one cell, and counts are at least one.
    pub fn validated(&self) -> Self {
        let defaults = Self::default();
        let positive = |v: f32, fallback: f32| if v.is_finite() && v > 0.0 { v } else { fallback };

        let width = positive(self.width, defaults.width).max(MIN_WORLD_EXTENT);
        let height = positive(self.height, defaults.height).max(MIN_WORLD_EXTENT);
        let tile_size = positive(self.tile_size, defaults.tile_size).min(width.min(height) / 4.0);
        let player_half_extent =
            positive(self.player_half_extent, defaults.player_half_extent).min(tile_size * 0.45);

        Self {
            width,
            height,
            tile_size,
            player_half_extent,
            player_speed: positive(self.player_speed, defaults.player_speed),
            max_health: self.max_health.max(1),
            projectile_speed: positive(self.projectile_speed, defaults.projectile_speed),
            projectile_damage: self.projectile_damage.max(1),
            projectile_lifetime_ticks: self.projectile_lifetime_ticks.max(1),
            shot_cooldown_ticks: self.shot_cooldown_ticks,
            build_cooldown_ticks: self.build_cooldown_ticks,
            max_blocks: self.max_blocks,
            seed: self.seed,
        }
    }

    /// Number of block columns and rows that fit in the world.
    pub fn grid(&self) -> (i32, i32) {
        (
            (self.width / self.tile_size).floor() as i32,
            (self.height / self.tile_size).floor() as i32,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_already_valid() {
        let config = WorldConfig::default();
        assert_eq!(config.validated(), config);
    }

    #[test]
    fn test_validated_replaces_bad_dimensions() {
        let config = WorldConfig {
            width: f32::NAN,
            height: -5.0,
            tile_size: 0.0,
            player_speed: f32::INFINITY,
            ..WorldConfig::default()
        }
        .validated();

        let defaults = WorldConfig::default();
        assert_eq!(config.width, defaults.width);
        assert_eq!(config.height, defaults.height);
        assert_eq!(config.tile_size, defaults.tile_size);
        assert_eq!(config.player_speed, defaults.player_speed);
    }

    #[test]
    fn test_validated_keeps_hitbox_inside_a_cell() {
        let config = WorldConfig {
            tile_size: 10.0,
            player_half_extent: 50.0,
            ..WorldConfig::default()
        }
        .validated();
        assert!(config.player_half_extent * 2.0 < config.tile_size);
    }

    #[test]
    fn test_grid_size() {
        assert_eq!(WorldConfig::default().grid(), (50, 37));
    }
}
