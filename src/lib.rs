//! Jazz Actors - actor physics core for a side-scrolling platformer
//!
//! Core modules:
//! - `sim`: Deterministic simulation (actors, collisions, push/carry, containers)
//! - `content`: Metadata cache with asynchronous, non-blocking loading
//! - `jobs`: Worker pool for asset decoding
//! - `settings`: Level configuration and the physics ruleset

pub mod content;
pub mod jobs;
pub mod settings;
pub mod sim;

pub use content::{ContentError, ContentResolver, Metadata};
pub use jobs::{JobError, ThreadPool};
pub use settings::{PhysicsRuleset, Settings, SettingsError};

use glam::{IVec2, Vec2};

/// Simulation constants
pub mod consts {
    /// Reference frame rate; `time_mult == 1.0` is one frame at this rate
    pub const FRAMES_PER_SECOND: f32 = 60.0;
    /// Fixed simulation step (seconds)
    pub const SIM_DT: f32 = 1.0 / FRAMES_PER_SECOND;
    /// Maximum substeps per host frame to prevent spiral of death
    pub const MAX_SUBSTEPS: u32 = 8;

    /// Tile edge length in world units
    pub const TILE_SIZE: f32 = 32.0;

    /// Default level gravity (units/frame²)
    pub const DEFAULT_GRAVITY: f32 = 0.3;
    /// Speed clamp applied by standard movement on both axes
    pub const MAX_SPEED: f32 = 16.0;
    /// Step used by incremental collision searches
    pub const COLLISION_CHECK_STEP: f32 = 0.5;

    /// Horizontal speed of a pushed solid object (units/frame)
    pub const PUSH_SPEED: f32 = 0.5;
    /// Frames a push stays alive without being refreshed
    pub const PUSH_DECAY_TIME: f32 = 6.0;
    /// Vertical nudges tried when relocating a carried rider
    pub const CARRY_ADJUST_ATTEMPTS: usize = 8;
    /// Size of the vertical nudge per attempt (units/frame)
    pub const CARRY_ADJUST_STEP: f32 = 0.5;

    /// Damage amount that always kills
    pub const INSTANT_KILL: i32 = i32::MAX;
    /// Size of the fixed event parameter block
    pub const EVENT_PARAMS_LEN: usize = 16;
}

/// Tile coordinate containing a world position
#[inline]
pub fn tile_of(pos: Vec2) -> IVec2 {
    IVec2::new(
        (pos.x / consts::TILE_SIZE).floor() as i32,
        (pos.y / consts::TILE_SIZE).floor() as i32,
    )
}

/// Converts an elapsed wall-clock time (seconds) into a frame-time multiplier
#[inline]
pub fn time_mult_from_secs(dt: f32) -> f32 {
    dt * consts::FRAMES_PER_SECOND
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_of_negative_coordinates() {
        assert_eq!(tile_of(Vec2::new(31.9, 32.0)), IVec2::new(0, 1));
        assert_eq!(tile_of(Vec2::new(-0.1, -32.0)), IVec2::new(-1, -1));
    }

    #[test]
    fn test_time_mult_from_secs() {
        assert!((time_mult_from_secs(1.0 / 60.0) - 1.0).abs() < 0.0001);
        assert!((time_mult_from_secs(1.0 / 30.0) - 2.0).abs() < 0.0001);
    }
}
