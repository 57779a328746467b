//! Level settings and the physics ruleset
//!
//! Every behaviour that differs between the classic and the reforged rules
//! is a method on [`PhysicsRuleset`], so call sites never branch on a bare flag.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::consts::DEFAULT_GRAVITY;

/// Errors while reading settings
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid settings JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Ruleset toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PhysicsRuleset {
    Classic,
    #[default]
    Reforged,
}

impl PhysicsRuleset {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhysicsRuleset::Classic => "Classic",
            PhysicsRuleset::Reforged => "Reforged",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "classic" | "original" => Some(PhysicsRuleset::Classic),
            "reforged" => Some(PhysicsRuleset::Reforged),
            _ => None,
        }
    }

    pub fn is_reforged(&self) -> bool {
        *self == PhysicsRuleset::Reforged
    }

    /// Walking acceleration of a player (units/frame²)
    pub fn player_acceleration(&self) -> f32 {
        match self {
            PhysicsRuleset::Classic => 0.4,
            PhysicsRuleset::Reforged => 0.2,
        }
    }

    /// Player hitbox as (half width, height above hotspot, height below hotspot)
    pub fn player_hitbox(&self) -> (f32, f32, f32) {
        match self {
            PhysicsRuleset::Classic => (10.0, 8.0, 20.0),
            PhysicsRuleset::Reforged => (11.0, 10.0, 20.0),
        }
    }

    /// Whether a solid object falling onto a player hurts it
    pub fn falling_objects_hurt_players(&self) -> bool {
        match self {
            PhysicsRuleset::Classic => false,
            PhysicsRuleset::Reforged => true,
        }
    }
}

/// Level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub ruleset: PhysicsRuleset,
    /// Gravity applied to actors with `APPLY_GRAVITATION`
    pub gravity: f32,
    /// Asset decoding threads (0 = decode on the frame thread)
    pub worker_threads: usize,
    /// Seed for all gameplay randomness
    pub seed: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ruleset: PhysicsRuleset::default(),
            gravity: DEFAULT_GRAVITY,
            worker_threads: 2,
            seed: 0x4A4A_3250,
        }
    }
}

impl Settings {
    pub fn from_json(json: &str) -> Result<Self, SettingsError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, SettingsError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load settings from a JSON file, falling back to defaults
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match std::fs::read_to_string(path)
            .map_err(SettingsError::from)
            .and_then(|json| Self::from_json(&json))
        {
            Ok(settings) => {
                log::info!("Loaded settings from {}", path.display());
                settings
            }
            Err(e) => {
                log::info!("Using default settings ({})", e);
                Self::default()
            }
        }
    }
}
