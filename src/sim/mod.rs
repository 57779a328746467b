//! Deterministic simulation module
//!
//! All actor logic lives here. This module must be pure and deterministic:
//! - Frame-scaled updates only (`time_mult`)
//! - Seeded RNG only
//! - Stable iteration order (by actor id)
//! - No rendering or platform dependencies

pub mod aabb;
pub mod activation;
pub mod actor;
pub mod collectible;
pub mod collision;
pub mod container;
pub mod level;
pub mod monitor;
pub mod player;
pub mod solid;
pub mod state;
pub mod tick;
pub mod tiles;
pub mod weapons;

pub use aabb::Aabb;
pub use activation::{ActivationDetails, ActivationScheduler, create_actor};
pub use actor::{Actor, ActorBase, Capability, PerishOutcome, TransitionCallback};
pub use collectible::{Collectible, CollectibleKind};
pub use collision::{HitDamage, HitOutcome, HitPolicy, apply_hit_policy};
pub use container::{
    AmmoBarrel, AmmoCrate, BarrelContainer, ContainerContent, ContainerFamily, CrateContainer,
    GenericContainer, PushableBox,
};
pub use level::{Level, LevelContext, LevelHandler, PlayerSnapshot, World, with_player};
pub use monitor::PowerUpWeaponMonitor;
pub use player::{Modifier, Player, SpecialMove};
pub use solid::SolidObject;
pub use state::{
    ActorId, ActorState, EventParams, EventType, LevelEvent, MoveType, SpawnRequest,
    TileCollisionParams, TileDestructType, WeaponSet, WeaponType, event_params,
};
pub use tick::tick;
pub use tiles::{EventMap, StoredEvent, Tile, TileMap};
pub use weapons::{Shot, Tnt};
