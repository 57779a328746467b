//! Shared simulation vocabulary: ids, state flags, weapons, event types

use std::fmt;

use bitflags::bitflags;
use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::consts::EVENT_PARAMS_LEN;

/// Registry handle of a live actor. Ids are never reused within a level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ActorId(pub u32);

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

bitflags! {
    /// Per-actor state bits
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct ActorState: u32 {
        const IS_CREATED_FROM_EVENT_MAP = 0x01;
        const IS_FROM_GENERATOR = 0x02;
        const ILLUMINATED = 0x04;
        const ASYNC = 0x08;

        const INITIALIZED = 0x100;
        const IS_INVULNERABLE = 0x200;
        const CAN_JUMP = 0x400;
        const CAN_BE_FROZEN = 0x800;
        const IS_FACING_LEFT = 0x1000;

        const COLLIDE_WITH_TILESET = 0x10000;
        const COLLIDE_WITH_OTHER_ACTORS = 0x20000;
        const COLLIDE_WITH_SOLID_OBJECTS = 0x40000;
        const FORCE_DISABLE_COLLISIONS = 0x80000;
        const IS_DIRTY = 0x100000;
        const IS_DESTROYED = 0x200000;
        const APPLY_GRAVITATION = 0x400000;
        const IS_SOLID_OBJECT = 0x800000;
        const SKIP_PER_PIXEL_COLLISIONS = 0x1000000;
        const COLLIDE_WITH_TILESET_REDUCED = 0x2000000;
        const COLLIDE_WITH_SOLID_OBJECTS_BELOW = 0x4000000;
        const TRIGGERS_TNT = 0x8000000;
    }
}

/// Number of weapon types
pub const WEAPON_COUNT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum WeaponType {
    Blaster = 0,
    Bouncer,
    Freezer,
    Seeker,
    RF,
    Toaster,
    TNT,
    Pepper,
    Electro,
    Thunderbolt,
}

impl WeaponType {
    pub const ALL: [WeaponType; WEAPON_COUNT] = [
        WeaponType::Blaster,
        WeaponType::Bouncer,
        WeaponType::Freezer,
        WeaponType::Seeker,
        WeaponType::RF,
        WeaponType::Toaster,
        WeaponType::TNT,
        WeaponType::Pepper,
        WeaponType::Electro,
        WeaponType::Thunderbolt,
    ];

    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.get(value as usize).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

bitflags! {
    /// Set of weapon types, one bit per `WeaponType`
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct WeaponSet: u16 {
        const BLASTER = 1 << 0;
        const BOUNCER = 1 << 1;
        const FREEZER = 1 << 2;
        const SEEKER = 1 << 3;
        const RF = 1 << 4;
        const TOASTER = 1 << 5;
        const TNT = 1 << 6;
        const PEPPER = 1 << 7;
        const ELECTRO = 1 << 8;
        const THUNDERBOLT = 1 << 9;
    }
}

impl WeaponSet {
    pub fn of(weapon: WeaponType) -> Self {
        Self::from_bits_truncate(1 << weapon.index())
    }

    pub fn accepts(&self, weapon: WeaponType) -> bool {
        self.contains(Self::of(weapon))
    }
}

/// Level event types understood by the activation factory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum EventType {
    Empty = 0x0000,
    Ammo = 0x0002,
    PowerUpWeapon = 0x0003,
    Food = 0x0004,
    Gem = 0x0040,
    Coin = 0x0048,
    Crate = 0x0061,
    Barrel = 0x0062,
    CrateAmmo = 0x0063,
    BarrelAmmo = 0x0064,
    PushableBox = 0x00C5,
    WeaponTNT = 0x0609,
}

impl EventType {
    pub fn from_u16(value: u16) -> Option<Self> {
        Some(match value {
            0x0000 => EventType::Empty,
            0x0002 => EventType::Ammo,
            0x0003 => EventType::PowerUpWeapon,
            0x0004 => EventType::Food,
            0x0040 => EventType::Gem,
            0x0048 => EventType::Coin,
            0x0061 => EventType::Crate,
            0x0062 => EventType::Barrel,
            0x0063 => EventType::CrateAmmo,
            0x0064 => EventType::BarrelAmmo,
            0x00C5 => EventType::PushableBox,
            0x0609 => EventType::WeaponTNT,
            _ => return None,
        })
    }
}

/// Fixed-size event parameter block
pub type EventParams = [u8; EVENT_PARAMS_LEN];

/// Copy at most `EVENT_PARAMS_LEN` bytes into a parameter block
pub fn event_params(bytes: &[u8]) -> EventParams {
    let mut params = [0u8; EVENT_PARAMS_LEN];
    let len = bytes.len().min(EVENT_PARAMS_LEN);
    params[..len].copy_from_slice(&bytes[..len]);
    params
}

/// How `move_instantly` interprets its vector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveType {
    /// Target position
    Absolute,
    /// Offset from the current position
    Relative,
    /// Relative, skipping the emptiness test
    Force,
}

bitflags! {
    /// What a collision test is allowed to destroy
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct TileDestructType: u8 {
        const WEAPON = 0x01;
        const SPECIAL_MOVE = 0x02;
        const IGNORE_SOLID_TILES = 0x80;
    }
}

/// In/out parameters of a tile collision test
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileCollisionParams {
    pub destruct_type: TileDestructType,
    /// The mover is heading down, so one-way platforms block
    pub downwards: bool,
    pub weapon_type: WeaponType,
    /// Maximum number of tiles this test may destroy
    pub weapon_strength: u32,
    /// Out: tiles destroyed by this test
    pub tiles_destroyed: u32,
}

impl TileCollisionParams {
    pub fn new(downwards: bool) -> Self {
        Self {
            destruct_type: TileDestructType::empty(),
            downwards,
            weapon_type: WeaponType::Blaster,
            weapon_strength: 0,
            tiles_destroyed: 0,
        }
    }

    pub fn weapon(weapon_type: WeaponType, weapon_strength: u32) -> Self {
        Self {
            destruct_type: TileDestructType::WEAPON,
            downwards: false,
            weapon_type,
            weapon_strength,
            tiles_destroyed: 0,
        }
    }
}

/// Request to activate a new actor at the start of the next frame
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnRequest {
    pub event_type: EventType,
    pub pos: Vec2,
    pub layer: i32,
    pub params: EventParams,
    /// External force applied once the actor is activated
    pub force: Vec2,
}

/// Observable side effects, drained by the host each frame
#[derive(Debug, Clone, PartialEq)]
pub enum LevelEvent {
    Activated { id: ActorId, event_type: Option<EventType> },
    ActivationFailed { event_type: Option<EventType> },
    Perished { id: ActorId, collider: Option<ActorId> },
    Debris { pos: Vec2, count: u32 },
    Sound { pos: Vec2, name: &'static str },
    Score { player: ActorId, amount: u32 },
    Ricochet { shot: ActorId, pos: Vec2 },
    CarryChanged { player: ActorId, object: Option<ActorId> },
    TileDestroyed { tile: glam::IVec2 },
    Explosion { pos: Vec2 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weapon_set_accepts() {
        let set = WeaponSet::BLASTER | WeaponSet::RF;
        assert!(set.accepts(WeaponType::RF));
        assert!(!set.accepts(WeaponType::Toaster));
        assert_eq!(WeaponSet::of(WeaponType::Thunderbolt), WeaponSet::THUNDERBOLT);
    }

    #[test]
    fn test_weapon_from_u8() {
        assert_eq!(WeaponType::from_u8(3), Some(WeaponType::Seeker));
        assert_eq!(WeaponType::from_u8(10), None);
    }

    #[test]
    fn test_event_params_truncates() {
        let params = event_params(&[7; 20]);
        assert_eq!(params, [7; EVENT_PARAMS_LEN]);
        let params = event_params(&[1, 2]);
        assert_eq!(&params[..3], &[1, 2, 0]);
    }

    #[test]
    fn test_event_type_roundtrip() {
        assert_eq!(EventType::from_u16(0x0064), Some(EventType::BarrelAmmo));
        assert_eq!(EventType::from_u16(0x7777), None);
    }
}
