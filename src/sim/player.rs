//! Player actor: inventory, carry state and pushing
//!
//! Only the parts of a player the actor core interacts with live here.
//! Input is a single walking axis set by the host before each frame.

use async_trait::async_trait;
use glam::Vec2;

use super::aabb::Aabb;
use super::activation::ActivationDetails;
use super::actor::{Actor, ActorBase, Capability};
use super::level::{LevelHandler, PlayerSnapshot};
use super::state::{ActorId, ActorState, TileCollisionParams, WEAPON_COUNT, WeaponType};
use crate::content::ContentResolver;
use crate::settings::PhysicsRuleset;

const MAX_WALK_SPEED: f32 = 4.0;
const AMMO_LIMIT: u16 = 99;
const SCORE_LIMIT: u32 = 999_999_999;
/// Push speed is scaled up so the player keeps contact with the object
const PUSH_FOLLOW_FACTOR: f32 = 1.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpecialMove {
    #[default]
    None,
    Buttstomp,
    Uppercut,
    Sidekick,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Modifier {
    #[default]
    None,
    Airboard,
    Copter,
}

#[derive(Debug, Clone)]
pub struct Player {
    pub base: ActorBase,
    pub index: u8,
    pub ruleset: PhysicsRuleset,
    pub ammo: [u16; WEAPON_COUNT],
    pub weapon_upgrades: [u8; WEAPON_COUNT],
    pub current_weapon: WeaponType,
    pub score: u32,
    /// Solid object currently carrying this player
    pub carrying_object: Option<ActorId>,
    pub special_move: SpecialMove,
    pub sugar_rush_left: f32,
    pub in_water: bool,
    pub modifier: Modifier,
    /// Walking input in [-1, 1]
    pub walk: f32,
    push_frames_left: f32,
}

impl Player {
    pub fn new(index: u8) -> Self {
        Self {
            base: ActorBase::new(),
            index,
            ruleset: PhysicsRuleset::default(),
            ammo: [0; WEAPON_COUNT],
            weapon_upgrades: [0; WEAPON_COUNT],
            current_weapon: WeaponType::Blaster,
            score: 0,
            carrying_object: None,
            special_move: SpecialMove::None,
            sugar_rush_left: 0.0,
            in_water: false,
            modifier: Modifier::None,
            walk: 0.0,
            push_frames_left: 0.0,
        }
    }

    pub fn can_break_solid_objects(&self) -> bool {
        self.special_move != SpecialMove::None || self.sugar_rush_left > 0.0
    }

    pub fn can_move_vertically(&self) -> bool {
        self.in_water || self.modifier != Modifier::None
    }

    pub fn is_pushing(&self) -> bool {
        self.push_frames_left > 0.0
    }

    /// Returns whether the carrying object changed
    pub fn set_carrying_object(&mut self, object: Option<ActorId>, reset_speed: bool) -> bool {
        let changed = self.carrying_object != object;
        self.carrying_object = object;

        if reset_speed {
            self.base.set_state(ActorState::CAN_JUMP, true);
            self.base.speed.y = 0.0;
            self.base.external_force.y = 0.0;
            self.base.internal_force_y = 0.0;
        }
        changed
    }

    /// Returns false when the weapon is already full
    pub fn add_ammo(&mut self, weapon: WeaponType, count: u16) -> bool {
        let ammo = &mut self.ammo[weapon.index()];
        if *ammo >= AMMO_LIMIT {
            return false;
        }
        let switch_to = *ammo == 0;
        *ammo = ammo.saturating_add(count).min(AMMO_LIMIT);
        if switch_to {
            self.current_weapon = weapon;
        }
        true
    }

    pub fn add_weapon_upgrade(&mut self, weapon: WeaponType, upgrade: u8) {
        self.weapon_upgrades[weapon.index()] |= upgrade;
    }

    pub fn add_score(&mut self, amount: u32) {
        self.score = self.score.saturating_add(amount).min(SCORE_LIMIT);
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            ammo: self.ammo,
            carrying_object: self.carrying_object,
        }
    }

    fn update_hitbox(&mut self) {
        let (half_width, above, below) = self.ruleset.player_hitbox();
        let pos = self.base.pos;
        self.base.aabb_inner = Aabb::new(pos.x - half_width, pos.y - above, pos.x + half_width, pos.y + below);
        self.base.aabb = self.base.aabb_inner;
    }

    fn apply_walking(&mut self, time_mult: f32) {
        let accel = self.ruleset.player_acceleration() * time_mult;
        let speed = &mut self.base.speed.x;
        if self.walk != 0.0 {
            *speed = (*speed + self.walk * accel).clamp(-MAX_WALK_SPEED, MAX_WALK_SPEED);
            self.base.set_state(ActorState::IS_FACING_LEFT, self.walk < 0.0);
        } else if *speed > 0.0 {
            *speed = (*speed - accel).max(0.0);
        } else if *speed < 0.0 {
            *speed = (*speed + accel).min(0.0);
        }
    }

    /// Push the solid object directly ahead, following it at the push speed
    pub fn push_solid_objects(&mut self, time_mult: f32, level: &mut dyn LevelHandler) {
        if self.push_frames_left > 0.0 {
            self.push_frames_left -= time_mult;
        }

        let speed_x = self.base.speed.x;
        if !self.base.has_state(ActorState::CAN_JUMP) || self.walk == 0.0 || speed_x.abs() <= 0.0 {
            return;
        }

        let offset = if speed_x < 0.0 { -2.0 } else { 2.0 };
        let hitbox = self.base.aabb_inner.translated(Vec2::new(offset, 0.0));
        let mut params = TileCollisionParams::new(false);
        let mut collider = None;
        if level.is_position_empty_with_collider(&self.base, &hitbox, &mut params, &mut collider) {
            return;
        }
        let Some(object) = collider else {
            return;
        };

        let left = speed_x < 0.0;
        let mut push_speed = 0.0;
        level.with_actor(object, &mut |actor, level| {
            if let Some(solid) = actor.as_solid_mut() {
                push_speed = solid.push(left, time_mult, level);
            }
        });

        if push_speed.abs() > 0.0 {
            self.base.speed.x = push_speed * PUSH_FOLLOW_FACTOR * time_mult;
            self.push_frames_left = 3.0;
        }
    }
}

#[async_trait(?Send)]
impl Actor for Player {
    fn base(&self) -> &ActorBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ActorBase {
        &mut self.base
    }

    async fn on_activated(&mut self, _details: &ActivationDetails, content: &ContentResolver) -> bool {
        self.base.set_state(ActorState::COLLIDE_WITH_SOLID_OBJECTS, true);
        self.base.set_health(5);
        self.ammo[WeaponType::Blaster.index()] = AMMO_LIMIT;
        if !self.base.request_metadata(content, "Interactive/Player").await {
            return false;
        }
        self.base.set_animation("Idle");
        true
    }

    fn on_update_hitbox(&mut self) {
        self.update_hitbox();
    }

    fn on_update(&mut self, time_mult: f32, level: &mut dyn LevelHandler) {
        self.apply_walking(time_mult);
        if self.sugar_rush_left > 0.0 {
            self.sugar_rush_left = (self.sugar_rush_left - time_mult).max(0.0);
        }

        self.push_solid_objects(time_mult, level);

        let mut params = TileCollisionParams::new(self.base.speed.y >= 0.0);
        self.base.try_standard_movement(time_mult, &mut params, level);
        self.update_hitbox();
        level.sync_proxy(&self.base);
        self.base.update_frozen_state(time_mult, level);
    }

    fn capability(&self) -> Capability {
        Capability::Player {
            id: self.base.id,
            can_break_solid_objects: self.can_break_solid_objects(),
        }
    }

    fn as_player(&self) -> Option<&Player> {
        Some(self)
    }

    fn as_player_mut(&mut self) -> Option<&mut Player> {
        Some(self)
    }
}
