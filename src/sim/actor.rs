//! Actor base state and the hook contract every actor type implements
//!
//! Hooks never call each other implicitly. An override that wants the
//! default behaviour calls the matching `ActorBase` helper (or the
//! `SolidObject` one) explicitly, and `on_perish` reports through
//! [`PerishOutcome`] whether final removal already happened.

use std::sync::Arc;

use async_trait::async_trait;
use glam::{IVec2, Vec2};

use super::aabb::Aabb;
use super::activation::ActivationDetails;
use super::level::LevelHandler;
use super::player::Player;
use super::solid::SolidObject;
use super::state::{
    ActorId, ActorState, EventType, LevelEvent, MoveType, TileCollisionParams, WeaponType,
};
use super::weapons::Shot;
use crate::consts::{COLLISION_CHECK_STEP, INSTANT_KILL, MAX_SPEED};
use crate::content::{ContentResolver, Metadata};

/// What a collider is, resolved once per collision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Shot {
        owner: Option<ActorId>,
        weapon: WeaponType,
        strength: i32,
    },
    Explosive {
        owner: Option<ActorId>,
        /// The blast is live; an unexploded charge only shortens fuses
        detonated: bool,
    },
    Player {
        id: ActorId,
        can_break_solid_objects: bool,
    },
    Other,
}

/// Result of `on_perish`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PerishOutcome {
    /// Base cleanup ran; the actor leaves the registry at the end of the frame
    Removed,
    /// Removal waits for a transition to finish
    Deferred,
}

/// Deferred work attached to a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionCallback {
    FinishPerish { collider: Option<ActorId> },
}

#[derive(Debug, Clone, PartialEq)]
struct Transition {
    name: String,
    time_left: f32,
    callback: TransitionCallback,
}

/// State shared by every actor
#[derive(Debug, Clone)]
pub struct ActorBase {
    pub id: ActorId,
    pub pos: Vec2,
    pub speed: Vec2,
    pub external_force: Vec2,
    pub internal_force_y: f32,
    pub elasticity: f32,
    pub friction: f32,
    pub frozen_time_left: f32,
    pub health: i32,
    pub max_health: i32,
    state: ActorState,
    /// Outer bounds, used for actor-vs-actor overlap
    pub aabb: Aabb,
    /// Inner bounds, used for movement and solid tests
    pub aabb_inner: Aabb,
    pub origin_tile: IVec2,
    pub layer: i32,
    pub event_type: Option<EventType>,
    pub metadata: Option<Arc<Metadata>>,
    pub animation: String,
    transition: Option<Transition>,
}

impl Default for ActorBase {
    fn default() -> Self {
        Self::new()
    }
}

impl ActorBase {
    pub fn new() -> Self {
        Self {
            id: ActorId(0),
            pos: Vec2::ZERO,
            speed: Vec2::ZERO,
            external_force: Vec2::ZERO,
            internal_force_y: 0.0,
            elasticity: 0.0,
            friction: 1.5,
            frozen_time_left: 0.0,
            health: 1,
            max_health: 1,
            state: ActorState::empty(),
            aabb: Aabb::default(),
            aabb_inner: Aabb::default(),
            origin_tile: IVec2::ZERO,
            layer: 0,
            event_type: None,
            metadata: None,
            animation: String::new(),
            transition: None,
        }
    }

    pub fn state(&self) -> ActorState {
        self.state
    }

    /// True when every bit of `flags` is set
    pub fn has_state(&self, flags: ActorState) -> bool {
        self.state.contains(flags)
    }

    pub fn set_state(&mut self, flags: ActorState, value: bool) {
        self.state.set(flags, value);
    }

    pub fn replace_state(&mut self, state: ActorState) {
        self.state = state;
    }

    pub fn set_health(&mut self, health: i32) {
        self.health = health;
        self.max_health = health;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen_time_left > 0.0
    }

    pub fn is_invulnerable(&self) -> bool {
        self.has_state(ActorState::IS_INVULNERABLE)
    }

    pub fn add_external_force(&mut self, force: Vec2) {
        self.external_force += force;
    }

    /// Await metadata from the cache; a suspension point of activation
    pub async fn request_metadata(&mut self, content: &ContentResolver, path: &str) -> bool {
        match content.request_metadata(path).await {
            Ok(metadata) => {
                self.metadata = Some(metadata);
                true
            }
            Err(e) => {
                log::debug!("Actor {} could not load {}: {}", self.id, path, e);
                false
            }
        }
    }

    pub fn set_animation(&mut self, name: &str) {
        self.animation.clear();
        self.animation.push_str(name);
    }

    pub fn animation_duration(&self, name: &str) -> f32 {
        self.metadata
            .as_ref()
            .and_then(|m| m.animation_duration(name))
            .unwrap_or(0.0)
    }

    /// Play a one-shot animation and run `callback` when it ends
    pub fn set_transition(&mut self, name: &str, callback: TransitionCallback) {
        self.transition = Some(Transition {
            name: name.to_string(),
            time_left: self.animation_duration(name),
            callback,
        });
    }

    pub fn has_transition(&self) -> bool {
        self.transition.is_some()
    }

    pub fn transition_name(&self) -> Option<&str> {
        self.transition.as_ref().map(|t| t.name.as_str())
    }

    /// Count the running transition down; returns its callback once it ends
    pub fn advance_transition(&mut self, time_mult: f32) -> Option<TransitionCallback> {
        let transition = self.transition.as_mut()?;
        if transition.time_left > 0.0 {
            transition.time_left -= time_mult;
            return None;
        }
        self.transition.take().map(|t| t.callback)
    }

    /// Collision box of `w`×`h` centered on the position
    pub fn update_hitbox(&mut self, w: f32, h: f32) {
        self.aabb_inner = Aabb::from_center(self.pos, w, h);
        self.aabb = self.aabb_inner;
    }

    /// Refresh the collision box from the loaded metadata
    pub fn refresh_hitbox(&mut self) {
        if let Some((w, h)) = self.metadata.as_ref().map(|m| m.bounding_box) {
            self.update_hitbox(w as f32, h as f32);
        }
    }

    /// Move by `v` (or to `v` for `MoveType::Absolute`) if the target is free
    pub fn move_instantly(
        &mut self,
        v: Vec2,
        move_type: MoveType,
        params: &mut TileCollisionParams,
        level: &mut dyn LevelHandler,
    ) -> bool {
        let (new_pos, aabb) = match move_type {
            MoveType::Relative | MoveType::Force => {
                if v == Vec2::ZERO {
                    return true;
                }
                (self.pos + v, self.aabb_inner.translated(v))
            }
            MoveType::Absolute => (v, self.aabb_inner.translated(v - self.pos)),
        };

        let free = move_type == MoveType::Force || level.is_position_empty(self, &aabb, params);
        if free {
            let delta = new_pos - self.pos;
            self.aabb_inner = aabb;
            self.aabb = self.aabb.translated(delta);
            self.pos = new_pos;
            if !self.has_state(ActorState::FORCE_DISABLE_COLLISIONS) {
                self.state |= ActorState::IS_DIRTY;
            }
            level.sync_proxy(self);
        }
        free
    }

    /// Gravity, forces and speed applied with slope and wall handling
    pub fn try_standard_movement(
        &mut self,
        time_mult: f32,
        params: &mut TileCollisionParams,
        level: &mut dyn LevelHandler,
    ) {
        let gravity = if self.has_state(ActorState::APPLY_GRAVITATION) {
            level.gravity()
        } else {
            0.0
        };
        let elasticity = self.elasticity;

        let accel_y = (self.internal_force_y + self.external_force.y) * time_mult;
        self.speed.x = self.speed.x.clamp(-MAX_SPEED, MAX_SPEED);
        self.speed.y = (self.speed.y + accel_y).clamp(-MAX_SPEED, MAX_SPEED);

        let (mut effective_x, mut effective_y) = if self.is_frozen() {
            let x = (self.external_force.x * time_mult).clamp(-MAX_SPEED, MAX_SPEED);
            let y = if self.has_state(ActorState::APPLY_GRAVITATION) {
                self.speed.y + 0.5 * accel_y
            } else {
                ((gravity * 2.0 + self.internal_force_y) * time_mult).clamp(-MAX_SPEED, MAX_SPEED)
            };
            (x, y)
        } else {
            (
                self.speed.x + self.external_force.x * time_mult,
                self.speed.y + 0.5 * accel_y,
            )
        };
        effective_x *= time_mult;
        effective_y *= time_mult;

        if effective_x.abs() > 0.0 || effective_y.abs() > 0.0 {
            if self.has_state(ActorState::CAN_JUMP | ActorState::APPLY_GRAVITATION) {
                self.move_on_ground(effective_x, effective_y, elasticity, params, level);
            } else {
                self.move_airborne(effective_x, effective_y, elasticity, time_mult, params, level);
            }
        }

        if self.external_force.x > 0.0 {
            self.external_force.x = (self.external_force.x - self.friction * time_mult).max(0.0);
        } else if self.external_force.x < 0.0 {
            self.external_force.x = (self.external_force.x + self.friction * time_mult).min(0.0);
        }

        if gravity > 0.0 {
            let mut below = self.aabb_inner;
            below.b += COLLISION_CHECK_STEP;
            if level.is_position_empty(self, &below, params) {
                self.speed.y += gravity * time_mult;
                self.set_state(ActorState::CAN_JUMP, false);
            } else if effective_y.abs() <= f32::EPSILON {
                self.set_state(ActorState::CAN_JUMP, true);
            }

            self.external_force.y = (self.external_force.y + gravity * 0.33 * time_mult).min(0.0);
            self.internal_force_y = (self.internal_force_y + gravity * 0.33 * time_mult).min(0.0);
        }
    }

    fn move_on_ground(
        &mut self,
        effective_x: f32,
        effective_y: f32,
        elasticity: f32,
        params: &mut TileCollisionParams,
        level: &mut dyn LevelHandler,
    ) {
        // Follow slopes between roughly 45 degrees down and 45 degrees up
        let max_y_diff = 3.0f32.max(effective_x.abs() + 2.5);
        let mut y_diff = max_y_diff + effective_y;
        while y_diff >= -max_y_diff + effective_y {
            if self.move_instantly(Vec2::new(effective_x, y_diff), MoveType::Relative, params, level) {
                return;
            }
            y_diff -= COLLISION_CHECK_STEP;
        }

        let sign = if effective_x > 0.0 { 1.0 } else { -1.0 };
        let mut x_diff = effective_x.abs();
        while x_diff >= -effective_x.abs() {
            if self.move_instantly(Vec2::new(x_diff * sign, 0.0), MoveType::Relative, params, level) {
                return;
            }
            x_diff -= COLLISION_CHECK_STEP;
        }

        // Facing a wall
        if x_diff > COLLISION_CHECK_STEP || (x_diff > 0.0 && elasticity > 0.0) {
            self.speed.x = -(elasticity * self.speed.x);
        }
    }

    fn move_airborne(
        &mut self,
        effective_x: f32,
        effective_y: f32,
        elasticity: f32,
        time_mult: f32,
        params: &mut TileCollisionParams,
        level: &mut dyn LevelHandler,
    ) {
        if self.move_instantly(Vec2::new(effective_x, effective_y), MoveType::Relative, params, level) {
            return;
        }

        let sign_x = if effective_x > 0.0 { 1.0 } else { -1.0 };
        let mut x_diff = effective_x.abs();
        while x_diff > f32::EPSILON {
            if self.move_instantly(Vec2::new(x_diff * sign_x, 0.0), MoveType::Relative, params, level) {
                break;
            }
            x_diff -= COLLISION_CHECK_STEP;
        }

        let sign_y = if effective_y > 0.0 { 1.0 } else { -1.0 };
        let mut y_diff = effective_y.abs();
        while y_diff > f32::EPSILON {
            let signed = y_diff * sign_y;
            if self.move_instantly(Vec2::new(0.0, signed), MoveType::Relative, params, level)
                || self.move_instantly(Vec2::new(y_diff * 0.2, signed), MoveType::Relative, params, level)
                || self.move_instantly(Vec2::new(y_diff * -0.2, signed), MoveType::Relative, params, level)
            {
                break;
            }
            y_diff -= COLLISION_CHECK_STEP;
        }

        if y_diff < effective_y.abs() {
            if effective_y > 0.0 {
                self.speed.y = -(elasticity * effective_y / time_mult);
                if self.speed.y > -COLLISION_CHECK_STEP {
                    self.speed.y = 0.0;
                    self.set_state(ActorState::CAN_JUMP, true);
                }
            } else {
                self.speed.y = 0.0;
            }
        }

        if x_diff < effective_x.abs() * 0.3 && x_diff > 0.0 && elasticity > 0.0 {
            self.speed.x = -(elasticity * self.speed.x);
        }
    }

    pub fn update_frozen_state(&mut self, time_mult: f32, level: &mut dyn LevelHandler) {
        if self.frozen_time_left > 0.0 {
            self.frozen_time_left -= time_mult;
            if self.frozen_time_left <= 0.0 {
                self.frozen_time_left = 0.0;
                level.emit(LevelEvent::Sound {
                    pos: self.pos,
                    name: "IceBreak",
                });
            }
        }
    }

    /// Default per-frame update
    pub fn update(&mut self, time_mult: f32, level: &mut dyn LevelHandler) {
        let mut params = TileCollisionParams::new(self.speed.y >= 0.0);
        self.try_standard_movement(time_mult, &mut params, level);
        self.refresh_hitbox();
        level.sync_proxy(self);
        self.update_frozen_state(time_mult, level);
    }

    /// Freeze or thaw in response to a freezer or toaster shot
    pub fn handle_frozen_state_change(&mut self, other: &mut dyn Actor, level: &mut dyn LevelHandler) {
        let Capability::Shot { owner, weapon, .. } = other.capability() else {
            return;
        };
        match weapon {
            WeaponType::Freezer if owner != Some(self.id) => {
                let duration = other.as_shot_mut().map_or(0.0, |shot| shot.frozen_duration());
                self.frozen_time_left = duration;
                other.decrease_health(INSTANT_KILL, Some(self.id), level);
            }
            WeaponType::Toaster => {
                self.frozen_time_left = self.frozen_time_left.min(1.0);
            }
            _ => {}
        }
    }

    /// Base perish: clear the event tile and mark for removal
    pub fn perish(&mut self, collider: Option<ActorId>, level: &mut dyn LevelHandler) -> PerishOutcome {
        if self.has_state(ActorState::IS_CREATED_FROM_EVENT_MAP) {
            let tile = self.origin_tile;
            if let Some(events) = level.event_map() {
                events.deactivate(tile);
                events.store_tile_event(tile, EventType::Empty, [0; 16]);
            }
        }

        self.state |= ActorState::IS_DESTROYED | ActorState::SKIP_PER_PIXEL_COLLISIONS;
        level.sync_proxy(self);
        level.emit(LevelEvent::Perished { id: self.id, collider });
        log::debug!("Actor {} perished (collider {:?})", self.id, collider);
        PerishOutcome::Removed
    }
}

/// Behaviour hooks of a live actor
#[async_trait(?Send)]
pub trait Actor {
    fn base(&self) -> &ActorBase;
    fn base_mut(&mut self) -> &mut ActorBase;

    /// Suspendable initialization; `false` discards the actor
    async fn on_activated(&mut self, details: &ActivationDetails, content: &ContentResolver) -> bool;

    /// Size the collision boxes once activation succeeded
    fn on_update_hitbox(&mut self) {
        self.base_mut().refresh_hitbox();
    }

    fn on_update(&mut self, time_mult: f32, level: &mut dyn LevelHandler) {
        self.base_mut().update(time_mult, level);
    }

    /// Returns whether the collision was consumed
    fn on_handle_collision(&mut self, other: &mut dyn Actor, level: &mut dyn LevelHandler) -> bool {
        if self.base().has_state(ActorState::CAN_BE_FROZEN) {
            self.base_mut().handle_frozen_state_change(other, level);
        }
        false
    }

    fn on_health_changed(&mut self, _collider: Option<ActorId>, _level: &mut dyn LevelHandler) {}

    fn on_perish(&mut self, collider: Option<ActorId>, level: &mut dyn LevelHandler) -> PerishOutcome {
        self.base_mut().perish(collider, level)
    }

    fn on_transition_finished(&mut self, callback: TransitionCallback, level: &mut dyn LevelHandler) {
        match callback {
            TransitionCallback::FinishPerish { collider } => {
                self.base_mut().perish(collider, level);
            }
        }
    }

    /// Reduce health and perish on reaching zero. Returns whether this call killed the actor.
    fn decrease_health(&mut self, amount: i32, collider: Option<ActorId>, level: &mut dyn LevelHandler) -> bool {
        let base = self.base_mut();
        if amount <= 0 || base.health <= 0 {
            return false;
        }
        base.health = if amount >= base.health { 0 } else { base.health - amount };

        if base.health > 0 {
            self.on_health_changed(collider, level);
            return false;
        }
        if self.on_perish(collider, level) == PerishOutcome::Deferred {
            log::trace!("Actor {} perish deferred", self.base().id);
        }
        true
    }

    fn capability(&self) -> Capability {
        Capability::Other
    }

    fn as_player(&self) -> Option<&Player> {
        None
    }

    fn as_player_mut(&mut self) -> Option<&mut Player> {
        None
    }

    fn as_solid(&self) -> Option<&SolidObject> {
        None
    }

    fn as_solid_mut(&mut self) -> Option<&mut SolidObject> {
        None
    }

    fn as_shot_mut(&mut self) -> Option<&mut Shot> {
        None
    }
}
