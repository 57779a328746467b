//! Destructible containers and the pushable box
//!
//! A container holds an ordered list of content descriptors. When it
//! perishes every descriptor is spawned `count` times, in insertion order,
//! before the container leaves the world. Crates wait for their break
//! animation before removal, barrels go at once.

use async_trait::async_trait;
use glam::Vec2;
use rand::Rng;

use super::activation::ActivationDetails;
use super::actor::{Actor, ActorBase, PerishOutcome, TransitionCallback};
use super::collision::{HitPolicy, apply_hit_policy};
use super::level::{LevelHandler, with_player};
use super::solid::SolidObject;
use super::state::{
    ActorId, ActorState, EventParams, EventType, LevelEvent, SpawnRequest, WeaponType, event_params,
};
use crate::content::ContentResolver;

/// Spawn count range of the fallback ammo policy (upper bound exclusive)
const FALLBACK_AMMO_COUNT: std::ops::Range<u32> = 4..7;
/// Weapon used when no player holds ammo for anything but the blaster
const FALLBACK_WEAPON: WeaponType = WeaponType::Bouncer;
const AMMO_CRATE_COUNT: u32 = 5;
const FALLING_HURT_SPEED: f32 = 4.0;

/// One kind of pickup a container releases
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerContent {
    pub event_type: EventType,
    pub count: u32,
    pub params: EventParams,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerFamily {
    /// Removal waits for the "Destroyed" transition
    Crate,
    /// Removed as soon as it perishes
    Barrel,
}

/// Solid object with content and a family-specific perish
#[derive(Debug, Clone)]
pub struct GenericContainer {
    pub solid: SolidObject,
    pub family: ContainerFamily,
    /// Synthesize random ammo when perishing without content
    pub fallback_ammo: bool,
    content: Vec<ContainerContent>,
    spawned: bool,
}

impl GenericContainer {
    pub fn new(family: ContainerFamily) -> Self {
        Self {
            solid: SolidObject::new(),
            family,
            fallback_ammo: false,
            content: Vec::new(),
            spawned: false,
        }
    }

    /// Append a descriptor; `params` longer than the parameter block is truncated
    pub fn add_content(&mut self, event_type: EventType, count: u32, params: &[u8]) {
        if count == 0 {
            return;
        }
        self.content.push(ContainerContent {
            event_type,
            count,
            params: event_params(params),
        });
    }

    pub fn content(&self) -> &[ContainerContent] {
        &self.content
    }

    /// Ammo for weapons the players actually hold, 4 to 6 single pickups
    pub fn add_fallback_ammo(&mut self, level: &mut dyn LevelHandler) {
        let mut eligible: Vec<WeaponType> = Vec::new();
        for player in level.player_ids() {
            let Some(snapshot) = level.player_snapshot(player) else {
                continue;
            };
            for weapon in WeaponType::ALL.into_iter().skip(1) {
                if snapshot.ammo[weapon.index()] > 0 && !eligible.contains(&weapon) {
                    eligible.push(weapon);
                }
            }
        }
        if eligible.is_empty() {
            eligible.push(FALLBACK_WEAPON);
        }

        let count = level.rng().random_range(FALLBACK_AMMO_COUNT);
        for _ in 0..count {
            let weapon = eligible[level.rng().random_range(0..eligible.len())];
            self.add_content(EventType::Ammo, 1, &[weapon as u8]);
        }
        log::debug!(
            "Container {} synthesized {} ammo pickups from {:?}",
            self.solid.base.id,
            count,
            eligible
        );
    }

    /// Queue every pickup at the container's position. Runs once.
    pub fn spawn_content(&mut self, level: &mut dyn LevelHandler) {
        if self.spawned {
            return;
        }
        self.spawned = true;

        let total: u32 = self.content.iter().map(|c| c.count).sum();
        let base = &self.solid.base;
        for content in &self.content {
            for _ in 0..content.count {
                let (offset, force) = if total > 1 {
                    let rng = level.rng();
                    (
                        Vec2::new(rng.random_range(-8.0..8.0), rng.random_range(-2.0..2.0)),
                        Vec2::new(rng.random_range(-2.0..2.0), rng.random_range(-3.0..-1.0)),
                    )
                } else {
                    (Vec2::ZERO, Vec2::ZERO)
                };
                level.spawn(SpawnRequest {
                    event_type: content.event_type,
                    pos: base.pos + offset,
                    layer: base.layer,
                    params: content.params,
                    force,
                });
            }
        }
    }

    fn apply_container_state(&mut self) {
        self.solid.apply_solid_state();
        self.solid.base.set_state(ActorState::TRIGGERS_TNT, true);
        self.solid.base.set_health(1);
    }

    /// Family-specific perish: debris, content, then removal (deferred for crates)
    pub fn perish(&mut self, collider: Option<ActorId>, level: &mut dyn LevelHandler) -> PerishOutcome {
        if self.content.is_empty() && self.fallback_ammo {
            self.add_fallback_ammo(level);
        }

        let pos = self.solid.base.pos;
        level.emit(LevelEvent::Debris { pos, count: 5 });
        level.emit(LevelEvent::Sound { pos, name: "Break" });

        match self.family {
            ContainerFamily::Crate => {
                let base = &mut self.solid.base;
                base.set_state(
                    ActorState::IS_SOLID_OBJECT
                        | ActorState::COLLIDE_WITH_OTHER_ACTORS
                        | ActorState::COLLIDE_WITH_TILESET
                        | ActorState::APPLY_GRAVITATION,
                    false,
                );
                base.frozen_time_left = base.frozen_time_left.min(1.0);
                base.set_transition("Destroyed", TransitionCallback::FinishPerish { collider });
                level.sync_proxy(&self.solid.base);
                self.solid.cancel_push();
                self.solid.release_riders(level);
                self.spawn_content(level);
                PerishOutcome::Deferred
            }
            ContainerFamily::Barrel => {
                self.spawn_content(level);
                self.solid.perish(collider, level)
            }
        }
    }

    /// Shared collision entry point of every container type
    fn handle_collision(
        actor: &mut dyn Actor,
        other: &mut dyn Actor,
        level: &mut dyn LevelHandler,
    ) -> bool {
        if apply_hit_policy(actor, other, &HitPolicy::any_weapon(), level).is_handled() {
            return true;
        }
        match actor.as_solid_mut() {
            Some(solid) => solid.handle_collision(other, level),
            None => false,
        }
    }
}

/// Implements `Actor` for a type with a `container: GenericContainer` field
macro_rules! container_actor {
    ($ty:ty, $metadata:expr) => {
        #[async_trait(?Send)]
        impl Actor for $ty {
            fn base(&self) -> &ActorBase {
                &self.container.solid.base
            }

            fn base_mut(&mut self) -> &mut ActorBase {
                &mut self.container.solid.base
            }

            async fn on_activated(&mut self, details: &ActivationDetails, content: &ContentResolver) -> bool {
                self.container.apply_container_state();
                self.configure(details);
                if !self.container.solid.base.request_metadata(content, $metadata).await {
                    return false;
                }
                self.container.solid.base.set_animation("Idle");
                true
            }

            fn on_update(&mut self, time_mult: f32, level: &mut dyn LevelHandler) {
                self.container.solid.update(time_mult, level);
            }

            fn on_handle_collision(&mut self, other: &mut dyn Actor, level: &mut dyn LevelHandler) -> bool {
                GenericContainer::handle_collision(self, other, level)
            }

            fn on_perish(&mut self, collider: Option<ActorId>, level: &mut dyn LevelHandler) -> PerishOutcome {
                self.container.perish(collider, level)
            }

            fn on_transition_finished(&mut self, callback: TransitionCallback, level: &mut dyn LevelHandler) {
                match callback {
                    TransitionCallback::FinishPerish { collider } => {
                        self.container.solid.perish(collider, level);
                    }
                }
            }

            fn as_solid(&self) -> Option<&SolidObject> {
                Some(&self.container.solid)
            }

            fn as_solid_mut(&mut self) -> Option<&mut SolidObject> {
                Some(&mut self.container.solid)
            }
        }

        impl $ty {
            pub fn preload(_params: &EventParams, content: &ContentResolver) {
                content.preload_metadata($metadata);
            }
        }
    };
}

/// Pushable crate of ammo for the weapon in `params[0]`
#[derive(Debug, Clone)]
pub struct AmmoCrate {
    pub container: GenericContainer,
}

impl Default for AmmoCrate {
    fn default() -> Self {
        Self::new()
    }
}

impl AmmoCrate {
    pub fn new() -> Self {
        let mut container = GenericContainer::new(ContainerFamily::Crate);
        container.fallback_ammo = true;
        Self { container }
    }

    fn configure(&mut self, details: &ActivationDetails) {
        self.container.solid.movable = true;
        add_weapon_ammo(&mut self.container, details.params[0]);
    }
}

container_actor!(AmmoCrate, "Object/CrateAmmo");

/// Barrel of ammo; same content rules as the crate, removed immediately
#[derive(Debug, Clone)]
pub struct AmmoBarrel {
    pub container: GenericContainer,
}

impl Default for AmmoBarrel {
    fn default() -> Self {
        Self::new()
    }
}

impl AmmoBarrel {
    pub fn new() -> Self {
        let mut container = GenericContainer::new(ContainerFamily::Barrel);
        container.fallback_ammo = true;
        Self { container }
    }

    fn configure(&mut self, details: &ActivationDetails) {
        add_weapon_ammo(&mut self.container, details.params[0]);
    }
}

container_actor!(AmmoBarrel, "Object/BarrelAmmo");

fn add_weapon_ammo(container: &mut GenericContainer, weapon: u8) {
    match WeaponType::from_u8(weapon) {
        Some(WeaponType::Blaster) => {}
        Some(weapon) => container.add_content(EventType::Ammo, AMMO_CRATE_COUNT, &[weapon as u8]),
        None => log::warn!("Ammo container with unknown weapon {}", weapon),
    }
}

/// Content from params: event type (u16, little endian), count, then event params
fn add_event_content(container: &mut GenericContainer, params: &EventParams) {
    let raw_type = u16::from_le_bytes([params[0], params[1]]);
    let count = params[2] as u32;
    match EventType::from_u16(raw_type) {
        Some(EventType::Empty) => {}
        Some(event_type) => container.add_content(event_type, count, &params[3..]),
        None => log::warn!("Container with unknown content event {:#06x}", raw_type),
    }
}

/// Crate holding arbitrary events
#[derive(Debug, Clone)]
pub struct CrateContainer {
    pub container: GenericContainer,
}

impl Default for CrateContainer {
    fn default() -> Self {
        Self::new()
    }
}

impl CrateContainer {
    pub fn new() -> Self {
        Self {
            container: GenericContainer::new(ContainerFamily::Crate),
        }
    }

    fn configure(&mut self, details: &ActivationDetails) {
        self.container.solid.movable = true;
        add_event_content(&mut self.container, &details.params);
    }
}

container_actor!(CrateContainer, "Object/CrateContainer");

/// Barrel holding arbitrary events
#[derive(Debug, Clone)]
pub struct BarrelContainer {
    pub container: GenericContainer,
}

impl Default for BarrelContainer {
    fn default() -> Self {
        Self::new()
    }
}

impl BarrelContainer {
    pub fn new() -> Self {
        Self {
            container: GenericContainer::new(ContainerFamily::Barrel),
        }
    }

    fn configure(&mut self, details: &ActivationDetails) {
        add_event_content(&mut self.container, &details.params);
    }
}

container_actor!(BarrelContainer, "Object/BarrelContainer");

/// Indestructible movable box
#[derive(Debug, Clone)]
pub struct PushableBox {
    pub solid: SolidObject,
    hurt_players: Vec<ActorId>,
}

impl Default for PushableBox {
    fn default() -> Self {
        Self::new()
    }
}

impl PushableBox {
    pub fn new() -> Self {
        Self {
            solid: SolidObject::new(),
            hurt_players: Vec::new(),
        }
    }

    pub fn preload(_params: &EventParams, content: &ContentResolver) {
        content.preload_metadata("Object/PushBox");
    }

    /// A box dropping fast onto a player hurts it once per fall
    fn hurt_players_below(&mut self, level: &mut dyn LevelHandler) {
        let id = self.solid.base.id;
        let inner = self.solid.base.aabb_inner;
        let feet = super::aabb::Aabb::new(inner.l + 2.0, inner.b - 4.0, inner.r - 2.0, inner.b + 2.0);
        for player_id in level.player_ids() {
            if self.hurt_players.contains(&player_id) {
                continue;
            }
            let hit = with_player(level, player_id, |player, level| {
                if feet.overlaps(&player.base.aabb_inner) {
                    player.decrease_health(1, Some(id), level);
                    true
                } else {
                    false
                }
            });
            if hit == Some(true) {
                log::debug!("Box {} fell on player {}", id, player_id);
                self.hurt_players.push(player_id);
            }
        }
    }
}

#[async_trait(?Send)]
impl Actor for PushableBox {
    fn base(&self) -> &ActorBase {
        &self.solid.base
    }

    fn base_mut(&mut self) -> &mut ActorBase {
        &mut self.solid.base
    }

    async fn on_activated(&mut self, _details: &ActivationDetails, content: &ContentResolver) -> bool {
        self.solid.apply_solid_state();
        self.solid.movable = true;
        if !self.solid.base.request_metadata(content, "Object/PushBox").await {
            return false;
        }
        self.solid.base.set_animation("Idle");
        true
    }

    fn on_update(&mut self, time_mult: f32, level: &mut dyn LevelHandler) {
        self.solid.update(time_mult, level);

        if self.solid.base.speed.y > FALLING_HURT_SPEED {
            if level.ruleset().falling_objects_hurt_players() {
                self.hurt_players_below(level);
            }
        } else if self.solid.base.speed.y <= 0.0 {
            self.hurt_players.clear();
        }
    }

    fn on_handle_collision(&mut self, other: &mut dyn Actor, level: &mut dyn LevelHandler) -> bool {
        self.solid.handle_collision(other, level)
    }

    fn on_perish(&mut self, collider: Option<ActorId>, level: &mut dyn LevelHandler) -> PerishOutcome {
        self.solid.perish(collider, level)
    }

    fn as_solid(&self) -> Option<&SolidObject> {
        Some(&self.solid)
    }

    fn as_solid_mut(&mut self) -> Option<&mut SolidObject> {
        Some(&mut self.solid)
    }
}
