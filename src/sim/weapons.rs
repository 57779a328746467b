//! Weapon actors: player shots and TNT

use async_trait::async_trait;
use glam::Vec2;

use super::aabb::Aabb;
use super::activation::ActivationDetails;
use super::actor::{Actor, ActorBase, Capability, TransitionCallback};
use super::level::{LevelHandler, with_player};
use super::state::{
    ActorId, ActorState, EventParams, LevelEvent, MoveType, TileCollisionParams, TileDestructType,
    WeaponType,
};
use crate::consts::INSTANT_KILL;
use crate::content::ContentResolver;

const SHOT_LIFETIME: f32 = 60.0;
const MAX_RICOCHETS: u32 = 2;

const TNT_FUSE: f32 = 200.0;
const TNT_SHORT_FUSE: f32 = 40.0;
const TNT_RADIUS: f32 = 50.0;
const TNT_TILE_REACH: f32 = 34.0;
const TNT_TILE_STRENGTH: u32 = 8;
const SCORE_PER_TILE: u32 = 50;

/// A projectile fired by a player (or by nobody, for level hazards)
#[derive(Debug, Clone)]
pub struct Shot {
    pub base: ActorBase,
    pub owner: Option<ActorId>,
    pub weapon: WeaponType,
    pub strength: i32,
    pub upgrades: u8,
    time_left: f32,
    ricochets: u32,
}

impl Shot {
    pub fn new(owner: Option<ActorId>, weapon: WeaponType) -> Self {
        Self {
            base: ActorBase::new(),
            owner,
            weapon,
            strength: 1,
            upgrades: 0,
            time_left: SHOT_LIFETIME,
            ricochets: 0,
        }
    }

    pub fn with_strength(mut self, strength: i32) -> Self {
        self.strength = strength;
        self
    }

    pub fn with_speed(mut self, speed: Vec2) -> Self {
        self.base.speed = speed;
        self
    }

    pub fn preload(_params: &EventParams, content: &ContentResolver) {
        content.preload_metadata("Weapon/Shot");
    }

    /// How long a target hit by this shot stays frozen
    pub fn frozen_duration(&self) -> f32 {
        if self.upgrades & 0x1 != 0 { 280.0 } else { 180.0 }
    }

    pub fn ricochets(&self) -> u32 {
        self.ricochets
    }

    /// Bounce away from `target`
    pub fn trigger_ricochet(&mut self, target: &Aabb, level: &mut dyn LevelHandler) {
        let away = if self.base.pos.x < target.center().x { -1.0 } else { 1.0 };
        self.base.speed.x = away * self.base.speed.x.abs().max(1.0);
        self.base.speed.y = -0.5 * self.base.speed.y.abs() - 1.0;
        self.ricochets += 1;

        level.emit(LevelEvent::Ricochet {
            shot: self.base.id,
            pos: self.base.pos,
        });
        level.emit(LevelEvent::Sound {
            pos: self.base.pos,
            name: "Ricochet",
        });

        if self.ricochets > MAX_RICOCHETS {
            self.decrease_health(INSTANT_KILL, None, level);
        }
    }
}

#[async_trait(?Send)]
impl Actor for Shot {
    fn base(&self) -> &ActorBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ActorBase {
        &mut self.base
    }

    async fn on_activated(&mut self, _details: &ActivationDetails, content: &ContentResolver) -> bool {
        self.base.set_state(
            ActorState::APPLY_GRAVITATION | ActorState::CAN_BE_FROZEN,
            false,
        );
        self.base.set_state(ActorState::SKIP_PER_PIXEL_COLLISIONS, true);
        if !self.base.request_metadata(content, "Weapon/Shot").await {
            return false;
        }
        self.base.set_animation("Idle");
        true
    }

    fn on_update(&mut self, time_mult: f32, level: &mut dyn LevelHandler) {
        self.time_left -= time_mult;
        if self.time_left <= 0.0 {
            self.decrease_health(INSTANT_KILL, None, level);
            return;
        }

        let strength = self.strength.max(0) as u32;
        let mut params = TileCollisionParams::weapon(self.weapon, strength);
        let step = self.base.speed * time_mult;
        if !self
            .base
            .move_instantly(step, MoveType::Relative, &mut params, level)
        {
            log::trace!("Shot {} hit a wall", self.base.id);
            self.decrease_health(INSTANT_KILL, None, level);
        }
    }

    fn on_handle_collision(&mut self, _other: &mut dyn Actor, _level: &mut dyn LevelHandler) -> bool {
        false
    }

    fn capability(&self) -> Capability {
        Capability::Shot {
            owner: self.owner,
            weapon: self.weapon,
            strength: self.strength,
        }
    }

    fn as_shot_mut(&mut self) -> Option<&mut Shot> {
        Some(self)
    }
}

/// A placed charge. The fuse is cut short when something that reacts to
/// explosives comes near, and the blast hits every actor in range.
#[derive(Debug, Clone)]
pub struct Tnt {
    pub base: ActorBase,
    pub owner: Option<ActorId>,
    time_left: f32,
    exploded: bool,
}

impl Tnt {
    pub fn new(owner: Option<ActorId>) -> Self {
        Self {
            base: ActorBase::new(),
            owner,
            time_left: 0.0,
            exploded: false,
        }
    }

    pub fn preload(_params: &EventParams, content: &ContentResolver) {
        content.preload_metadata("Weapon/TNT");
    }

    pub fn time_left(&self) -> f32 {
        self.time_left
    }

    pub fn is_exploded(&self) -> bool {
        self.exploded
    }

    fn shorten_fuse(&mut self) {
        if self.time_left > TNT_SHORT_FUSE {
            self.time_left = TNT_SHORT_FUSE;
        }
    }

    fn scan_for_triggers(&mut self, level: &mut dyn LevelHandler) {
        let own_id = self.base.id;
        let mut triggered = false;
        level.find_collision_actors_by_radius(
            self.base.pos.x,
            self.base.pos.y,
            TNT_RADIUS,
            &mut |actor, _| {
                let base = actor.base();
                if base.id != own_id
                    && !base.is_invulnerable()
                    && base.has_state(ActorState::TRIGGERS_TNT)
                {
                    triggered = true;
                    return false;
                }
                true
            },
        );
        if triggered {
            self.shorten_fuse();
        }
    }

    fn explode(&mut self, level: &mut dyn LevelHandler) {
        self.exploded = true;
        self.base
            .set_transition("Explode", TransitionCallback::FinishPerish { collider: None });

        let pos = self.base.pos;
        level.emit(LevelEvent::Explosion { pos });
        level.emit(LevelEvent::Sound {
            pos,
            name: "Explosion",
        });
        log::debug!("TNT {} exploded at {:?}", self.base.id, pos);

        level.find_collision_actors_by_radius(pos.x, pos.y, TNT_RADIUS, &mut |actor, level| {
            actor.on_handle_collision(&mut *self, level);
            true
        });

        let aabb = Aabb::new(
            pos.x - TNT_TILE_REACH,
            pos.y - TNT_TILE_REACH,
            pos.x + TNT_TILE_REACH,
            pos.y + TNT_TILE_REACH,
        );
        let mut params = TileCollisionParams::weapon(WeaponType::TNT, TNT_TILE_STRENGTH);
        params.destruct_type |= TileDestructType::IGNORE_SOLID_TILES;
        let destroyed = match level.tile_map() {
            Some(tiles) => {
                tiles.is_tile_empty(&aabb, &mut params);
                tiles.take_destroyed()
            }
            None => Vec::new(),
        };
        for tile in destroyed {
            level.emit(LevelEvent::TileDestroyed { tile });
        }

        if params.tiles_destroyed > 0 {
            if let Some(owner) = self.owner {
                let amount = params.tiles_destroyed * SCORE_PER_TILE;
                with_player(level, owner, |player, level| {
                    player.add_score(amount);
                    level.emit(LevelEvent::Score { player: owner, amount });
                });
            }
        }
    }
}

#[async_trait(?Send)]
impl Actor for Tnt {
    fn base(&self) -> &ActorBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ActorBase {
        &mut self.base
    }

    async fn on_activated(&mut self, _details: &ActivationDetails, content: &ContentResolver) -> bool {
        self.time_left = TNT_FUSE;
        self.base.set_state(
            ActorState::COLLIDE_WITH_TILESET
                | ActorState::COLLIDE_WITH_OTHER_ACTORS
                | ActorState::APPLY_GRAVITATION,
            false,
        );
        if !self.base.request_metadata(content, "Weapon/TNT").await {
            return false;
        }
        self.base.set_animation("Idle");
        true
    }

    fn on_update(&mut self, time_mult: f32, level: &mut dyn LevelHandler) {
        self.base.update(time_mult, level);

        if self.time_left > 0.0 {
            self.time_left -= time_mult;
            if self.time_left > TNT_SHORT_FUSE {
                self.scan_for_triggers(level);
            }
        } else if !self.exploded {
            self.explode(level);
        }
    }

    fn on_handle_collision(&mut self, other: &mut dyn Actor, level: &mut dyn LevelHandler) -> bool {
        if let Capability::Explosive { .. } = other.capability() {
            self.shorten_fuse();
        }
        if self.base.has_state(ActorState::CAN_BE_FROZEN) {
            self.base.handle_frozen_state_change(other, level);
        }
        false
    }

    fn capability(&self) -> Capability {
        Capability::Explosive {
            owner: self.owner,
            detonated: self.exploded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::InMemorySource;
    use crate::settings::Settings;
    use crate::sim::container::AmmoCrate;
    use crate::sim::level::Level;
    use crate::sim::player::Player;
    use crate::sim::state::{EventType, event_params};
    use crate::sim::tiles::{Tile, TileMap};

    fn level(rows: &[&str]) -> Level {
        let settings = Settings {
            worker_threads: 0,
            ..Settings::default()
        };
        Level::new(&settings, TileMap::from_rows(rows), InMemorySource::stock())
    }

    fn detonated(level: &Level, id: ActorId) -> bool {
        matches!(
            level.actor(id).map(|a| a.capability()),
            Some(Capability::Explosive { detonated: true, .. })
        )
    }

    #[test]
    fn test_shot_dies_against_wall() {
        let mut level = level(&["..#.....", "........", "########"]);
        let shot = Shot::new(None, WeaponType::Blaster).with_speed(Vec2::new(8.0, 0.0));
        let id = level.add_actor(Box::new(shot), Vec2::new(40.0, 16.0), 0);
        level.finish_activations();

        for _ in 0..4 {
            level.update(1.0);
        }
        assert!(level.actor(id).is_none());
    }

    #[test]
    fn test_shot_destroys_weak_tile() {
        let mut level = level(&["..x.....", "........", "########"]);
        let shot = Shot::new(None, WeaponType::Blaster).with_speed(Vec2::new(8.0, 0.0));
        level.add_actor(Box::new(shot), Vec2::new(40.0, 16.0), 0);
        level.finish_activations();

        for _ in 0..4 {
            level.update(1.0);
        }
        assert_eq!(level.world().tile_map().tile(2, 0), Tile::Empty);
    }

    #[test]
    fn test_shot_expires() {
        let mut level = level(&["........", "........", "########"]);
        let id = level.add_actor(Box::new(Shot::new(None, WeaponType::Blaster)), Vec2::new(40.0, 16.0), 0);
        level.finish_activations();
        for _ in 0..(SHOT_LIFETIME as usize + 1) {
            level.update(1.0);
        }
        assert!(level.actor(id).is_none());
    }

    #[test]
    fn test_fuse_cut_near_monitor() {
        let mut level = level(&["........", "........", "########"]);
        level.spawn_event(
            EventType::PowerUpWeapon,
            Vec2::new(48.0, 50.0),
            0,
            event_params(&[WeaponType::Seeker as u8]),
            ActorState::empty(),
        );
        let near = level.add_actor(Box::new(Tnt::new(None)), Vec2::new(80.0, 40.0), 0);
        let far = level.add_actor(Box::new(Tnt::new(None)), Vec2::new(220.0, 40.0), 0);
        level.finish_activations();

        for _ in 0..45 {
            level.update(1.0);
        }
        assert!(detonated(&level, near));
        assert!(!detonated(&level, far));
        let state = level.actor(far).unwrap().base().state();
        assert!(!state.contains(ActorState::COLLIDE_WITH_OTHER_ACTORS));
    }

    #[test]
    fn test_explosion_breaks_crate_and_tiles() {
        let mut level = level(&["........", "..x.....", "########"]);
        let player_id = level.add_player(Player::new(0), Vec2::new(200.0, 44.0));
        level.finish_activations();

        let crate_id = level.add_actor(Box::new(AmmoCrate::new()), Vec2::new(48.0, 49.0), 0);
        let tnt_id = level.add_actor(Box::new(Tnt::new(Some(player_id))), Vec2::new(80.0, 40.0), 0);
        level.finish_activations();

        let mut exploded_at = None;
        for frame in 0..260 {
            level.update(1.0);
            if exploded_at.is_none() && detonated(&level, tnt_id) {
                exploded_at = Some(frame);
            }
        }
        assert!(exploded_at.is_some());
        // Transition over: the charge is gone
        assert!(level.actor(tnt_id).is_none());
        assert!(level.actor(crate_id).is_none());
        assert_eq!(level.world().tile_map().tile(2, 1), Tile::Empty);

        let player = level.player(player_id).unwrap();
        assert_eq!(player.score, SCORE_PER_TILE);
    }
}
