//! Solid objects: pushing by players and carrying riders
//!
//! A push is latched for `PUSH_DECAY_TIME` frames. While it lasts the
//! object keeps moving on its own and re-confirms every rider each frame;
//! once it runs out, every player riding the object is released.

use glam::Vec2;

use super::aabb::Aabb;
use super::actor::{Actor, ActorBase, PerishOutcome};
use super::level::{LevelHandler, with_player};
use super::player::Player;
use super::state::{ActorId, ActorState, LevelEvent, MoveType, TileCollisionParams};
use crate::consts::{CARRY_ADJUST_ATTEMPTS, CARRY_ADJUST_STEP, PUSH_DECAY_TIME, PUSH_SPEED};

/// Actor base plus push/carry state
#[derive(Debug, Clone)]
pub struct SolidObject {
    pub base: ActorBase,
    /// Passable from below
    pub is_one_way: bool,
    /// Can be pushed (fixed after activation)
    pub movable: bool,
    pushing_speed_x: f32,
    pushing_time: f32,
}

impl Default for SolidObject {
    fn default() -> Self {
        Self::new()
    }
}

impl SolidObject {
    pub fn new() -> Self {
        Self {
            base: ActorBase::new(),
            is_one_way: false,
            movable: false,
            pushing_speed_x: 0.0,
            pushing_time: 0.0,
        }
    }

    /// Flags every solid object carries after activation
    pub fn apply_solid_state(&mut self) {
        self.base.set_state(
            ActorState::IS_SOLID_OBJECT
                | ActorState::COLLIDE_WITH_SOLID_OBJECTS
                | ActorState::COLLIDE_WITH_SOLID_OBJECTS_BELOW
                | ActorState::SKIP_PER_PIXEL_COLLISIONS,
            true,
        );
    }

    pub fn pushing_time(&self) -> f32 {
        self.pushing_time
    }

    /// Current push velocity, zero once the push has decayed
    pub fn pushing_speed_x(&self) -> f32 {
        if self.pushing_time > 0.0 {
            self.pushing_speed_x
        } else {
            0.0
        }
    }

    /// Push horizontally; returns the applied speed or 0 when rejected
    pub fn push(&mut self, left: bool, time_mult: f32, level: &mut dyn LevelHandler) -> f32 {
        if !self.movable {
            return 0.0;
        }

        if self.pushing_time > 0.0 {
            self.pushing_time = PUSH_DECAY_TIME;
            return self.pushing_speed_x;
        }

        let speed_x = if left { -PUSH_SPEED } else { PUSH_SPEED };
        if self.try_push_internal(time_mult, speed_x, level) {
            self.pushing_speed_x = speed_x;
            self.pushing_time = PUSH_DECAY_TIME;
            log::trace!("Solid {} pushed at {}", self.base.id, speed_x);
            speed_x
        } else {
            0.0
        }
    }

    fn try_push_internal(&mut self, time_mult: f32, speed_x: f32, level: &mut dyn LevelHandler) -> bool {
        let inner = self.base.aabb_inner;
        let edge = if speed_x < 0.0 { inner.l } else { inner.r };
        let ahead = edge + speed_x * time_mult;
        let mid_y = (inner.t + inner.b) * 0.5;
        let probe = Aabb::new(edge.min(ahead), mid_y - 1.0, edge.max(ahead), mid_y + 1.0);

        let mut params = TileCollisionParams::new(false);
        if let Some(tiles) = level.tile_map() {
            if !tiles.is_tile_empty(&probe, &mut params) {
                return false;
            }
        }

        let had_below = self.base.has_state(ActorState::COLLIDE_WITH_SOLID_OBJECTS_BELOW);
        self.base.set_state(ActorState::COLLIDE_WITH_SOLID_OBJECTS_BELOW, false);

        let dx = speed_x * time_mult;
        let moved = self
            .base
            .move_instantly(Vec2::new(dx, 0.0), MoveType::Relative, &mut params, level)
            || self.base.move_instantly(
                Vec2::new(dx, -2.0 * time_mult),
                MoveType::Relative,
                &mut params,
                level,
            );

        self.base.set_state(ActorState::COLLIDE_WITH_SOLID_OBJECTS_BELOW, had_below);
        level.sync_proxy(&self.base);
        moved
    }

    /// Push decay, own movement, then rider bookkeeping
    pub fn update(&mut self, time_mult: f32, level: &mut dyn LevelHandler) {
        let last_pos = self.base.pos;

        // A frozen object holds its push without moving
        if self.pushing_time > 0.0 && !self.base.is_frozen() {
            self.pushing_time = (self.pushing_time - time_mult).max(0.0);
            if !self.try_push_internal(time_mult, self.pushing_speed_x, level) {
                self.pushing_time = 0.0;
            }
        }

        self.base.update(time_mult, level);

        let diff = self.base.pos - last_pos;
        if self.pushing_time > 0.0 && self.base.has_state(ActorState::IS_SOLID_OBJECT) {
            for player_id in level.player_ids() {
                self.update_rider(player_id, diff, time_mult, level);
            }
        } else {
            self.release_riders(level);
        }
    }

    fn update_rider(&mut self, player_id: ActorId, diff: Vec2, time_mult: f32, level: &mut dyn LevelHandler) {
        let id = self.base.id;
        let inner = self.base.aabb_inner;

        let changed = with_player(level, player_id, |player, level| {
            if player.carrying_object == Some(id) {
                let carry_zone = Aabb::new(inner.l, inner.t - 8.0, inner.r, inner.b);
                if carry_zone.overlaps(&player.base.aabb_inner)
                    && player.base.has_state(ActorState::APPLY_GRAVITATION)
                {
                    relocate_rider(player, diff, time_mult, level);
                    player.set_carrying_object(Some(id), true)
                } else {
                    player.set_carrying_object(None, false)
                }
            } else {
                let top_strip = Aabb::new(inner.l, inner.t - 1.0, inner.r, inner.t + 1.0);
                if top_strip.overlaps(&player.base.aabb_inner)
                    && player.base.speed.y >= diff.y * time_mult
                    && !player.can_move_vertically()
                {
                    player.set_carrying_object(Some(id), false)
                } else {
                    false
                }
            }
        });

        if changed == Some(true) {
            let object = level.player_snapshot(player_id).and_then(|p| p.carrying_object);
            level.emit(LevelEvent::CarryChanged {
                player: player_id,
                object,
            });
        }
    }

    /// Drop every rider that references this object
    pub fn release_riders(&mut self, level: &mut dyn LevelHandler) {
        let id = self.base.id;
        for player_id in level.player_ids() {
            let riding = level
                .player_snapshot(player_id)
                .is_some_and(|p| p.carrying_object == Some(id));
            if !riding {
                continue;
            }
            let released = with_player(level, player_id, |player, _| {
                player.set_carrying_object(None, false)
            });
            if released == Some(true) {
                level.emit(LevelEvent::CarryChanged {
                    player: player_id,
                    object: None,
                });
            }
        }
    }

    /// Drop any latched push
    pub fn cancel_push(&mut self) {
        self.pushing_time = 0.0;
        self.pushing_speed_x = 0.0;
    }

    /// Base perish plus carry cancellation
    pub fn perish(&mut self, collider: Option<ActorId>, level: &mut dyn LevelHandler) -> PerishOutcome {
        self.cancel_push();
        self.release_riders(level);
        self.base.perish(collider, level)
    }

    /// Default solid collision; freezing only
    pub fn handle_collision(&mut self, other: &mut dyn Actor, level: &mut dyn LevelHandler) -> bool {
        if self.base.has_state(ActorState::CAN_BE_FROZEN) {
            self.base.handle_frozen_state_change(other, level);
        }
        false
    }
}

/// Move a rider along with the object, nudging it up when the exact spot is taken
fn relocate_rider(player: &mut Player, diff: Vec2, time_mult: f32, level: &mut dyn LevelHandler) {
    let mut params = TileCollisionParams::new(false);
    let mut target = player.base.pos + diff;
    for _ in 0..CARRY_ADJUST_ATTEMPTS {
        if player
            .base
            .move_instantly(target, MoveType::Absolute, &mut params, level)
        {
            return;
        }
        target.y -= CARRY_ADJUST_STEP * time_mult;
    }
    player
        .base
        .move_instantly(Vec2::new(0.0, diff.y), MoveType::Relative, &mut params, level);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::InMemorySource;
    use crate::settings::Settings;
    use crate::sim::container::PushableBox;
    use crate::sim::level::Level;
    use crate::sim::tiles::TileMap;
    use proptest::prelude::*;

    fn level(rows: &[&str]) -> Level {
        let settings = Settings {
            worker_threads: 0,
            ..Settings::default()
        };
        Level::new(&settings, TileMap::from_rows(rows), InMemorySource::stock())
    }

    /// 32×32 box resting on the floor with its left edge at x = 64
    fn level_with_box(rows: &[&str]) -> (Level, ActorId) {
        let mut level = level(rows);
        let id = level.add_actor(Box::new(PushableBox::new()), Vec2::new(80.0, 48.0), 0);
        level.finish_activations();
        (level, id)
    }

    fn push(level: &mut Level, id: ActorId, left: bool) -> f32 {
        let mut result = 0.0;
        level.context().with_actor(id, &mut |actor, level| {
            if let Some(solid) = actor.as_solid_mut() {
                result = solid.push(left, 1.0, level);
            }
        });
        result
    }

    fn solid(level: &Level, id: ActorId) -> &SolidObject {
        level.actor(id).and_then(|a| a.as_solid()).unwrap()
    }

    #[test]
    fn test_push_left_into_empty_tile() {
        let (mut level, id) = level_with_box(&["........", "........", "########"]);
        assert_eq!(solid(&level, id).pushing_time(), 0.0);

        assert_eq!(push(&mut level, id, true), -0.5);
        assert_eq!(solid(&level, id).pushing_time(), 6.0);
        assert_eq!(solid(&level, id).base.pos.x, 79.5);
    }

    #[test]
    fn test_push_blocked_by_wall() {
        let (mut level, id) = level_with_box(&[".#......", ".#......", "########"]);
        assert_eq!(push(&mut level, id, true), 0.0);
        assert_eq!(solid(&level, id).pushing_time(), 0.0);
        assert_eq!(solid(&level, id).base.pos.x, 80.0);
    }

    #[test]
    fn test_immovable_rejects_push() {
        let (mut level, id) = level_with_box(&["........", "........", "########"]);
        if let Some(solid) = level.actor_mut(id).and_then(|a| a.as_solid_mut()) {
            solid.movable = false;
        }
        assert_eq!(push(&mut level, id, false), 0.0);
        assert_eq!(solid(&level, id).pushing_time(), 0.0);
    }

    #[test]
    fn test_repeated_push_is_debounced() {
        let (mut level, id) = level_with_box(&["........", "........", "########"]);
        assert_eq!(push(&mut level, id, true), -0.5);

        // A wall appears ahead; the latched push skips the tile test
        let mut ctx = level.context();
        if let Some(tiles) = ctx.tile_map() {
            tiles.set_tile(1, 1, crate::sim::tiles::Tile::Solid);
        }
        assert_eq!(push(&mut level, id, true), -0.5);
        // Opposite direction returns the latched speed too
        assert_eq!(push(&mut level, id, false), -0.5);
        assert_eq!(solid(&level, id).pushing_time(), 6.0);
        assert_eq!(solid(&level, id).base.pos.x, 79.5);
    }

    #[test]
    fn test_push_decays_then_stops() {
        let (mut level, id) = level_with_box(&["............", "............", "############"]);
        push(&mut level, id, false);

        let mut last = solid(&level, id).pushing_time();
        while last > 0.0 {
            level.update(1.0);
            let now = solid(&level, id).pushing_time();
            assert!(now < last);
            last = now;
        }
        assert_eq!(solid(&level, id).pushing_speed_x(), 0.0);

        let x = solid(&level, id).base.pos.x;
        level.update(1.0);
        assert_eq!(solid(&level, id).base.pos.x, x);
    }

    #[test]
    fn test_stalled_push_is_cancelled() {
        let (mut level, id) = level_with_box(&["....#...", "....#...", "########"]);
        // Right edge at 96, wall starts at 128
        assert_eq!(push(&mut level, id, false), 0.5);
        let mut frames = 0;
        while solid(&level, id).pushing_time() > 0.0 {
            let mut ctx = level.context();
            ctx.with_actor(id, &mut |actor, level| {
                if let Some(solid) = actor.as_solid_mut() {
                    solid.push(false, 1.0, level);
                }
            });
            level.update(1.0);
            frames += 1;
            assert!(frames < 200);
        }
        let pos = solid(&level, id).base.aabb_inner.r;
        assert!(pos <= 128.0);
        assert!(pos > 126.0);
    }

    #[test]
    fn test_frozen_object_holds_push_without_moving() {
        let (mut level, id) = level_with_box(&["............", "............", "############"]);
        assert_eq!(push(&mut level, id, false), 0.5);
        if let Some(actor) = level.actor_mut(id) {
            actor.base_mut().frozen_time_left = 180.0;
        }

        let x = solid(&level, id).base.pos.x;
        for _ in 0..100 {
            level.update(1.0);
        }
        assert_eq!(solid(&level, id).base.pos.x, x);
        assert_eq!(solid(&level, id).pushing_time(), 6.0);

        // Thawed: the held push decays and runs out
        for _ in 0..100 {
            level.update(1.0);
        }
        assert_eq!(solid(&level, id).pushing_time(), 0.0);
        assert!(solid(&level, id).base.pos.x > x);
    }

    /// Floating one-way box over a floor at y = 128
    fn level_with_one_way_box() -> (Level, ActorId) {
        let (mut level, id) = level_with_box(&[
            "........",
            "........",
            "........",
            "........",
            "########",
        ]);
        level.context().with_actor(id, &mut |actor, _| {
            if let Some(solid) = actor.as_solid_mut() {
                solid.is_one_way = true;
                solid.base.set_state(ActorState::APPLY_GRAVITATION, false);
            }
        });
        (level, id)
    }

    #[test]
    fn test_one_way_blocks_only_downward_queries() {
        let (mut level, _) = level_with_one_way_box();
        let mut mover = ActorBase::new();
        mover.id = ActorId(999);
        mover.set_state(ActorState::COLLIDE_WITH_SOLID_OBJECTS, true);
        // Inside the box (64..96, 32..64)
        let aabb = Aabb::new(70.0, 40.0, 90.0, 56.0);

        let mut ctx = level.context();
        assert!(ctx.is_position_empty(&mover, &aabb, &mut TileCollisionParams::new(false)));
        assert!(!ctx.is_position_empty(&mover, &aabb, &mut TileCollisionParams::new(true)));
    }

    #[test]
    fn test_jump_through_one_way_and_land_on_top() {
        let (mut level, id) = level_with_one_way_box();
        // Standing on the floor under the box
        let player_id = level.add_player(Player::new(0), Vec2::new(80.0, 108.0));
        level.finish_activations();
        level.update(1.0);

        if let Some(player) = level.player_mut(player_id) {
            player.base.speed.y = -10.0;
        }
        let mut highest_feet = f32::MAX;
        for _ in 0..120 {
            level.update(1.0);
            highest_feet = highest_feet.min(level.player(player_id).unwrap().base.aabb_inner.b);
        }

        let top = solid(&level, id).base.aabb_inner.t;
        assert!(highest_feet < top);
        let feet = level.player(player_id).unwrap().base.aabb_inner.b;
        assert!((feet - top).abs() < 1.0, "feet {} top {}", feet, top);
    }

    proptest! {
        #[test]
        fn push_time_never_increases_without_push(time_mult in 0.2f32..3.0, frames in 1usize..20) {
            let (mut level, id) = level_with_box(&["................", "................", "################"]);
            push(&mut level, id, false);
            let mut last = solid(&level, id).pushing_time();
            for _ in 0..frames {
                level.update(time_mult);
                let now = solid(&level, id).pushing_time();
                prop_assert!(now <= last);
                prop_assert!(now >= 0.0);
                if last > 0.0 {
                    prop_assert!(now < last);
                }
                last = now;
            }
        }
    }
}
