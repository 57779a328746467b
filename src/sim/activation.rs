//! Actor factory and the cooperative activation scheduler
//!
//! Every activation runs as a task on a single-threaded `LocalPool`. A task
//! only suspends where it awaits metadata, and the frame loop resumes
//! pending tasks once per frame, so activation never blocks a frame and
//! never runs in parallel with actor updates.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use futures::executor::LocalPool;
use futures::task::LocalSpawnExt;
use glam::{IVec3, Vec2};

use super::actor::Actor;
use super::collectible::Collectible;
use super::container::{AmmoBarrel, AmmoCrate, BarrelContainer, CrateContainer, PushableBox};
use super::monitor::PowerUpWeaponMonitor;
use super::state::{ActorId, ActorState, EventParams, EventType};
use super::weapons::Tnt;
use crate::content::ContentResolver;
use crate::tile_of;

/// Where and how an actor is created
#[derive(Debug, Clone, PartialEq)]
pub struct ActivationDetails {
    /// World position; `z` is the render layer
    pub pos: IVec3,
    pub state: ActorState,
    pub event_type: Option<EventType>,
    pub params: EventParams,
    pub force: Vec2,
}

impl ActivationDetails {
    pub fn at(pos: Vec2, layer: i32) -> Self {
        Self {
            pos: IVec3::new(pos.x as i32, pos.y as i32, layer),
            state: ActorState::empty(),
            event_type: None,
            params: [0; 16],
            force: Vec2::ZERO,
        }
    }

    pub fn with_params(mut self, params: EventParams) -> Self {
        self.params = params;
        self
    }
}

/// Create the actor for a level event
pub fn create_actor(event_type: EventType) -> Option<Box<dyn Actor>> {
    let actor: Box<dyn Actor> = match event_type {
        EventType::CrateAmmo => Box::new(AmmoCrate::new()),
        EventType::BarrelAmmo => Box::new(AmmoBarrel::new()),
        EventType::Crate => Box::new(CrateContainer::new()),
        EventType::Barrel => Box::new(BarrelContainer::new()),
        EventType::PushableBox => Box::new(PushableBox::new()),
        EventType::PowerUpWeapon => Box::new(PowerUpWeaponMonitor::new()),
        EventType::Ammo | EventType::Gem | EventType::Coin | EventType::Food => {
            Box::new(Collectible::new())
        }
        EventType::WeaponTNT => Box::new(Tnt::new(None)),
        EventType::Empty => return None,
    };
    Some(actor)
}

/// Warm the metadata an event will request when activated
pub fn preload(event_type: EventType, params: &EventParams, content: &ContentResolver) {
    match event_type {
        EventType::CrateAmmo => AmmoCrate::preload(params, content),
        EventType::BarrelAmmo => AmmoBarrel::preload(params, content),
        EventType::Crate => CrateContainer::preload(params, content),
        EventType::Barrel => BarrelContainer::preload(params, content),
        EventType::PushableBox => PushableBox::preload(params, content),
        EventType::PowerUpWeapon => PowerUpWeaponMonitor::preload(params, content),
        EventType::Ammo | EventType::Gem | EventType::Coin | EventType::Food => {
            Collectible::preload(params, content)
        }
        EventType::WeaponTNT => Tnt::preload(params, content),
        EventType::Empty => {}
    }
}

type Completed = Rc<RefCell<Vec<(Box<dyn Actor>, bool)>>>;

pub struct ActivationScheduler {
    pool: LocalPool,
    completed: Completed,
    pending: Rc<Cell<usize>>,
}

impl Default for ActivationScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivationScheduler {
    pub fn new() -> Self {
        Self {
            pool: LocalPool::new(),
            completed: Rc::new(RefCell::new(Vec::new())),
            pending: Rc::new(Cell::new(0)),
        }
    }

    /// Queue an activation task; it first runs on the next `pump`
    pub fn schedule(
        &mut self,
        id: ActorId,
        mut actor: Box<dyn Actor>,
        details: ActivationDetails,
        content: Rc<ContentResolver>,
    ) {
        let completed = self.completed.clone();
        let pending = self.pending.clone();

        let task = async move {
            {
                let pos = Vec2::new(details.pos.x as f32, details.pos.y as f32);
                let base = actor.base_mut();
                base.id = id;
                base.replace_state(
                    ActorState::CAN_BE_FROZEN
                        | ActorState::COLLIDE_WITH_TILESET
                        | ActorState::COLLIDE_WITH_OTHER_ACTORS
                        | ActorState::APPLY_GRAVITATION
                        | details.state,
                );
                base.pos = pos;
                base.origin_tile = tile_of(pos);
                base.layer = details.pos.z;
                base.event_type = details.event_type;
                base.external_force = details.force;
            }

            let success = actor.on_activated(&details, &content).await;
            if success {
                actor.on_update_hitbox();
                actor.base_mut().set_state(ActorState::INITIALIZED, true);
            }

            pending.set(pending.get() - 1);
            completed.borrow_mut().push((actor, success));
        };

        self.pending.set(self.pending.get() + 1);
        if let Err(e) = self.pool.spawner().spawn_local(task) {
            self.pending.set(self.pending.get() - 1);
            log::warn!("Could not schedule activation of {}: {}", id, e);
        }
    }

    /// Resume every task that can make progress; returns finished activations
    pub fn pump(&mut self) -> Vec<(Box<dyn Actor>, bool)> {
        self.pool.run_until_stalled();
        std::mem::take(&mut *self.completed.borrow_mut())
    }

    /// Block until every task has finished
    pub fn finish(&mut self) -> Vec<(Box<dyn Actor>, bool)> {
        self.pool.run();
        std::mem::take(&mut *self.completed.borrow_mut())
    }

    pub fn pending(&self) -> usize {
        self.pending.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::InMemorySource;
    use crate::sim::state::{ActorState, event_params};

    fn resolver() -> Rc<ContentResolver> {
        Rc::new(ContentResolver::new(InMemorySource::stock(), None))
    }

    #[test]
    fn test_activation_suspends_until_pumped() {
        let mut scheduler = ActivationScheduler::new();
        let details = ActivationDetails::at(Vec2::new(70.0, 40.0), 3);
        scheduler.schedule(ActorId(1), Box::new(AmmoCrate::new()), details, resolver());
        assert_eq!(scheduler.pending(), 1);

        let done = scheduler.pump();
        assert_eq!(done.len(), 1);
        let (actor, success) = &done[0];
        assert!(*success);
        let base = actor.base();
        assert_eq!(base.id, ActorId(1));
        assert_eq!(base.origin_tile, glam::IVec2::new(2, 1));
        assert_eq!(base.layer, 3);
        assert!(base.has_state(ActorState::INITIALIZED | ActorState::CAN_BE_FROZEN));
        assert_eq!(base.aabb_inner.width(), 30.0);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn test_missing_metadata_fails_activation() {
        let mut scheduler = ActivationScheduler::new();
        let empty = Rc::new(ContentResolver::new(InMemorySource::new(), None));
        let details = ActivationDetails::at(Vec2::ZERO, 0);
        scheduler.schedule(ActorId(1), Box::new(PushableBox::new()), details, empty);
        let done = scheduler.finish();
        assert_eq!(done.len(), 1);
        assert!(!done[0].1);
        assert!(!done[0].0.base().has_state(ActorState::INITIALIZED));
    }

    #[test]
    fn test_interleaved_tasks_all_complete() {
        let mut scheduler = ActivationScheduler::new();
        let content = resolver();
        for i in 0..3 {
            let details = ActivationDetails::at(Vec2::new(40.0 * i as f32, 0.0), 0)
                .with_params(event_params(&[1]));
            scheduler.schedule(ActorId(i + 1), Box::new(AmmoBarrel::new()), details, content.clone());
        }
        let done = scheduler.finish();
        let mut ids: Vec<_> = done.iter().map(|(a, _)| a.base().id).collect();
        ids.sort();
        assert_eq!(ids, vec![ActorId(1), ActorId(2), ActorId(3)]);
        assert!(done.iter().all(|(_, success)| *success));
    }

    #[test]
    fn test_factory_covers_stock_events() {
        assert!(create_actor(EventType::CrateAmmo).is_some());
        assert!(create_actor(EventType::Gem).is_some());
        assert!(create_actor(EventType::Empty).is_none());
    }
}
