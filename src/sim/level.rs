//! The level: actor registry, collision proxies and the collaborator API
//!
//! An actor is loaned out of the registry while its hooks run. The world
//! keeps a proxy (bounds, flags, player snapshot) for every registered
//! actor, so collision queries and player reads keep working for actors
//! that are currently on loan.

use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use glam::{IVec3, Vec2};
use rand::SeedableRng;
use rand_pcg::Pcg32;

use super::aabb::Aabb;
use super::activation::{self, ActivationDetails, ActivationScheduler};
use super::actor::{Actor, ActorBase};
use super::player::Player;
use super::state::{
    ActorId, ActorState, EventParams, EventType, LevelEvent, SpawnRequest, TileCollisionParams,
    WEAPON_COUNT,
};
use super::tiles::{EventMap, TileMap};
use crate::content::{ContentResolver, MetadataSource};
use crate::jobs::ThreadPool;
use crate::settings::{PhysicsRuleset, Settings};

/// Player data readable while the player is on loan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlayerSnapshot {
    pub ammo: [u16; WEAPON_COUNT],
    pub carrying_object: Option<ActorId>,
}

/// Collision view of a registered actor
#[derive(Debug, Clone, PartialEq)]
pub struct Proxy {
    pub aabb: Aabb,
    pub aabb_inner: Aabb,
    pub state: ActorState,
    pub one_way: bool,
    pub player: Option<PlayerSnapshot>,
}

impl Proxy {
    fn of(actor: &dyn Actor) -> Self {
        let base = actor.base();
        Self {
            aabb: base.aabb,
            aabb_inner: base.aabb_inner,
            state: base.state(),
            one_way: actor.as_solid().is_some_and(|solid| solid.is_one_way),
            player: actor.as_player().map(Player::snapshot),
        }
    }
}

/// The collaborator every actor hook receives
pub trait LevelHandler {
    fn ruleset(&self) -> PhysicsRuleset;
    fn gravity(&self) -> f32;
    fn elapsed_frames(&self) -> f32;

    /// Players in registration order
    fn player_ids(&self) -> Vec<ActorId>;
    fn player_snapshot(&self, id: ActorId) -> Option<PlayerSnapshot>;

    /// Run `f` on a registered actor. Returns false if the id is unknown or
    /// the actor is already on loan.
    fn with_actor(&mut self, id: ActorId, f: &mut dyn FnMut(&mut dyn Actor, &mut dyn LevelHandler)) -> bool;

    /// Visit actors whose bounds touch the circle; the visitor returns false to stop
    fn find_collision_actors_by_radius(
        &mut self,
        x: f32,
        y: f32,
        radius: f32,
        visitor: &mut dyn FnMut(&mut dyn Actor, &mut dyn LevelHandler) -> bool,
    );

    /// Tile and solid-object test. A blocking solid object is reported in
    /// `collider` and queued as a contact for the collision phase.
    fn is_position_empty_with_collider(
        &mut self,
        actor: &ActorBase,
        aabb: &Aabb,
        params: &mut TileCollisionParams,
        collider: &mut Option<ActorId>,
    ) -> bool;

    fn is_position_empty(&mut self, actor: &ActorBase, aabb: &Aabb, params: &mut TileCollisionParams) -> bool {
        let mut collider = None;
        self.is_position_empty_with_collider(actor, aabb, params, &mut collider)
    }

    /// Publish bounds and flags of an actor that moved while on loan
    fn sync_proxy(&mut self, actor: &ActorBase);

    fn tile_map(&mut self) -> Option<&mut TileMap>;
    fn event_map(&mut self) -> Option<&mut EventMap>;
    fn rng(&mut self) -> &mut Pcg32;

    /// Queue an actor for activation at the start of the next frame
    fn spawn(&mut self, request: SpawnRequest);
    fn emit(&mut self, event: LevelEvent);
}

/// Run `f` on a registered player
pub fn with_player<R>(
    level: &mut dyn LevelHandler,
    id: ActorId,
    f: impl FnOnce(&mut Player, &mut dyn LevelHandler) -> R,
) -> Option<R> {
    let mut f = Some(f);
    let mut result = None;
    level.with_actor(id, &mut |actor, level| {
        if let (Some(player), Some(f)) = (actor.as_player_mut(), f.take()) {
            result = Some(f(player, level));
        }
    });
    result
}

/// Level state outside the actor registry
pub struct World {
    pub(crate) ruleset: PhysicsRuleset,
    pub(crate) gravity: f32,
    pub(crate) tile_map: TileMap,
    pub(crate) event_map: EventMap,
    pub(crate) proxies: BTreeMap<ActorId, Proxy>,
    pub(crate) players: Vec<ActorId>,
    pub(crate) rng: Pcg32,
    pub(crate) spawns: Vec<SpawnRequest>,
    pub(crate) contacts: Vec<(ActorId, ActorId)>,
    pub(crate) events: Vec<LevelEvent>,
    pub(crate) elapsed_frames: f32,
}

impl World {
    pub fn new(settings: &Settings, tile_map: TileMap) -> Self {
        Self {
            ruleset: settings.ruleset,
            gravity: settings.gravity,
            tile_map,
            event_map: EventMap::new(),
            proxies: BTreeMap::new(),
            players: Vec::new(),
            rng: Pcg32::seed_from_u64(settings.seed),
            spawns: Vec::new(),
            contacts: Vec::new(),
            events: Vec::new(),
            elapsed_frames: 0.0,
        }
    }

    pub fn proxy(&self, id: ActorId) -> Option<&Proxy> {
        self.proxies.get(&id)
    }

    pub fn tile_map(&self) -> &TileMap {
        &self.tile_map
    }

    pub(crate) fn register(&mut self, actor: &dyn Actor) {
        let id = actor.base().id;
        self.proxies.insert(id, Proxy::of(actor));
        if actor.as_player().is_some() && !self.players.contains(&id) {
            self.players.push(id);
        }
    }

    pub(crate) fn refresh_proxy(&mut self, actor: &dyn Actor) {
        if let Some(proxy) = self.proxies.get_mut(&actor.base().id) {
            *proxy = Proxy::of(actor);
        }
    }

    pub(crate) fn unregister(&mut self, id: ActorId) {
        self.proxies.remove(&id);
        self.players.retain(|p| *p != id);
    }

    fn is_position_empty(
        &mut self,
        actor: &ActorBase,
        aabb: &Aabb,
        params: &mut TileCollisionParams,
        collider: &mut Option<ActorId>,
    ) -> bool {
        if actor.has_state(ActorState::COLLIDE_WITH_TILESET) {
            let empty = self.tile_map.is_tile_empty(aabb, params);
            for tile in self.tile_map.take_destroyed() {
                self.events.push(LevelEvent::TileDestroyed { tile });
            }
            if !empty {
                return false;
            }
        }

        if !actor.has_state(ActorState::COLLIDE_WITH_SOLID_OBJECTS) {
            return true;
        }

        let only_below = actor.has_state(ActorState::COLLIDE_WITH_SOLID_OBJECTS_BELOW);
        for (id, proxy) in &self.proxies {
            if *id == actor.id
                || !proxy.state.contains(ActorState::IS_SOLID_OBJECT)
                || proxy.state.contains(ActorState::IS_DESTROYED)
            {
                continue;
            }
            if only_below && actor.aabb_inner.b > proxy.aabb_inner.center().y {
                continue;
            }
            if proxy.one_way && !params.downwards {
                continue;
            }
            if proxy.aabb_inner.overlaps(aabb) {
                *collider = Some(*id);
                self.contacts.push((actor.id, *id));
                return false;
            }
        }
        true
    }
}

pub(crate) type Registry = BTreeMap<ActorId, Option<Box<dyn Actor>>>;

/// `LevelHandler` over the world and the registry
pub struct LevelContext<'a> {
    pub(crate) world: &'a mut World,
    pub(crate) actors: &'a mut Registry,
}

impl LevelHandler for LevelContext<'_> {
    fn ruleset(&self) -> PhysicsRuleset {
        self.world.ruleset
    }

    fn gravity(&self) -> f32 {
        self.world.gravity
    }

    fn elapsed_frames(&self) -> f32 {
        self.world.elapsed_frames
    }

    fn player_ids(&self) -> Vec<ActorId> {
        self.world.players.clone()
    }

    fn player_snapshot(&self, id: ActorId) -> Option<PlayerSnapshot> {
        self.world.proxies.get(&id).and_then(|p| p.player)
    }

    fn with_actor(&mut self, id: ActorId, f: &mut dyn FnMut(&mut dyn Actor, &mut dyn LevelHandler)) -> bool {
        let Some(mut actor) = self.actors.get_mut(&id).and_then(Option::take) else {
            return false;
        };
        f(actor.as_mut(), self);
        self.world.refresh_proxy(actor.as_ref());
        if let Some(slot) = self.actors.get_mut(&id) {
            *slot = Some(actor);
        }
        true
    }

    fn find_collision_actors_by_radius(
        &mut self,
        x: f32,
        y: f32,
        radius: f32,
        visitor: &mut dyn FnMut(&mut dyn Actor, &mut dyn LevelHandler) -> bool,
    ) {
        let center = Vec2::new(x, y);
        let found: Vec<ActorId> = self
            .world
            .proxies
            .iter()
            .filter(|(_, p)| !p.state.contains(ActorState::IS_DESTROYED))
            .filter(|(_, p)| p.aabb.distance_squared_to(center) <= radius * radius)
            .map(|(id, _)| *id)
            .collect();

        for id in found {
            let mut keep_going = true;
            self.with_actor(id, &mut |actor, level| {
                keep_going = visitor(actor, level);
            });
            if !keep_going {
                break;
            }
        }
    }

    fn is_position_empty_with_collider(
        &mut self,
        actor: &ActorBase,
        aabb: &Aabb,
        params: &mut TileCollisionParams,
        collider: &mut Option<ActorId>,
    ) -> bool {
        self.world.is_position_empty(actor, aabb, params, collider)
    }

    fn sync_proxy(&mut self, actor: &ActorBase) {
        if let Some(proxy) = self.world.proxies.get_mut(&actor.id) {
            proxy.aabb = actor.aabb;
            proxy.aabb_inner = actor.aabb_inner;
            proxy.state = actor.state();
        }
    }

    fn tile_map(&mut self) -> Option<&mut TileMap> {
        Some(&mut self.world.tile_map)
    }

    fn event_map(&mut self) -> Option<&mut EventMap> {
        Some(&mut self.world.event_map)
    }

    fn rng(&mut self) -> &mut Pcg32 {
        &mut self.world.rng
    }

    fn spawn(&mut self, request: SpawnRequest) {
        self.world.spawns.push(request);
    }

    fn emit(&mut self, event: LevelEvent) {
        if let LevelEvent::CarryChanged { player, object } = &event {
            log::debug!("Player {} carried by {:?}", player, object);
        }
        self.world.events.push(event);
    }
}

/// A running level
pub struct Level {
    pub(crate) world: World,
    pub(crate) actors: Registry,
    pub(crate) content: Rc<ContentResolver>,
    pub(crate) scheduler: ActivationScheduler,
    next_id: u32,
}

impl Level {
    /// Create a level; metadata decodes on a worker pool when `settings.worker_threads > 0`
    pub fn new(settings: &Settings, tile_map: TileMap, source: impl MetadataSource + 'static) -> Self {
        let pool = (settings.worker_threads > 0).then(|| ThreadPool::new(settings.worker_threads));
        Self::with_content(settings, tile_map, ContentResolver::new(source, pool))
    }

    pub fn with_content(settings: &Settings, tile_map: TileMap, content: ContentResolver) -> Self {
        log::info!(
            "Level created ({}x{} tiles, {} ruleset, seed {:#x})",
            tile_map.width(),
            tile_map.height(),
            settings.ruleset.as_str(),
            settings.seed
        );
        Self {
            world: World::new(settings, tile_map),
            actors: BTreeMap::new(),
            content: Rc::new(content),
            scheduler: ActivationScheduler::new(),
            next_id: 1,
        }
    }

    pub fn context(&mut self) -> LevelContext<'_> {
        LevelContext {
            world: &mut self.world,
            actors: &mut self.actors,
        }
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn content(&self) -> &ContentResolver {
        &self.content
    }

    pub fn event_map_mut(&mut self) -> &mut EventMap {
        &mut self.world.event_map
    }

    pub fn ruleset(&self) -> PhysicsRuleset {
        self.world.ruleset
    }

    pub fn elapsed_frames(&self) -> f32 {
        self.world.elapsed_frames
    }

    fn allocate_id(&mut self) -> ActorId {
        let id = ActorId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Start activating `actor`; it joins the registry once activation completes
    pub fn activate(&mut self, actor: Box<dyn Actor>, details: ActivationDetails) -> ActorId {
        let id = self.allocate_id();
        self.scheduler.schedule(id, actor, details, self.content.clone());
        id
    }

    pub fn add_actor(&mut self, actor: Box<dyn Actor>, pos: Vec2, layer: i32) -> ActorId {
        let details = ActivationDetails::at(pos, layer);
        self.activate(actor, details)
    }

    /// Add a player; it adopts the level's ruleset
    pub fn add_player(&mut self, mut player: Player, pos: Vec2) -> ActorId {
        player.ruleset = self.world.ruleset;
        self.add_actor(Box::new(player), pos, 0)
    }

    /// Activate an event through the actor factory
    pub fn spawn_event(
        &mut self,
        event_type: EventType,
        pos: Vec2,
        layer: i32,
        params: EventParams,
        state: ActorState,
    ) -> Option<ActorId> {
        let Some(actor) = activation::create_actor(event_type) else {
            log::warn!("No actor for event type {:?}", event_type);
            return None;
        };
        let details = ActivationDetails {
            pos: IVec3::new(pos.x as i32, pos.y as i32, layer),
            state,
            event_type: Some(event_type),
            params,
            force: Vec2::ZERO,
        };
        Some(self.activate(actor, details))
    }

    pub(crate) fn spawn_request(&mut self, request: SpawnRequest) -> Option<ActorId> {
        let actor = activation::create_actor(request.event_type)?;
        let details = ActivationDetails {
            pos: IVec3::new(request.pos.x as i32, request.pos.y as i32, request.layer),
            state: ActorState::empty(),
            event_type: Some(request.event_type),
            params: request.params,
            force: request.force,
        };
        Some(self.activate(actor, details))
    }

    /// Warm the metadata cache for every stored event
    pub fn preload_event_map(&self) {
        let mut events: Vec<_> = self.world.event_map.iter().collect();
        events.sort_by_key(|(tile, _)| (tile.y, tile.x));
        for (_, event) in events {
            activation::preload(event.event_type, &event.params, &self.content);
        }
    }

    /// Activate every active stored event at its tile
    pub fn place_events(&mut self) -> Vec<ActorId> {
        let mut events: Vec<_> = self
            .world
            .event_map
            .iter()
            .filter(|(_, e)| e.active)
            .map(|(tile, e)| (*tile, e.event_type, e.params))
            .collect();
        events.sort_by_key(|(tile, _, _)| (tile.y, tile.x));

        events
            .into_iter()
            .filter_map(|(tile, event_type, params)| {
                let pos = (tile.as_vec2() + Vec2::splat(0.5)) * crate::consts::TILE_SIZE;
                self.spawn_event(
                    event_type,
                    pos,
                    0,
                    params,
                    ActorState::IS_CREATED_FROM_EVENT_MAP,
                )
            })
            .collect()
    }

    /// Advance one frame
    pub fn update(&mut self, time_mult: f32) {
        super::tick::tick(self, time_mult);
    }

    /// Drive every pending activation to completion
    pub fn finish_activations(&mut self) {
        let completed = self.scheduler.finish();
        self.register_completed(completed);
    }

    pub(crate) fn register_completed(&mut self, completed: Vec<(Box<dyn Actor>, bool)>) {
        for (actor, success) in completed {
            let id = actor.base().id;
            let event_type = actor.base().event_type;
            if !success {
                log::debug!("Activation of {} ({:?}) failed, discarding", id, event_type);
                self.world.events.push(LevelEvent::ActivationFailed { event_type });
                continue;
            }
            debug_assert!(!self.actors.contains_key(&id), "actor id {} registered twice", id);
            self.world.register(actor.as_ref());
            self.actors.insert(id, Some(actor));
            self.world.events.push(LevelEvent::Activated { id, event_type });
        }
    }

    pub fn actor(&self, id: ActorId) -> Option<&dyn Actor> {
        self.actors.get(&id).and_then(|slot| slot.as_deref())
    }

    pub fn actor_mut(&mut self, id: ActorId) -> Option<&mut (dyn Actor + 'static)> {
        self.actors.get_mut(&id).and_then(|slot| slot.as_deref_mut())
    }

    pub fn player(&self, id: ActorId) -> Option<&Player> {
        self.actor(id).and_then(|a| a.as_player())
    }

    pub fn player_mut(&mut self, id: ActorId) -> Option<&mut Player> {
        self.actor_mut(id).and_then(|a| a.as_player_mut())
    }

    pub fn player_ids(&self) -> &[ActorId] {
        &self.world.players
    }

    pub fn actor_ids(&self) -> Vec<ActorId> {
        self.actors.keys().copied().collect()
    }

    pub fn actor_count(&self) -> usize {
        self.actors.len()
    }

    pub fn pending_activations(&self) -> usize {
        self.scheduler.pending()
    }

    pub fn pending_spawns(&self) -> &[SpawnRequest] {
        &self.world.spawns
    }

    pub fn drain_events(&mut self) -> Vec<LevelEvent> {
        std::mem::take(&mut self.world.events)
    }

    /// Unordered id pairs whose outer bounds overlap and that may collide
    pub(crate) fn overlapping_pairs(&self) -> Vec<(ActorId, ActorId)> {
        let candidates: Vec<(ActorId, &Proxy)> = self
            .world
            .proxies
            .iter()
            .filter(|(_, p)| {
                !p.state
                    .intersects(ActorState::IS_DESTROYED | ActorState::FORCE_DISABLE_COLLISIONS)
            })
            .map(|(id, p)| (*id, p))
            .collect();

        let mut pairs = Vec::new();
        for (i, (a, pa)) in candidates.iter().enumerate() {
            for (b, pb) in &candidates[i + 1..] {
                let either_collides = pa.state.contains(ActorState::COLLIDE_WITH_OTHER_ACTORS)
                    || pb.state.contains(ActorState::COLLIDE_WITH_OTHER_ACTORS);
                if either_collides && pa.aabb.overlaps(&pb.aabb) {
                    pairs.push((*a, *b));
                }
            }
        }
        pairs
    }

    /// Queued solid contacts followed by overlapping pairs, each pair once
    pub(crate) fn collision_pairs(&mut self) -> Vec<(ActorId, ActorId)> {
        let mut seen = BTreeSet::new();
        let contacts = std::mem::take(&mut self.world.contacts);
        contacts
            .into_iter()
            .chain(self.overlapping_pairs())
            .filter(|(a, b)| a != b && seen.insert((*a.min(b), *a.max(b))))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::InMemorySource;
    use crate::sim::container::AmmoCrate;

    fn level() -> Level {
        let settings = Settings {
            worker_threads: 0,
            ..Settings::default()
        };
        Level::new(
            &settings,
            TileMap::from_rows(&["........", "........", "########"]),
            InMemorySource::stock(),
        )
    }

    #[test]
    fn test_activation_registers_actor_and_proxy() {
        let mut level = level();
        let id = level.add_actor(Box::new(AmmoCrate::new()), Vec2::new(48.0, 49.0), 0);
        assert!(level.actor(id).is_none());
        level.finish_activations();

        let actor = level.actor(id).unwrap();
        assert!(actor.base().has_state(ActorState::INITIALIZED | ActorState::IS_SOLID_OBJECT));
        assert_eq!(level.world().proxy(id).unwrap().aabb_inner, actor.base().aabb_inner);
        assert!(matches!(
            level.drain_events().as_slice(),
            [LevelEvent::Activated { .. }]
        ));
    }

    #[test]
    fn test_with_actor_refuses_loaned_actor() {
        let mut level = level();
        let id = level.add_actor(Box::new(AmmoCrate::new()), Vec2::new(48.0, 49.0), 0);
        level.finish_activations();

        let mut ctx = level.context();
        let mut nested = None;
        let found = ctx.with_actor(id, &mut |_, level| {
            nested = Some(level.with_actor(id, &mut |_, _| {}));
        });
        assert!(found);
        assert_eq!(nested, Some(false));
        assert!(!ctx.with_actor(ActorId(999), &mut |_, _| {}));
    }

    #[test]
    fn test_solid_blocks_and_queues_contact() {
        let mut level = level();
        let crate_id = level.add_actor(Box::new(AmmoCrate::new()), Vec2::new(48.0, 49.0), 0);
        level.finish_activations();

        let mut mover = ActorBase::new();
        mover.id = ActorId(500);
        mover.replace_state(ActorState::COLLIDE_WITH_SOLID_OBJECTS);
        let mut params = TileCollisionParams::new(false);
        let mut collider = None;
        let mut ctx = level.context();
        let probe = Aabb::from_center(Vec2::new(60.0, 49.0), 10.0, 10.0);
        assert!(!ctx.is_position_empty_with_collider(&mover, &probe, &mut params, &mut collider));
        assert_eq!(collider, Some(crate_id));
        assert_eq!(level.world.contacts, vec![(ActorId(500), crate_id)]);
    }

    #[test]
    fn test_radius_query_stops_early() {
        let mut level = level();
        for x in [40.0, 80.0, 120.0] {
            level.add_actor(Box::new(AmmoCrate::new()), Vec2::new(x, 49.0), 0);
        }
        level.finish_activations();

        let mut visited = 0;
        level
            .context()
            .find_collision_actors_by_radius(80.0, 49.0, 100.0, &mut |_, _| {
                visited += 1;
                false
            });
        assert_eq!(visited, 1);

        let mut visited = 0;
        level
            .context()
            .find_collision_actors_by_radius(40.0, 49.0, 20.0, &mut |_, _| {
                visited += 1;
                true
            });
        assert_eq!(visited, 1);
    }
}
