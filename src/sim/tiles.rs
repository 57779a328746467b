//! Tile map and per-tile event storage

use std::collections::HashMap;

use glam::IVec2;

use super::aabb::Aabb;
use super::state::{EventParams, EventType, TileCollisionParams, TileDestructType, WeaponSet};
use crate::consts::TILE_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tile {
    Empty,
    Solid,
    /// Solid until hit by one of these weapons
    Destructible(WeaponSet),
}

/// Grid of 32-unit tiles. Columns outside the map block, rows outside are open.
#[derive(Debug, Clone)]
pub struct TileMap {
    width: i32,
    height: i32,
    tiles: Vec<Tile>,
    destroyed: Vec<IVec2>,
}

impl TileMap {
    pub fn new(width: i32, height: i32) -> Self {
        let width = width.max(0);
        let height = height.max(0);
        Self {
            width,
            height,
            tiles: vec![Tile::Empty; (width * height) as usize],
            destroyed: Vec::new(),
        }
    }

    /// Build from text rows: `#` solid, `x` destructible by any weapon, anything else empty
    pub fn from_rows(rows: &[&str]) -> Self {
        let width = rows.iter().map(|row| row.len()).max().unwrap_or(0) as i32;
        let mut map = Self::new(width, rows.len() as i32);
        for (y, row) in rows.iter().enumerate() {
            for (x, c) in row.chars().enumerate() {
                let tile = match c {
                    '#' => Tile::Solid,
                    'x' => Tile::Destructible(WeaponSet::all()),
                    _ => Tile::Empty,
                };
                map.set_tile(x as i32, y as i32, tile);
            }
        }
        map
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.width || y >= self.height {
            return None;
        }
        Some((y * self.width + x) as usize)
    }

    pub fn tile(&self, x: i32, y: i32) -> Tile {
        if x < 0 || x >= self.width {
            return Tile::Solid;
        }
        self.index(x, y).map_or(Tile::Empty, |i| self.tiles[i])
    }

    pub fn set_tile(&mut self, x: i32, y: i32, tile: Tile) {
        if let Some(i) = self.index(x, y) {
            self.tiles[i] = tile;
        }
    }

    /// Test `aabb` against the tiles it covers, destroying what `params` allows
    pub fn is_tile_empty(&mut self, aabb: &Aabb, params: &mut TileCollisionParams) -> bool {
        let x0 = (aabb.l / TILE_SIZE).floor() as i32;
        let y0 = (aabb.t / TILE_SIZE).floor() as i32;
        let x1 = (aabb.r / TILE_SIZE).ceil() as i32 - 1;
        let y1 = (aabb.b / TILE_SIZE).ceil() as i32 - 1;
        let destroying = params.destruct_type.contains(TileDestructType::WEAPON);
        let ignore_solid = params.destruct_type.contains(TileDestructType::IGNORE_SOLID_TILES);

        let mut empty = true;
        for y in y0..=y1 {
            for x in x0..=x1 {
                let blocked = match self.tile(x, y) {
                    Tile::Empty => false,
                    Tile::Solid => !ignore_solid || x < 0 || x >= self.width,
                    Tile::Destructible(weapons) => {
                        if destroying
                            && weapons.accepts(params.weapon_type)
                            && params.tiles_destroyed < params.weapon_strength
                        {
                            self.set_tile(x, y, Tile::Empty);
                            self.destroyed.push(IVec2::new(x, y));
                            params.tiles_destroyed += 1;
                            false
                        } else {
                            !ignore_solid
                        }
                    }
                };
                if blocked {
                    if !destroying {
                        return false;
                    }
                    empty = false;
                }
            }
        }
        empty
    }

    /// Tiles destroyed since the last call
    pub fn take_destroyed(&mut self) -> Vec<IVec2> {
        std::mem::take(&mut self.destroyed)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredEvent {
    pub event_type: EventType,
    pub params: EventParams,
    pub active: bool,
}

/// Per-tile persisted event state and numbered triggers
#[derive(Debug, Clone, Default)]
pub struct EventMap {
    events: HashMap<IVec2, StoredEvent>,
    triggers: HashMap<u8, bool>,
}

impl EventMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store_tile_event(&mut self, tile: IVec2, event_type: EventType, params: EventParams) {
        if event_type == EventType::Empty {
            self.events.remove(&tile);
            return;
        }
        self.events.insert(
            tile,
            StoredEvent {
                event_type,
                params,
                active: true,
            },
        );
    }

    pub fn event_at(&self, tile: IVec2) -> Option<&StoredEvent> {
        self.events.get(&tile)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&IVec2, &StoredEvent)> {
        self.events.iter()
    }

    pub fn deactivate(&mut self, tile: IVec2) {
        if let Some(event) = self.events.get_mut(&tile) {
            event.active = false;
        }
    }

    pub fn is_active(&self, tile: IVec2) -> bool {
        self.events.get(&tile).is_some_and(|e| e.active)
    }

    pub fn trigger(&self, id: u8) -> bool {
        self.triggers.get(&id).copied().unwrap_or(false)
    }

    pub fn set_trigger(&mut self, id: u8, value: bool) {
        self.triggers.insert(id, value);
    }
}
