//! Pickups released by containers

use async_trait::async_trait;

use super::activation::ActivationDetails;
use super::actor::{Actor, ActorBase};
use super::level::LevelHandler;
use super::player::Player;
use super::state::{ActorId, EventParams, EventType, LevelEvent, WeaponType};
use crate::consts::INSTANT_KILL;
use crate::content::ContentResolver;

const AMMO_PER_PICKUP: u16 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectibleKind {
    Ammo(WeaponType),
    Gem,
    Coin,
    Food,
}

impl CollectibleKind {
    pub fn from_event(event_type: EventType, params: &EventParams) -> Option<Self> {
        match event_type {
            EventType::Ammo => WeaponType::from_u8(params[0]).map(CollectibleKind::Ammo),
            EventType::Gem => Some(CollectibleKind::Gem),
            EventType::Coin => Some(CollectibleKind::Coin),
            EventType::Food => Some(CollectibleKind::Food),
            _ => None,
        }
    }

    pub fn score(&self) -> u32 {
        match self {
            CollectibleKind::Ammo(_) => 100,
            CollectibleKind::Gem => 100,
            CollectibleKind::Coin => 500,
            CollectibleKind::Food => 50,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Collectible {
    pub base: ActorBase,
    pub kind: CollectibleKind,
}

impl Default for Collectible {
    fn default() -> Self {
        Self::new()
    }
}

impl Collectible {
    pub fn new() -> Self {
        Self {
            base: ActorBase::new(),
            kind: CollectibleKind::Gem,
        }
    }

    pub fn preload(_params: &EventParams, content: &ContentResolver) {
        content.preload_metadata("Object/Collectible");
    }

    /// Returns false when the player cannot take it (ammo already full)
    fn give_to(&self, player: &mut Player) -> bool {
        if let CollectibleKind::Ammo(weapon) = self.kind {
            if !player.add_ammo(weapon, AMMO_PER_PICKUP) {
                return false;
            }
        }
        player.add_score(self.kind.score());
        true
    }
}

#[async_trait(?Send)]
impl Actor for Collectible {
    fn base(&self) -> &ActorBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ActorBase {
        &mut self.base
    }

    async fn on_activated(&mut self, details: &ActivationDetails, content: &ContentResolver) -> bool {
        if let Some(event_type) = details.event_type {
            match CollectibleKind::from_event(event_type, &details.params) {
                Some(kind) => self.kind = kind,
                None => return false,
            }
        }
        self.base.elasticity = 0.3;
        if !self.base.request_metadata(content, "Object/Collectible").await {
            return false;
        }
        let animation = match self.kind {
            CollectibleKind::Ammo(_) => "Ammo",
            CollectibleKind::Gem => "Gem",
            CollectibleKind::Coin => "Coin",
            CollectibleKind::Food => "Food",
        };
        self.base.set_animation(animation);
        true
    }

    fn on_handle_collision(&mut self, other: &mut dyn Actor, level: &mut dyn LevelHandler) -> bool {
        let Some(player) = other.as_player_mut() else {
            return false;
        };
        if self.base.health <= 0 || !self.give_to(player) {
            return false;
        }

        let player_id: ActorId = player.base.id;
        level.emit(LevelEvent::Score {
            player: player_id,
            amount: self.kind.score(),
        });
        level.emit(LevelEvent::Sound {
            pos: self.base.pos,
            name: "Pickup",
        });
        self.decrease_health(INSTANT_KILL, Some(player_id), level);
        true
    }
}
