//! Weapon power-up monitor
//!
//! Breaking the monitor with a player-fired shot, an owned TNT blast or a
//! breaking move upgrades the weapon in `params[0]` for the credited player.

use async_trait::async_trait;

use super::activation::ActivationDetails;
use super::actor::{Actor, ActorBase, PerishOutcome};
use super::collision::{HitDamage, HitOutcome, HitPolicy, apply_hit_policy};
use super::level::{LevelHandler, with_player};
use super::player::Player;
use super::solid::SolidObject;
use super::state::{ActorId, ActorState, EventParams, LevelEvent, WeaponSet, WeaponType};
use crate::content::ContentResolver;

const UPGRADE: u8 = 0x01;
const UPGRADE_AMMO: u16 = 25;

#[derive(Debug, Clone)]
pub struct PowerUpWeaponMonitor {
    pub solid: SolidObject,
    pub weapon: WeaponType,
}

impl Default for PowerUpWeaponMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl PowerUpWeaponMonitor {
    pub fn new() -> Self {
        Self {
            solid: SolidObject::new(),
            weapon: WeaponType::Blaster,
        }
    }

    pub fn preload(_params: &EventParams, content: &ContentResolver) {
        content.preload_metadata("Object/PowerUpMonitor");
    }

    pub fn hit_policy() -> HitPolicy {
        HitPolicy {
            accepted: WeaponSet::BLASTER
                | WeaponSet::RF
                | WeaponSet::SEEKER
                | WeaponSet::PEPPER
                | WeaponSet::ELECTRO,
            damage: HitDamage::InstantKill,
            require_owner: true,
        }
    }

    fn apply_upgrade(&self, player: &mut Player) {
        player.add_weapon_upgrade(self.weapon, UPGRADE);
        player.add_ammo(self.weapon, UPGRADE_AMMO);
        log::debug!(
            "Monitor {} upgraded {:?} for player {}",
            self.solid.base.id,
            self.weapon,
            player.base.id
        );
    }

    /// The credited player may be the collider itself, which is on loan
    fn reward(&self, credited: ActorId, other: &mut dyn Actor, level: &mut dyn LevelHandler) {
        if let Some(player) = other.as_player_mut().filter(|p| p.base.id == credited) {
            self.apply_upgrade(player);
            return;
        }
        if with_player(level, credited, |player, _| self.apply_upgrade(player)).is_none() {
            log::debug!("Monitor {} credited unknown player {}", self.solid.base.id, credited);
        }
    }
}

#[async_trait(?Send)]
impl Actor for PowerUpWeaponMonitor {
    fn base(&self) -> &ActorBase {
        &self.solid.base
    }

    fn base_mut(&mut self) -> &mut ActorBase {
        &mut self.solid.base
    }

    async fn on_activated(&mut self, details: &ActivationDetails, content: &ContentResolver) -> bool {
        self.weapon = WeaponType::from_u8(details.params[0]).unwrap_or(WeaponType::Blaster);
        self.solid.apply_solid_state();
        self.solid.base.set_state(ActorState::TRIGGERS_TNT, true);
        self.solid.movable = true;

        if !self
            .solid
            .base
            .request_metadata(content, "Object/PowerUpMonitor")
            .await
        {
            return false;
        }
        self.solid.base.set_animation(&format!("{:?}", self.weapon));
        true
    }

    fn on_update(&mut self, time_mult: f32, level: &mut dyn LevelHandler) {
        self.solid.update(time_mult, level);
    }

    fn on_handle_collision(&mut self, other: &mut dyn Actor, level: &mut dyn LevelHandler) -> bool {
        match apply_hit_policy(self, other, &Self::hit_policy(), level) {
            HitOutcome::Damaged {
                credited: Some(player),
                ..
            } => {
                self.reward(player, other, level);
                level.emit(LevelEvent::Sound {
                    pos: self.solid.base.pos,
                    name: "Break",
                });
                true
            }
            HitOutcome::Fallthrough => self.solid.handle_collision(other, level),
            _ => true,
        }
    }

    fn on_perish(&mut self, collider: Option<ActorId>, level: &mut dyn LevelHandler) -> PerishOutcome {
        level.emit(LevelEvent::Debris {
            pos: self.solid.base.pos,
            count: 4,
        });
        self.solid.perish(collider, level)
    }

    fn as_solid(&self) -> Option<&SolidObject> {
        Some(&self.solid)
    }

    fn as_solid_mut(&mut self) -> Option<&mut SolidObject> {
        Some(&mut self.solid)
    }
}
