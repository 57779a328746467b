//! Hit resolution shared by every destructible solid
//!
//! Containers and monitors describe how they react to shots, explosives and
//! players with a [`HitPolicy`]; [`apply_hit_policy`] applies the common
//! rules once and reports what happened.

use super::actor::{Actor, Capability};
use super::level::LevelHandler;
use super::state::{ActorId, WeaponSet};
use crate::consts::INSTANT_KILL;

/// Damage dealt by an accepted shot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitDamage {
    /// The shot's strength
    Strength,
    InstantKill,
}

/// How a destructible object reacts to colliders
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HitPolicy {
    /// Weapons whose shots damage the object; others ricochet
    pub accepted: WeaponSet,
    pub damage: HitDamage,
    /// Ownerless shots ricochet even when their weapon is accepted
    pub require_owner: bool,
}

impl HitPolicy {
    /// Damaged by any shot, by its strength
    pub fn any_weapon() -> Self {
        Self {
            accepted: WeaponSet::all(),
            damage: HitDamage::Strength,
            require_owner: false,
        }
    }
}

/// Result of a hit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitOutcome {
    Damaged {
        /// Who gets the credit (shot owner, explosive owner or player)
        credited: Option<ActorId>,
        /// This hit took the object to zero health
        destroyed: bool,
    },
    Ricocheted,
    /// Ownerless blast; no effect
    Absorbed,
    /// Not a hit this policy handles; run the default collision
    Fallthrough,
}

impl HitOutcome {
    pub fn is_handled(&self) -> bool {
        !matches!(self, HitOutcome::Fallthrough)
    }
}

/// Resolve a collision between `target` and `other` under `policy`
pub fn apply_hit_policy(
    target: &mut dyn Actor,
    other: &mut dyn Actor,
    policy: &HitPolicy,
    level: &mut dyn LevelHandler,
) -> HitOutcome {
    if target.base().health <= 0 {
        return HitOutcome::Fallthrough;
    }

    match other.capability() {
        Capability::Shot {
            owner,
            weapon,
            strength,
        } => {
            let owner_ok = owner.is_some() || !policy.require_owner;
            if !policy.accepted.accepts(weapon) || !owner_ok {
                let bounds = target.base().aabb_inner;
                if let Some(shot) = other.as_shot_mut() {
                    shot.trigger_ricochet(&bounds, level);
                }
                return HitOutcome::Ricocheted;
            }
            if strength <= 0 {
                return HitOutcome::Fallthrough;
            }

            let amount = match policy.damage {
                HitDamage::Strength => strength,
                HitDamage::InstantKill => INSTANT_KILL,
            };
            let target_id = target.base().id;
            let destroyed = target.decrease_health(amount, owner, level);
            other.decrease_health(INSTANT_KILL, Some(target_id), level);
            HitOutcome::Damaged {
                credited: owner,
                destroyed,
            }
        }
        Capability::Explosive {
            owner: Some(owner),
            detonated: true,
        } => {
            let destroyed = target.decrease_health(INSTANT_KILL, Some(owner), level);
            HitOutcome::Damaged {
                credited: Some(owner),
                destroyed,
            }
        }
        Capability::Explosive {
            owner: None,
            detonated: true,
        } => HitOutcome::Absorbed,
        Capability::Player {
            id,
            can_break_solid_objects: true,
        } => {
            let destroyed = target.decrease_health(INSTANT_KILL, Some(id), level);
            HitOutcome::Damaged {
                credited: Some(id),
                destroyed,
            }
        }
        _ => HitOutcome::Fallthrough,
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec2;

    use super::*;
    use crate::content::InMemorySource;
    use crate::settings::Settings;
    use crate::sim::container::CrateContainer;
    use crate::sim::level::Level;
    use crate::sim::state::{LevelEvent, WeaponType};
    use crate::sim::tiles::TileMap;
    use crate::sim::weapons::{Shot, Tnt};

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

    fn target_with_health(health: i32) -> CrateContainer {
        let mut target = CrateContainer::new();
        target.base_mut().set_health(health);
        target
    }

    fn rf_only() -> HitPolicy {
        HitPolicy {
            accepted: WeaponSet::RF,
            damage: HitDamage::Strength,
            require_owner: false,
        }
    }

    #[test]
    fn test_accepted_shot_damages_by_strength() {
        let mut level = level();
        let mut target = target_with_health(5);
        let mut shot = Shot::new(Some(ActorId(9)), WeaponType::RF).with_strength(2);

        let outcome = apply_hit_policy(&mut target, &mut shot, &rf_only(), &mut level.context());
        assert_eq!(
            outcome,
            HitOutcome::Damaged {
                credited: Some(ActorId(9)),
                destroyed: false
            }
        );
        assert_eq!(target.base().health, 3);
        assert_eq!(shot.base().health, 0);
    }

    #[test]
    fn test_rejected_shot_ricochets() {
        let mut level = level();
        let mut target = target_with_health(5);
        target.base_mut().update_hitbox(30.0, 30.0);
        let mut shot = Shot::new(Some(ActorId(9)), WeaponType::Toaster)
            .with_strength(3)
            .with_speed(Vec2::new(6.0, 0.0));
        shot.base_mut().pos = Vec2::new(-20.0, 0.0);

        let outcome = apply_hit_policy(&mut target, &mut shot, &rf_only(), &mut level.context());
        assert_eq!(outcome, HitOutcome::Ricocheted);
        assert_eq!(target.base().health, 5);
        assert_eq!(shot.base().health, 1);
        assert!(shot.base().speed.x < 0.0);
        assert!(level
            .drain_events()
            .iter()
            .any(|e| matches!(e, LevelEvent::Ricochet { .. })));
    }

    #[test]
    fn test_ownerless_shot_ricochets_when_owner_required() {
        let mut level = level();
        let mut target = target_with_health(5);
        let mut shot = Shot::new(None, WeaponType::RF).with_strength(1);
        let policy = HitPolicy {
            require_owner: true,
            ..rf_only()
        };
        let outcome = apply_hit_policy(&mut target, &mut shot, &policy, &mut level.context());
        assert_eq!(outcome, HitOutcome::Ricocheted);
        assert_eq!(target.base().health, 5);
    }

    #[test]
    fn test_dead_target_falls_through() {
        let mut level = level();
        let mut target = target_with_health(0);
        let mut shot = Shot::new(Some(ActorId(2)), WeaponType::RF).with_strength(1);
        let outcome = apply_hit_policy(&mut target, &mut shot, &rf_only(), &mut level.context());
        assert_eq!(outcome, HitOutcome::Fallthrough);
        assert_eq!(shot.base().health, 1);
    }

    #[test]
    fn test_unexploded_charge_does_nothing() {
        let mut level = level();
        let mut target = target_with_health(5);
        let mut tnt = Tnt::new(Some(ActorId(3)));
        let outcome = apply_hit_policy(&mut target, &mut tnt, &rf_only(), &mut level.context());
        assert_eq!(outcome, HitOutcome::Fallthrough);
        assert!(!outcome.is_handled());
        assert_eq!(target.base().health, 5);
    }
}
