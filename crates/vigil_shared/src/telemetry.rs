//! Telemetry records the host simulation feeds into the detection core.
//!
//! The host OWNS the ground truth: positions, attacks, mining and damage
//! arrive here already resolved. The core never asks the world "where is X"
//! beyond the narrow query surface it declares itself.

use crate::math::Vec3;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier of a tracked entity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Host time in milliseconds. Monotonic per entity except across teleports.
pub type TimestampMs = u64;

/// What kind of entity was hit by an attack.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    /// Another tracked player (entity-vs-entity combat).
    #[default]
    Player,
    /// A simulated creature (entity-vs-creature combat).
    Creature,
}

/// Value class of a mined block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockClass {
    /// High-value ore.
    RareOre,
    /// Filler material dug through on the way to ore.
    Common,
    /// Anything else; counted per identifier only.
    #[default]
    Other,
}

/// An entity became tracked.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntityJoined {
    /// Entity identifier.
    pub id: EntityId,
    /// Human-readable name used in violation details.
    pub display_name: String,
    /// Spawn position.
    pub position: Vec3,
    /// Host time.
    pub time_ms: TimestampMs,
}

/// An entity stopped being tracked.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityLeft {
    /// Entity identifier.
    pub id: EntityId,
}

/// Movement telemetry.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    /// Entity identifier.
    pub id: EntityId,
    /// Reported position.
    pub position: Vec3,
    /// Facing yaw in degrees.
    #[serde(default)]
    pub yaw: f32,
    /// Facing pitch in degrees.
    #[serde(default)]
    pub pitch: f32,
    /// Host's on-ground flag.
    pub on_ground: bool,
    /// Host-reported vertical velocity (units/s), when the host tracks one.
    #[serde(default)]
    pub vertical_velocity: Option<f64>,
    /// Host time.
    pub time_ms: TimestampMs,
}

/// The host moved an entity discontinuously (teleport, respawn, correction).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Teleported {
    /// Entity identifier.
    pub id: EntityId,
    /// Destination.
    pub position: Vec3,
    /// Host time.
    pub time_ms: TimestampMs,
}

/// An entity attacked another.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackSample {
    /// Attacker.
    pub id: EntityId,
    /// Attacked entity.
    pub target: EntityId,
    /// Kind of the attacked entity.
    #[serde(default)]
    pub target_kind: TargetKind,
    /// Host time.
    pub time_ms: TimestampMs,
}

/// An entity broke a block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockMinedSample {
    /// Miner.
    pub id: EntityId,
    /// Host block identifier, e.g. `minecraft:diamond_ore`.
    pub block_id: String,
    /// Class assigned by the host.
    #[serde(default)]
    pub class: BlockClass,
    /// Host time.
    pub time_ms: TimestampMs,
}

/// The host applied fall damage to an entity.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FallDamageSample {
    /// Entity identifier.
    pub id: EntityId,
    /// Damage applied (health units).
    pub amount: f64,
    /// Host time.
    pub time_ms: TimestampMs,
}

/// Host-reported conditions that exempt an entity from some checks.
///
/// Queried per evaluation, never cached by the core.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExemptionFlags {
    /// Creative / spectator equivalent: exempt from everything.
    pub in_creative_or_spectator: bool,
    /// Allowed to fly.
    pub has_flight_permission: bool,
    /// Riding a carrier (vehicle equivalent).
    pub is_mounted: bool,
    /// Gliding (elytra equivalent).
    pub is_gliding: bool,
    /// Levitation effect active.
    pub has_levitation: bool,
    /// Slow-falling effect active.
    pub has_slow_falling: bool,
    /// Sprinting.
    pub is_sprinting: bool,
    /// Speed-boost effect level (0 = none).
    pub speed_effect_level: u8,
    /// Slowness effect level (0 = none).
    pub slowness_effect_level: u8,
    /// Touching or submerged in liquid.
    pub in_liquid: bool,
    /// Jump-boost effect active.
    pub has_jump_boost: bool,
}

impl ExemptionFlags {
    /// Exempt from horizontal movement checks.
    #[must_use]
    pub const fn movement_exempt(&self) -> bool {
        self.in_creative_or_spectator || self.is_mounted
    }

    /// Exempt from airborne checks (flight, fall suppression).
    #[must_use]
    pub const fn airborne_exempt(&self) -> bool {
        self.in_creative_or_spectator
            || self.has_flight_permission
            || self.is_mounted
            || self.is_gliding
            || self.has_levitation
            || self.has_slow_falling
    }

    /// Exempt from combat and mining checks.
    #[must_use]
    pub const fn interaction_exempt(&self) -> bool {
        self.in_creative_or_spectator
    }
}

/// Every telemetry input the core consumes, as one stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Telemetry {
    /// Entity joined.
    Joined(EntityJoined),
    /// Entity left.
    Left(EntityLeft),
    /// Position sample.
    Position(PositionSample),
    /// Teleport / re-baseline signal.
    Teleported(Teleported),
    /// Attack sample.
    Attack(AttackSample),
    /// Block mined sample.
    BlockMined(BlockMinedSample),
    /// Fall damage sample.
    FallDamage(FallDamageSample),
    /// Periodic trigger.
    Tick {
        /// Host time.
        time_ms: TimestampMs,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_airborne_exemptions() {
        let flags = ExemptionFlags::default();
        assert!(!flags.airborne_exempt());

        let gliding = ExemptionFlags { is_gliding: true, ..Default::default() };
        assert!(gliding.airborne_exempt());
        assert!(!gliding.movement_exempt());

        let mounted = ExemptionFlags { is_mounted: true, ..Default::default() };
        assert!(mounted.movement_exempt());
    }

    #[test]
    fn test_telemetry_from_toml() {
        #[derive(Deserialize)]
        struct Stream {
            events: Vec<Telemetry>,
        }

        let text = r#"
            [[events]]
            kind = "position"
            id = 7
            position = { x = 1.0, y = 64.0, z = -2.5 }
            on_ground = true
            time_ms = 50

            [[events]]
            kind = "tick"
            time_ms = 50
        "#;

        let stream: Stream = toml::from_str(text).unwrap();
        assert_eq!(stream.events.len(), 2);
        assert_eq!(stream.events[1], Telemetry::Tick { time_ms: 50 });
        match &stream.events[0] {
            Telemetry::Position(p) => {
                assert_eq!(p.id, EntityId(7));
                assert_eq!(p.position, Vec3::new(1.0, 64.0, -2.5));
                assert!(p.vertical_velocity.is_none());
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
