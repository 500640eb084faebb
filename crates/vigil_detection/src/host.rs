//! # Host Query Surface
//!
//! The few things the core asks the host simulation on demand. Everything
//! else is pushed in as telemetry.
//!
//! ```text
//! vigil_detection defines:     The host implements:
//! ┌─────────────────┐          ┌─────────────────┐
//! │ trait HostView  │ ←─────── │ impl HostView   │
//! └─────────────────┘          └─────────────────┘
//! ```
//!
//! Implementations must answer from already-resolved state and never block:
//! these are called with an entity's record lock held.

use parking_lot::RwLock;
use std::collections::HashMap;
use vigil_shared::{EntityId, ExemptionFlags, Vec3};

/// On-demand queries into the host simulation.
pub trait HostView: Send + Sync {
    /// Conditions exempting an entity from checks right now.
    fn exemptions(&self, id: EntityId) -> ExemptionFlags;

    /// Round-trip latency of an entity, in milliseconds.
    fn latency_ms(&self, id: EntityId) -> u32;

    /// Current position of any entity the host knows (attack targets
    /// included).
    fn entity_position(&self, id: EntityId) -> Option<Vec3>;

    /// Entities within `radius` of `center`, with their positions.
    fn nearby_entities(&self, center: Vec3, radius: f64) -> Vec<(EntityId, Vec3)>;
}

/// In-memory [`HostView`] whose answers are set by hand.
///
/// Drives the replay harness and tests; also a reasonable adapter for hosts
/// that push their state once per tick.
#[derive(Debug, Default)]
pub struct ScriptedHost {
    flags: RwLock<HashMap<EntityId, ExemptionFlags>>,
    latency: RwLock<HashMap<EntityId, u32>>,
    positions: RwLock<HashMap<EntityId, Vec3>>,
}

impl ScriptedHost {
    /// Creates a host where nobody is exempt and latency is zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces an entity's exemption flags.
    pub fn set_flags(&self, id: EntityId, flags: ExemptionFlags) {
        self.flags.write().insert(id, flags);
    }

    /// Sets an entity's latency.
    pub fn set_latency(&self, id: EntityId, latency_ms: u32) {
        self.latency.write().insert(id, latency_ms);
    }

    /// Sets an entity's position.
    pub fn set_position(&self, id: EntityId, position: Vec3) {
        self.positions.write().insert(id, position);
    }

    /// Forgets an entity.
    pub fn remove(&self, id: EntityId) {
        self.flags.write().remove(&id);
        self.latency.write().remove(&id);
        self.positions.write().remove(&id);
    }
}

impl HostView for ScriptedHost {
    fn exemptions(&self, id: EntityId) -> ExemptionFlags {
        self.flags.read().get(&id).copied().unwrap_or_default()
    }

    fn latency_ms(&self, id: EntityId) -> u32 {
        self.latency.read().get(&id).copied().unwrap_or(0)
    }

    fn entity_position(&self, id: EntityId) -> Option<Vec3> {
        self.positions.read().get(&id).copied()
    }

    fn nearby_entities(&self, center: Vec3, radius: f64) -> Vec<(EntityId, Vec3)> {
        let mut nearby: Vec<_> = self
            .positions
            .read()
            .iter()
            .filter(|(_, pos)| pos.distance(center) <= radius)
            .map(|(id, pos)| (*id, *pos))
            .collect();
        nearby.sort_unstable_by_key(|(id, _)| *id);
        nearby
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_answers() {
        let host = ScriptedHost::new();
        let id = EntityId(3);
        assert_eq!(host.exemptions(id), ExemptionFlags::default());
        assert_eq!(host.latency_ms(id), 0);

        host.set_latency(id, 120);
        host.set_position(id, Vec3::new(1.0, 0.0, 0.0));
        host.set_position(EntityId(4), Vec3::new(10.0, 0.0, 0.0));

        assert_eq!(host.latency_ms(id), 120);
        let near = host.nearby_entities(Vec3::ZERO, 5.0);
        assert_eq!(near, vec![(id, Vec3::new(1.0, 0.0, 0.0))]);

        host.remove(id);
        assert!(host.entity_position(id).is_none());
    }
}
