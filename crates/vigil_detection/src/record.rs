//! # Entity Record
//!
//! Everything the core remembers about one tracked entity. Pure storage:
//! detectors own the logic, the record only keeps its buffers bounded.
//!
//! ## Baselines
//!
//! Speed, flight and fall each keep their own last-seen position. One
//! detector re-baselining (gap too large, exemption) never hides a delta
//! from another.

use crate::violation::ViolationLevels;
use std::collections::{HashMap, VecDeque};
use vigil_shared::constants::{
    ATTACK_INTERVAL_CAPACITY, POSITION_HISTORY_CAPACITY, RECENT_TARGET_CAPACITY,
    SPEED_SAMPLE_CAPACITY,
};
use vigil_shared::{BlockClass, EntityId, PositionSample, TimestampMs, Vec3};

// =============================================================================
// BOUNDED BUFFER
// =============================================================================

/// FIFO that evicts its oldest element once full.
#[derive(Clone, Debug)]
pub struct BoundedBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedBuffer<T> {
    /// Creates an empty buffer. A zero capacity is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { items: VecDeque::with_capacity(capacity), capacity }
    }

    /// Appends, evicting the oldest element when full.
    pub fn push(&mut self, item: T) {
        if self.items.len() == self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    /// Removes elements from the front while `pred` holds.
    pub fn evict_while(&mut self, mut pred: impl FnMut(&T) -> bool) {
        while self.items.front().is_some_and(&mut pred) {
            self.items.pop_front();
        }
    }

    /// Newest element.
    #[must_use]
    pub fn last(&self) -> Option<&T> {
        self.items.back()
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    /// Element count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Keeps only the elements `pred` accepts.
    pub fn retain(&mut self, pred: impl FnMut(&T) -> bool) {
        self.items.retain(pred);
    }

    /// Drops every element.
    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl BoundedBuffer<f64> {
    /// Arithmetic mean, `None` when empty.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean(&self) -> Option<f64> {
        if self.items.is_empty() {
            return None;
        }
        Some(self.items.iter().sum::<f64>() / self.items.len() as f64)
    }
}

// =============================================================================
// RECORD PARTS
// =============================================================================

/// A position with the host time it was sampled at.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimedPosition {
    /// Position.
    pub position: Vec3,
    /// Host time.
    pub time_ms: TimestampMs,
}

/// What the latest sample did to the ground state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GroundTransition {
    /// First sample seen.
    Initial,
    /// Same state as before.
    Unchanged,
    /// Ground to air.
    TookOff,
    /// Air to ground.
    Landed,
}

/// On-ground flag and continuous air time.
#[derive(Clone, Copy, Debug, Default)]
pub struct GroundState {
    on_ground: bool,
    known: bool,
    airborne_since_ms: Option<TimestampMs>,
    air_time_ms: u64,
}

impl GroundState {
    /// Applies a sample's on-ground flag.
    pub fn observe(&mut self, on_ground: bool, now: TimestampMs) -> GroundTransition {
        let transition = if !self.known {
            GroundTransition::Initial
        } else if self.on_ground == on_ground {
            GroundTransition::Unchanged
        } else if on_ground {
            GroundTransition::Landed
        } else {
            GroundTransition::TookOff
        };

        self.known = true;
        self.on_ground = on_ground;

        match transition {
            GroundTransition::Initial | GroundTransition::TookOff | GroundTransition::Landed => {
                self.airborne_since_ms = (!on_ground).then_some(now);
                self.air_time_ms = 0;
            }
            GroundTransition::Unchanged => {
                if let Some(since) = self.airborne_since_ms {
                    self.air_time_ms = now.saturating_sub(since);
                }
            }
        }
        transition
    }

    /// Restarts the air-time clock without changing the flag.
    pub fn rebaseline(&mut self, now: TimestampMs) {
        self.air_time_ms = 0;
        self.airborne_since_ms = (self.known && !self.on_ground).then_some(now);
    }

    /// Whether the entity is on the ground.
    #[must_use]
    pub const fn on_ground(&self) -> bool {
        self.on_ground
    }

    /// Continuous time in the air, zero on the ground.
    #[must_use]
    pub const fn air_time_ms(&self) -> u64 {
        self.air_time_ms
    }
}

/// Last facing. Kept for geometry checks, read by nothing yet.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rotation {
    /// Yaw, degrees.
    pub yaw: f32,
    /// Pitch, degrees.
    pub pitch: f32,
}

/// A recently attacked entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecentTarget {
    /// Target.
    pub target: EntityId,
    /// Attack time.
    pub time_ms: TimestampMs,
}

/// Attack timing and targets.
#[derive(Clone, Debug)]
pub struct AttackState {
    /// Time of the previous attack.
    pub last_attack_ms: Option<TimestampMs>,
    /// Rapid inter-attack intervals, ms.
    pub intervals: BoundedBuffer<f64>,
    /// Targets hit within the recent window.
    pub recent_targets: BoundedBuffer<RecentTarget>,
}

impl Default for AttackState {
    fn default() -> Self {
        Self {
            last_attack_ms: None,
            intervals: BoundedBuffer::new(ATTACK_INTERVAL_CAPACITY),
            recent_targets: BoundedBuffer::new(RECENT_TARGET_CAPACITY),
        }
    }
}

impl AttackState {
    /// Forgets attacks stamped after `now` once the host clock stepped back.
    pub fn rewind(&mut self, now: TimestampMs) {
        if self.last_attack_ms.is_some_and(|t| t > now) {
            self.last_attack_ms = None;
        }
        self.recent_targets.retain(|hit| hit.time_ms <= now);
    }
}

/// Mined-block tallies.
#[derive(Clone, Debug, Default)]
pub struct MiningCounters {
    /// Rare ore mined.
    pub rare: u64,
    /// Filler blocks mined.
    pub common: u64,
    /// Count per host block identifier.
    pub per_block: HashMap<String, u64>,
    /// New blocks since the last ratio evaluation.
    pub dirty: bool,
}

impl MiningCounters {
    /// Counts one mined block.
    pub fn record(&mut self, block_id: &str, class: BlockClass) {
        match class {
            BlockClass::RareOre => self.rare += 1,
            BlockClass::Common => self.common += 1,
            BlockClass::Other => {}
        }
        // Avoid allocating a key for blocks already seen.
        if let Some(count) = self.per_block.get_mut(block_id) {
            *count += 1;
        } else {
            self.per_block.insert(block_id.to_owned(), 1);
        }
        self.dirty = true;
    }

    /// Count of one block identifier.
    #[must_use]
    pub fn count_of(&self, block_id: &str) -> u64 {
        self.per_block.get(block_id).copied().unwrap_or(0)
    }
}

/// A landing awaiting its fall damage.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PendingLanding {
    /// Damage a fall of this height should deal.
    pub expected_damage: f64,
    /// Damage the host reported since landing.
    pub received_damage: f64,
    /// Fall height.
    pub fall_distance: f64,
    /// Landing time.
    pub landed_at_ms: TimestampMs,
}

/// Fall accumulation.
#[derive(Clone, Copy, Debug, Default)]
pub struct FallState {
    /// Downward distance covered in the current airborne stretch.
    pub distance: f64,
    /// Height at the previous sample.
    pub last_y: Option<f64>,
    /// Landing under evaluation.
    pub pending: Option<PendingLanding>,
    /// Fall damage reported before its landing was seen.
    pub unclaimed_damage: f64,
    /// Time of the first unclaimed damage report.
    pub unclaimed_since_ms: Option<TimestampMs>,
}

// =============================================================================
// ENTITY RECORD
// =============================================================================

/// Per-entity state.
#[derive(Clone, Debug)]
pub struct EntityRecord {
    /// Entity identifier.
    pub id: EntityId,
    /// Name used in admin summaries.
    pub display_name: String,
    /// Recent positions, irregular-movement check.
    pub position_history: BoundedBuffer<TimedPosition>,
    /// Recent horizontal speeds.
    pub speed_samples: BoundedBuffer<f64>,
    /// Speed detector's last position.
    pub speed_baseline: Option<TimedPosition>,
    /// Flight detector's last position.
    pub flight_baseline: Option<TimedPosition>,
    /// Ground flag and air time.
    pub ground: GroundState,
    /// Last facing.
    pub rotation: Rotation,
    /// Last teleport time.
    pub last_teleport_ms: Option<TimestampMs>,
    /// Attack state.
    pub attack: AttackState,
    /// Mining tallies.
    pub mining: MiningCounters,
    /// Fall accumulation.
    pub fall: FallState,
    /// Newest position sample not yet evaluated by a tick.
    pub pending_sample: Option<PositionSample>,
    /// Time of the newest sample a tick has evaluated.
    pub last_evaluated_ms: Option<TimestampMs>,
    /// Escalation counters.
    pub levels: ViolationLevels,
    /// Set once the entity left; the record must not be mutated after this.
    pub retired: bool,
}

impl EntityRecord {
    /// Creates an empty record.
    #[must_use]
    pub fn new(id: EntityId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            position_history: BoundedBuffer::new(POSITION_HISTORY_CAPACITY),
            speed_samples: BoundedBuffer::new(SPEED_SAMPLE_CAPACITY),
            speed_baseline: None,
            flight_baseline: None,
            ground: GroundState::default(),
            rotation: Rotation::default(),
            last_teleport_ms: None,
            attack: AttackState::default(),
            mining: MiningCounters::default(),
            fall: FallState::default(),
            pending_sample: None,
            last_evaluated_ms: None,
            levels: ViolationLevels::default(),
            retired: false,
        }
    }

    /// Newest position the core has seen, evaluated or not.
    #[must_use]
    pub fn last_known_position(&self) -> Option<Vec3> {
        self.pending_sample
            .map(|s| s.position)
            .or_else(|| self.speed_baseline.map(|p| p.position))
    }

    /// Re-baselines all position-derived state at `position`.
    ///
    /// Violation levels, attack and mining state survive.
    pub fn rebaseline(&mut self, position: Vec3, now: TimestampMs) {
        let point = TimedPosition { position, time_ms: now };
        self.position_history.clear();
        self.position_history.push(point);
        self.speed_samples.clear();
        self.speed_baseline = Some(point);
        self.flight_baseline = Some(point);
        self.ground.rebaseline(now);
        self.fall = FallState { last_y: Some(position.y), ..FallState::default() };
        self.pending_sample = None;
        self.last_evaluated_ms = Some(now);
    }

    /// The host clock stepped back to `now`.
    ///
    /// Re-baselines at `position` and drops every timestamp later than `now`.
    /// Windowed checks then measure from the new clock.
    pub fn rewind(&mut self, position: Vec3, now: TimestampMs) {
        self.rebaseline(position, now);
        if self.last_teleport_ms.is_some_and(|t| t > now) {
            self.last_teleport_ms = None;
        }
        self.attack.rewind(now);
        self.levels.rewind(now);
    }
}
