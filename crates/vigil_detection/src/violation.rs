//! # Violations & The Escalation State Machine
//!
//! Every check funnels through one counter type:
//!
//! ```text
//!            anomaly                 level >= action threshold
//!   level ─────────────► level + 1 ──────────────────────────► emit Violation
//!     ▲                                                        level - 3 (floor 0)
//!     │  no anomaly for >= decay interval
//!     └──────────────── level - 1 (floor 0)
//! ```
//!
//! Counters are per check, per entity. No check can see another's level.

use serde::{Deserialize, Serialize};
use std::fmt;
use vigil_shared::{EntityId, TimestampMs};

/// Levels removed from a counter right after it emits a violation.
pub const FLAG_RESET_STEP: u32 = 3;

/// Category of an emitted violation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationCategory {
    /// Horizontal speed beyond locomotion limits.
    Speed,
    /// Sustained airborne movement without permission.
    Flight,
    /// Automated combat (rhythm or geometry).
    KillAura,
    /// Attack beyond reach.
    Reach,
    /// Implausible rare-ore discovery rate.
    Xray,
    /// Fall damage suppressed.
    NoFall,
}

impl ViolationCategory {
    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Speed => "speed",
            Self::Flight => "flight",
            Self::KillAura => "kill_aura",
            Self::Reach => "reach",
            Self::Xray => "xray",
            Self::NoFall => "no_fall",
        }
    }
}

impl fmt::Display for ViolationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One escalation counter.
///
/// Irregular movement keeps its own counter and threshold but reports as
/// [`ViolationCategory::Flight`]: it is the early warning to the flight
/// detector's confirmation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Check {
    /// Sustained over-speed.
    Speed,
    /// Rising while airborne, sampled by the speed detector.
    IrregularMovement,
    /// Airborne beyond max air time.
    Flight,
    /// Attack rhythm and multi-angle attacks.
    KillAura,
    /// Attack distance.
    Reach,
    /// Rare / common mining ratio.
    Xray,
    /// Fall damage shortfall.
    NoFall,
}

impl Check {
    /// Number of checks.
    pub const COUNT: usize = 7;

    /// Every check, in counter order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::Speed,
        Self::IrregularMovement,
        Self::Flight,
        Self::KillAura,
        Self::Reach,
        Self::Xray,
        Self::NoFall,
    ];

    /// Category reported when this check flags.
    #[must_use]
    pub const fn category(self) -> ViolationCategory {
        match self {
            Self::Speed => ViolationCategory::Speed,
            Self::IrregularMovement | Self::Flight => ViolationCategory::Flight,
            Self::KillAura => ViolationCategory::KillAura,
            Self::Reach => ViolationCategory::Reach,
            Self::Xray => ViolationCategory::Xray,
            Self::NoFall => ViolationCategory::NoFall,
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

/// An emitted anomaly. Immutable, handed to a sink and forgotten.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    /// Offending entity.
    pub entity: EntityId,
    /// Category.
    pub category: ViolationCategory,
    /// Measured value (speed, ratio, interval, distance...).
    pub metric: f64,
    /// Human-readable explanation.
    pub detail: String,
    /// Host time of detection.
    pub time_ms: TimestampMs,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}ms] {} {}: {}",
            self.time_ms, self.entity, self.category, self.detail
        )
    }
}

/// Escalation counter for one check.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ViolationCounter {
    level: u32,
    last_violation_ms: Option<TimestampMs>,
}

impl ViolationCounter {
    /// Current level.
    #[must_use]
    pub const fn level(&self) -> u32 {
        self.level
    }

    /// Time of the last escalation, if any.
    #[must_use]
    pub const fn last_violation_ms(&self) -> Option<TimestampMs> {
        self.last_violation_ms
    }

    /// Records an anomaly.
    ///
    /// Returns `true` when the level reached `action_threshold`; the caller
    /// must emit exactly one violation. The level has already been reduced
    /// by [`FLAG_RESET_STEP`] when this returns.
    pub fn escalate(&mut self, now: TimestampMs, action_threshold: u32) -> bool {
        self.level = self.level.saturating_add(1);
        self.last_violation_ms = Some(now);

        if self.level >= action_threshold {
            self.level = self.level.saturating_sub(FLAG_RESET_STEP);
            return true;
        }
        false
    }

    /// Records a clean evaluation. Lowers the level by one once
    /// `decay_interval_ms` has passed since the last escalation.
    ///
    /// Returns `true` if the level actually dropped.
    pub fn decay(&mut self, now: TimestampMs, decay_interval_ms: u64) -> bool {
        if self.level == 0 {
            return false;
        }
        let quiet_for = match self.last_violation_ms {
            Some(last) => now.saturating_sub(last),
            None => u64::MAX,
        };
        if quiet_for < decay_interval_ms {
            return false;
        }
        self.level -= 1;
        true
    }

    /// The host clock stepped back to `now`: an escalation stamped later
    /// counts as happening at `now`. The level is kept.
    pub fn rewind(&mut self, now: TimestampMs) {
        if let Some(last) = self.last_violation_ms.as_mut() {
            *last = (*last).min(now);
        }
    }
}

/// All counters of one entity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ViolationLevels {
    counters: [ViolationCounter; Check::COUNT],
}

impl ViolationLevels {
    /// Counter of one check.
    #[must_use]
    pub const fn counter(&self, check: Check) -> &ViolationCounter {
        &self.counters[check.index()]
    }

    /// Mutable counter of one check.
    pub fn counter_mut(&mut self, check: Check) -> &mut ViolationCounter {
        &mut self.counters[check.index()]
    }

    /// Level of one check.
    #[must_use]
    pub const fn level(&self, check: Check) -> u32 {
        self.counters[check.index()].level
    }

    /// Clamps every counter's last escalation time to `now`.
    pub fn rewind(&mut self, now: TimestampMs) {
        for counter in &mut self.counters {
            counter.rewind(now);
        }
    }

    /// `(check, level)` for every check.
    #[must_use]
    pub fn snapshot(&self) -> [(Check, u32); Check::COUNT] {
        Check::ALL.map(|check| (check, self.level(check)))
    }
}
