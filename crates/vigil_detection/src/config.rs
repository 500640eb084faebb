//! # Detection Configuration
//!
//! Every threshold the detectors read. The engine holds one immutable
//! snapshot per evaluation; swapping it never affects an evaluation in flight.
//!
//! All fields default to the tuned production values, so a TOML document
//! only needs to name what it changes:
//!
//! ```toml
//! speed_tolerance = 1.5
//! max_reach_pvp = 3.0
//!
//! [action_thresholds]
//! reach = 3
//! ```

use crate::error::{DetectionError, DetectionResult};
use crate::violation::Check;
use serde::{Deserialize, Serialize};
use vigil_shared::constants::MILLIS_PER_SECOND;
use vigil_shared::{BlockClass, TargetKind};

/// Escalation level at which each check emits a violation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionThresholds {
    /// Speed.
    pub speed: u32,
    /// Irregular movement.
    pub irregular_movement: u32,
    /// Flight.
    pub flight: u32,
    /// Kill aura.
    pub kill_aura: u32,
    /// Reach.
    pub reach: u32,
    /// Xray.
    pub xray: u32,
    /// No-fall.
    pub no_fall: u32,
}

impl Default for ActionThresholds {
    fn default() -> Self {
        Self {
            speed: 5,
            irregular_movement: 5,
            flight: 5,
            kill_aura: 5,
            reach: 5,
            xray: 5,
            no_fall: 5,
        }
    }
}

impl ActionThresholds {
    /// Threshold of one check.
    #[must_use]
    pub const fn get(&self, check: Check) -> u32 {
        match check {
            Check::Speed => self.speed,
            Check::IrregularMovement => self.irregular_movement,
            Check::Flight => self.flight,
            Check::KillAura => self.kill_aura,
            Check::Reach => self.reach,
            Check::Xray => self.xray,
            Check::NoFall => self.no_fall,
        }
    }
}

/// Maps host block identifiers to a [`BlockClass`].
///
/// Hosts that already classify blocks can ignore this and fill
/// `BlockMinedSample::class` themselves.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockClassifier {
    /// Identifiers counted as rare ore. Matched against the identifier with
    /// any `namespace:` prefix removed.
    pub valuable_ores: Vec<String>,
    /// Substrings marking filler blocks.
    pub filler_markers: Vec<String>,
}

impl Default for BlockClassifier {
    fn default() -> Self {
        Self {
            valuable_ores: vec![
                "diamond_ore".to_owned(),
                "deepslate_diamond_ore".to_owned(),
                "ancient_debris".to_owned(),
            ],
            filler_markers: vec!["stone".to_owned(), "deepslate".to_owned()],
        }
    }
}

impl BlockClassifier {
    /// Classifies a block identifier.
    #[must_use]
    pub fn classify(&self, block_id: &str) -> BlockClass {
        let name = block_id.rsplit(':').next().unwrap_or(block_id);

        if self.valuable_ores.iter().any(|ore| ore == name) {
            BlockClass::RareOre
        } else if self.filler_markers.iter().any(|m| name.contains(m.as_str())) {
            BlockClass::Common
        } else {
            BlockClass::Other
        }
    }
}

/// Thresholds for all detectors.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    // --- Speed ---
    /// Jitter allowance multiplied onto the speed limit. Must be >= 1.0.
    pub speed_tolerance: f64,
    /// Walking speed in units/s.
    pub base_speed: f64,
    /// Multiplier while sprinting.
    pub sprint_multiplier: f64,
    /// Speed gained per speed-effect level (fraction).
    pub speed_effect_per_level: f64,
    /// Speed lost per slowness level (fraction).
    pub slowness_per_level: f64,
    /// Sample gap beyond which deltas are discarded.
    pub max_sample_gap_ms: u64,
    /// Samples needed before the sustained check runs.
    pub sustained_min_samples: usize,
    /// Fraction the mean must exceed the limit by.
    pub sustained_margin: f64,

    // --- Flight ---
    /// Air time allowed before flight checks apply.
    pub max_air_time_ms: u64,
    /// Falling slower than this (units/s, negative) counts as suppressed.
    pub min_fall_rate: f64,
    /// Air time required before the suppressed-fall check applies.
    pub suppressed_fall_min_air_ms: u64,
    /// Sample gaps shorter than this are re-baselined.
    pub min_flight_sample_gap_ms: u64,
    /// Flight checks pause this long after a teleport.
    pub teleport_grace_ms: u64,

    // --- Combat ---
    /// Attacks per second considered humanly sustainable.
    pub max_attacks_per_second: f64,
    /// Explicit minimum mean interval. Derived from
    /// `max_attacks_per_second` when unset.
    pub min_attack_interval_ms: Option<f64>,
    /// Gaps above this are not part of a rapid sequence.
    pub rapid_attack_gap_ms: u64,
    /// Intervals needed before the rate test runs.
    pub min_attack_samples: usize,
    /// Interval std-dev below which timing is machine-regular.
    pub attack_regularity_std_dev_ms: f64,
    /// Direction change counted by the multi-angle test, in degrees.
    pub max_attack_angle_deg: f64,
    /// Direction changes that escalate.
    pub multi_angle_min_changes: usize,
    /// Radius searched for recently attacked targets.
    pub multi_target_radius: f64,
    /// How long an attacked target stays "recent".
    pub recent_target_window_ms: u64,
    /// Reach against players.
    pub max_reach_pvp: f64,
    /// Reach against creatures.
    pub max_reach_pve: f64,
    /// Extra reach per second of round-trip latency.
    pub latency_compensation: f64,

    // --- Mining ---
    /// Rare/common ratio above which mining is suspicious.
    pub xray_ratio_threshold: f64,
    /// Common blocks needed before the ratio is evaluated.
    pub xray_min_common_blocks: u64,
    /// Block classification used by hosts that do not classify.
    pub block_classifier: BlockClassifier,

    // --- Fall ---
    /// Fall distance that deals no damage.
    pub safe_fall_distance: f64,
    /// Damage shortfall tolerated.
    pub fall_damage_tolerance: f64,
    /// Time after landing for the host to report fall damage.
    pub landing_grace_ms: u64,

    // --- State machine ---
    /// Quiet time before a level decays.
    pub decay_interval_ms: u64,
    /// Per-check action thresholds.
    pub action_thresholds: ActionThresholds,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            speed_tolerance: 1.3,
            base_speed: 4.3,
            sprint_multiplier: 1.3,
            speed_effect_per_level: 0.2,
            slowness_per_level: 0.15,
            max_sample_gap_ms: 1_000,
            sustained_min_samples: 5,
            sustained_margin: 0.1,

            max_air_time_ms: 3_000,
            min_fall_rate: -0.5,
            suppressed_fall_min_air_ms: 1_500,
            min_flight_sample_gap_ms: 50,
            teleport_grace_ms: 2_000,

            max_attacks_per_second: 16.0,
            min_attack_interval_ms: None,
            rapid_attack_gap_ms: 200,
            min_attack_samples: 10,
            attack_regularity_std_dev_ms: 50.0,
            max_attack_angle_deg: 45.0,
            multi_angle_min_changes: 2,
            multi_target_radius: 5.0,
            recent_target_window_ms: 2_000,
            max_reach_pvp: 3.2,
            max_reach_pve: 3.5,
            latency_compensation: 0.5,

            xray_ratio_threshold: 0.05,
            xray_min_common_blocks: 20,
            block_classifier: BlockClassifier::default(),

            safe_fall_distance: 3.0,
            fall_damage_tolerance: 0.5,
            landing_grace_ms: 500,

            decay_interval_ms: 10_000,
            action_thresholds: ActionThresholds::default(),
        }
    }
}

impl DetectionConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// [`DetectionError::Parse`] on malformed TOML,
    /// [`DetectionError::InvalidConfig`] on out-of-range values.
    pub fn from_toml_str(text: &str) -> DetectionResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every value is finite and in range.
    ///
    /// # Errors
    ///
    /// [`DetectionError::InvalidConfig`] naming the first bad field.
    pub fn validate(&self) -> DetectionResult<()> {
        if !self.speed_tolerance.is_finite() || self.speed_tolerance < 1.0 {
            return Err(DetectionError::invalid(
                "speed_tolerance",
                format!("must be >= 1.0, got {}", self.speed_tolerance),
            ));
        }

        let positive = [
            ("base_speed", self.base_speed),
            ("sprint_multiplier", self.sprint_multiplier),
            ("max_attacks_per_second", self.max_attacks_per_second),
            ("attack_regularity_std_dev_ms", self.attack_regularity_std_dev_ms),
            ("max_attack_angle_deg", self.max_attack_angle_deg),
            ("multi_target_radius", self.multi_target_radius),
            ("max_reach_pvp", self.max_reach_pvp),
            ("max_reach_pve", self.max_reach_pve),
            ("xray_ratio_threshold", self.xray_ratio_threshold),
        ];
        for (field, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(DetectionError::invalid(field, format!("must be > 0, got {value}")));
            }
        }

        let non_negative = [
            ("speed_effect_per_level", self.speed_effect_per_level),
            ("slowness_per_level", self.slowness_per_level),
            ("sustained_margin", self.sustained_margin),
            ("latency_compensation", self.latency_compensation),
            ("safe_fall_distance", self.safe_fall_distance),
            ("fall_damage_tolerance", self.fall_damage_tolerance),
        ];
        for (field, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(DetectionError::invalid(field, format!("must be >= 0, got {value}")));
            }
        }

        if !self.min_fall_rate.is_finite() || self.min_fall_rate > 0.0 {
            return Err(DetectionError::invalid(
                "min_fall_rate",
                format!("must be <= 0, got {}", self.min_fall_rate),
            ));
        }

        if let Some(interval) = self.min_attack_interval_ms {
            if !interval.is_finite() || interval <= 0.0 {
                return Err(DetectionError::invalid(
                    "min_attack_interval_ms",
                    format!("must be > 0, got {interval}"),
                ));
            }
        }

        if self.min_flight_sample_gap_ms >= self.max_sample_gap_ms {
            return Err(DetectionError::invalid(
                "min_flight_sample_gap_ms",
                format!("must be below max_sample_gap_ms ({})", self.max_sample_gap_ms),
            ));
        }

        if self.sustained_min_samples == 0 || self.min_attack_samples < 2 {
            return Err(DetectionError::invalid(
                "sample counts",
                "sustained_min_samples must be >= 1 and min_attack_samples >= 2",
            ));
        }

        for check in Check::ALL {
            if self.action_thresholds.get(check) == 0 {
                return Err(DetectionError::invalid(
                    "action_thresholds",
                    format!("{check:?} must be >= 1"),
                ));
            }
        }

        Ok(())
    }

    /// Mean attack interval below which attacks are too fast.
    #[must_use]
    pub fn min_attack_interval(&self) -> f64 {
        self.min_attack_interval_ms
            .unwrap_or(MILLIS_PER_SECOND / self.max_attacks_per_second)
    }

    /// Action threshold of one check.
    #[must_use]
    pub const fn action_threshold(&self, check: Check) -> u32 {
        self.action_thresholds.get(check)
    }

    /// Reach ceiling for a target kind before latency compensation.
    #[must_use]
    pub const fn max_reach(&self, kind: TargetKind) -> f64 {
        match kind {
            TargetKind::Player => self.max_reach_pvp,
            TargetKind::Creature => self.max_reach_pve,
        }
    }
}
