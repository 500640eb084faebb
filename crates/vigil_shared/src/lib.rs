//! # VIGIL Shared
//!
//! Types spoken by both the host simulation adapter and the detection core.
//!
//! ## CRITICAL RULE
//!
//! This crate must NEVER contain detection logic:
//! - no thresholds
//! - no violation counters
//! - no per-entity state
//!
//! If you need any of those, put them in `vigil_detection`.

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod constants;
pub mod math;
pub mod telemetry;

pub use constants::{TICK_MILLIS, TICK_RATE};
pub use math::Vec3;
pub use telemetry::{
    AttackSample, BlockClass, BlockMinedSample, EntityId, EntityJoined, EntityLeft,
    ExemptionFlags, FallDamageSample, PositionSample, TargetKind, Telemetry, Teleported,
    TimestampMs,
};
