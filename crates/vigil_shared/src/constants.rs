//! # Timing Constants
//!
//! Cadence and bookkeeping constants both the host adapter and the
//! detection core agree on.

// =============================================================================
// TICK CADENCE
// =============================================================================

/// Nominal host tick rate (periodic evaluations per second).
pub const TICK_RATE: u32 = 20;

/// Duration of one nominal tick in milliseconds.
pub const TICK_MILLIS: u64 = 1_000 / TICK_RATE as u64;

/// Milliseconds per second, for unit conversions.
pub const MILLIS_PER_SECOND: f64 = 1_000.0;

// =============================================================================
// PER-ENTITY BUFFER BOUNDS
// =============================================================================

/// Position history capacity (samples).
pub const POSITION_HISTORY_CAPACITY: usize = 10;

/// Horizontal speed sample capacity.
pub const SPEED_SAMPLE_CAPACITY: usize = 20;

/// Inter-attack interval capacity.
pub const ATTACK_INTERVAL_CAPACITY: usize = 20;

/// Recent attack target capacity (the 2 s window is also enforced by time).
pub const RECENT_TARGET_CAPACITY: usize = 32;
