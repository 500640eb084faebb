//! # Speed Detector
//!
//! Horizontal speed against the entity's locomotion limit, judged on a
//! moving average so one lag spike never escalates on its own.
//!
//! Also runs the irregular-movement check: rising while airborne. It
//! overlaps the flight detector on purpose. Irregular movement reacts
//! within a few samples of any unexplained climb; flight only confirms once
//! the entity has stayed up past the max air time. They keep separate
//! counters and thresholds, and both report as `Flight`.

use super::{decay, escalate, Context};
use crate::config::DetectionConfig;
use crate::record::{EntityRecord, TimedPosition};
use crate::violation::{Check, Violation};
use vigil_shared::constants::MILLIS_PER_SECOND;
use vigil_shared::{ExemptionFlags, PositionSample, Vec3};

/// History entries needed before irregular movement is judged.
const IRREGULAR_MIN_HISTORY: usize = 3;

/// Horizontal speed in units/s between two positions `elapsed_ms` apart.
///
/// The vertical axis is ignored.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn horizontal_speed(from: Vec3, to: Vec3, elapsed_ms: u64) -> f64 {
    from.horizontal_distance(to) / (elapsed_ms as f64 / MILLIS_PER_SECOND)
}

/// Speed limit for an entity with the given effects.
///
/// Can be zero (deep slowness); callers skip the check then.
#[must_use]
pub fn max_allowed_speed(flags: &ExemptionFlags, config: &DetectionConfig) -> f64 {
    let speed_bonus = 1.0 + config.speed_effect_per_level * f64::from(flags.speed_effect_level);
    let slowness =
        (1.0 - config.slowness_per_level * f64::from(flags.slowness_effect_level)).max(0.0);
    let sprint = if flags.is_sprinting { config.sprint_multiplier } else { 1.0 };

    config.base_speed * speed_bonus * slowness * sprint * config.speed_tolerance
}

/// Runs both checks for one position sample.
pub fn evaluate(
    record: &mut EntityRecord,
    sample: &PositionSample,
    ctx: &Context<'_>,
    out: &mut Vec<Violation>,
) {
    check_speed(record, sample, ctx, out);
    check_irregular_movement(record, sample, ctx, out);
}

fn check_speed(
    record: &mut EntityRecord,
    sample: &PositionSample,
    ctx: &Context<'_>,
    out: &mut Vec<Violation>,
) {
    let current = TimedPosition { position: sample.position, time_ms: sample.time_ms };
    let previous = record.speed_baseline.replace(current);

    if ctx.flags.movement_exempt() {
        return;
    }
    let Some(previous) = previous else {
        return;
    };
    if current.time_ms <= previous.time_ms {
        tracing::trace!("{} speed: non-monotonic sample, re-baselined", record.id);
        return;
    }
    let elapsed = current.time_ms - previous.time_ms;
    if elapsed > ctx.config.max_sample_gap_ms {
        tracing::trace!("{} speed: {}ms gap, re-baselined", record.id, elapsed);
        return;
    }

    let speed = horizontal_speed(previous.position, current.position, elapsed);
    if !speed.is_finite() {
        return;
    }
    record.speed_samples.push(speed);

    let max_speed = max_allowed_speed(&ctx.flags, ctx.config);
    if max_speed <= 0.0 {
        return;
    }

    if speed <= max_speed {
        decay(record, Check::Speed, ctx);
        return;
    }

    // Sustained check: one fast sample alone never escalates.
    if record.speed_samples.len() < ctx.config.sustained_min_samples {
        return;
    }
    let Some(mean) = record.speed_samples.mean() else {
        return;
    };
    let over_percent = (mean / max_speed - 1.0) * 100.0;
    if mean > max_speed && over_percent > ctx.config.sustained_margin * 100.0 {
        escalate(
            record,
            Check::Speed,
            ctx,
            mean,
            || format!("Moving at {mean:.2} units/s ({over_percent:.2}% over limit)"),
            out,
        );
    }
}

fn check_irregular_movement(
    record: &mut EntityRecord,
    sample: &PositionSample,
    ctx: &Context<'_>,
    out: &mut Vec<Violation>,
) {
    let previous = record.position_history.last().copied();
    record
        .position_history
        .push(TimedPosition { position: sample.position, time_ms: sample.time_ms });

    if sample.on_ground {
        decay(record, Check::IrregularMovement, ctx);
        return;
    }

    let flags = &ctx.flags;
    if record.position_history.len() < IRREGULAR_MIN_HISTORY
        || flags.airborne_exempt()
        || flags.in_liquid
        || flags.has_jump_boost
    {
        return;
    }
    let Some(previous) = previous else {
        return;
    };
    if sample.position.y <= previous.position.y || sample.time_ms <= previous.time_ms {
        return;
    }

    let vertical_velocity = sample.vertical_velocity.unwrap_or_else(|| {
        let secs = (sample.time_ms - previous.time_ms) as f64 / MILLIS_PER_SECOND;
        (sample.position.y - previous.position.y) / secs
    });
    if vertical_velocity >= 0.0 {
        escalate(
            record,
            Check::IrregularMovement,
            ctx,
            vertical_velocity,
            || format!("Irregular vertical movement detected (y-vel: {vertical_velocity:.2})"),
            out,
        );
    }
}
