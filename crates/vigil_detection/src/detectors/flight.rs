//! # Flight Detector
//!
//! Confirms sustained flight: once an entity has been continuously airborne
//! past the max air time, it must be falling, and falling fast enough.
//!
//! Expects the record's ground state to already reflect `sample`.

use super::{decay, escalate, Context};
use crate::record::{EntityRecord, TimedPosition};
use crate::violation::{Check, Violation};
use vigil_shared::constants::MILLIS_PER_SECOND;
use vigil_shared::PositionSample;

/// Evaluates one position sample.
#[allow(clippy::cast_precision_loss)]
pub fn evaluate(
    record: &mut EntityRecord,
    sample: &PositionSample,
    ctx: &Context<'_>,
    out: &mut Vec<Violation>,
) {
    let config = ctx.config;
    let current = TimedPosition { position: sample.position, time_ms: sample.time_ms };
    let previous = record.flight_baseline.replace(current);

    if ctx.flags.airborne_exempt() {
        return;
    }
    let in_teleport_grace = record
        .last_teleport_ms
        .is_some_and(|t| ctx.now.saturating_sub(t) < config.teleport_grace_ms);
    if in_teleport_grace {
        tracing::trace!("{} flight: teleport grace", record.id);
        return;
    }
    let Some(previous) = previous else {
        return;
    };
    if current.time_ms <= previous.time_ms {
        return;
    }
    let elapsed = current.time_ms - previous.time_ms;
    if elapsed < config.min_flight_sample_gap_ms || elapsed > config.max_sample_gap_ms {
        tracing::trace!("{} flight: {}ms gap, re-baselined", record.id, elapsed);
        return;
    }

    if record.ground.on_ground() {
        decay(record, Check::Flight, ctx);
        return;
    }

    let air_time = record.ground.air_time_ms();
    if air_time <= config.max_air_time_ms {
        return;
    }

    let secs = elapsed as f64 / MILLIS_PER_SECOND;
    let vertical_velocity = (current.position.y - previous.position.y) / secs;
    let air_secs = air_time as f64 / MILLIS_PER_SECOND;

    if current.position.y >= previous.position.y && vertical_velocity >= 0.0 {
        escalate(
            record,
            Check::Flight,
            ctx,
            vertical_velocity,
            || {
                format!(
                    "Airtime: {air_secs:.1}s, Vertical velocity: {vertical_velocity:.2} units/s"
                )
            },
            out,
        );
    } else if vertical_velocity > config.min_fall_rate
        && air_time > config.suppressed_fall_min_air_ms
    {
        escalate(
            record,
            Check::Flight,
            ctx,
            vertical_velocity,
            || format!("Airtime: {air_secs:.1}s, Fall velocity: {vertical_velocity:.2} units/s"),
            out,
        );
    }
}
