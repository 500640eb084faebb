//! # Fall Suppression Detector
//!
//! Compares the fall damage the host actually applied against what the
//! fall height calls for. Clients that spoof `on_ground` mid-fall land
//! without taking damage.
//!
//! ```text
//!   airborne ──► accumulate downward distance
//!   landed   ──► distance > safe? open a pending landing
//!   damage   ──► credit the pending landing (or hold it until one opens)
//!   tick     ──► grace elapsed? judge expected vs. received
//! ```
//!
//! Damage reports can overtake the position sample that shows the landing,
//! so damage seen shortly before a landing is credited to it.

use super::{decay, escalate, Context};
use crate::record::{EntityRecord, GroundTransition, PendingLanding};
use crate::violation::{Check, Violation};
use vigil_shared::{FallDamageSample, PositionSample};

/// Tracks fall distance for one position sample.
///
/// Expects `transition` from applying `sample` to the record's ground state.
pub fn observe(
    record: &mut EntityRecord,
    sample: &PositionSample,
    transition: GroundTransition,
    ctx: &Context<'_>,
) {
    let y = sample.position.y;
    let previous_y = record.fall.last_y.replace(y);

    if ctx.flags.airborne_exempt() || ctx.flags.in_liquid {
        record.fall.distance = 0.0;
        return;
    }

    let descent = previous_y.map_or(0.0, |py| (py - y).max(0.0));

    match transition {
        GroundTransition::Initial => record.fall.distance = 0.0,
        GroundTransition::TookOff => record.fall.distance = descent,
        GroundTransition::Unchanged if !sample.on_ground => record.fall.distance += descent,
        GroundTransition::Unchanged => record.fall.distance = 0.0,
        GroundTransition::Landed => {
            let fallen = record.fall.distance + descent;
            record.fall.distance = 0.0;
            if fallen > ctx.config.safe_fall_distance {
                open_landing(record, fallen, ctx);
            }
        }
    }
}

fn open_landing(record: &mut EntityRecord, fallen: f64, ctx: &Context<'_>) {
    let expected = fallen - ctx.config.safe_fall_distance;
    let grace = ctx.config.landing_grace_ms;

    let early_damage = match record.fall.unclaimed_since_ms.take() {
        Some(since) if ctx.now.saturating_sub(since) <= grace => record.fall.unclaimed_damage,
        _ => 0.0,
    };
    record.fall.unclaimed_damage = 0.0;

    tracing::trace!("{} landed after {:.2} units", record.id, fallen);

    record.fall.pending = Some(match record.fall.pending {
        // Second landing inside the grace window: judge both together.
        Some(open) => PendingLanding {
            expected_damage: open.expected_damage + expected,
            received_damage: open.received_damage + early_damage,
            fall_distance: open.fall_distance.max(fallen),
            landed_at_ms: open.landed_at_ms,
        },
        None => PendingLanding {
            expected_damage: expected,
            received_damage: early_damage,
            fall_distance: fallen,
            landed_at_ms: ctx.now,
        },
    });
}

/// Credits host-applied fall damage.
pub fn on_fall_damage(record: &mut EntityRecord, sample: &FallDamageSample) {
    if !sample.amount.is_finite() || sample.amount < 0.0 {
        return;
    }
    if let Some(pending) = record.fall.pending.as_mut() {
        pending.received_damage += sample.amount;
    } else {
        record.fall.unclaimed_damage += sample.amount;
        record.fall.unclaimed_since_ms.get_or_insert(sample.time_ms);
    }
}

/// Judges a pending landing once its grace period has passed.
pub fn evaluate(record: &mut EntityRecord, ctx: &Context<'_>, out: &mut Vec<Violation>) {
    let grace = ctx.config.landing_grace_ms;

    let Some(landing) = record.fall.pending else {
        // Damage with no landing to claim it goes stale.
        if record
            .fall
            .unclaimed_since_ms
            .is_some_and(|since| ctx.now.saturating_sub(since) > grace)
        {
            record.fall.unclaimed_damage = 0.0;
            record.fall.unclaimed_since_ms = None;
        }
        decay(record, Check::NoFall, ctx);
        return;
    };
    if ctx.now < landing.landed_at_ms.saturating_add(grace) {
        return;
    }
    record.fall.pending = None;

    let shortfall = landing.expected_damage - landing.received_damage;
    if shortfall > ctx.config.fall_damage_tolerance {
        escalate(
            record,
            Check::NoFall,
            ctx,
            shortfall,
            || {
                format!(
                    "Fell {:.2} units, expected {:.2} damage, received {:.2}",
                    landing.fall_distance, landing.expected_damage, landing.received_damage
                )
            },
            out,
        );
    } else {
        decay(record, Check::NoFall, ctx);
    }
}
