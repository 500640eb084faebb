//! # Detectors
//!
//! Five independent checks, each a function of
//! `(EntityRecord, sample, DetectionConfig) -> (EntityRecord', Option<Violation>)`.
//! None holds state outside the record.
//!
//! | Detector | Trigger      | Checks                         |
//! |----------|--------------|--------------------------------|
//! | speed    | tick         | Speed, IrregularMovement       |
//! | flight   | tick         | Flight                         |
//! | combat   | attack event | KillAura, Reach                |
//! | mining   | tick         | Xray                           |
//! | fall     | tick         | NoFall                         |
//!
//! Every escalation and decay goes through [`escalate`] and [`decay`] so
//! the state machine is applied the same way everywhere.

pub mod combat;
pub mod fall;
pub mod flight;
pub mod mining;
pub mod speed;

use crate::config::DetectionConfig;
use crate::record::EntityRecord;
use crate::violation::{Check, Violation};
use vigil_shared::{ExemptionFlags, TimestampMs};

/// Inputs shared by one evaluation.
#[derive(Clone, Copy, Debug)]
pub struct Context<'a> {
    /// Config snapshot for this evaluation.
    pub config: &'a DetectionConfig,
    /// Host exemptions, queried for this evaluation.
    pub flags: ExemptionFlags,
    /// Host time of the sample under evaluation.
    pub now: TimestampMs,
}

/// Escalates `check`; on flag, pushes a violation built from `metric` and
/// `detail` into `out`.
///
/// `detail` only runs when a violation is actually emitted.
pub(crate) fn escalate(
    record: &mut EntityRecord,
    check: Check,
    ctx: &Context<'_>,
    metric: f64,
    detail: impl FnOnce() -> String,
    out: &mut Vec<Violation>,
) {
    let threshold = ctx.config.action_threshold(check);
    let counter = record.levels.counter_mut(check);
    let flagged = counter.escalate(ctx.now, threshold);

    tracing::trace!(
        "{} {:?} escalated to {} (metric {:.3})",
        record.id,
        check,
        counter.level(),
        metric
    );

    if flagged {
        let violation = Violation {
            entity: record.id,
            category: check.category(),
            metric,
            detail: detail(),
            time_ms: ctx.now,
        };
        tracing::info!(
            "Violation: {} {} metric={:.4} ({})",
            violation.entity,
            violation.category,
            violation.metric,
            record.display_name
        );
        out.push(violation);
    }
}

/// Clean evaluation for `check`.
pub(crate) fn decay(record: &mut EntityRecord, check: Check, ctx: &Context<'_>) {
    if record
        .levels
        .counter_mut(check)
        .decay(ctx.now, ctx.config.decay_interval_ms)
    {
        tracing::trace!("{} {:?} decayed to {}", record.id, check, record.levels.level(check));
    }
}
