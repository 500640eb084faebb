//! # Combat Detector
//!
//! Event-driven: runs on every attack, never on the tick.
//!
//! Three tests per attack:
//!
//! 1. **Rhythm**: rapid attacks that are both too fast on average and too
//!    regular. Human timing jitters; scripted timing does not.
//! 2. **Multi-angle**: recently hit targets spread around the attacker in
//!    sharply different directions.
//! 3. **Reach**: attacker-to-target distance against the target kind's
//!    ceiling plus latency compensation.
//!
//! Rhythm and multi-angle feed the same `KillAura` counter.

use super::{decay, escalate, Context};
use crate::host::HostView;
use crate::record::{EntityRecord, RecentTarget};
use crate::violation::{Check, Violation};
use vigil_shared::constants::MILLIS_PER_SECOND;
use vigil_shared::{AttackSample, Vec3};

/// Slack on the reach comparison so a target at exactly the limit passes.
const REACH_EPSILON: f64 = 1e-9;

/// Mean and population standard deviation of attack intervals.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AttackRhythm {
    /// Mean interval, ms.
    pub mean_ms: f64,
    /// Standard deviation, ms.
    pub std_dev_ms: f64,
}

impl AttackRhythm {
    /// Measures a sequence of intervals. `None` when empty.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn measure<'a>(intervals: impl IntoIterator<Item = &'a f64>) -> Option<Self> {
        // Welford
        let mut count = 0_u32;
        let mut mean = 0.0;
        let mut m2 = 0.0;
        for &x in intervals {
            count += 1;
            let delta = x - mean;
            mean += delta / f64::from(count);
            m2 += delta * (x - mean);
        }
        if count == 0 {
            return None;
        }
        Some(Self { mean_ms: mean, std_dev_ms: (m2 / f64::from(count)).sqrt() })
    }

    /// Too fast and too regular to be human.
    #[must_use]
    pub fn is_automated(&self, min_interval_ms: f64, max_std_dev_ms: f64) -> bool {
        self.mean_ms < min_interval_ms && self.std_dev_ms < max_std_dev_ms
    }
}

/// Number of adjacent direction changes sharper than `max_angle_deg` when
/// walking `targets` in order as seen from `origin`.
///
/// Targets sitting on the origin have no direction and are skipped.
#[must_use]
pub fn count_direction_changes(
    origin: Vec3,
    targets: impl IntoIterator<Item = Vec3>,
    max_angle_deg: f64,
) -> usize {
    let mut changes = 0;
    let mut last_direction: Option<Vec3> = None;

    for target in targets {
        let Some(direction) = (target - origin).normalized() else {
            continue;
        };
        if let Some(last) = last_direction {
            if last.angle_deg(direction).is_some_and(|angle| angle > max_angle_deg) {
                changes += 1;
            }
        }
        last_direction = Some(direction);
    }
    changes
}

/// Evaluates one attack.
///
/// `attacker_position` is the core's best knowledge of where the attacker
/// stood; reach and multi-angle are skipped without it.
pub fn on_attack(
    record: &mut EntityRecord,
    sample: &AttackSample,
    attacker_position: Option<Vec3>,
    host: &dyn HostView,
    ctx: &Context<'_>,
    out: &mut Vec<Violation>,
) {
    if ctx.flags.interaction_exempt() {
        return;
    }

    let window = ctx.config.recent_target_window_ms;
    let now = ctx.now;
    if record.attack.last_attack_ms.is_some_and(|t| now < t) {
        tracing::trace!("{} attack clock stepped back to {}ms", record.id, now);
        record.attack.rewind(now);
        record.levels.rewind(now);
    }
    let recent = &mut record.attack.recent_targets;
    recent.push(RecentTarget { target: sample.target, time_ms: now });
    recent.evict_while(|hit| now.saturating_sub(hit.time_ms) > window);

    check_rhythm(record, ctx, out);

    if let Some(origin) = attacker_position {
        check_multi_angle(record, origin, host, ctx, out);
        check_reach(record, sample, origin, host, ctx, out);
    }
}

#[allow(clippy::cast_precision_loss)]
fn check_rhythm(record: &mut EntityRecord, ctx: &Context<'_>, out: &mut Vec<Violation>) {
    let config = ctx.config;
    let previous = record.attack.last_attack_ms.replace(ctx.now);

    let Some(interval) = previous.and_then(|prev| ctx.now.checked_sub(prev)) else {
        return;
    };
    if interval > config.rapid_attack_gap_ms {
        return;
    }
    record.attack.intervals.push(interval as f64);

    if record.attack.intervals.len() < config.min_attack_samples {
        return;
    }
    let Some(rhythm) = AttackRhythm::measure(record.attack.intervals.iter()) else {
        return;
    };

    if rhythm.is_automated(config.min_attack_interval(), config.attack_regularity_std_dev_ms) {
        escalate(
            record,
            Check::KillAura,
            ctx,
            rhythm.mean_ms,
            || {
                format!(
                    "Rapid attacks (avg: {:.2}ms, stdDev: {:.2})",
                    rhythm.mean_ms, rhythm.std_dev_ms
                )
            },
            out,
        );
    } else {
        decay(record, Check::KillAura, ctx);
    }
}

#[allow(clippy::cast_precision_loss)]
fn check_multi_angle(
    record: &mut EntityRecord,
    origin: Vec3,
    host: &dyn HostView,
    ctx: &Context<'_>,
    out: &mut Vec<Violation>,
) {
    let config = ctx.config;
    if record.attack.recent_targets.len() < 3 {
        return;
    }

    // Distinct targets, ordered by their latest hit.
    let mut ordered: Vec<RecentTarget> = Vec::with_capacity(record.attack.recent_targets.len());
    for hit in record.attack.recent_targets.iter() {
        ordered.retain(|seen| seen.target != hit.target);
        ordered.push(*hit);
    }

    let attacker = record.id;
    let nearby = host.nearby_entities(origin, config.multi_target_radius);
    let positions = ordered.iter().filter_map(|hit| {
        nearby
            .iter()
            .find(|(id, _)| *id == hit.target && *id != attacker)
            .map(|(_, pos)| *pos)
    });

    let changes = count_direction_changes(origin, positions, config.max_attack_angle_deg);
    if changes >= config.multi_angle_min_changes {
        escalate(
            record,
            Check::KillAura,
            ctx,
            changes as f64,
            || format!("Multiple angle attacks ({changes} different angles)"),
            out,
        );
    }
}

fn check_reach(
    record: &mut EntityRecord,
    sample: &AttackSample,
    origin: Vec3,
    host: &dyn HostView,
    ctx: &Context<'_>,
    out: &mut Vec<Violation>,
) {
    let Some(target) = host.entity_position(sample.target) else {
        tracing::trace!("{} reach: target {} has no position", record.id, sample.target);
        return;
    };

    let reach = origin.distance(target);
    if !reach.is_finite() {
        return;
    }
    let latency = host.latency_ms(sample.id);
    let max_reach = ctx.config.max_reach(sample.target_kind)
        + f64::from(latency) / MILLIS_PER_SECOND * ctx.config.latency_compensation;

    if reach > max_reach + REACH_EPSILON {
        escalate(
            record,
            Check::Reach,
            ctx,
            reach,
            || {
                format!(
                    "Reached {reach:.2} units (max allowed: {max_reach:.2}, latency: {latency}ms)"
                )
            },
            out,
        );
    } else {
        decay(record, Check::Reach, ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{ctx, record};
    use super::*;
    use crate::config::DetectionConfig;
    use crate::host::ScriptedHost;
    use vigil_shared::{EntityId, TargetKind};

    const ATTACKER: EntityId = EntityId(1);

    fn attack(target: u64, time_ms: u64) -> AttackSample {
        AttackSample {
            id: ATTACKER,
            target: EntityId(target),
            target_kind: TargetKind::Player,
            time_ms,
        }
    }

    fn hit(
        rec: &mut EntityRecord,
        host: &ScriptedHost,
        config: &DetectionConfig,
        sample: &AttackSample,
    ) -> Vec<Violation> {
        let mut out = Vec::new();
        on_attack(rec, sample, Some(Vec3::ZERO), host, &ctx(config, sample.time_ms), &mut out);
        out
    }

    #[test]
    fn test_rhythm_regular_and_fast() {
        let intervals = [50.0, 48.0, 52.0, 50.0, 49.0, 51.0, 50.0, 50.0, 47.0, 53.0];
        let rhythm = AttackRhythm::measure(&intervals).unwrap();
        assert!((rhythm.mean_ms - 50.0).abs() < 1e-9);
        assert!(rhythm.std_dev_ms < 50.0);
        assert!(rhythm.is_automated(62.5, 50.0));
    }

    #[test]
    fn test_rhythm_irregular_is_human() {
        let intervals = [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 250.0, 250.0];
        let rhythm = AttackRhythm::measure(&intervals).unwrap();
        assert!((rhythm.mean_ms - 50.0).abs() < 1e-9);
        assert!((rhythm.std_dev_ms - 100.0).abs() < 1e-9);
        assert!(!rhythm.is_automated(62.5, 50.0));
        assert!(AttackRhythm::measure(&[]).is_none());
    }

    #[test]
    fn test_attack_clock_step_back_evicts_old_targets() {
        let config = DetectionConfig::default();
        let host = ScriptedHost::new();
        let mut rec = record();

        for (i, target) in [2, 3, 4].into_iter().enumerate() {
            hit(&mut rec, &host, &config, &attack(target, 60_000 + i as u64 * 300));
        }
        assert_eq!(rec.attack.recent_targets.len(), 3);

        hit(&mut rec, &host, &config, &attack(5, 100));
        let kept: Vec<u64> = rec.attack.recent_targets.iter().map(|h| h.target.0).collect();
        assert_eq!(kept, vec![5]);
        assert_eq!(rec.attack.last_attack_ms, Some(100));

        // The window keeps sliding from the new clock.
        hit(&mut rec, &host, &config, &attack(6, 3_000));
        let kept: Vec<u64> = rec.attack.recent_targets.iter().map(|h| h.target.0).collect();
        assert_eq!(kept, vec![6]);
    }

    #[test]
    fn test_rapid_regular_attacks_escalate() {
        let config = DetectionConfig::default();
        let host = ScriptedHost::new();
        let mut rec = record();

        // 11 attacks, 10 intervals of 50 ms. No target positions: reach skipped.
        for i in 0..11 {
            hit(&mut rec, &host, &config, &attack(2, 1_000 + i * 50));
        }
        assert_eq!(rec.attack.intervals.len(), 10);
        assert_eq!(rec.levels.level(Check::KillAura), 1);
    }

    #[test]
    fn test_slow_attacks_not_buffered() {
        let config = DetectionConfig::default();
        let host = ScriptedHost::new();
        let mut rec = record();

        for i in 0..20 {
            hit(&mut rec, &host, &config, &attack(2, i * 500));
        }
        assert!(rec.attack.intervals.is_empty());
        assert_eq!(rec.levels.level(Check::KillAura), 0);
    }

    #[test]
    fn test_reach_boundary() {
        let mut config = DetectionConfig::default();
        config.action_thresholds.reach = 1;
        let host = ScriptedHost::new();
        let mut rec = record();

        host.set_position(EntityId(2), Vec3::new(3.2, 0.0, 0.0));
        assert!(hit(&mut rec, &host, &config, &attack(2, 0)).is_empty());
        assert_eq!(rec.levels.level(Check::Reach), 0);

        host.set_position(EntityId(2), Vec3::new(3.25, 0.0, 0.0));
        let out = hit(&mut rec, &host, &config, &attack(2, 1_000));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].category, crate::ViolationCategory::Reach);
        assert!(out[0].detail.contains("3.25"));
        assert!(out[0].detail.contains("max allowed: 3.20"));
    }

    #[test]
    fn test_reach_latency_and_creature_ceiling() {
        let config = DetectionConfig::default();
        let host = ScriptedHost::new();
        let mut rec = record();

        host.set_latency(ATTACKER, 200);
        host.set_position(EntityId(2), Vec3::new(3.25, 0.0, 0.0));
        // 3.2 + 0.2 * 0.5 = 3.3
        hit(&mut rec, &host, &config, &attack(2, 0));
        assert_eq!(rec.levels.level(Check::Reach), 0);

        host.set_latency(ATTACKER, 0);
        host.set_position(EntityId(3), Vec3::new(0.0, 0.0, 3.4));
        let mut creature = attack(3, 500);
        creature.target_kind = TargetKind::Creature;
        hit(&mut rec, &host, &config, &creature);
        assert_eq!(rec.levels.level(Check::Reach), 0);
    }

    #[test]
    fn test_direction_changes() {
        let targets = [
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(-1.0, 0.0, 0.0),
            Vec3::new(-1.0, 0.0, 0.1),
        ];
        assert_eq!(count_direction_changes(Vec3::ZERO, targets, 45.0), 2);
        assert_eq!(count_direction_changes(Vec3::ZERO, [Vec3::ZERO], 45.0), 0);
    }

    #[test]
    fn test_multi_angle_attacks_escalate() {
        let config = DetectionConfig::default();
        let host = ScriptedHost::new();
        let mut rec = record();

        host.set_position(EntityId(2), Vec3::new(2.0, 0.0, 0.0));
        host.set_position(EntityId(3), Vec3::new(0.0, 0.0, 2.0));
        host.set_position(EntityId(4), Vec3::new(-2.0, 0.0, 0.0));
        host.set_position(EntityId(9), Vec3::new(0.0, 0.0, -40.0));

        hit(&mut rec, &host, &config, &attack(2, 0));
        hit(&mut rec, &host, &config, &attack(3, 400));
        assert_eq!(rec.levels.level(Check::KillAura), 0);

        hit(&mut rec, &host, &config, &attack(4, 800));
        assert_eq!(rec.levels.level(Check::KillAura), 1);
    }

    #[test]
    fn test_recent_targets_window() {
        let config = DetectionConfig::default();
        let host = ScriptedHost::new();
        let mut rec = record();

        hit(&mut rec, &host, &config, &attack(2, 0));
        hit(&mut rec, &host, &config, &attack(3, 1_000));
        hit(&mut rec, &host, &config, &attack(4, 2_500));

        let targets: Vec<u64> =
            rec.attack.recent_targets.iter().map(|t| t.target.0).collect();
        assert_eq!(targets, vec![3, 4]);
    }
}
