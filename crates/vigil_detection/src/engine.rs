//! # Detection Engine
//!
//! Glue between the host's event delivery and the detectors.
//!
//! ## Scheduling
//!
//! - Attacks are judged immediately, on the caller's thread.
//! - Positions are stashed; the next [`DetectionEngine::tick`] judges the
//!   newest one per entity.
//! - Mining and fall results are judged on every tick.
//!
//! Nothing here spawns threads, sleeps or waits. The host drives it all.
//!
//! ## Locking
//!
//! Each call locks exactly one record. `tick` snapshots the handle list,
//! releases the map lock, then visits records one at a time. Violations are
//! handed to the sink after the record lock is released.

use crate::config::DetectionConfig;
use crate::detectors::{combat, fall, flight, mining, speed, Context};
use crate::error::DetectionResult;
use crate::host::HostView;
use crate::record::{EntityRecord, Rotation};
use crate::sink::ViolationSink;
use crate::store::{EntityHandle, EntityStore};
use crate::violation::Violation;
use parking_lot::RwLock;
use std::sync::Arc;
use vigil_shared::{
    AttackSample, BlockMinedSample, EntityId, EntityJoined, EntityLeft, FallDamageSample,
    PositionSample, Telemetry, Teleported, TimestampMs,
};

/// Outcome of one tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Records visited.
    pub entities: usize,
    /// Position samples judged.
    pub positions_evaluated: usize,
    /// Violations emitted.
    pub violations: usize,
}

/// The violation-detection core.
pub struct DetectionEngine {
    store: EntityStore,
    config: RwLock<Arc<DetectionConfig>>,
    host: Arc<dyn HostView>,
    sink: Arc<dyn ViolationSink>,
}

impl DetectionEngine {
    /// Creates an engine.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` fails validation.
    pub fn new(
        config: DetectionConfig,
        host: Arc<dyn HostView>,
        sink: Arc<dyn ViolationSink>,
    ) -> DetectionResult<Self> {
        config.validate()?;
        Ok(Self {
            store: EntityStore::new(),
            config: RwLock::new(Arc::new(config)),
            host,
            sink,
        })
    }

    /// Current config snapshot.
    #[must_use]
    pub fn config(&self) -> Arc<DetectionConfig> {
        Arc::clone(&self.config.read())
    }

    /// Swaps in a new config. Evaluations already running keep the old one.
    ///
    /// # Errors
    ///
    /// Returns an error (and keeps the old config) if validation fails.
    pub fn update_config(&self, config: DetectionConfig) -> DetectionResult<()> {
        config.validate()?;
        *self.config.write() = Arc::new(config);
        tracing::debug!("Detection config replaced");
        Ok(())
    }

    /// The entity store.
    #[must_use]
    pub const fn store(&self) -> &EntityStore {
        &self.store
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// An entity joined.
    pub fn on_join(&self, event: &EntityJoined) {
        self.store.join(event.id, &event.display_name, event.position, event.time_ms);
        tracing::debug!("{} joined as {}", event.id, event.display_name);
    }

    /// An entity left. Its record is retired and forgotten.
    pub fn on_leave(&self, event: &EntityLeft) {
        if self.store.leave(event.id) {
            tracing::debug!("{} left", event.id);
        }
    }

    /// The host moved an entity discontinuously.
    pub fn on_teleport(&self, event: &Teleported) {
        let Some(handle) = self.tracked(event.id) else {
            return;
        };
        let mut record = handle.lock();
        if record.retired {
            return;
        }
        record.rebaseline(event.position, event.time_ms);
        record.last_teleport_ms = Some(event.time_ms);
        tracing::debug!("{} teleported, history re-baselined", event.id);
    }

    // ========================================================================
    // Telemetry
    // ========================================================================

    /// Stashes a position sample for the next tick.
    ///
    /// A sample stamped exactly at the newest known time is a duplicate and
    /// is dropped. A sample stamped earlier means the host clock stepped
    /// back: the record is re-baselined at that sample and detection resumes
    /// from the new clock.
    pub fn on_position(&self, sample: &PositionSample) {
        if !sample.position.is_finite() {
            tracing::trace!("{} non-finite position dropped", sample.id);
            return;
        }
        let Some(handle) = self.tracked(sample.id) else {
            return;
        };
        let mut record = handle.lock();
        if record.retired {
            return;
        }

        let newest = record
            .pending_sample
            .map(|s| s.time_ms)
            .or(record.last_evaluated_ms);
        match newest {
            Some(t) if sample.time_ms == t => {
                tracing::trace!("{} duplicate position sample at {}ms dropped", sample.id, t);
            }
            Some(t) if sample.time_ms < t => {
                tracing::debug!(
                    "{} clock stepped back from {}ms to {}ms, re-baselined",
                    sample.id,
                    t,
                    sample.time_ms
                );
                record.rewind(sample.position, sample.time_ms);
            }
            _ => record.pending_sample = Some(*sample),
        }
    }

    /// Judges an attack immediately.
    pub fn on_attack(&self, sample: &AttackSample) {
        let config = self.config();
        let Some(handle) = self.tracked(sample.id) else {
            return;
        };
        let mut out = Vec::new();
        {
            let mut record = handle.lock();
            if record.retired {
                return;
            }
            let ctx = Context {
                config: &config,
                flags: self.host.exemptions(sample.id),
                now: sample.time_ms,
            };
            let attacker = self
                .host
                .entity_position(sample.id)
                .or_else(|| record.last_known_position());
            combat::on_attack(&mut record, sample, attacker, self.host.as_ref(), &ctx, &mut out);
        }
        self.emit(out);
    }

    /// Tallies a mined block. Judged on the next tick.
    pub fn on_block_mined(&self, sample: &BlockMinedSample) {
        let config = self.config();
        let Some(handle) = self.tracked(sample.id) else {
            return;
        };
        let mut record = handle.lock();
        if !record.retired {
            mining::record_block(&mut record, sample, &config);
        }
    }

    /// Credits fall damage the host applied.
    pub fn on_fall_damage(&self, sample: &FallDamageSample) {
        let Some(handle) = self.tracked(sample.id) else {
            return;
        };
        let mut record = handle.lock();
        if !record.retired {
            fall::on_fall_damage(&mut record, sample);
        }
    }

    /// Routes one telemetry record to its handler.
    pub fn ingest(&self, event: &Telemetry) -> Option<TickReport> {
        match event {
            Telemetry::Joined(e) => self.on_join(e),
            Telemetry::Left(e) => self.on_leave(e),
            Telemetry::Position(e) => self.on_position(e),
            Telemetry::Teleported(e) => self.on_teleport(e),
            Telemetry::Attack(e) => self.on_attack(e),
            Telemetry::BlockMined(e) => self.on_block_mined(e),
            Telemetry::FallDamage(e) => self.on_fall_damage(e),
            Telemetry::Tick { time_ms } => return Some(self.tick(*time_ms)),
        }
        None
    }

    // ========================================================================
    // Tick
    // ========================================================================

    /// Runs the periodic detectors for every tracked entity.
    pub fn tick(&self, now: TimestampMs) -> TickReport {
        let config = self.config();
        let mut report = TickReport::default();

        for (_, handle) in self.store.handles() {
            let mut out = Vec::new();
            {
                let mut record = handle.lock();
                if record.retired {
                    continue;
                }
                report.entities += 1;
                if self.evaluate(&mut record, &config, now, &mut out) {
                    report.positions_evaluated += 1;
                }
            }
            report.violations += out.len();
            self.emit(out);
        }
        report
    }

    /// Periodic evaluation of one record. Returns whether a position sample
    /// was judged.
    fn evaluate(
        &self,
        record: &mut EntityRecord,
        config: &DetectionConfig,
        now: TimestampMs,
        out: &mut Vec<Violation>,
    ) -> bool {
        let flags = self.host.exemptions(record.id);

        let mut judged = false;
        if let Some(sample) = record.pending_sample.take() {
            let fresh = record.last_evaluated_ms.map_or(true, |t| sample.time_ms > t);
            if fresh {
                record.last_evaluated_ms = Some(sample.time_ms);
                let ctx = Context { config, flags, now: sample.time_ms };

                let transition = record.ground.observe(sample.on_ground, sample.time_ms);
                record.rotation = Rotation { yaw: sample.yaw, pitch: sample.pitch };

                speed::evaluate(record, &sample, &ctx, out);
                flight::evaluate(record, &sample, &ctx, out);
                fall::observe(record, &sample, transition, &ctx);
                judged = true;
            }
        }

        let ctx = Context { config, flags, now };
        fall::evaluate(record, &ctx, out);
        mining::evaluate(record, &ctx, out);
        judged
    }

    /// Handle for telemetry about `id`. `None` once the entity left.
    fn tracked(&self, id: EntityId) -> Option<EntityHandle> {
        let handle = self.store.get_or_create(id);
        if handle.is_none() {
            tracing::trace!("{} departed, telemetry dropped", id);
        }
        handle
    }

    fn emit(&self, violations: Vec<Violation>) {
        for violation in violations {
            if let Err(err) = self.sink.offer(violation) {
                tracing::warn!("Violation dropped: {}", err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::ScriptedHost;
    use crate::sink::CollectingSink;
    use crate::violation::{Check, ViolationCategory};
    use vigil_shared::constants::ATTACK_INTERVAL_CAPACITY;
    use vigil_shared::{BlockClass, ExemptionFlags, TargetKind, Vec3};

    fn engine() -> (DetectionEngine, Arc<ScriptedHost>, Arc<CollectingSink>) {
        let host = Arc::new(ScriptedHost::new());
        let sink = Arc::new(CollectingSink::new());
        let engine = DetectionEngine::new(
            DetectionConfig::default(),
            Arc::clone(&host) as Arc<dyn HostView>,
            Arc::clone(&sink) as Arc<dyn ViolationSink>,
        )
        .unwrap();
        (engine, host, sink)
    }

    fn position(id: u64, x: f64, t: u64) -> PositionSample {
        PositionSample {
            id: EntityId(id),
            position: Vec3::new(x, 64.0, 0.0),
            yaw: 0.0,
            pitch: 0.0,
            on_ground: true,
            vertical_velocity: None,
            time_ms: t,
        }
    }

    #[test]
    fn test_rejects_invalid_config() {
        let mut config = DetectionConfig::default();
        config.speed_tolerance = 0.5;
        let result = DetectionEngine::new(
            config,
            Arc::new(ScriptedHost::new()),
            Arc::new(CollectingSink::new()),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_entity_created_lazily() {
        let (engine, _, _) = engine();
        engine.on_position(&position(42, 0.0, 100));
        assert_eq!(engine.store().len(), 1);

        let report = engine.tick(100);
        assert_eq!(report.entities, 1);
        assert_eq!(report.positions_evaluated, 1);
    }

    fn join(engine: &DetectionEngine, id: u64) {
        engine.on_join(&EntityJoined {
            id: EntityId(id),
            display_name: format!("entity_{id}"),
            position: Vec3::new(0.0, 64.0, 0.0),
            time_ms: 0,
        });
    }

    fn attack(id: u64, t: u64) -> AttackSample {
        AttackSample { id: EntityId(id), target: EntityId(99), target_kind: TargetKind::Player, time_ms: t }
    }

    #[test]
    fn test_tick_judges_newest_sample_once() {
        let (engine, _, _) = engine();
        engine.on_position(&position(1, 0.0, 100));
        engine.on_position(&position(1, 1.0, 150));
        // Same timestamp again: duplicate, dropped.
        engine.on_position(&position(1, 0.5, 150));

        assert_eq!(engine.tick(150).positions_evaluated, 1);
        assert_eq!(engine.tick(200).positions_evaluated, 0);

        let handle = engine.store().handle(EntityId(1)).unwrap();
        let record = handle.lock();
        assert_eq!(record.last_evaluated_ms, Some(150));
        assert_eq!(record.last_known_position(), Some(Vec3::new(1.0, 64.0, 0.0)));
    }

    #[test]
    fn test_clock_step_back_rebaselines_and_keeps_judging() {
        let (engine, _, sink) = engine();
        join(&engine, 1);

        // A minute of walking well under the limit.
        for i in 1..=300_u64 {
            engine.on_position(&position(1, i as f64 * 0.8, i * 200));
            engine.tick(i * 200);
        }
        assert!(sink.is_empty());

        // Host restarts its clock at zero; the entity now runs at 40 u/s.
        let origin = 300.0 * 0.8;
        engine.on_position(&position(1, origin, 0));
        engine.tick(0);
        {
            let handle = engine.store().handle(EntityId(1)).unwrap();
            let record = handle.lock();
            assert_eq!(record.last_evaluated_ms, Some(0));
            assert_eq!(record.speed_baseline.map(|p| p.time_ms), Some(0));
            assert!(record.speed_samples.is_empty());
        }

        let mut judged = 0;
        for i in 1..=100_u64 {
            engine.on_position(&position(1, origin + i as f64 * 8.0, i * 200));
            judged += engine.tick(i * 200).positions_evaluated;
        }

        assert_eq!(judged, 100);
        let flagged = sink.take();
        assert!(!flagged.is_empty());
        assert!(flagged.iter().all(|v| v.category == ViolationCategory::Speed));
        assert!(flagged.iter().all(|v| v.time_ms <= 20_000));

        let handle = engine.store().handle(EntityId(1)).unwrap();
        assert_eq!(handle.lock().last_evaluated_ms, Some(20_000));
    }

    #[test]
    fn test_leave_drops_state() {
        let (engine, _, _) = engine();
        engine.on_join(&EntityJoined {
            id: EntityId(1),
            display_name: "alice".to_owned(),
            position: Vec3::ZERO,
            time_ms: 0,
        });
        let handle = engine.store().handle(EntityId(1)).unwrap();

        engine.on_leave(&EntityLeft { id: EntityId(1) });

        assert!(engine.store().is_empty());
        assert!(handle.lock().retired);
        assert_eq!(engine.tick(100).entities, 0);
    }

    #[test]
    fn test_telemetry_after_leave_touches_nothing() {
        let (engine, _, sink) = engine();
        join(&engine, 1);
        let handle = engine.store().handle(EntityId(1)).unwrap();
        let before = handle.lock().levels;

        engine.on_leave(&EntityLeft { id: EntityId(1) });

        engine.on_position(&position(1, 500.0, 100));
        engine.on_attack(&attack(1, 120));
        engine.on_block_mined(&BlockMinedSample {
            id: EntityId(1),
            block_id: "minecraft:diamond_ore".to_owned(),
            class: BlockClass::RareOre,
            time_ms: 130,
        });
        engine.on_fall_damage(&FallDamageSample { id: EntityId(1), amount: 4.0, time_ms: 140 });
        engine.on_teleport(&Teleported {
            id: EntityId(1),
            position: Vec3::new(1_000.0, 64.0, 0.0),
            time_ms: 150,
        });
        let report = engine.tick(200);

        assert_eq!(report, TickReport::default());
        assert!(sink.is_empty());
        assert!(engine.store().is_empty());
        assert!(engine.store().handle(EntityId(1)).is_none());

        let record = handle.lock();
        assert!(record.retired);
        assert!(record.pending_sample.is_none());
        assert_eq!(record.last_evaluated_ms, Some(0));
        assert!(record.last_teleport_ms.is_none());
        assert!(record.attack.last_attack_ms.is_none());
        assert!(record.attack.recent_targets.is_empty());
        assert_eq!(record.mining.rare, 0);
        assert!(record.fall.unclaimed_damage.abs() < f64::EPSILON);
        assert_eq!(record.levels, before);
    }

    #[test]
    fn test_rejoin_after_leave_tracks_again() {
        let (engine, _, _) = engine();
        for cycle in 0..1_000_u64 {
            join(&engine, 1);
            engine.on_leave(&EntityLeft { id: EntityId(1) });
            engine.on_attack(&attack(1, cycle));
        }
        assert!(engine.store().is_empty());

        join(&engine, 1);
        engine.on_position(&position(1, 1.0, 100));
        assert_eq!(engine.tick(100).positions_evaluated, 1);
        assert_eq!(engine.store().len(), 1);
    }

    #[test]
    fn test_concurrent_attacks_and_ticks_on_one_entity() {
        let (engine, _, _) = engine();
        join(&engine, 1);
        let attacks = 200_u64;
        let steps = 200_u64;

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for i in 1..=attacks {
                    engine.on_attack(&attack(1, i * 50));
                }
            });
            scope.spawn(|| {
                for i in 1..=steps {
                    engine.on_position(&position(1, i as f64 * 0.5, i * 100));
                    engine.tick(i * 100);
                }
            });
        });
        engine.tick(steps * 100 + 50);

        let handle = engine.store().handle(EntityId(1)).unwrap();
        let record = handle.lock();
        assert_eq!(record.attack.last_attack_ms, Some(attacks * 50));
        assert_eq!(
            record.attack.intervals.len(),
            (attacks as usize - 1).min(ATTACK_INTERVAL_CAPACITY)
        );
        assert!(record.attack.intervals.iter().all(|&ms| (ms - 50.0).abs() < f64::EPSILON));
        assert_eq!(record.last_evaluated_ms, Some(steps * 100));
        assert!(record.pending_sample.is_none());
    }

    #[test]
    fn test_attack_reach_uses_host_positions() {
        let (engine, host, sink) = engine();
        let mut config = DetectionConfig::default();
        config.action_thresholds.reach = 1;
        engine.update_config(config).unwrap();

        host.set_position(EntityId(1), Vec3::ZERO);
        host.set_position(EntityId(2), Vec3::new(0.0, 0.0, 4.0));
        engine.on_attack(&AttackSample {
            id: EntityId(1),
            target: EntityId(2),
            target_kind: TargetKind::Player,
            time_ms: 10,
        });

        let emitted = sink.take();
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].category, ViolationCategory::Reach);
    }

    #[test]
    fn test_exempt_entity_never_flags() {
        let (engine, host, sink) = engine();
        host.set_flags(
            EntityId(1),
            ExemptionFlags { in_creative_or_spectator: true, ..Default::default() },
        );

        for i in 0..40_u64 {
            engine.on_position(&position(1, i as f64 * 20.0, i * 100));
            engine.tick(i * 100);
        }

        assert!(sink.is_empty());
        assert_eq!(engine.store().levels(EntityId(1)).unwrap().level(Check::Speed), 0);
    }

    #[test]
    fn test_teleport_rebaselines_without_violation() {
        let (engine, _, sink) = engine();
        for i in 0..10_u64 {
            engine.on_position(&position(1, i as f64, i * 200));
            engine.tick(i * 200);
        }
        engine.on_teleport(&Teleported {
            id: EntityId(1),
            position: Vec3::new(5_000.0, 64.0, 0.0),
            time_ms: 2_000,
        });
        engine.on_position(&position(1, 5_001.0, 2_200));
        engine.tick(2_200);

        assert!(sink.is_empty());
        let handle = engine.store().handle(EntityId(1)).unwrap();
        let record = handle.lock();
        assert_eq!(record.speed_samples.len(), 1);
        assert!((record.speed_samples.mean().unwrap() - 5.0).abs() < 1e-9);
    }
}
