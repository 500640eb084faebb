//! # Mining Ratio Detector
//!
//! Someone who can see through walls digs straight to ore. Their rare-ore to
//! filler ratio ends up far above what blind tunnelling produces.
//!
//! Blocks are tallied as they arrive; the ratio is judged on the tick, and
//! only when new blocks came in since the last judgement. An idle miner's
//! level therefore holds instead of decaying every tick.

use super::{decay, escalate, Context};
use crate::config::DetectionConfig;
use crate::record::EntityRecord;
use crate::violation::{Check, Violation};
use vigil_shared::{BlockClass, BlockMinedSample};

/// Tallies a mined block.
///
/// Blocks the host left as [`BlockClass::Other`] are classified with the
/// configured [`BlockClassifier`](crate::config::BlockClassifier).
pub fn record_block(record: &mut EntityRecord, sample: &BlockMinedSample, config: &DetectionConfig) {
    let class = match sample.class {
        BlockClass::Other => config.block_classifier.classify(&sample.block_id),
        class => class,
    };
    record.mining.record(&sample.block_id, class);
}

/// Judges the ratio if new blocks arrived.
#[allow(clippy::cast_precision_loss)]
pub fn evaluate(record: &mut EntityRecord, ctx: &Context<'_>, out: &mut Vec<Violation>) {
    if !std::mem::take(&mut record.mining.dirty) || ctx.flags.interaction_exempt() {
        return;
    }

    let config = ctx.config;
    let rare = record.mining.rare;
    let common = record.mining.common;
    if rare == 0 || common <= config.xray_min_common_blocks {
        return;
    }

    let ratio = rare as f64 / common as f64;
    let threshold = config.xray_ratio_threshold;
    if ratio > threshold {
        escalate(
            record,
            Check::Xray,
            ctx,
            ratio,
            || {
                format!(
                    "Rare/common ratio: {ratio:.4} (threshold: {threshold:.4}), rare: {rare}, common: {common}"
                )
            },
            out,
        );
    } else {
        decay(record, Check::Xray, ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{ctx, record};
    use super::*;
    use vigil_shared::EntityId;

    fn mine(rec: &mut EntityRecord, config: &DetectionConfig, block: &str, count: usize) {
        for _ in 0..count {
            let sample = BlockMinedSample {
                id: EntityId(1),
                block_id: block.to_owned(),
                class: BlockClass::Other,
                time_ms: 0,
            };
            record_block(rec, &sample, config);
        }
    }

    #[test]
    fn test_small_sample_not_evaluated() {
        let config = DetectionConfig::default();
        let mut rec = record();
        mine(&mut rec, &config, "minecraft:diamond_ore", 1);
        mine(&mut rec, &config, "minecraft:stone", 15);

        let mut out = Vec::new();
        evaluate(&mut rec, &ctx(&config, 1_000), &mut out);

        assert!(out.is_empty());
        assert_eq!(rec.levels.level(Check::Xray), 0);
        assert!(!rec.mining.dirty);
    }

    #[test]
    fn test_high_ratio_escalates() {
        let mut config = DetectionConfig::default();
        config.action_thresholds.xray = 1;
        let mut rec = record();
        mine(&mut rec, &config, "minecraft:diamond_ore", 2);
        mine(&mut rec, &config, "minecraft:stone", 21);

        let mut out = Vec::new();
        evaluate(&mut rec, &ctx(&config, 1_000), &mut out);

        assert_eq!(out.len(), 1);
        assert!((out[0].metric - 2.0 / 21.0).abs() < 1e-12);
        assert_eq!(
            out[0].detail,
            "Rare/common ratio: 0.0952 (threshold: 0.0500), rare: 2, common: 21"
        );
    }

    #[test]
    fn test_only_new_blocks_trigger_evaluation() {
        let config = DetectionConfig::default();
        let mut rec = record();
        mine(&mut rec, &config, "minecraft:diamond_ore", 2);
        mine(&mut rec, &config, "minecraft:stone", 21);

        let mut out = Vec::new();
        for t in 0..10 {
            evaluate(&mut rec, &ctx(&config, t * 50), &mut out);
        }
        assert_eq!(rec.levels.level(Check::Xray), 1);

        mine(&mut rec, &config, "minecraft:stone", 1);
        evaluate(&mut rec, &ctx(&config, 600), &mut out);
        assert_eq!(rec.levels.level(Check::Xray), 2);
    }

    #[test]
    fn test_normal_ratio_decays() {
        let config = DetectionConfig::default();
        let mut rec = record();
        rec.levels.counter_mut(Check::Xray).escalate(0, 10);
        mine(&mut rec, &config, "minecraft:diamond_ore", 1);
        mine(&mut rec, &config, "minecraft:deepslate", 100);

        evaluate(&mut rec, &ctx(&config, 20_000), &mut Vec::new());
        assert_eq!(rec.levels.level(Check::Xray), 0);
    }
}
