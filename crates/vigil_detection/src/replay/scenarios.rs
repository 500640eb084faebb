//! Built-in scenarios.
//!
//! Each one pairs an offender with, where it makes sense, a control entity
//! doing the same thing legitimately. Jitter comes from a seeded ChaCha
//! stream, so a given `(name, seed)` always builds the same events.

use super::{HostAction, Scenario, ScenarioEvent};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use vigil_shared::{
    AttackSample, BlockClass, BlockMinedSample, EntityId, EntityJoined, ExemptionFlags,
    FallDamageSample, PositionSample, TargetKind, Telemetry, Teleported, TimestampMs, Vec3,
};

/// Names accepted by [`Scenario::builtin`].
pub const BUILTIN_NAMES: [&str; 5] =
    ["speed_burst", "flight_hover", "kill_aura_burst", "xray_strip_mine", "no_fall_drop"];

pub(super) fn build(name: &str, seed: u64) -> Option<Scenario> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let scenario = match name {
        "speed_burst" => speed_burst(&mut rng),
        "flight_hover" => flight_hover(&mut rng),
        "kill_aura_burst" => kill_aura_burst(&mut rng),
        "xray_strip_mine" => xray_strip_mine(&mut rng),
        "no_fall_drop" => no_fall_drop(&mut rng),
        _ => return None,
    };
    Some(scenario)
}

// =============================================================================
// EVENT BUILDER
// =============================================================================

#[derive(Default)]
struct Script {
    events: Vec<ScenarioEvent>,
}

impl Script {
    fn join(&mut self, id: u64, name: &str, position: Vec3, time_ms: TimestampMs) {
        self.push(Telemetry::Joined(EntityJoined {
            id: EntityId(id),
            display_name: name.to_owned(),
            position,
            time_ms,
        }));
    }

    fn position(&mut self, id: u64, position: Vec3, on_ground: bool, time_ms: TimestampMs) {
        self.push(Telemetry::Position(PositionSample {
            id: EntityId(id),
            position,
            yaw: 0.0,
            pitch: 0.0,
            on_ground,
            vertical_velocity: None,
            time_ms,
        }));
    }

    fn tick(&mut self, time_ms: TimestampMs) {
        self.push(Telemetry::Tick { time_ms });
    }

    fn push(&mut self, event: impl Into<ScenarioEvent>) {
        self.events.push(event.into());
    }

    fn finish(self, name: &str, description: &str) -> Scenario {
        Scenario {
            name: name.to_owned(),
            description: description.to_owned(),
            config: None,
            events: self.events,
        }
    }
}

// =============================================================================
// SCENARIOS
// =============================================================================

/// Steady 6 u/s, then a 30-35 u/s burst, at 200 ms samples.
fn speed_burst(rng: &mut ChaCha8Rng) -> Scenario {
    const SPRINTER: u64 = 1;
    let mut script = Script::default();
    let mut pos = Vec3::new(0.0, 64.0, 0.0);
    let mut t = 0;

    script.join(SPRINTER, "sprinter", pos, t);
    for i in 0..25 {
        let speed = if i < 10 {
            6.0 + rng.gen_range(-0.1..0.1)
        } else {
            rng.gen_range(30.0..35.0)
        };
        t += 200;
        pos.x += speed * 0.2;
        pos.z += rng.gen_range(-0.01..0.01);
        script.position(SPRINTER, pos, true, t);
        script.tick(t);
    }
    script.finish("speed_burst", "Baseline walking followed by a sustained speed burst")
}

/// Jump, climb, then hover for seconds. A permitted flyer does the same.
fn flight_hover(rng: &mut ChaCha8Rng) -> Scenario {
    const HOVERER: u64 = 2;
    const PERMITTED: u64 = 7;
    let mut script = Script::default();

    script.join(HOVERER, "hoverer", Vec3::new(0.0, 64.0, 0.0), 0);
    script.join(PERMITTED, "builder", Vec3::new(50.0, 64.0, 0.0), 0);
    script.push(HostAction::SetFlags {
        id: EntityId(PERMITTED),
        flags: ExemptionFlags { has_flight_permission: true, ..ExemptionFlags::default() },
    });

    for step in 1..=60_u32 {
        let t = TimestampMs::from(step) * 100;
        // Climb 4 units over the first half second, then hold.
        let climb = (f64::from(step) * 0.8).min(4.0);
        let wobble = rng.gen_range(-0.01..0.01);
        script.position(HOVERER, Vec3::new(0.0, 64.0 + climb + wobble, 0.0), false, t);
        script.position(PERMITTED, Vec3::new(50.0, 64.0 + climb + wobble, 0.0), false, t);
        script.tick(t);
    }
    script.finish("flight_hover", "Sustained hovering with and without flight permission")
}

/// Machine-regular 50 ms attacks spread around the attacker, then hits from
/// beyond reach.
fn kill_aura_burst(rng: &mut ChaCha8Rng) -> Scenario {
    const ATTACKER: u64 = 3;
    const FAR_TARGET: u64 = 13;
    let mut script = Script::default();
    let origin = Vec3::new(0.0, 64.0, 0.0);

    script.join(ATTACKER, "aura", origin, 0);
    let ring = [
        (10, Vec3::new(2.5, 64.0, 0.0)),
        (11, Vec3::new(0.0, 64.0, 2.5)),
        (12, Vec3::new(-2.5, 64.0, 0.0)),
    ];
    for (id, position) in ring {
        script.push(HostAction::SetPosition { id: EntityId(id), position });
    }
    script.push(HostAction::SetPosition {
        id: EntityId(FAR_TARGET),
        position: Vec3::new(0.0, 64.0, -4.2),
    });

    let mut t: TimestampMs = 1_000;
    for i in 0..40 {
        t += rng.gen_range(48..=52);
        let (target, _) = ring[i % ring.len()];
        script.push(Telemetry::Attack(AttackSample {
            id: EntityId(ATTACKER),
            target: EntityId(target),
            target_kind: TargetKind::Player,
            time_ms: t,
        }));
        if i % 4 == 0 {
            script.tick(t);
        }
    }

    for _ in 0..6 {
        t += 600;
        script.push(Telemetry::Attack(AttackSample {
            id: EntityId(ATTACKER),
            target: EntityId(FAR_TARGET),
            target_kind: TargetKind::Player,
            time_ms: t,
        }));
        script.tick(t);
    }
    script.finish("kill_aura_burst", "Scripted attack rhythm, multi-angle hits and long reach")
}

/// Digging straight to ore: far too many diamonds per stone.
fn xray_strip_mine(rng: &mut ChaCha8Rng) -> Scenario {
    const MINER: u64 = 4;
    let mut script = Script::default();
    script.join(MINER, "miner", Vec3::new(0.0, 12.0, 0.0), 0);

    let mut t = 0;
    for i in 0..60 {
        t += 250;
        let rare = i % 6 == 5 || rng.gen_bool(0.05);
        let (block_id, class) = if rare {
            ("minecraft:diamond_ore", BlockClass::RareOre)
        } else {
            ("minecraft:stone", BlockClass::Common)
        };
        script.push(Telemetry::BlockMined(BlockMinedSample {
            id: EntityId(MINER),
            block_id: block_id.to_owned(),
            class,
            time_ms: t,
        }));
        script.tick(t);
    }
    script.finish("xray_strip_mine", "Ore-to-stone ratio far above blind tunnelling")
}

/// Repeated 20-unit drops. The offender never takes damage; the control
/// entity does.
fn no_fall_drop(rng: &mut ChaCha8Rng) -> Scenario {
    const OFFENDER: u64 = 5;
    const CONTROL: u64 = 6;
    const TOP: f64 = 100.0;
    const FLOOR: f64 = 80.0;
    let mut script = Script::default();

    script.join(OFFENDER, "feather", Vec3::new(0.0, TOP, 0.0), 0);
    script.join(CONTROL, "honest", Vec3::new(20.0, TOP, 0.0), 0);

    let mut t: TimestampMs = 0;
    for _ in 0..6 {
        t += 100;
        for (id, x) in [(OFFENDER, 0.0), (CONTROL, 20.0)] {
            script.push(Telemetry::Teleported(Teleported {
                id: EntityId(id),
                position: Vec3::new(x, TOP, 0.0),
                time_ms: t,
            }));
        }
        t += 50;
        script.position(OFFENDER, Vec3::new(0.0, TOP, 0.0), true, t);
        script.position(CONTROL, Vec3::new(20.0, TOP, 0.0), true, t);
        script.tick(t);

        let mut y = TOP;
        while y > FLOOR {
            t += 50;
            y = (y - rng.gen_range(0.9..1.1)).max(FLOOR);
            let landed = y <= FLOOR;
            script.position(OFFENDER, Vec3::new(0.0, y, 0.0), landed, t);
            script.position(CONTROL, Vec3::new(20.0, y, 0.0), landed, t);
            script.tick(t);
        }
        script.push(Telemetry::FallDamage(FallDamageSample {
            id: EntityId(CONTROL),
            amount: TOP - FLOOR - 3.0,
            time_ms: t + 10,
        }));

        for _ in 0..12 {
            t += 50;
            script.tick(t);
        }
    }
    script.finish("no_fall_drop", "Landings from 20 units with and without fall damage")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_events() {
        for name in BUILTIN_NAMES {
            assert_eq!(build(name, 9), build(name, 9), "{name}");
        }
        assert_ne!(build("speed_burst", 1), build("speed_burst", 2));
        assert!(build("nope", 1).is_none());
    }
}
