//! # Replay Harness
//!
//! Feeds a fixed, timestamped event sequence through a fresh engine and
//! collects what it emits. No threads, no sleeping, no wall clock: the same
//! scenario always yields the same violations.
//!
//! ## Scenario Format
//!
//! ```toml
//! name = "hover"
//!
//! [[events]]
//! kind = "joined"
//! id = 1
//! display_name = "alice"
//! position = { x = 0.0, y = 64.0, z = 0.0 }
//! time_ms = 0
//!
//! [[events]]
//! kind = "set_flags"
//! id = 1
//! flags = { is_sprinting = true }
//!
//! [[events]]
//! kind = "tick"
//! time_ms = 50
//! ```
//!
//! Telemetry events use the same `kind` tags as [`Telemetry`]; `set_flags`,
//! `set_latency` and `set_position` script the host's answers.

pub mod scenarios;

use crate::config::DetectionConfig;
use crate::engine::DetectionEngine;
use crate::error::{DetectionError, DetectionResult};
use crate::host::{HostView, ScriptedHost};
use crate::sink::{CollectingSink, ViolationSink};
use crate::store::EntitySummary;
use crate::violation::Violation;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use vigil_shared::{EntityId, ExemptionFlags, Telemetry, Vec3};

/// Host-side scripting inside a scenario.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HostAction {
    /// Replace an entity's exemption flags.
    SetFlags {
        /// Entity.
        id: EntityId,
        /// New flags.
        #[serde(default)]
        flags: ExemptionFlags,
    },
    /// Set an entity's latency.
    SetLatency {
        /// Entity.
        id: EntityId,
        /// Round-trip latency.
        latency_ms: u32,
    },
    /// Place an entity the core does not track (attack targets).
    SetPosition {
        /// Entity.
        id: EntityId,
        /// Position.
        position: Vec3,
    },
}

/// One step of a scenario.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScenarioEvent {
    /// Host scripting.
    Host(HostAction),
    /// Telemetry delivered to the engine.
    Telemetry(Telemetry),
}

impl From<Telemetry> for ScenarioEvent {
    fn from(event: Telemetry) -> Self {
        Self::Telemetry(event)
    }
}

impl From<HostAction> for ScenarioEvent {
    fn from(action: HostAction) -> Self {
        Self::Host(action)
    }
}

/// A named, ordered event sequence.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Name shown in reports.
    pub name: String,
    /// What the scenario exercises.
    #[serde(default)]
    pub description: String,
    /// Config override for this scenario.
    #[serde(default)]
    pub config: Option<DetectionConfig>,
    /// Events, in delivery order.
    #[serde(default)]
    pub events: Vec<ScenarioEvent>,
}

impl Scenario {
    /// Parses a scenario document.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or the config override is
    /// invalid.
    pub fn from_toml_str(text: &str) -> DetectionResult<Self> {
        let scenario: Self = toml::from_str(text)?;
        if let Some(config) = &scenario.config {
            config.validate()?;
        }
        Ok(scenario)
    }

    /// Reads and parses a scenario file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> DetectionResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Builds a built-in scenario. `seed` drives its jitter.
    ///
    /// # Errors
    ///
    /// [`DetectionError::UnknownScenario`] for a name not in
    /// [`scenarios::BUILTIN_NAMES`].
    pub fn builtin(name: &str, seed: u64) -> DetectionResult<Self> {
        scenarios::build(name, seed).ok_or_else(|| DetectionError::UnknownScenario(name.to_owned()))
    }
}

/// What a replay produced.
#[derive(Clone, Debug, PartialEq)]
pub struct ReplayOutcome {
    /// Scenario name.
    pub scenario: String,
    /// Violations, in emission order.
    pub violations: Vec<Violation>,
    /// Events delivered.
    pub events: usize,
    /// Ticks run.
    pub ticks: usize,
    /// Final levels of every entity still tracked.
    pub summaries: Vec<EntitySummary>,
}

/// Runs scenarios against fresh engines.
#[derive(Clone, Debug, Default)]
pub struct ReplayHarness {
    config: DetectionConfig,
}

impl ReplayHarness {
    /// Creates a harness. Scenarios without their own config use `config`.
    #[must_use]
    pub fn new(config: DetectionConfig) -> Self {
        Self { config }
    }

    /// Replays a scenario from a clean state.
    ///
    /// # Errors
    ///
    /// Returns an error if the effective config is invalid.
    pub fn run(&self, scenario: &Scenario) -> DetectionResult<ReplayOutcome> {
        let config = scenario.config.clone().unwrap_or_else(|| self.config.clone());
        let host = Arc::new(ScriptedHost::new());
        let sink = Arc::new(CollectingSink::new());
        let engine = DetectionEngine::new(
            config,
            Arc::clone(&host) as Arc<dyn HostView>,
            Arc::clone(&sink) as Arc<dyn ViolationSink>,
        )?;

        tracing::info!("Replaying '{}' ({} events)", scenario.name, scenario.events.len());

        let mut ticks = 0;
        for event in &scenario.events {
            match event {
                ScenarioEvent::Host(action) => apply(&host, action),
                ScenarioEvent::Telemetry(telemetry) => {
                    mirror(&host, telemetry);
                    if engine.ingest(telemetry).is_some() {
                        ticks += 1;
                    }
                }
            }
        }

        let summaries = engine
            .store()
            .handles()
            .iter()
            .filter_map(|(id, _)| engine.store().summary(*id))
            .collect();

        Ok(ReplayOutcome {
            scenario: scenario.name.clone(),
            violations: sink.take(),
            events: scenario.events.len(),
            ticks,
            summaries,
        })
    }
}

fn apply(host: &ScriptedHost, action: &HostAction) {
    match action {
        HostAction::SetFlags { id, flags } => host.set_flags(*id, *flags),
        HostAction::SetLatency { id, latency_ms } => host.set_latency(*id, *latency_ms),
        HostAction::SetPosition { id, position } => host.set_position(*id, *position),
    }
}

/// Keeps the scripted host's view of positions in step with the telemetry,
/// as a live host's would be.
fn mirror(host: &ScriptedHost, event: &Telemetry) {
    match event {
        Telemetry::Joined(e) => host.set_position(e.id, e.position),
        Telemetry::Position(e) => host.set_position(e.id, e.position),
        Telemetry::Teleported(e) => host.set_position(e.id, e.position),
        Telemetry::Left(e) => host.remove(e.id),
        Telemetry::Attack(_)
        | Telemetry::BlockMined(_)
        | Telemetry::FallDamage(_)
        | Telemetry::Tick { .. } => {}
    }
}
