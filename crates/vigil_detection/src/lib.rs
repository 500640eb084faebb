//! # VIGIL Detection
//!
//! Real-time violation detection for a live multiplayer simulation.
//!
//! ## Architecture
//!
//! ```text
//!  host telemetry ──► DetectionEngine ──► EntityStore ──► EntityRecord (per-entity lock)
//!                          │                                   │
//!                          │ tick / attack                     ▼
//!                          └──────────────────────────► detectors::{speed, flight,
//!                                                        combat, mining, fall}
//!                                                               │ escalate / decay
//!                                                               ▼
//!                                                        ViolationCounter
//!                                                               │ flag
//!                                                               ▼
//!                                                        ViolationSink
//! ```
//!
//! ## Rules
//!
//! - The detection path never blocks and never fails. Bad input is skipped.
//! - Every buffer in a record is bounded.
//! - One state machine for every check: see [`violation`].
//! - Same telemetry in, same violations out: see [`replay`].

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod detectors;
pub mod engine;
pub mod error;
pub mod host;
pub mod record;
pub mod replay;
pub mod sink;
pub mod store;
pub mod violation;

pub use config::{ActionThresholds, BlockClassifier, DetectionConfig};
pub use engine::{DetectionEngine, TickReport};
pub use error::{DetectionError, DetectionResult, SinkError};
pub use host::{HostView, ScriptedHost};
pub use record::EntityRecord;
pub use replay::{ReplayHarness, ReplayOutcome, Scenario, ScenarioEvent};
pub use sink::{ChannelSink, CollectingSink, TracingSink, ViolationLog, ViolationSink};
pub use store::{EntityHandle, EntityStore, EntitySummary};
pub use violation::{Check, Violation, ViolationCategory, ViolationCounter, ViolationLevels};
