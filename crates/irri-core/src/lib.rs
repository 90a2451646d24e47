//! ---
//! irri_section: "06-coordination-engine"
//! irri_subsection: "module"
//! irri_type: "source"
//! irri_scope: "code"
//! irri_description: "Primary coordination engine and lifecycle management."
//! irri_version: "v0.1.0-alpha"
//! irri_owner: "tbd"
//! ---
#![warn(missing_docs)]

//! The real-time coordination engine.
//!
//! Ties telemetry ingestion, the latest-state cache, decision making,
//! command dispatch and live observer notification into one pipeline:
//!
//! ```text
//! device messages -> ingestor -> state store -> live notifier
//! scheduler / api -> dispatcher -> device commands + event log -> notifier
//! ```
//!
//! Every component takes its collaborators as explicit constructor
//! dependencies; the [`coordinator`] owns wiring and shutdown.

pub mod coordinator;
pub mod dispatch;
pub mod ingest;
pub mod notify;
pub mod scheduler;

pub use coordinator::{CoordinationEngine, EngineHandle};
pub use dispatch::{CommandAck, CommandDispatcher, DispatchError};
pub use ingest::TelemetryIngestor;
pub use notify::{LiveNotifier, ObserverHandle};
pub use scheduler::{Scheduler, SchedulerHandle};
