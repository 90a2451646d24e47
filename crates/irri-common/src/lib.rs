//! ---
//! irri_section: "01-shared-runtime"
//! irri_subsection: "module"
//! irri_type: "source"
//! irri_scope: "code"
//! irri_description: "Shared primitives and utilities for the coordination runtime."
//! irri_version: "v0.1.0-alpha"
//! irri_owner: "tbd"
//! ---
//! Shared primitives for the Irricore coordination workspace.
//! This crate exposes configuration loading and the tracing bootstrap
//! consumed by every other workspace member.

pub mod config;
pub mod logging;

pub use config::{
    AppConfig, ArchiveConfig, FarmConfig, LoadedAppConfig, MqttConfig, ObserverConfig,
    SchedulerConfig, ZoneConfig,
};
pub use logging::{init_tracing, LogFormat, LoggingConfig};
