//! ---
//! irri_section: "02-messaging-data-model"
//! irri_subsection: "module"
//! irri_type: "source"
//! irri_scope: "code"
//! irri_description: "Message schema and transport contracts."
//! irri_version: "v0.1.0-alpha"
//! irri_owner: "tbd"
//! ---
#![warn(missing_docs)]

//! Wire schema for the Irricore device channel and live observer channel,
//! plus the transport contracts the coordination engine is wired against.

pub mod telemetry;
pub mod topic;
pub mod transport;
pub mod types;

/// Shared result type for decode operations.
pub type Result<T> = std::result::Result<T, DecodeError>;

/// Errors raised while decoding inbound device traffic.
///
/// Decode failures are terminal for the offending message: the ingestion
/// layer logs them and drops the payload, it never retries and never lets
/// them escape into the transport callback.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Payload was not valid JSON or did not match the expected shape.
    #[error("malformed payload: {0}")]
    Json(#[from] serde_json::Error),
    /// Topic string did not match `<namespace>/<device_id>/<kind>`.
    #[error("malformed topic {0:?}")]
    Topic(String),
    /// Topic suffix named a kind this coordinator does not consume.
    #[error("unrecognised topic kind {0:?}")]
    UnknownKind(String),
    /// A numeric field violated its documented physical range.
    #[error("field {field} out of range: {value}")]
    OutOfRange {
        /// Offending field name.
        field: &'static str,
        /// Rejected value.
        value: f64,
    },
}

pub use telemetry::{AlertReport, StatusReport, ValveReport, ValveSignal, WeatherReport};
pub use topic::{Topic, TopicKind};
pub use transport::{CommandPublisher, InMemoryPublisher, PublishError, TelemetrySink};
pub use types::{
    CommandAction, DeviceCommand, IrrigationAction, IrrigationEvent, LiveUpdate, LiveUpdateKind,
    Schedule, TriggerSource, ValveState, WeatherContext, WeatherReading,
};
