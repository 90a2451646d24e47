//! ---
//! irri_section: "02-messaging-data-model"
//! irri_subsection: "module"
//! irri_type: "source"
//! irri_scope: "code"
//! irri_description: "Message schema and transport contracts."
//! irri_version: "v0.1.0-alpha"
//! irri_owner: "tbd"
//! ---
use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Latest known state of one irrigation valve.
///
/// One logical record per valve; the most recent report wins. Mutated only by
/// the telemetry ingestor (device reports) and the command dispatcher
/// (optimistic update pending device confirmation).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValveState {
    /// Valve number on the field controller, `1..=valve_count`.
    pub valve_number: u8,
    /// Whether the valve is currently irrigating.
    pub is_open: bool,
    /// When the state last changed, coordinator clock.
    pub changed_at: DateTime<Utc>,
    /// Device that reported (or was commanded into) this state.
    pub device_id: String,
}

/// One accepted weather-station reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReading {
    /// Air temperature in degrees Celsius.
    pub temperature: f64,
    /// Relative humidity in percent, `0..=100`.
    pub humidity: f64,
    /// Barometric pressure in hPa.
    #[serde(default)]
    pub pressure: Option<f64>,
    /// Wind speed in km/h.
    #[serde(default)]
    pub wind_speed: Option<f64>,
    /// Rainfall over the last hour in millimetres.
    #[serde(default)]
    pub rain_last_hour: f64,
    /// Solar radiation in W/m², absent on stations without the sensor.
    #[serde(default)]
    pub solar_radiation: Option<f64>,
    /// When the reading was recorded.
    pub timestamp: DateTime<Utc>,
    /// Station that produced the reading.
    pub device_id: String,
}

/// Action recorded on the irrigation audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IrrigationAction {
    /// A valve was commanded open.
    On,
    /// A valve (or every valve) was commanded closed.
    Off,
    /// A zone was opened by the smart-irrigation path.
    SmartOn,
}

/// Origin of a dispatched irrigation action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    /// Operator-initiated call.
    Manual,
    /// Registered recurring schedule.
    Schedule,
    /// Predictive model verdict.
    MlModel,
    /// Heuristic weather rule verdict.
    WeatherRule,
}

impl TriggerSource {
    /// Stable string form used on the wire `source` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerSource::Manual => "manual",
            TriggerSource::Schedule => "schedule",
            TriggerSource::MlModel => "ml_model",
            TriggerSource::WeatherRule => "weather_rule",
        }
    }
}

/// Weather conditions captured alongside an irrigation event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeatherContext {
    /// Air temperature at dispatch time, degrees Celsius.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Relative humidity at dispatch time, percent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,
    /// Rainfall over the last hour, millimetres.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rain_last_hour: Option<f64>,
    /// Soil moisture, percent, when a probe is fitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub soil_moisture: Option<f64>,
}

impl WeatherContext {
    /// Snapshot the relevant fields of a reading, if one is available.
    pub fn from_reading(reading: Option<&WeatherReading>) -> Self {
        match reading {
            Some(reading) => Self {
                temperature: Some(reading.temperature),
                humidity: Some(reading.humidity),
                rain_last_hour: Some(reading.rain_last_hour),
                soil_moisture: None,
            },
            None => Self::default(),
        }
    }
}

/// Immutable audit record of one dispatched irrigation action.
///
/// Created exclusively by the command dispatcher, append-only thereafter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrrigationEvent {
    /// Affected valve; `None` for zone-level or batched actions.
    #[serde(default)]
    pub valve_number: Option<u8>,
    /// Zone the action targeted, when zone-scoped.
    #[serde(default)]
    pub zone_id: Option<String>,
    /// What was dispatched.
    pub action: IrrigationAction,
    /// Requested run time, absent for off commands.
    #[serde(default)]
    pub duration_minutes: Option<u32>,
    /// Who or what asked for the action.
    pub triggered_by: TriggerSource,
    /// Model confidence, populated only for `ml_model` triggers.
    #[serde(default)]
    pub confidence: Option<f64>,
    /// Weather snapshot at dispatch time.
    #[serde(default)]
    pub context: WeatherContext,
    /// When the event was recorded.
    pub timestamp: DateTime<Utc>,
}

/// One-shot schedule registration forwarded to the field controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    /// Valve the schedule drives.
    pub valve_number: u8,
    /// Hour of day the controller should open the valve, `0..=23`.
    pub start_hour: u8,
    /// Minute within the hour, `0..=59`.
    pub start_minute: u8,
    /// Run time per firing.
    pub duration_minutes: u32,
    /// Weekdays the schedule fires on, `0..=6` with 0 = Sunday.
    pub days_of_week: BTreeSet<u8>,
    /// Inactive schedules are accepted but not forwarded.
    pub active: bool,
    /// Whether the controller should skip firing after recent rain.
    pub weather_dependent: bool,
}

/// Action verb carried on the outbound command topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandAction {
    /// Open one valve.
    ValveOn,
    /// Close one valve.
    ValveOff,
    /// Close every valve, emergency stop.
    ValveAllOff,
    /// Ask the station for an immediate weather reading.
    ReadWeatherNow,
    /// Register a recurring schedule with the controller.
    ScheduleIrrigation,
}

/// Outbound message published to `<namespace>/<device_id>/command`.
///
/// Delivery is at-most-once, fire-and-forget; the device confirms by
/// publishing a fresh status report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceCommand {
    /// Action verb.
    pub action: CommandAction,
    /// Target valve for single-valve actions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valve: Option<u8>,
    /// Run time in minutes for on/schedule actions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    /// Schedule start hour.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_hour: Option<u8>,
    /// Schedule start minute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_minute: Option<u8>,
    /// When the coordinator issued the command.
    pub timestamp: DateTime<Utc>,
    /// Free-form origin tag, e.g. `manual` or `scheduler`.
    pub source: String,
}

impl DeviceCommand {
    /// Open a single valve for `duration` minutes.
    pub fn valve_on(valve: u8, duration: Option<u32>, source: impl Into<String>) -> Self {
        Self {
            action: CommandAction::ValveOn,
            valve: Some(valve),
            duration,
            start_hour: None,
            start_minute: None,
            timestamp: Utc::now(),
            source: source.into(),
        }
    }

    /// Close a single valve.
    pub fn valve_off(valve: u8, source: impl Into<String>) -> Self {
        Self {
            action: CommandAction::ValveOff,
            valve: Some(valve),
            duration: None,
            start_hour: None,
            start_minute: None,
            timestamp: Utc::now(),
            source: source.into(),
        }
    }

    /// Close every valve on the controller.
    pub fn all_off(source: impl Into<String>) -> Self {
        Self {
            action: CommandAction::ValveAllOff,
            valve: None,
            duration: None,
            start_hour: None,
            start_minute: None,
            timestamp: Utc::now(),
            source: source.into(),
        }
    }

    /// Request an immediate weather-station reading.
    pub fn read_weather_now(source: impl Into<String>) -> Self {
        Self {
            action: CommandAction::ReadWeatherNow,
            valve: None,
            duration: None,
            start_hour: None,
            start_minute: None,
            timestamp: Utc::now(),
            source: source.into(),
        }
    }

    /// Forward a schedule registration to the controller.
    pub fn schedule(schedule: &Schedule, source: impl Into<String>) -> Self {
        Self {
            action: CommandAction::ScheduleIrrigation,
            valve: Some(schedule.valve_number),
            duration: Some(schedule.duration_minutes),
            start_hour: Some(schedule.start_hour),
            start_minute: Some(schedule.start_minute),
            timestamp: Utc::now(),
            source: source.into(),
        }
    }

    /// Serialise for the device channel.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Classification of frames pushed to live observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiveUpdateKind {
    /// Raw inbound device message relay.
    MqttUpdate,
    /// Smart-irrigation verdict.
    Decision,
    /// Outbound command echo.
    Command,
    /// Device-originated alert relay.
    Alert,
}

/// Frame pushed to every connected observer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveUpdate {
    /// Frame kind, serialised as `type` for the observer protocol.
    #[serde(rename = "type")]
    pub kind: LiveUpdateKind,
    /// Source topic, present on device-message relays.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    /// Frame payload.
    pub data: JsonValue,
}

impl LiveUpdate {
    /// Relay frame for an inbound device message.
    pub fn mqtt_update(topic: impl Into<String>, data: JsonValue) -> Self {
        Self {
            kind: LiveUpdateKind::MqttUpdate,
            topic: Some(topic.into()),
            data,
        }
    }

    /// Frame describing a smart-irrigation verdict.
    pub fn decision(data: JsonValue) -> Self {
        Self {
            kind: LiveUpdateKind::Decision,
            topic: None,
            data,
        }
    }

    /// Frame echoing an outbound command.
    pub fn command(data: JsonValue) -> Self {
        Self {
            kind: LiveUpdateKind::Command,
            topic: None,
            data,
        }
    }

    /// Frame relaying a device alert.
    pub fn alert(data: JsonValue) -> Self {
        Self {
            kind: LiveUpdateKind::Alert,
            topic: None,
            data,
        }
    }
}
