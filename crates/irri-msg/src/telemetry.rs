//! ---
//! irri_section: "02-messaging-data-model"
//! irri_subsection: "module"
//! irri_type: "source"
//! irri_scope: "code"
//! irri_description: "Message schema and transport contracts."
//! irri_version: "v0.1.0-alpha"
//! irri_owner: "tbd"
//! ---
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::WeatherReading;
use crate::DecodeError;

fn default_device_id() -> String {
    "unknown".to_owned()
}

/// On/off signal as reported by the field controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ValveSignal {
    /// Valve reported open.
    On,
    /// Valve reported closed.
    Off,
}

impl ValveSignal {
    /// Whether the signal means the valve is irrigating.
    pub fn is_open(&self) -> bool {
        matches!(self, ValveSignal::On)
    }
}

/// One valve entry inside a status report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValveReport {
    /// Valve number on the controller.
    pub number: u8,
    /// Reported signal.
    pub state: ValveSignal,
}

/// Inbound payload on `<namespace>/<device_id>/status`.
///
/// A single report may batch the state of several valves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    /// Reporting device; controllers omit it on some firmware revisions.
    #[serde(default = "default_device_id")]
    pub device_id: String,
    /// Batched valve states.
    #[serde(default)]
    pub valves: Vec<ValveReport>,
}

/// Inbound payload on `<namespace>/<device_id>/weather`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReport {
    /// Reporting station.
    #[serde(default = "default_device_id")]
    pub device_id: String,
    /// Air temperature, degrees Celsius.
    pub temperature: f64,
    /// Relative humidity, percent.
    pub humidity: f64,
    /// Barometric pressure, hPa.
    #[serde(default)]
    pub pressure: Option<f64>,
    /// Wind speed, km/h.
    #[serde(default)]
    pub wind_speed: Option<f64>,
    /// Rainfall over the last hour, millimetres.
    #[serde(default)]
    pub rain_last_hour: f64,
    /// Solar radiation, W/m².
    #[serde(default)]
    pub solar_radiation: Option<f64>,
    /// Station-reported timestamp; the ingestion clock is used when absent.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl WeatherReport {
    /// Check the documented physical ranges.
    ///
    /// Humidity must lie within `[0, 100]`; rain and the optional gauge
    /// fields must be non-negative. Violations are rejected at ingestion:
    /// logged, never stored.
    pub fn validate(&self) -> Result<(), DecodeError> {
        if !(0.0..=100.0).contains(&self.humidity) {
            return Err(DecodeError::OutOfRange {
                field: "humidity",
                value: self.humidity,
            });
        }
        if self.rain_last_hour < 0.0 {
            return Err(DecodeError::OutOfRange {
                field: "rain_last_hour",
                value: self.rain_last_hour,
            });
        }
        for (field, value) in [
            ("pressure", self.pressure),
            ("wind_speed", self.wind_speed),
            ("solar_radiation", self.solar_radiation),
        ] {
            if let Some(value) = value {
                if value < 0.0 {
                    return Err(DecodeError::OutOfRange { field, value });
                }
            }
        }
        Ok(())
    }

    /// Convert into the canonical reading, stamping `received_at` when the
    /// station did not report its own clock.
    pub fn into_reading(self, received_at: DateTime<Utc>) -> WeatherReading {
        WeatherReading {
            temperature: self.temperature,
            humidity: self.humidity,
            pressure: self.pressure,
            wind_speed: self.wind_speed,
            rain_last_hour: self.rain_last_hour,
            solar_radiation: self.solar_radiation,
            timestamp: self.timestamp.unwrap_or(received_at),
            device_id: self.device_id,
        }
    }
}

/// Inbound payload on `<namespace>/<device_id>/alerts`.
///
/// Alerts are advisory: they are logged and relayed to observers, they never
/// actuate valves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertReport {
    /// Device raising the alert.
    #[serde(default = "default_device_id")]
    pub device_id: String,
    /// Controller-defined alert class, e.g. `overcurrent` or `low_battery`.
    pub alert_type: String,
    /// Affected valve, when the alert is valve-scoped.
    #[serde(default)]
    pub valve: Option<u8>,
    /// Free-form detail from the controller.
    #[serde(default)]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_report_batches_valves() {
        let report: StatusReport = serde_json::from_value(json!({
            "device_id": "d1",
            "valves": [
                {"number": 3, "state": "ON"},
                {"number": 4, "state": "OFF"}
            ]
        }))
        .unwrap();
        assert_eq!(report.valves.len(), 2);
        assert!(report.valves[0].state.is_open());
        assert!(!report.valves[1].state.is_open());
    }

    #[test]
    fn missing_device_id_defaults_to_unknown() {
        let report: StatusReport = serde_json::from_value(json!({
            "valves": [{"number": 1, "state": "ON"}]
        }))
        .unwrap();
        assert_eq!(report.device_id, "unknown");
    }

    #[test]
    fn humidity_outside_range_is_rejected() {
        let report: WeatherReport = serde_json::from_value(json!({
            "device_id": "ws1",
            "temperature": 22.0,
            "humidity": 104.0
        }))
        .unwrap();
        assert!(matches!(
            report.validate(),
            Err(DecodeError::OutOfRange { field: "humidity", .. })
        ));
    }

    #[test]
    fn negative_rain_is_rejected() {
        let report: WeatherReport = serde_json::from_value(json!({
            "temperature": 22.0,
            "humidity": 55.0,
            "rain_last_hour": -1.5
        }))
        .unwrap();
        assert!(matches!(
            report.validate(),
            Err(DecodeError::OutOfRange { field: "rain_last_hour", .. })
        ));
    }

    #[test]
    fn reading_takes_ingestion_clock_when_station_clock_absent() {
        let report: WeatherReport = serde_json::from_value(json!({
            "device_id": "ws1",
            "temperature": 22.0,
            "humidity": 55.0
        }))
        .unwrap();
        let received_at = Utc::now();
        let reading = report.into_reading(received_at);
        assert_eq!(reading.timestamp, received_at);
        assert_eq!(reading.rain_last_hour, 0.0);
    }
}
