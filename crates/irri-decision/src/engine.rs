//! ---
//! irri_section: "04-decision-engine"
//! irri_subsection: "module"
//! irri_type: "source"
//! irri_scope: "code"
//! irri_description: "Pure irrigation decision logic."
//! irri_version: "v0.1.0-alpha"
//! irri_owner: "tbd"
//! ---
use std::collections::BTreeSet;

use irri_common::ZoneConfig;
use irri_msg::{IrrigationEvent, WeatherReading};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::Predictor;

/// Feature defaults substituted when no weather reading is available.
pub const DEFAULT_TEMPERATURE: f64 = 25.0;
/// Humidity default, percent.
pub const DEFAULT_HUMIDITY: f64 = 60.0;
/// Rainfall default, millimetres over the last hour.
pub const DEFAULT_RAIN: f64 = 0.0;

/// Rainfall above this vetoes irrigation outright, millimetres.
pub const RAIN_VETO_MM: f64 = 5.0;
/// Ambient humidity above this vetoes irrigation, percent.
pub const HUMIDITY_VETO_PCT: f64 = 70.0;
/// Water-stress trigger: temperature above this, Celsius...
pub const STRESS_TEMPERATURE_C: f64 = 30.0;
/// ...combined with humidity below this, percent.
pub const STRESS_HUMIDITY_PCT: f64 = 40.0;

/// Run time for a model-driven irrigation, minutes.
pub const MODEL_DURATION_MIN: u32 = 30;
/// Run time for a water-stress irrigation, minutes.
pub const STRESS_DURATION_MIN: u32 = 25;
/// Default valve subset opened by the water-stress rule.
pub const STRESS_VALVES: [u8; 2] = [1, 2];
/// Confidence reported for every heuristic verdict.
pub const HEURISTIC_CONFIDENCE: f64 = 0.7;

/// Verdict of the decision engine.
///
/// Transient: never persisted directly, summarized into an
/// [`IrrigationEvent`] by the command dispatcher when acted upon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Whether irrigation should run now.
    pub should_irrigate: bool,
    /// Verdict confidence, `0.0..=1.0`.
    pub confidence: f64,
    /// Human-readable rule or model tag; empty when no rule fired.
    pub reason: String,
    /// Valves to open when irrigating; empty otherwise.
    pub valves_to_open: BTreeSet<u8>,
    /// Run time in minutes for the opened valves.
    pub duration_minutes: u32,
}

impl Decision {
    fn hold(reason: &str) -> Self {
        Self {
            should_irrigate: false,
            confidence: HEURISTIC_CONFIDENCE,
            reason: reason.to_owned(),
            valves_to_open: BTreeSet::new(),
            duration_minutes: 0,
        }
    }
}

/// Build the fixed-order feature vector consumed by the predictor.
///
/// Order is part of the model contract: `[temperature, humidity,
/// rain_last_hour]`, with documented defaults when no reading exists.
pub fn feature_vector(weather: Option<&WeatherReading>) -> [f64; 3] {
    match weather {
        Some(reading) => [
            reading.temperature,
            reading.humidity,
            reading.rain_last_hour,
        ],
        None => [DEFAULT_TEMPERATURE, DEFAULT_HUMIDITY, DEFAULT_RAIN],
    }
}

/// Compute an irrigation verdict for one zone.
///
/// Uses the predictive model when one is supplied and healthy; otherwise
/// evaluates the heuristic rule chain in documented precedence order. With
/// no weather reading and no model, no rule fires and the engine never
/// irrigates blind.
pub fn decide(
    weather: Option<&WeatherReading>,
    // TODO: fold irrigation recency into the rule chain once per-zone event
    // history is reliably populated by the archive.
    _last_event: Option<&IrrigationEvent>,
    model: Option<&dyn Predictor>,
    zone: &ZoneConfig,
) -> Decision {
    if let Some(model) = model {
        let features = feature_vector(weather);
        match model.predict(&features) {
            Ok(prediction) => {
                let should_irrigate = prediction.label == 1;
                return Decision {
                    should_irrigate,
                    confidence: prediction.confidence.clamp(0.0, 1.0),
                    reason: "ml_prediction".to_owned(),
                    valves_to_open: if should_irrigate {
                        zone.valves.clone()
                    } else {
                        BTreeSet::new()
                    },
                    duration_minutes: MODEL_DURATION_MIN,
                };
            }
            Err(err) => {
                debug!(error = %err, "predictor unavailable; falling back to heuristic rules");
            }
        }
    }

    let Some(weather) = weather else {
        return Decision::hold("");
    };

    if weather.rain_last_hour > RAIN_VETO_MM {
        return Decision::hold("recent rainfall detected");
    }
    if weather.humidity > HUMIDITY_VETO_PCT {
        return Decision::hold("ambient humidity high");
    }
    if weather.temperature > STRESS_TEMPERATURE_C && weather.humidity < STRESS_HUMIDITY_PCT {
        return Decision {
            should_irrigate: true,
            confidence: HEURISTIC_CONFIDENCE,
            reason: "water-stress conditions".to_owned(),
            valves_to_open: STRESS_VALVES.into_iter().collect(),
            duration_minutes: STRESS_DURATION_MIN,
        };
    }
    Decision::hold("")
}
