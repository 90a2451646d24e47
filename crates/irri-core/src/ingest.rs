//! ---
//! irri_section: "06-coordination-engine"
//! irri_subsection: "module"
//! irri_type: "source"
//! irri_scope: "code"
//! irri_description: "Primary coordination engine and lifecycle management."
//! irri_version: "v0.1.0-alpha"
//! irri_owner: "tbd"
//! ---
use std::sync::Arc;

use chrono::Utc;
use irri_msg::{
    AlertReport, DecodeError, LiveUpdate, StatusReport, TelemetrySink, Topic, TopicKind,
    ValveState, WeatherReport,
};
use irri_state::StateStore;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::notify::LiveNotifier;

/// Decodes inbound device traffic and routes it into the engine.
///
/// Runs on the transport task: every path through [`on_message`] is bounded
/// (in-memory writes, queued persistence, non-blocking broadcast) and every
/// failure is absorbed rather than raised into the transport loop.
///
/// [`on_message`]: TelemetrySink::on_message
pub struct TelemetryIngestor {
    state: Arc<StateStore>,
    notifier: Arc<LiveNotifier>,
}

impl TelemetryIngestor {
    /// Build an ingestor writing into `state` and notifying `notifier`.
    pub fn new(state: Arc<StateStore>, notifier: Arc<LiveNotifier>) -> Self {
        Self { state, notifier }
    }

    fn route(&self, topic: &Topic, value: &JsonValue) -> Result<(), DecodeError> {
        match topic.kind {
            TopicKind::Status => self.apply_status(value),
            TopicKind::Weather => self.apply_weather(value),
            TopicKind::Alerts => self.handle_alert(topic, value),
            // The command channel is outbound-only; an echo is not telemetry.
            TopicKind::Command => {
                debug!(topic = %topic, "ignoring message on command topic");
                Ok(())
            }
        }
    }

    fn apply_status(&self, value: &JsonValue) -> Result<(), DecodeError> {
        let report: StatusReport = serde_json::from_value(value.clone())?;
        let changed_at = Utc::now();
        for valve in &report.valves {
            // Latest-wins, overwritten unconditionally. Out-of-order delivery
            // is not detected here; see the design notes.
            self.state.put_valve_state(ValveState {
                valve_number: valve.number,
                is_open: valve.state.is_open(),
                changed_at,
                device_id: report.device_id.clone(),
            });
        }
        debug!(device = %report.device_id, valves = report.valves.len(), "status report applied");
        Ok(())
    }

    fn apply_weather(&self, value: &JsonValue) -> Result<(), DecodeError> {
        let report: WeatherReport = serde_json::from_value(value.clone())?;
        if let Err(err) = report.validate() {
            // Rejected readings are logged, never stored; the live relay
            // below still goes out.
            warn!(device = %report.device_id, error = %err, "weather reading rejected");
            return Ok(());
        }
        self.state.put_weather(report.into_reading(Utc::now()));
        Ok(())
    }

    fn handle_alert(&self, topic: &Topic, value: &JsonValue) -> Result<(), DecodeError> {
        let report: AlertReport = serde_json::from_value(value.clone())?;
        // Advisory only: alerts never actuate valves.
        warn!(
            device = %report.device_id,
            alert_type = %report.alert_type,
            valve = report.valve,
            message = report.message.as_deref().unwrap_or(""),
            topic = %topic,
            "device alert received"
        );
        self.notifier.broadcast(LiveUpdate::alert(value.clone()));
        Ok(())
    }
}

impl TelemetrySink for TelemetryIngestor {
    fn on_message(&self, topic: &str, payload: &[u8]) {
        let parsed = match Topic::parse(topic) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(topic, error = %err, "dropping message on unrecognised topic");
                return;
            }
        };
        let value: JsonValue = match serde_json::from_slice(payload) {
            Ok(value) => value,
            Err(err) => {
                warn!(topic, error = %err, "dropping undecodable payload");
                return;
            }
        };

        if let Err(err) = self.route(&parsed, &value) {
            warn!(topic, error = %err, "dropping message with unexpected shape");
            return;
        }

        // Best-effort and unconditional after processing: observers hear
        // about the message even when persistence or validation rejected it.
        self.notifier
            .broadcast(LiveUpdate::mqtt_update(topic, value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use irri_msg::LiveUpdateKind;
    use irri_persistence::MemoryArchive;
    use serde_json::json;

    fn fixture() -> (Arc<StateStore>, Arc<LiveNotifier>, TelemetryIngestor) {
        let state = Arc::new(StateStore::new(Arc::new(MemoryArchive::new())));
        let notifier = Arc::new(LiveNotifier::new(16));
        let ingestor = TelemetryIngestor::new(state.clone(), notifier.clone());
        (state, notifier, ingestor)
    }

    #[tokio::test]
    async fn status_report_updates_cache_and_notifies() {
        let (state, notifier, ingestor) = fixture();
        let mut observer = notifier.register();

        ingestor.on_message(
            "irricore/d1/status",
            json!({
                "device_id": "d1",
                "valves": [{"number": 3, "state": "ON"}]
            })
            .to_string()
            .as_bytes(),
        );

        let cached = state.get_latest_valve_state(3).unwrap();
        assert!(cached.is_open);
        assert_eq!(cached.device_id, "d1");

        let frame = observer.recv().await.unwrap();
        assert_eq!(frame.kind, LiveUpdateKind::MqttUpdate);
        assert!(frame.topic.unwrap().contains("status"));
    }

    #[tokio::test]
    async fn batched_status_updates_every_valve() {
        let (state, _notifier, ingestor) = fixture();
        ingestor.on_message(
            "irricore/d1/status",
            json!({
                "device_id": "d1",
                "valves": [
                    {"number": 1, "state": "ON"},
                    {"number": 2, "state": "OFF"},
                    {"number": 3, "state": "ON"}
                ]
            })
            .to_string()
            .as_bytes(),
        );
        assert!(state.get_latest_valve_state(1).unwrap().is_open);
        assert!(!state.get_latest_valve_state(2).unwrap().is_open);
        assert!(state.get_latest_valve_state(3).unwrap().is_open);
    }

    #[tokio::test]
    async fn malformed_payload_is_dropped_silently() {
        let (state, notifier, ingestor) = fixture();
        let mut observer = notifier.register();

        ingestor.on_message("irricore/d1/status", b"not json at all");
        ingestor.on_message("irricore/d1/status", b"{\"valves\": \"wrong shape\"}");

        assert!(state.get_latest_valve_state(1).is_none());
        // Nothing was broadcast for either dropped message.
        ingestor.on_message(
            "irricore/d1/weather",
            json!({"device_id": "ws1", "temperature": 20.0, "humidity": 50.0})
                .to_string()
                .as_bytes(),
        );
        let frame = observer.recv().await.unwrap();
        assert!(frame.topic.unwrap().contains("weather"));
    }

    #[tokio::test]
    async fn rejected_weather_is_not_stored_but_still_relayed() {
        let (state, notifier, ingestor) = fixture();
        let mut observer = notifier.register();

        ingestor.on_message(
            "irricore/ws1/weather",
            json!({"device_id": "ws1", "temperature": 20.0, "humidity": 140.0})
                .to_string()
                .as_bytes(),
        );

        assert!(state.get_latest_weather().is_none());
        let frame = observer.recv().await.unwrap();
        assert_eq!(frame.kind, LiveUpdateKind::MqttUpdate);
    }

    #[tokio::test]
    async fn alerts_are_advisory_and_never_touch_valve_state() {
        let (state, notifier, ingestor) = fixture();
        let mut observer = notifier.register();

        ingestor.on_message(
            "irricore/d1/alerts",
            json!({"device_id": "d1", "alert_type": "overcurrent", "valve": 4})
                .to_string()
                .as_bytes(),
        );

        assert!(state.get_latest_valve_state(4).is_none());
        let first = observer.recv().await.unwrap();
        assert_eq!(first.kind, LiveUpdateKind::Alert);
        let second = observer.recv().await.unwrap();
        assert_eq!(second.kind, LiveUpdateKind::MqttUpdate);
    }

    #[tokio::test]
    async fn unknown_topic_kind_is_dropped() {
        let (_state, notifier, ingestor) = fixture();
        let mut observer = notifier.register();
        ingestor.on_message("irricore/d1/firmware", b"{}");
        assert_eq!(notifier.broadcast(LiveUpdate::mqtt_update("t", json!(1))), 1);
        let frame = observer.recv().await.unwrap();
        assert_eq!(frame.topic.as_deref(), Some("t"));
    }
}
