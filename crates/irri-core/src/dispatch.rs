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

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use irri_common::{FarmConfig, ZoneConfig};
use irri_decision::{decide, Decision, Predictor};
use irri_msg::{
    CommandAction, DeviceCommand, IrrigationAction, IrrigationEvent, LiveUpdate, PublishError,
    Schedule, TriggerSource, ValveState, WeatherContext,
};
use irri_persistence::{Archive, RecordKind};
use irri_state::StateStore;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::notify::LiveNotifier;

/// Errors surfaced synchronously to dispatch callers.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Caller-supplied valve number outside the configured range.
    ///
    /// Raised before any side effect: no message is published and no event
    /// is recorded.
    #[error("valve {valve} outside configured range 1..={max}")]
    Validation {
        /// Rejected valve number.
        valve: u8,
        /// Highest valid valve number.
        max: u8,
    },
    /// Caller-supplied schedule field outside its documented range.
    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),
    /// Caller referenced a zone missing from the configuration.
    #[error("unknown zone {0:?}")]
    UnknownZone(String),
    /// The device channel rejected or timed out the publish.
    #[error("device channel publish failed: {0}")]
    Transport(#[from] PublishError),
    /// Command could not be serialised for the wire.
    #[error("command encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Acknowledgement returned for fire-and-forget commands.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandAck {
    /// Action that was published.
    pub action: CommandAction,
    /// Target valve for single-valve actions.
    pub valve: Option<u8>,
    /// When the command left the coordinator.
    pub issued_at: DateTime<Utc>,
}

/// Translates decisions and manual requests into outbound device commands.
///
/// Owns the only write path onto the irrigation audit trail: every
/// state-changing dispatch appends exactly one [`IrrigationEvent`], and only
/// after the publish attempt succeeded.
pub struct CommandDispatcher {
    publisher: Arc<dyn irri_msg::CommandPublisher>,
    archive: Arc<dyn Archive>,
    state: Arc<StateStore>,
    notifier: Arc<LiveNotifier>,
    model: Option<Arc<dyn Predictor>>,
    farm: FarmConfig,
    zones: IndexMap<String, ZoneConfig>,
}

impl CommandDispatcher {
    /// Build a dispatcher around its injected collaborators.
    pub fn new(
        publisher: Arc<dyn irri_msg::CommandPublisher>,
        archive: Arc<dyn Archive>,
        state: Arc<StateStore>,
        notifier: Arc<LiveNotifier>,
        model: Option<Arc<dyn Predictor>>,
        farm: FarmConfig,
        zones: IndexMap<String, ZoneConfig>,
    ) -> Self {
        Self {
            publisher,
            archive,
            state,
            notifier,
            model,
            farm,
            zones,
        }
    }

    /// Zone ids known to this dispatcher, in configuration order.
    pub fn zone_ids(&self) -> Vec<String> {
        self.zones.keys().cloned().collect()
    }

    fn check_valve(&self, valve: u8) -> Result<(), DispatchError> {
        if valve == 0 || valve > self.farm.valve_count {
            return Err(DispatchError::Validation {
                valve,
                max: self.farm.valve_count,
            });
        }
        Ok(())
    }

    async fn publish(&self, command: &DeviceCommand) -> Result<(), DispatchError> {
        let topic = self.farm.command_topic();
        let payload = command.encode()?;
        self.publisher.publish(&topic, &payload).await?;
        debug!(
            topic = %topic,
            action = ?command.action,
            valve = command.valve,
            transport = self.publisher.name(),
            "device command published"
        );
        self.notifier
            .broadcast(LiveUpdate::command(serde_json::to_value(command)?));
        Ok(())
    }

    /// Append to the audit trail; archive failures are logged, never fatal.
    fn record_event(&self, event: IrrigationEvent) {
        let key = event
            .zone_id
            .clone()
            .or_else(|| event.valve_number.map(|valve| format!("valve-{valve}")))
            .unwrap_or_else(|| "all".to_owned());
        match serde_json::to_value(&event) {
            Ok(payload) => {
                if let Err(err) = self
                    .archive
                    .append(RecordKind::IrrigationEvent, &key, payload)
                {
                    warn!(key = %key, error = %err, "irrigation event append failed");
                }
            }
            Err(err) => warn!(error = %err, "irrigation event serialization failed"),
        }
    }

    fn optimistic_valve_update(&self, valve: u8, is_open: bool, changed_at: DateTime<Utc>) {
        // Local update pending device confirmation; the next status report
        // from the field controller overwrites it either way.
        self.state.put_valve_state(ValveState {
            valve_number: valve,
            is_open,
            changed_at,
            device_id: self.farm.device_id.clone(),
        });
    }

    fn last_zone_event(&self, zone_id: &str) -> Option<IrrigationEvent> {
        match self.archive.latest(RecordKind::IrrigationEvent, zone_id) {
            Ok(record) => {
                record.and_then(|record| serde_json::from_value(record.payload).ok())
            }
            Err(err) => {
                warn!(zone = zone_id, error = %err, "zone history lookup failed");
                None
            }
        }
    }

    /// Turn one valve on or off on behalf of an operator.
    pub async fn issue_manual_command(
        &self,
        valve: u8,
        turn_on: bool,
        duration_minutes: Option<u32>,
    ) -> Result<CommandAck, DispatchError> {
        self.check_valve(valve)?;

        let command = if turn_on {
            DeviceCommand::valve_on(valve, duration_minutes, TriggerSource::Manual.as_str())
        } else {
            DeviceCommand::valve_off(valve, TriggerSource::Manual.as_str())
        };
        self.publish(&command).await?;

        self.optimistic_valve_update(valve, turn_on, command.timestamp);
        self.record_event(IrrigationEvent {
            valve_number: Some(valve),
            zone_id: None,
            action: if turn_on {
                IrrigationAction::On
            } else {
                IrrigationAction::Off
            },
            duration_minutes: if turn_on { duration_minutes } else { None },
            triggered_by: TriggerSource::Manual,
            confidence: None,
            context: WeatherContext::from_reading(self.state.get_latest_weather().as_ref()),
            timestamp: command.timestamp,
        });
        info!(valve, turn_on, "manual valve command dispatched");

        Ok(CommandAck {
            action: command.action,
            valve: Some(valve),
            issued_at: command.timestamp,
        })
    }

    /// Evaluate smart irrigation for a zone and dispatch the verdict.
    ///
    /// The decision is computed from the current weather, the zone's last
    /// irrigation event and the optional predictive model, then published
    /// valve by valve when positive. The verdict is broadcast to observers
    /// either way.
    pub async fn issue_smart_command(&self, zone_id: &str) -> Result<Decision, DispatchError> {
        let zone = self
            .zones
            .get(zone_id)
            .ok_or_else(|| DispatchError::UnknownZone(zone_id.to_owned()))?;

        let weather = self.state.get_latest_weather();
        let last_event = self.last_zone_event(zone_id);
        let decision = decide(
            weather.as_ref(),
            last_event.as_ref(),
            self.model.as_deref(),
            zone,
        );

        if decision.should_irrigate {
            // Fail fast on the whole valve set before the first publish.
            for valve in &decision.valves_to_open {
                self.check_valve(*valve)?;
            }

            let triggered_by = if decision.reason == "ml_prediction" {
                TriggerSource::MlModel
            } else {
                TriggerSource::WeatherRule
            };
            let issued_at = Utc::now();
            for valve in &decision.valves_to_open {
                let command = DeviceCommand::valve_on(
                    *valve,
                    Some(decision.duration_minutes),
                    triggered_by.as_str(),
                );
                self.publish(&command).await?;
                self.optimistic_valve_update(*valve, true, issued_at);
            }

            self.record_event(IrrigationEvent {
                valve_number: None,
                zone_id: Some(zone_id.to_owned()),
                action: IrrigationAction::SmartOn,
                duration_minutes: Some(decision.duration_minutes),
                triggered_by,
                confidence: matches!(triggered_by, TriggerSource::MlModel)
                    .then_some(decision.confidence),
                context: WeatherContext::from_reading(weather.as_ref()),
                timestamp: issued_at,
            });
            info!(
                zone = zone_id,
                valves = decision.valves_to_open.len(),
                duration = decision.duration_minutes,
                reason = %decision.reason,
                "smart irrigation dispatched"
            );
        } else {
            debug!(zone = zone_id, reason = %decision.reason, "smart irrigation held");
        }

        self.notifier.broadcast(LiveUpdate::decision(json!({
            "zone_id": zone_id,
            "should_irrigate": decision.should_irrigate,
            "confidence": decision.confidence,
            "reason": decision.reason,
            "valves": decision.valves_to_open,
            "duration_minutes": decision.duration_minutes,
        })));

        Ok(decision)
    }

    /// Emergency stop: close every valve on the controller.
    pub async fn all_valves_off(&self) -> Result<CommandAck, DispatchError> {
        let command = DeviceCommand::all_off(TriggerSource::Manual.as_str());
        self.publish(&command).await?;

        for valve in self.state.open_valves() {
            self.optimistic_valve_update(valve, false, command.timestamp);
        }
        self.record_event(IrrigationEvent {
            valve_number: None,
            zone_id: None,
            action: IrrigationAction::Off,
            duration_minutes: None,
            triggered_by: TriggerSource::Manual,
            confidence: None,
            context: WeatherContext::from_reading(self.state.get_latest_weather().as_ref()),
            timestamp: command.timestamp,
        });
        info!("all-valves-off dispatched");

        Ok(CommandAck {
            action: command.action,
            valve: None,
            issued_at: command.timestamp,
        })
    }

    /// Forward a schedule registration to the field controller.
    ///
    /// Registration does not change valve state, so no irrigation event is
    /// recorded; inactive schedules are accepted without being forwarded.
    pub async fn register_schedule(&self, schedule: &Schedule) -> Result<CommandAck, DispatchError> {
        self.check_valve(schedule.valve_number)?;
        if schedule.start_hour > 23 {
            return Err(DispatchError::InvalidSchedule(format!(
                "start_hour {} outside 0..=23",
                schedule.start_hour
            )));
        }
        if schedule.start_minute > 59 {
            return Err(DispatchError::InvalidSchedule(format!(
                "start_minute {} outside 0..=59",
                schedule.start_minute
            )));
        }
        if let Some(day) = schedule.days_of_week.iter().find(|day| **day > 6) {
            return Err(DispatchError::InvalidSchedule(format!(
                "day_of_week {day} outside 0..=6"
            )));
        }

        let command = DeviceCommand::schedule(schedule, TriggerSource::Schedule.as_str());
        if schedule.active {
            self.publish(&command).await?;
            info!(valve = schedule.valve_number, "schedule registered with controller");
        } else {
            debug!(valve = schedule.valve_number, "inactive schedule accepted, not forwarded");
        }

        Ok(CommandAck {
            action: command.action,
            valve: Some(schedule.valve_number),
            issued_at: command.timestamp,
        })
    }

    /// Ask the weather station for an immediate reading.
    pub async fn request_weather_reading(&self) -> Result<(), DispatchError> {
        let command = DeviceCommand::read_weather_now("scheduler");
        self.publish(&command).await?;
        debug!("weather poll command dispatched");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use irri_msg::{InMemoryPublisher, WeatherReading};
    use irri_persistence::MemoryArchive;

    struct Fixture {
        publisher: InMemoryPublisher,
        archive: Arc<MemoryArchive>,
        state: Arc<StateStore>,
        notifier: Arc<LiveNotifier>,
    }

    fn zone(valves: &[u8]) -> ZoneConfig {
        ZoneConfig {
            valves: valves.iter().copied().collect(),
            crop_type: "soy".to_owned(),
            area_hectares: 2.0,
        }
    }

    fn fixture() -> (Fixture, CommandDispatcher) {
        fixture_with_model(None)
    }

    fn fixture_with_model(model: Option<Arc<dyn Predictor>>) -> (Fixture, CommandDispatcher) {
        let publisher = InMemoryPublisher::new();
        let archive = Arc::new(MemoryArchive::new());
        let state = Arc::new(StateStore::new(archive.clone() as Arc<dyn Archive>));
        let notifier = Arc::new(LiveNotifier::new(16));
        let mut zones = IndexMap::new();
        zones.insert("north".to_owned(), zone(&[1, 2]));
        zones.insert("south".to_owned(), zone(&[3, 4]));
        let dispatcher = CommandDispatcher::new(
            Arc::new(publisher.clone()),
            archive.clone(),
            state.clone(),
            notifier.clone(),
            model,
            FarmConfig::default(),
            zones,
        );
        (
            Fixture {
                publisher,
                archive,
                state,
                notifier,
            },
            dispatcher,
        )
    }

    fn weather(temperature: f64, humidity: f64, rain: f64) -> WeatherReading {
        WeatherReading {
            temperature,
            humidity,
            pressure: None,
            wind_speed: None,
            rain_last_hour: rain,
            solar_radiation: None,
            timestamp: Utc::now(),
            device_id: "ws1".to_owned(),
        }
    }

    fn decoded_commands(publisher: &InMemoryPublisher) -> Vec<DeviceCommand> {
        publisher
            .sent()
            .iter()
            .map(|(_, payload)| serde_json::from_slice(payload).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn out_of_range_valves_fail_fast_with_no_side_effects() {
        let (fx, dispatcher) = fixture();
        for valve in [0u8, 11] {
            let err = dispatcher
                .issue_manual_command(valve, true, Some(10))
                .await
                .unwrap_err();
            assert!(matches!(err, DispatchError::Validation { max: 10, .. }));
        }
        assert!(fx.publisher.sent().is_empty());
        assert!(fx.archive.records_of(RecordKind::IrrigationEvent).is_empty());
    }

    #[tokio::test]
    async fn manual_on_publishes_updates_state_and_records_one_event() {
        let (fx, dispatcher) = fixture();
        let ack = dispatcher
            .issue_manual_command(5, true, Some(15))
            .await
            .unwrap();
        assert_eq!(ack.action, CommandAction::ValveOn);

        let commands = decoded_commands(&fx.publisher);
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].valve, Some(5));
        assert_eq!(commands[0].duration, Some(15));
        assert_eq!(commands[0].source, "manual");
        assert_eq!(
            fx.publisher.sent()[0].0,
            "irricore/field-controller-01/command"
        );

        // Optimistic update is visible before any device confirmation.
        assert!(fx.state.get_latest_valve_state(5).unwrap().is_open);

        let events = fx.archive.records_of(RecordKind::IrrigationEvent);
        assert_eq!(events.len(), 1);
        let event: IrrigationEvent = serde_json::from_value(events[0].payload.clone()).unwrap();
        assert_eq!(event.valve_number, Some(5));
        assert_eq!(event.action, IrrigationAction::On);
        assert_eq!(event.triggered_by, TriggerSource::Manual);
    }

    #[tokio::test]
    async fn publish_failure_surfaces_and_suppresses_the_event() {
        let (fx, dispatcher) = fixture();
        fx.publisher.set_failing(true);
        let err = dispatcher
            .issue_manual_command(2, true, Some(10))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Transport(_)));
        assert!(fx.archive.records_of(RecordKind::IrrigationEvent).is_empty());
        assert!(fx.state.get_latest_valve_state(2).is_none());
    }

    #[tokio::test]
    async fn smart_water_stress_opens_default_valves_and_logs_one_event() {
        let (fx, dispatcher) = fixture();
        fx.state.put_weather(weather(32.0, 35.0, 0.0));

        let decision = dispatcher.issue_smart_command("north").await.unwrap();
        assert!(decision.should_irrigate);
        assert_eq!(decision.reason, "water-stress conditions");
        assert_eq!(decision.duration_minutes, 25);

        let commands = decoded_commands(&fx.publisher);
        assert_eq!(commands.len(), 2);
        assert!(commands
            .iter()
            .all(|command| command.action == CommandAction::ValveOn
                && command.duration == Some(25)
                && command.source == "weather_rule"));

        let events = fx.archive.records_of(RecordKind::IrrigationEvent);
        assert_eq!(events.len(), 1);
        let event: IrrigationEvent = serde_json::from_value(events[0].payload.clone()).unwrap();
        assert_eq!(event.action, IrrigationAction::SmartOn);
        assert_eq!(event.zone_id.as_deref(), Some("north"));
        assert_eq!(event.triggered_by, TriggerSource::WeatherRule);
        assert!(event.confidence.is_none());
        assert_eq!(event.context.temperature, Some(32.0));
    }

    #[tokio::test]
    async fn smart_hold_publishes_nothing_but_broadcasts_the_verdict() {
        let (fx, dispatcher) = fixture();
        fx.state.put_weather(weather(22.0, 80.0, 0.0));
        let mut observer = fx.notifier.register();

        let decision = dispatcher.issue_smart_command("north").await.unwrap();
        assert!(!decision.should_irrigate);
        assert_eq!(decision.reason, "ambient humidity high");
        assert!(fx.publisher.sent().is_empty());
        assert!(fx.archive.records_of(RecordKind::IrrigationEvent).is_empty());

        let frame = observer.recv().await.unwrap();
        assert_eq!(frame.data["zone_id"], serde_json::json!("north"));
        assert_eq!(frame.data["should_irrigate"], serde_json::json!(false));
    }

    struct AlwaysIrrigate;

    impl Predictor for AlwaysIrrigate {
        fn predict(
            &self,
            _features: &[f64],
        ) -> Result<irri_decision::Prediction, irri_decision::ModelError> {
            Ok(irri_decision::Prediction {
                label: 1,
                confidence: 0.93,
            })
        }
    }

    #[tokio::test]
    async fn smart_model_path_uses_zone_valves_and_records_confidence() {
        let (fx, dispatcher) = fixture_with_model(Some(Arc::new(AlwaysIrrigate)));
        let decision = dispatcher.issue_smart_command("south").await.unwrap();
        assert!(decision.should_irrigate);
        assert_eq!(decision.reason, "ml_prediction");

        let commands = decoded_commands(&fx.publisher);
        let valves: Vec<_> = commands.iter().filter_map(|command| command.valve).collect();
        assert_eq!(valves, vec![3, 4]);
        assert!(commands.iter().all(|command| command.source == "ml_model"));

        let events = fx.archive.records_of(RecordKind::IrrigationEvent);
        let event: IrrigationEvent = serde_json::from_value(events[0].payload.clone()).unwrap();
        assert_eq!(event.triggered_by, TriggerSource::MlModel);
        assert_eq!(event.confidence, Some(0.93));
    }

    #[tokio::test]
    async fn unknown_zone_is_rejected() {
        let (fx, dispatcher) = fixture();
        let err = dispatcher.issue_smart_command("west").await.unwrap_err();
        assert!(matches!(err, DispatchError::UnknownZone(_)));
        assert!(fx.publisher.sent().is_empty());
    }

    #[tokio::test]
    async fn all_off_closes_cached_open_valves() {
        let (fx, dispatcher) = fixture();
        dispatcher.issue_manual_command(1, true, Some(5)).await.unwrap();
        dispatcher.issue_manual_command(2, true, Some(5)).await.unwrap();
        fx.publisher.take();

        let ack = dispatcher.all_valves_off().await.unwrap();
        assert_eq!(ack.action, CommandAction::ValveAllOff);
        let commands = decoded_commands(&fx.publisher);
        assert_eq!(commands.len(), 1);
        assert!(fx.state.open_valves().is_empty());
    }

    #[tokio::test]
    async fn schedule_registration_validates_and_skips_event_log() {
        let (fx, dispatcher) = fixture();
        let schedule = Schedule {
            valve_number: 3,
            start_hour: 5,
            start_minute: 45,
            duration_minutes: 20,
            days_of_week: [1, 4].into_iter().collect(),
            active: true,
            weather_dependent: true,
        };
        dispatcher.register_schedule(&schedule).await.unwrap();

        let commands = decoded_commands(&fx.publisher);
        assert_eq!(commands[0].action, CommandAction::ScheduleIrrigation);
        assert_eq!(commands[0].start_hour, Some(5));
        assert!(fx.archive.records_of(RecordKind::IrrigationEvent).is_empty());

        let bad = Schedule {
            start_hour: 24,
            ..schedule.clone()
        };
        assert!(matches!(
            dispatcher.register_schedule(&bad).await.unwrap_err(),
            DispatchError::InvalidSchedule(_)
        ));

        let inactive = Schedule {
            active: false,
            ..schedule
        };
        fx.publisher.take();
        dispatcher.register_schedule(&inactive).await.unwrap();
        assert!(fx.publisher.sent().is_empty());
    }
}
