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

use irri_common::SchedulerConfig;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{debug, info, warn};

use crate::dispatch::CommandDispatcher;

/// Owns the two periodic coordination timers.
///
/// Both timers start at process startup and run until shutdown; neither is a
/// fire-and-forget task, the returned [`SchedulerHandle`] can always cancel
/// and join them. The first tick of each timer lands one full interval after
/// startup, not immediately.
pub struct Scheduler {
    dispatcher: Arc<CommandDispatcher>,
    config: SchedulerConfig,
}

/// Join handle for the running timers.
pub struct SchedulerHandle {
    weather_task: JoinHandle<()>,
    advisor_task: JoinHandle<()>,
}

impl Scheduler {
    /// Create a scheduler driving `dispatcher` on the configured intervals.
    pub fn new(dispatcher: Arc<CommandDispatcher>, config: SchedulerConfig) -> Self {
        Self { dispatcher, config }
    }

    /// Spawn both timers; each one exits when `shutdown` fires.
    pub fn spawn(self, shutdown: &broadcast::Sender<()>) -> SchedulerHandle {
        let weather_period = self.config.weather_poll_interval;
        let advisor_period = self.config.smart_advisor_interval;

        let dispatcher = self.dispatcher.clone();
        let mut weather_shutdown = shutdown.subscribe();
        let weather_task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + weather_period, weather_period);
            loop {
                tokio::select! {
                    _ = weather_shutdown.recv() => {
                        debug!("weather poll timer stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(err) = dispatcher.request_weather_reading().await {
                            warn!(error = %err, "weather poll dispatch failed");
                        }
                    }
                }
            }
        });

        let dispatcher = self.dispatcher;
        let mut advisor_shutdown = shutdown.subscribe();
        let advisor_task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + advisor_period, advisor_period);
            loop {
                tokio::select! {
                    _ = advisor_shutdown.recv() => {
                        debug!("smart advisor timer stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        evaluate_all_zones(&dispatcher).await;
                    }
                }
            }
        });

        info!(
            weather_poll_secs = weather_period.as_secs(),
            smart_advisor_secs = advisor_period.as_secs(),
            "scheduler timers started"
        );
        SchedulerHandle {
            weather_task,
            advisor_task,
        }
    }
}

/// Run the smart advisor over every configured zone.
///
/// One zone failing must not prevent evaluation of the next.
async fn evaluate_all_zones(dispatcher: &CommandDispatcher) {
    for zone_id in dispatcher.zone_ids() {
        match dispatcher.issue_smart_command(&zone_id).await {
            Ok(decision) => {
                info!(
                    zone = %zone_id,
                    should_irrigate = decision.should_irrigate,
                    reason = %decision.reason,
                    "smart advisor evaluated zone"
                );
            }
            Err(err) => {
                warn!(zone = %zone_id, error = %err, "smart advisor zone evaluation failed");
            }
        }
    }
}

impl SchedulerHandle {
    /// Await both timer tasks after shutdown has been signalled.
    pub async fn join(self) {
        if let Err(err) = self.weather_task.await {
            warn!(error = %err, "weather poll task join error");
        }
        if let Err(err) = self.advisor_task.await {
            warn!(error = %err, "smart advisor task join error");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::LiveNotifier;
    use indexmap::IndexMap;
    use irri_common::{FarmConfig, ZoneConfig};
    use irri_msg::InMemoryPublisher;
    use irri_persistence::{Archive, MemoryArchive};
    use irri_state::StateStore;
    use std::time::Duration;

    fn zone(valves: &[u8]) -> ZoneConfig {
        ZoneConfig {
            valves: valves.iter().copied().collect(),
            crop_type: "soy".to_owned(),
            area_hectares: 1.0,
        }
    }

    fn dispatcher_with_zones(
        publisher: InMemoryPublisher,
        zones: IndexMap<String, ZoneConfig>,
        model: Option<Arc<dyn irri_decision::Predictor>>,
    ) -> Arc<CommandDispatcher> {
        let archive = Arc::new(MemoryArchive::new());
        let state = Arc::new(StateStore::new(archive.clone() as Arc<dyn Archive>));
        Arc::new(CommandDispatcher::new(
            Arc::new(publisher),
            archive,
            state,
            Arc::new(LiveNotifier::new(8)),
            model,
            FarmConfig::default(),
            zones,
        ))
    }

    fn dispatcher(publisher: InMemoryPublisher) -> Arc<CommandDispatcher> {
        let mut zones = IndexMap::new();
        zones.insert("north".to_owned(), zone(&[1, 2]));
        dispatcher_with_zones(publisher, zones, None)
    }

    #[tokio::test]
    async fn weather_poll_fires_on_interval_and_stops_on_shutdown() {
        let publisher = InMemoryPublisher::new();
        let dispatcher = dispatcher(publisher.clone());
        let config = SchedulerConfig {
            weather_poll_interval: Duration::from_millis(30),
            smart_advisor_interval: Duration::from_secs(3600),
        };
        let (shutdown, _) = broadcast::channel(4);
        let handle = Scheduler::new(dispatcher, config).spawn(&shutdown);

        tokio::time::sleep(Duration::from_millis(100)).await;
        let polls = publisher
            .sent()
            .iter()
            .filter(|(_, payload)| {
                let value: serde_json::Value = serde_json::from_slice(payload).unwrap();
                value["action"] == serde_json::json!("read_weather_now")
            })
            .count();
        assert!(polls >= 2, "expected at least two polls, saw {polls}");

        shutdown.send(()).unwrap();
        handle.join().await;
    }

    struct AlwaysIrrigate;

    impl irri_decision::Predictor for AlwaysIrrigate {
        fn predict(
            &self,
            _features: &[f64],
        ) -> Result<irri_decision::Prediction, irri_decision::ModelError> {
            Ok(irri_decision::Prediction {
                label: 1,
                confidence: 0.9,
            })
        }
    }

    #[tokio::test]
    async fn zone_failure_does_not_block_remaining_zones() {
        let publisher = InMemoryPublisher::new();
        // The model path opens each zone's own valves. The first zone
        // references a valve beyond the controller range, so its evaluation
        // fails fast; the second zone must still be dispatched.
        let mut zones = IndexMap::new();
        zones.insert("broken".to_owned(), zone(&[11]));
        zones.insert("healthy".to_owned(), zone(&[1, 2]));
        let dispatcher =
            dispatcher_with_zones(publisher.clone(), zones, Some(Arc::new(AlwaysIrrigate)));

        evaluate_all_zones(&dispatcher).await;

        let opened: Vec<u8> = publisher
            .sent()
            .iter()
            .filter_map(|(_, payload)| {
                let value: serde_json::Value = serde_json::from_slice(payload).unwrap();
                value["valve"].as_u64().map(|valve| valve as u8)
            })
            .collect();
        assert_eq!(opened, vec![1, 2]);
    }
}
