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

use anyhow::Result;
use irri_common::AppConfig;
use irri_decision::Predictor;
use irri_msg::CommandPublisher;
use irri_persistence::Archive;
use irri_state::StateStore;
use tokio::sync::broadcast;
use tracing::info;

use crate::dispatch::CommandDispatcher;
use crate::ingest::TelemetryIngestor;
use crate::notify::LiveNotifier;
use crate::scheduler::{Scheduler, SchedulerHandle};

/// Builder for the coordination engine.
///
/// Every collaborator is injected explicitly; the engine holds no ambient
/// globals. Transport adapters (the MQTT link, the observer server) are
/// wired by the daemon around the returned [`EngineHandle`].
pub struct CoordinationEngine {
    config: AppConfig,
    archive: Arc<dyn Archive>,
    publisher: Arc<dyn CommandPublisher>,
    model: Option<Arc<dyn Predictor>>,
}

impl CoordinationEngine {
    /// Assemble an engine from its injected dependencies.
    pub fn new(
        config: AppConfig,
        archive: Arc<dyn Archive>,
        publisher: Arc<dyn CommandPublisher>,
        model: Option<Arc<dyn Predictor>>,
    ) -> Self {
        Self {
            config,
            archive,
            publisher,
            model,
        }
    }

    /// Build all components, start the scheduler timers, and return the
    /// lifecycle handle.
    pub fn start(self) -> EngineHandle {
        let (shutdown, _) = broadcast::channel(8);

        let state = Arc::new(StateStore::new(self.archive.clone()));
        let notifier = Arc::new(LiveNotifier::new(self.config.observers.queue_depth));
        let dispatcher = Arc::new(CommandDispatcher::new(
            self.publisher,
            self.archive,
            state.clone(),
            notifier.clone(),
            self.model,
            self.config.farm.clone(),
            self.config.zones.clone(),
        ));
        let ingestor = Arc::new(TelemetryIngestor::new(state.clone(), notifier.clone()));
        let scheduler =
            Scheduler::new(dispatcher.clone(), self.config.scheduler.clone()).spawn(&shutdown);

        info!(
            zones = self.config.zones.len(),
            valve_count = self.config.farm.valve_count,
            "coordination engine started"
        );

        EngineHandle {
            shutdown,
            scheduler: Some(scheduler),
            state,
            notifier,
            dispatcher,
            ingestor,
        }
    }
}

/// Handle over the running engine, used by the daemon and by transports.
pub struct EngineHandle {
    shutdown: broadcast::Sender<()>,
    scheduler: Option<SchedulerHandle>,
    state: Arc<StateStore>,
    notifier: Arc<LiveNotifier>,
    dispatcher: Arc<CommandDispatcher>,
    ingestor: Arc<TelemetryIngestor>,
}

impl EngineHandle {
    /// Latest-known-state cache, for API-layer queries.
    pub fn state(&self) -> Arc<StateStore> {
        self.state.clone()
    }

    /// Live observer fan-out, for the observer server.
    pub fn notifier(&self) -> Arc<LiveNotifier> {
        self.notifier.clone()
    }

    /// Command dispatcher, for API-layer operations.
    pub fn dispatcher(&self) -> Arc<CommandDispatcher> {
        self.dispatcher.clone()
    }

    /// Telemetry ingestor, for the inbound device channel.
    pub fn ingestor(&self) -> Arc<TelemetryIngestor> {
        self.ingestor.clone()
    }

    /// Stop the scheduler timers and wait for them to finish.
    ///
    /// In-flight broadcasts may be abandoned; observers are dropped when
    /// their server-side handles go away.
    pub async fn shutdown(mut self) -> Result<()> {
        let _ = self.shutdown.send(());
        if let Some(scheduler) = self.scheduler.take() {
            scheduler.join().await;
        }
        info!("coordination engine shutdown complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use irri_msg::{InMemoryPublisher, TelemetrySink};
    use irri_persistence::MemoryArchive;
    use serde_json::json;

    #[tokio::test]
    async fn engine_wires_ingest_to_state_and_notifier() {
        let engine = CoordinationEngine::new(
            AppConfig::default(),
            Arc::new(MemoryArchive::new()),
            Arc::new(InMemoryPublisher::new()),
            None,
        );
        let handle = engine.start();
        let mut observer = handle.notifier().register();

        handle.ingestor().on_message(
            "irricore/d1/status",
            json!({"device_id": "d1", "valves": [{"number": 1, "state": "ON"}]})
                .to_string()
                .as_bytes(),
        );

        assert!(handle.state().get_latest_valve_state(1).unwrap().is_open);
        assert!(observer.recv().await.unwrap().topic.unwrap().contains("status"));

        handle.shutdown().await.unwrap();
    }
}
