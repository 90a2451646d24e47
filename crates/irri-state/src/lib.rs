//! ---
//! irri_section: "05-state-cache"
//! irri_subsection: "module"
//! irri_type: "source"
//! irri_scope: "code"
//! irri_description: "Latest-known-state cache with write-through."
//! irri_version: "v0.1.0-alpha"
//! irri_owner: "tbd"
//! ---
#![warn(missing_docs)]

//! Single source of truth for "current" valve and weather queries.
//!
//! Reads are served from memory, falling back to the durable archive on a
//! cold miss. Writes update memory synchronously under a per-resource lock
//! and enqueue the durable append on a background worker, so archive
//! failures never block the ingestion or dispatch paths.

use std::collections::HashMap;
use std::sync::Arc;

use irri_msg::{ValveState, WeatherReading};
use irri_persistence::{Archive, RecordKind};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Archive key under which the current weather reading is stored.
///
/// A single installation has one effective weather feed; the reporting
/// station's id stays inside the payload.
pub const WEATHER_KEY: &str = "current";

enum WriteJob {
    Valve(ValveState),
    Weather(WeatherReading),
}

/// In-memory latest-known-state cache with durable write-through.
pub struct StateStore {
    valves: RwLock<HashMap<u8, ValveState>>,
    weather: RwLock<Option<WeatherReading>>,
    archive: Arc<dyn Archive>,
    writes: mpsc::UnboundedSender<WriteJob>,
}

impl StateStore {
    /// Create a store backed by `archive` and spawn its write-through worker.
    ///
    /// Must be called from within a tokio runtime. The worker drains when
    /// the store is dropped.
    pub fn new(archive: Arc<dyn Archive>) -> Self {
        let (writes, mut rx) = mpsc::unbounded_channel::<WriteJob>();
        let worker_archive = archive.clone();
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                let result = match &job {
                    WriteJob::Valve(state) => serde_json::to_value(state).map(|payload| {
                        worker_archive.append(
                            RecordKind::ValveState,
                            &state.valve_number.to_string(),
                            payload,
                        )
                    }),
                    WriteJob::Weather(reading) => serde_json::to_value(reading).map(|payload| {
                        worker_archive.append(RecordKind::Weather, WEATHER_KEY, payload)
                    }),
                };
                match result {
                    Ok(Ok(sequence)) => debug!(sequence, "state write persisted"),
                    Ok(Err(err)) => warn!(error = %err, "durable state write failed"),
                    Err(err) => warn!(error = %err, "state record serialization failed"),
                }
            }
            debug!("state write-through worker stopped");
        });
        Self {
            valves: RwLock::new(HashMap::new()),
            weather: RwLock::new(None),
            archive,
            writes,
        }
    }

    /// Latest known state for one valve, consulting the archive on a cold
    /// miss and backfilling the cache.
    pub fn get_latest_valve_state(&self, valve_number: u8) -> Option<ValveState> {
        if let Some(state) = self.valves.read().get(&valve_number) {
            return Some(state.clone());
        }

        let record = match self
            .archive
            .latest(RecordKind::ValveState, &valve_number.to_string())
        {
            Ok(record) => record?,
            Err(err) => {
                warn!(valve = valve_number, error = %err, "cold-start valve lookup failed");
                return None;
            }
        };
        let state: ValveState = match serde_json::from_value(record.payload) {
            Ok(state) => state,
            Err(err) => {
                warn!(valve = valve_number, error = %err, "archived valve record is malformed");
                return None;
            }
        };

        // Backfill without clobbering a write that landed while we were
        // reading the archive.
        let mut valves = self.valves.write();
        Some(
            valves
                .entry(valve_number)
                .or_insert_with(|| state.clone())
                .clone(),
        )
    }

    /// Most recent accepted weather reading, consulting the archive on a
    /// cold miss.
    pub fn get_latest_weather(&self) -> Option<WeatherReading> {
        if let Some(reading) = self.weather.read().as_ref() {
            return Some(reading.clone());
        }

        let record = match self.archive.latest(RecordKind::Weather, WEATHER_KEY) {
            Ok(record) => record?,
            Err(err) => {
                warn!(error = %err, "cold-start weather lookup failed");
                return None;
            }
        };
        let reading: WeatherReading = match serde_json::from_value(record.payload) {
            Ok(reading) => reading,
            Err(err) => {
                warn!(error = %err, "archived weather record is malformed");
                return None;
            }
        };

        let mut weather = self.weather.write();
        Some(weather.get_or_insert_with(|| reading.clone()).clone())
    }

    /// Store a valve state: memory now, archive on the worker.
    pub fn put_valve_state(&self, state: ValveState) {
        self.valves
            .write()
            .insert(state.valve_number, state.clone());
        if self.writes.send(WriteJob::Valve(state)).is_err() {
            debug!("write-through worker gone; durable valve write skipped");
        }
    }

    /// Store a weather reading: memory now, archive on the worker.
    pub fn put_weather(&self, reading: WeatherReading) {
        *self.weather.write() = Some(reading.clone());
        if self.writes.send(WriteJob::Weather(reading)).is_err() {
            debug!("write-through worker gone; durable weather write skipped");
        }
    }

    /// Valve numbers currently cached as open.
    pub fn open_valves(&self) -> Vec<u8> {
        self.valves
            .read()
            .values()
            .filter(|state| state.is_open)
            .map(|state| state.valve_number)
            .collect()
    }
}
