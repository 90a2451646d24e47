//! ---
//! irri_section: "01-shared-runtime"
//! irri_subsection: "module"
//! irri_type: "source"
//! irri_scope: "code"
//! irri_description: "Configuration loading for the coordination runtime."
//! irri_version: "v0.1.0-alpha"
//! irri_owner: "tbd"
//! ---
use std::collections::BTreeSet;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use tracing::debug;

use crate::logging::LoggingConfig;

fn default_namespace() -> String {
    "irricore".to_owned()
}

fn default_device_id() -> String {
    "field-controller-01".to_owned()
}

fn default_valve_count() -> u8 {
    10
}

fn default_mqtt_host() -> String {
    "localhost".to_owned()
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_mqtt_client_id() -> String {
    "irricored".to_owned()
}

fn default_keep_alive() -> Duration {
    Duration::from_secs(30)
}

fn default_publish_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_observers_enabled() -> bool {
    true
}

fn default_observer_listen() -> SocketAddr {
    "0.0.0.0:8090".parse().expect("valid default observer address")
}

fn default_observer_queue_depth() -> usize {
    64
}

fn default_weather_poll_interval() -> Duration {
    Duration::from_secs(7_200)
}

fn default_smart_advisor_interval() -> Duration {
    Duration::from_secs(21_600)
}

fn default_archive_directory() -> PathBuf {
    PathBuf::from("target/archive")
}

fn default_crop_type() -> String {
    "soy".to_owned()
}

fn default_area_hectares() -> f64 {
    1.0
}

/// Primary configuration object for the Irricore runtime.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub farm: FarmConfig,
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub observers: ObserverConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub zones: IndexMap<String, ZoneConfig>,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    pub source: PathBuf,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &str = "IRRICORE_CONFIG";

    /// Load configuration from disk, respecting the `IRRICORE_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            let path = PathBuf::from(env_path);
            if !path.exists() {
                return Err(anyhow!(
                    "configuration override {} points at missing file {}",
                    Self::ENV_CONFIG_PATH,
                    path.display()
                ));
            }
            let config = Self::from_path(&path)?;
            return Ok(LoadedAppConfig {
                config,
                source: path,
            });
        }

        for candidate in candidates {
            let path = candidate.as_ref();
            if path.exists() {
                let config = Self::from_path(path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path.to_path_buf(),
                });
            }
            debug!(path = %path.display(), "configuration candidate not present");
        }

        Err(anyhow!(
            "no configuration file found; set {} or provide --config",
            Self::ENV_CONFIG_PATH
        ))
    }

    fn from_path(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read configuration {}", path.display()))?;
        let config: AppConfig = toml::from_str(&raw)
            .with_context(|| format!("failed to parse configuration {}", path.display()))?;
        config.validate()?;
        debug!(path = %path.display(), zones = config.zones.len(), "configuration loaded");
        Ok(config)
    }

    /// Validate cross-field invariants that serde defaults cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.farm.valve_count == 0 {
            return Err(anyhow!("farm.valve_count must be at least 1"));
        }
        if self.scheduler.weather_poll_interval.is_zero()
            || self.scheduler.smart_advisor_interval.is_zero()
        {
            return Err(anyhow!("scheduler intervals must be non-zero"));
        }
        for (zone_id, zone) in &self.zones {
            if zone.valves.is_empty() {
                return Err(anyhow!("zone {zone_id} has no valve members"));
            }
            for valve in &zone.valves {
                if *valve == 0 || *valve > self.farm.valve_count {
                    return Err(anyhow!(
                        "zone {zone_id} references valve {valve} outside 1..={}",
                        self.farm.valve_count
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Identity of the coordinated farm installation on the device channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FarmConfig {
    /// Topic namespace shared by every device on this installation.
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Device identifier commands are addressed to.
    #[serde(default = "default_device_id")]
    pub device_id: String,
    /// Highest valid valve number on the field controller.
    #[serde(default = "default_valve_count")]
    pub valve_count: u8,
}

impl Default for FarmConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            device_id: default_device_id(),
            valve_count: default_valve_count(),
        }
    }
}

impl FarmConfig {
    /// Outbound command topic for the configured device.
    pub fn command_topic(&self) -> String {
        format!("{}/{}/command", self.namespace, self.device_id)
    }

    /// Inbound subscription filters for every device in the namespace.
    pub fn subscription_filters(&self) -> [String; 3] {
        [
            format!("{}/+/status", self.namespace),
            format!("{}/+/weather", self.namespace),
            format!("{}/+/alerts", self.namespace),
        ]
    }
}

/// Broker connection settings for the device channel.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    #[serde(default = "default_mqtt_host")]
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default = "default_mqtt_client_id")]
    pub client_id: String,
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_keep_alive")]
    pub keep_alive: Duration,
    /// Upper bound on a single outbound publish before it is abandoned.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_publish_timeout")]
    pub publish_timeout: Duration,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            client_id: default_mqtt_client_id(),
            keep_alive: default_keep_alive(),
            publish_timeout: default_publish_timeout(),
        }
    }
}

/// Live observer (WebSocket) endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObserverConfig {
    #[serde(default = "default_observers_enabled")]
    pub enabled: bool,
    #[serde(default = "default_observer_listen")]
    pub listen: SocketAddr,
    /// Frames buffered per observer before best-effort delivery drops.
    #[serde(default = "default_observer_queue_depth")]
    pub queue_depth: usize,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            enabled: default_observers_enabled(),
            listen: default_observer_listen(),
            queue_depth: default_observer_queue_depth(),
        }
    }
}

/// Fixed intervals for the periodic coordination timers.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_weather_poll_interval")]
    pub weather_poll_interval: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_smart_advisor_interval")]
    pub smart_advisor_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            weather_poll_interval: default_weather_poll_interval(),
            smart_advisor_interval: default_smart_advisor_interval(),
        }
    }
}

/// Location of the durable append-only archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    #[serde(default = "default_archive_directory")]
    pub directory: PathBuf,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            directory: default_archive_directory(),
        }
    }
}

/// Static agronomic grouping of valves.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ZoneConfig {
    /// Valve numbers belonging to this zone.
    pub valves: BTreeSet<u8>,
    #[serde(default = "default_crop_type")]
    pub crop_type: String,
    #[serde(default = "default_area_hectares")]
    pub area_hectares: f64,
}
