//! ---
//! irri_section: "06-coordination-engine"
//! irri_subsection: "binary"
//! irri_type: "source"
//! irri_scope: "code"
//! irri_description: "Binary entrypoint for the Irricore daemon."
//! irri_version: "v0.1.0-alpha"
//! irri_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use irri_common::config::AppConfig;
use irri_common::logging::init_tracing;
use irri_core::coordinator::CoordinationEngine;
use irri_net::{MqttLink, ObserverServer};
use irri_persistence::JsonlArchive;
use tokio::signal;
use tracing::info;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Irricore coordination daemon",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Run the coordination engine")]
    Run,
    #[command(about = "Load and validate the configuration, then exit")]
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/irricore.prod.toml"));
    candidates.push(PathBuf::from("configs/irricore.dev.toml"));

    let loaded = AppConfig::load_with_source(&candidates)?;
    let config = loaded.config;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            init_tracing("irricod", &config.logging)?;
            info!(source = %loaded.source.display(), "configuration loaded");
            run_daemon(config).await
        }
        Commands::CheckConfig => {
            println!(
                "Configuration {} is valid ({} zones, {} valves)",
                loaded.source.display(),
                config.zones.len(),
                config.farm.valve_count
            );
            Ok(())
        }
    }
}

async fn run_daemon(config: AppConfig) -> Result<()> {
    let archive = Arc::new(JsonlArchive::open(
        &config.archive.directory.join("events.jsonl"),
    )?);

    // The MQTT session connects lazily on the first event-loop poll; the
    // publisher is usable immediately and commands queue until then.
    let link = MqttLink::connect(&config.mqtt, &config.farm);
    let publisher = link.publisher();

    let observers = config.observers.clone();
    let engine = CoordinationEngine::new(config, archive, publisher, None).start();
    let device = link.spawn(engine.ingestor());

    let observer_server = if observers.enabled {
        Some(ObserverServer::spawn(&observers, engine.notifier()).await?)
    } else {
        info!("observer server disabled by configuration");
        None
    };

    info!("daemon running; waiting for termination signal");
    signal::ctrl_c().await?;
    info!("ctrl-c received; shutting down");

    engine.shutdown().await?;
    device.shutdown().await?;
    if let Some(server) = observer_server {
        server.shutdown().await?;
    }

    Ok(())
}
