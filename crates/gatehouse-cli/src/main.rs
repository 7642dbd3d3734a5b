//! gatehouse - RFID access controller daemon.
//!
//! Configuration comes from `config.json` under `BASE_DIR`, overlaid with
//! environment variables. Without GPIO hardware the relays are driven
//! through the mock driver and card swipes are typed on stdin.

mod console;
mod settings;

use anyhow::{Context, Result};
use console::{Command, Console, HELP};
use gatehouse_controller::{AccessController, ControllerBuilder};
use gatehouse_core::ControllerConfig;
use gatehouse_hardware::mock::MockGpio;
use gatehouse_sync::{CloudSink, MemorySink};
use settings::{Settings, SinkKind};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let settings = Settings::from_env()?;
    let mut config = ControllerConfig::load_or_default(&settings.storage.config_path());
    settings.apply(&mut config);
    config.validate().context("invalid controller configuration")?;

    info!(
        base_dir = %settings.storage.base_dir.display(),
        cap_bytes = settings.storage.max_bytes,
        entity_id = %config.entity_id,
        "starting gatehouse"
    );

    let builder = ControllerBuilder::<MemorySink>::new(settings.storage.clone())
        .config(config)
        .gpio(Arc::new(MockGpio::new()));
    let builder = match settings.sink {
        SinkKind::Memory => builder.sink(Arc::new(MemorySink::new())),
        SinkKind::None => builder,
    };
    let controller = builder
        .build()
        .context("failed to start access controller")?;

    run(controller).await
}

async fn run<S: CloudSink>(controller: AccessController<S>) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let workers = controller.start_workers(shutdown_rx)?;

    let console = Console::new(&controller);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("{HELP}");

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => match line.parse::<Command>() {
                    Ok(command) => match console.execute(command).await {
                        Ok(output) => println!("{output}"),
                        Err(e) => warn!(error = %e, "command failed"),
                    },
                    Err(e) => println!("{e}"),
                },
                Ok(None) => {
                    info!("stdin closed, waiting for shutdown signal");
                    wait_for_signal().await;
                    break;
                }
                Err(e) => {
                    error!(error = %e, "failed to read stdin");
                    break;
                }
            },
            _ = wait_for_signal() => break,
        }
    }

    info!("shutting down");
    signal_shutdown(&shutdown_tx);
    workers.join().await;
    Ok(())
}

/// Tell the workers to stop. Returns whether any worker was listening.
fn signal_shutdown(shutdown: &watch::Sender<bool>) -> bool {
    match shutdown.send(true) {
        Ok(()) => true,
        Err(_) => {
            debug!("no workers listening for shutdown");
            false
        }
    }
}

async fn wait_for_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
    }
}

/// `RUST_LOG` wins; otherwise `LOG_LEVEL`, defaulting to `info`.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        EnvFilter::try_new(level.to_lowercase()).unwrap_or_else(|_| EnvFilter::new("info"))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
