//! SBB Split-Flap Display Service
//!
//! RS485 driver daemon with a clock display mode and a JSON API.

use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use sbbsrv::{
    api::{self, AppState},
    core::{
        bootstrap::{self, Args},
        DirectionDriver, Transceiver, TxEnableLine,
    },
    service::{ClockUpdater, LocalClock, SbbClient},
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = bootstrap::load_configuration(&args)?;
    if args.validate {
        println!("# Configuration is valid\n{}", serde_yaml::to_string(&config)?);
        return Ok(());
    }
    bootstrap::initialize_logging(&config)?;
    info!("Starting sbbsrv v{}", env!("CARGO_PKG_VERSION"));

    let spec = config.connection_spec()?;
    let bus = spec.create_transport()?;
    let line = TxEnableLine::open(config.rs485.tx_enable)?;
    let direction = DirectionDriver::new(line, config.rs485.hold_delay());
    info!(
        "RS485 transmitter enable: {} (off delay {:?})",
        config.rs485.tx_enable,
        config.rs485.hold_delay()
    );

    let shutdown = CancellationToken::new();
    let (handle, transceiver_task) = Transceiver::spawn(
        bus,
        direction,
        config.timing.exchange_timing(),
        shutdown.clone(),
    );
    let client = SbbClient::new(handle);

    let clock_task = if config.clock.is_enabled() {
        let updater = ClockUpdater::new(client.clone(), config.clock.clone(), LocalClock);
        Some(updater.spawn(shutdown.clone()))
    } else {
        info!("No clock modules configured, clock display disabled");
        None
    };

    let config = Arc::new(config);
    let api_task = match config.api.port {
        Some(port) => {
            let state = AppState::new(client.clone(), Arc::clone(&config));
            let api_config = config.api.clone();
            let token = shutdown.clone();
            Some(tokio::spawn(async move {
                if let Err(e) = api::serve(&api_config, port, state, token.clone()).await {
                    error!("JSON API stopped: {e}");
                    token.cancel();
                }
            }))
        },
        None => {
            info!("No JSON API port configured, API disabled");
            None
        },
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!("Failed to listen for shutdown signal: {e}");
            }
            info!("Shutdown signal received");
        }
        () = shutdown.cancelled() => {}
    }
    shutdown.cancel();

    if let Some(task) = api_task {
        let _ = task.await;
    }
    if let Some(task) = clock_task {
        let _ = task.await;
    }
    drop(client);
    if let Err(e) = transceiver_task.await {
        error!("Transceiver task failed: {e}");
    }

    info!("sbbsrv stopped");
    Ok(())
}
