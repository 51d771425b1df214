//! Mindnoscape command-line front end
//!
//! Loads the configuration, opens the store and serves the terminal through
//! the stdio adapter until `exit`, end of input or Ctrl-C.
//!
//! Set `MINDNOSCAPE_CONFIG` to use a configuration file other than
//! `./data/config.json`.

mod logging;

use anyhow::Context;
use mindnoscape_core::adapter::{Adapter, AdapterManager, StdioAdapter};
use mindnoscape_core::{Config, DataManager, SessionManager, SessionManagerConfig};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

fn main() -> ExitCode {
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(run());
    runtime.shutdown_timeout(Duration::from_millis(500));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("mindnoscape: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let config_path = Config::default_path();
    let config = Config::load_or_create(&config_path)
        .await
        .context("Failed to load configuration")?;
    logging::init(&config)?;
    tracing::info!("Configuration loaded from {}", config_path.display());

    let data = Arc::new(
        DataManager::new(&config)
            .await
            .context("Failed to initialise data manager")?,
    );
    let sessions = SessionManager::new(data, SessionManagerConfig::default());
    let adapters = AdapterManager::new(sessions);

    let stdio = Arc::new(StdioAdapter::new());
    adapters.adapter_add(stdio.clone());

    let serve = {
        let adapters = adapters.clone();
        tokio::spawn(async move { stdio.run(adapters).await })
    };

    tokio::select! {
        joined = serve => match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!("Stdio adapter failed: {:#}", e),
            Err(e) => tracing::error!("Stdio adapter task aborted: {}", e),
        },
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, shutting down");
        }
    }

    adapters.shutdown().await;
    tracing::info!("Mindnoscape stopped");
    Ok(())
}
