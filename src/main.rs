// callgate - Request resilience and concurrency control for outbound calls
// Author: kelexine (https://github.com/kelexine)

use anyhow::Result;
use callgate::cli::{run_simulation, Args, Command};
use callgate::config::GuardConfig;
use callgate::metrics::gather_metrics;
use callgate::pipeline::RequestPipeline;
use callgate::utils::logging;
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Phase 1: Load configuration
    let config = match &args.config {
        Some(path) => GuardConfig::load_from(path)?,
        None => GuardConfig::load()?,
    };

    // Phase 2: Initialize logging
    logging::init(&config.logging)?;

    match args.command {
        Command::Config => {
            print!("{}", config.to_toml()?);
        }
        Command::Simulate(simulate) => {
            info!("Starting callgate v{}", env!("CARGO_PKG_VERSION"));

            // Phase 3: Build the pipeline and its background sweep
            let pipeline = RequestPipeline::new(&config)?;
            pipeline.start_maintenance();

            // Phase 4: Run until done or interrupted
            let cancel = CancellationToken::new();
            let watcher = tokio::spawn(cancel_on_signal(cancel.clone()));
            let report = run_simulation(&pipeline, &simulate, &cancel).await;
            watcher.abort();
            pipeline.shutdown().await;

            println!("{}", serde_json::to_string_pretty(&report)?);
            if simulate.metrics {
                print!("{}", gather_metrics());
            }
        }
    }

    Ok(())
}

async fn cancel_on_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal, cancelling in-flight calls");
        },
        _ = terminate => {
            info!("Received SIGTERM signal, cancelling in-flight calls");
        },
    }
    cancel.cancel();
}
