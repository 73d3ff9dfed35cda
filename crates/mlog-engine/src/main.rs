//! MediaLog pipeline controller binary.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mlog_engine::{EngineConfig, PollingEngine};
use mlog_store::StoreClient;

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::from_default_env()
                .add_directive("mlog_engine=info".parse().unwrap())
                .add_directive("mlog_store=info".parse().unwrap()),
        )
        .init();

    info!("Starting mlog-engine");

    // Load configuration
    let config = EngineConfig::from_env();
    info!("Engine config: {:?}", config);

    // Create store client
    let store = match StoreClient::from_env() {
        Ok(s) => Arc::new(s),
        Err(e) => {
            error!("Failed to create store client: {}", e);
            std::process::exit(1);
        }
    };

    let engine = PollingEngine::new(config, store);

    // On interrupt, finish the in-flight cycle up to its soft timeout and
    // exit; child processes run to their own timeouts.
    let interrupt = Arc::clone(&engine);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        interrupt.shutdown();
    });

    match engine.run().await {
        Ok(stats) => {
            info!(
                poll_cycles = stats.poll_cycles,
                successful = stats.successful,
                failed = stats.failed,
                "Controller finished"
            );
        }
        Err(e) => {
            error!("Engine error: {}", e);
            std::process::exit(1);
        }
    }
}
