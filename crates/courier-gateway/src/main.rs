//! Courier Gateway entry point
//!
//! Run with:
//! ```bash
//! cargo run -p courier-gateway
//! ```
//!
//! Configuration is loaded from environment variables.

use courier_common::{try_init_tracing_with_config, AppConfig, TracingConfig};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Configuration picks the log format, so it is loaded before tracing.
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = try_init_tracing_with_config(TracingConfig::for_environment(config.app.env)) {
        eprintln!("Warning: Failed to initialize tracing: {e}");
    }

    if let Err(e) = run(config).await {
        error!(error = %e, "Gateway failed");
        std::process::exit(1);
    }
}

async fn run(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        name = %config.app.name,
        env = ?config.app.env,
        port = config.gateway.port,
        persistence = if config.database.is_some() { "postgres" } else { "memory" },
        "Starting Courier Gateway..."
    );

    courier_gateway::run(config).await?;

    Ok(())
}
