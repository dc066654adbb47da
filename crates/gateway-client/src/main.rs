//! Gateway client entry point
//!
//! Run with:
//! ```bash
//! DISCORDTOKEN=... cargo run -p gateway-client
//! ```
//!
//! Configuration is loaded from environment variables (and `.env` if present).

use gateway_client::GatewayClient;
use gateway_common::{try_init_tracing_with_config, GatewayConfig, TracingConfig};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    // Configuration first so the log format can follow the environment
    let config = match GatewayConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = try_init_tracing_with_config(TracingConfig::for_environment(config.app.env)) {
        eprintln!("Warning: Failed to initialize tracing: {e}");
    }

    if rustls::crypto::ring::default_provider().install_default().is_err() {
        warn!("A TLS crypto provider was already installed");
    }

    if let Err(e) = run(config).await {
        error!(error = %e, "Gateway client failed");
        std::process::exit(1);
    }
}

async fn run(config: GatewayConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        app = %config.app.name,
        env = ?config.app.env,
        url = %config.endpoint.url(),
        "Starting gateway client..."
    );

    let client = GatewayClient::new(config);
    let outcome = client.run(shutdown_signal()).await?;

    info!(
        connection_id = %outcome.connection_id,
        reason = %outcome.reason,
        last_sequence = ?outcome.last_sequence,
        close_acknowledged = outcome.close_acknowledged,
        "Gateway client stopped"
    );

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("Interrupt received, closing gateway session");
}
