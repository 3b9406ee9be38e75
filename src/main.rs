use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::AppState;
use camp_core::CoreConfig;

/// Main entry point for the camp clinic records service
///
/// Loads `.env`, resolves the configuration once and serves the REST API until Ctrl-C or
/// SIGTERM, letting in-flight requests finish.
///
/// # Environment Variables
/// - `CAMP_REST_ADDR`: server address (default: "0.0.0.0:3000")
/// - `CAMP_DATA_DIR`: root of all clinic data (default: "clinic_data")
/// - `CAMP_TOKEN_SECRET`: HMAC key for session tokens, at least 32 bytes (required)
/// - `CAMP_TOKEN_TTL_HOURS`, `CAMP_BCRYPT_COST`, `CAMP_MAX_UPLOAD_BYTES`: optional tuning
/// - `CAMP_EMAIL_*`, `CAMP_WHATSAPP_*`: notification providers; unset channels are skipped
///
/// # Errors
/// Returns an error if:
/// - the logging/tracing configuration cannot be initialised,
/// - the configuration is invalid or the data directory cannot be created,
/// - the server address cannot be bound, or
/// - the HTTP server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("camp=info".parse()?)
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = CoreConfig::from_lookup(|key| std::env::var(key).ok())?;
    std::fs::create_dir_all(cfg.data_dir())?;
    let rest_addr = std::env::var("CAMP_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());

    tracing::info!("++ Starting camp REST API on {}", rest_addr);
    tracing::info!("++ Clinic data under {}", cfg.data_dir().display());

    let app = api_rest::router(AppState::new(Arc::new(cfg)));

    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("-- Camp REST API stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
