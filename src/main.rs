//! github-login binary entry point

use github_login::{AppState, config};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application entry point
///
/// # Setup
/// 1. Initialize tracing/logging
/// 2. Load configuration from files and environment
/// 3. Initialize AppState
/// 4. Build Axum router
/// 5. Start HTTP server
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Initialize tracing/logging
    let log_format =
        std::env::var("GITHUB_LOGIN__LOGGING__FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "github_login=info,tower_http=info".into());

    if log_format == "json" {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }

    tracing::info!("Starting github-login...");

    github_login::metrics::init_metrics();

    // 2. Load configuration
    let config = config::AppConfig::load()?;
    tracing::info!(
        public_url = %config.server.public_url,
        "Configuration loaded"
    );

    // 3. Initialize application state
    let state = AppState::new(config.clone())?;

    // 4. Build Axum router
    let app = github_login::build_router(state);

    // 5. Start HTTP server
    let addr = config.server.bind_addr();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(error) => {
            tracing::error!(%error, address = %addr, "Failed to bind HTTP listener");
            return Err(error.into());
        }
    };

    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;

    Ok(())
}
