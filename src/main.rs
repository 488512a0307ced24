use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use connections_auth::{api, AppState, Config, SharedState};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "connections_auth=info,tower_http=info".into()),
        )
        .init();

    // Load config
    let config = Config::from_env()?;
    info!("connections-auth v{}", env!("CARGO_PKG_VERSION"));
    info!("Listening on {}:{}", config.host, config.port);

    let addr = format!("{}:{}", config.host, config.port);
    let state: SharedState = Arc::new(AppState::from_config(config)?);
    info!("Registered {} sign-in providers", state.registry.count());
    if state.config.auth_service_secret.is_none() {
        tracing::warn!("AUTH_SERVICE_SECRET not set, provider token reads are disabled");
    }

    // Build router
    let app = api::router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server ready ✓");
    axum::serve(listener, app).await?;

    Ok(())
}
