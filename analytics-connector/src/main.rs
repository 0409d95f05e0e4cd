use analytics_connector::api::{create_router, ApiState};
use analytics_connector::AdobeConnector;
use anyhow::{Context, Result};
use askdata::config::{load_from_env, ENCRYPTION_KEY_ENV};
use askdata::credentials::{validate_key, SettingsStore};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "analytics_connector=info,askdata=info".into()),
        )
        .init();

    info!("Analytics connector starting...");

    let config = load_from_env().context("Failed to load configuration")?;

    let encryption_key = std::env::var(ENCRYPTION_KEY_ENV).with_context(|| {
        format!("{} is required (base64-encoded 32-byte key)", ENCRYPTION_KEY_ENV)
    })?;
    validate_key(&encryption_key)
        .with_context(|| format!("{} is not a valid encryption key", ENCRYPTION_KEY_ENV))?;

    info!(
        database = %config.storage.database_path,
        ims_url = %config.adobe.ims_url,
        api_url = %config.adobe.api_url,
        auth_enabled = config.server.auth_enabled,
        serialize_token_refresh = config.adobe.serialize_token_refresh,
        "Configuration loaded"
    );

    let store = Arc::new(
        SettingsStore::new(&config.storage.database_path, &encryption_key)
            .context("Failed to initialize settings store")?,
    );
    info!("Settings store initialized");

    let connector = Arc::new(
        AdobeConnector::new(Arc::clone(&store), &config.adobe)
            .context("Failed to initialize Adobe connector")?,
    );

    let router = create_router(ApiState {
        store,
        connector,
        auth_enabled: config.server.auth_enabled,
    })
    .layer(CorsLayer::permissive());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(addr = %addr, "Analytics API listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for ctrl_c signal");
            }
            info!("Shutdown signal received");
        })
        .await
        .context("Analytics API server error")?;

    info!("Analytics connector stopped");
    Ok(())
}
