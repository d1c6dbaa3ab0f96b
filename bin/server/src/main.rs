use axum::{Router, routing::get};
use campus_gate_server::{
    auth::{self, AppState, OidcClient},
    config::ServerConfig,
    db::{PgCustomImportOverlay, Stores},
    error::StartupError,
};
use campus_gate_identity::PendingStore;
use campus_gate_verification::{Sha256Hasher, parse_import};
use rootcause::Report;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Report<StartupError>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = ServerConfig::from_env().map_err(|e| StartupError::Config {
        details: e.to_string(),
    })?;
    tracing::info!("Loaded configuration");

    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .map_err(|e| StartupError::Database {
            details: e.to_string(),
        })?;

    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .map_err(|e| StartupError::Migration {
            details: e.to_string(),
        })?;

    let stores = Stores::new(db_pool);

    if let Some(path) = &config.custom_import_file {
        let count = load_custom_import(&stores.custom_imports, path).await?;
        tracing::info!(entries = count, path = %path, "Loaded custom import");
    }

    let shutdown = CancellationToken::new();
    tokio::spawn(cleanup_expired_requests(
        stores.clone(),
        config.verification.cleanup_interval_seconds,
        shutdown.clone(),
    ));

    tracing::info!("Discovering OIDC provider...");
    let oidc_client = OidcClient::discover(config.oidc)
        .await
        .map_err(|e| StartupError::Oidc {
            details: e.to_string(),
        })?;

    let app_state = Arc::new(AppState::new(stores, oidc_client, config.verification));

    let app = Router::new()
        .route("/verify/{token}", get(auth::verify))
        .route("/auth/callback", get(auth::callback))
        .route("/health", get(auth::health))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .map_err(|e| StartupError::Bind {
            addr: config.listen_addr.clone(),
            details: e.to_string(),
        })?;

    tracing::info!("listening on http://{}", config.listen_addr);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .map_err(|e| StartupError::Serve {
            details: e.to_string(),
        })?;

    Ok(())
}

/// Replaces the custom import overlay with the contents of `path`.
async fn load_custom_import(
    overlay: &PgCustomImportOverlay,
    path: &str,
) -> Result<u64, Report<StartupError>> {
    let import_error = |details: String| StartupError::CustomImport {
        path: path.to_string(),
        details,
    };

    let json = std::fs::read_to_string(path).map_err(|e| import_error(e.to_string()))?;
    let entries = parse_import(&json, &Sha256Hasher).map_err(|e| import_error(e.to_string()))?;
    let count = overlay
        .replace_all(&entries)
        .await
        .map_err(|e| import_error(e.to_string()))?;
    Ok(count)
}

/// Deletes expired verification requests until shutdown.
async fn cleanup_expired_requests(stores: Stores, interval_secs: u64, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            _ = interval.tick() => {}
        }
        match stores
            .verification_requests
            .delete_expired(chrono::Utc::now())
            .await
        {
            Ok(count) if count > 0 => {
                tracing::debug!(deleted_requests = count, "Periodic request cleanup");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Failed to cleanup expired verification requests");
            }
        }
    }
}

/// Resolves on Ctrl-C and tells background tasks to stop.
async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutting down");
    shutdown.cancel();
}
