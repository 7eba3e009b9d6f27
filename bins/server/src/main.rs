//! SmartHub API Server
//!
//! Main entry point for the SmartHub storage gateway.

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use smarthub_api::{AppState, create_router};
use smarthub_core::storage::{S3Repository, StorageService, StorageType, s3_client};
use smarthub_shared::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "smarthub=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = AppConfig::load()?;

    // Build the storage registry
    let client = s3_client(&config.s3).await;
    let scratch_root = config.storage.scratch_root();
    info!(scratch_root = %scratch_root.display(), "Download scratch directory");

    let storage = StorageService::builder()
        .register(
            StorageType::S3,
            Arc::new(S3Repository::new(client, scratch_root)),
        )
        .build();

    // Create application state
    let state = AppState {
        storage: Arc::new(storage),
    };

    // Create router
    let app = create_router(state, config.server.max_upload_bytes);

    // Start server
    let addr = config.server.bind_address();
    let listener = TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
