// =============================================================================
// Ecoledger Backend - API Server Entry Point
// =============================================================================

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ecoledger_backend::config::Config;
use ecoledger_backend::db::Database;
use ecoledger_backend::{create_router, sweeper, AppState};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables from multiple possible locations
    if dotenvy::dotenv().is_err() {
        let _ = dotenvy::from_filename("crates/backend/.env");
    }

    // Load configuration
    let config = Config::from_env()?;
    let bind_addr = config.bind_address.clone();

    // Ensure database directory exists for SQLite
    if config.database_url.starts_with("sqlite:") {
        let db_path = config.database_url.trim_start_matches("sqlite:");
        if let Some(parent) = std::path::Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).ok();
            }
        }
    }

    // Initialize database
    let db = Database::new(&config.database_url).await?;
    db.run_migrations().await?;

    // Optional in-process overdue sweeper
    if let Some(interval_secs) = config.sweep_interval_secs {
        tokio::spawn(sweeper::run_periodic_sweeper(db.clone(), interval_secs));
        tracing::info!("Overdue sweeper running every {}s", interval_secs);
    }

    // Create app state
    let state = AppState {
        config: Arc::new(config),
        db,
    };

    // Build router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("🚀 Ecoledger API Server running on http://{}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
