// =============================================================================
// Ecoledger Backend - Disposal-Due Cascade Service
// =============================================================================
// Tracks disposal obligations cascading through the four-tier supply chain
// (consumer → business → retailer → company) as payments propagate upward.
// Table of Contents:
// 1. Modules
// 2. Application State
// 3. Router Setup
// =============================================================================

pub mod config;
pub mod db;
pub mod dues;
pub mod error;
pub mod inventory;
pub mod purchases;
pub mod reports;
pub mod sweeper;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::db::Database;

// -----------------------------------------------------------------------------
// 2. Application State
// -----------------------------------------------------------------------------

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Database,
}

// -----------------------------------------------------------------------------
// 3. Router Setup
// -----------------------------------------------------------------------------

pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(|| async { "OK" }))
        // Purchase recording (each originates its part of the due chain)
        .route("/api/purchases/consumer", post(purchases::consumer_purchase_handler))
        .route("/api/purchases/business", post(purchases::business_purchase_handler))
        .route(
            "/api/purchases/retailer-company",
            post(purchases::retailer_company_purchase_handler),
        )
        // Dues
        .route("/api/dues/sweep", post(sweeper::sweep_handler))
        .route("/api/dues/:tier", get(reports::list_dues_handler))
        .route("/api/dues/:tier/:id", get(reports::get_due_handler))
        .route("/api/dues/:tier/:id/settle", post(purchases::settle_due_handler))
        // Membership for business→retailer resolution
        .route(
            "/api/retailers/:id/businesses",
            post(purchases::register_business_handler),
        )
        // Reports
        .route(
            "/api/reports/summary/:tier/:owner_id",
            get(reports::due_summary_handler),
        )
        .route(
            "/api/reports/trend/:tier/:owner_id",
            get(reports::monthly_trend_handler),
        )
        .route(
            "/api/reports/top-counterparties",
            get(reports::top_counterparties_handler),
        )
        .route(
            "/api/inventory/retailer/:retailer_id",
            get(reports::inventory_snapshot_handler),
        )
        .route(
            "/api/inventory/:id/movement",
            post(purchases::inventory_movement_handler),
        )
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
