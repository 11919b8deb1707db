// =============================================================================
// Ecoledger Backend - Overdue Sweeper
// =============================================================================
// Marks pending dues whose due_date has passed as overdue. Pure bulk update;
// moving to overdue never cascades, only settle does.
// =============================================================================

use axum::{extract::State, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::Database;
use crate::dues::Tier;
use crate::error::ApiError;
use crate::AppState;

/// Rows marked overdue per tier by one sweep.
#[derive(Debug, Default, Serialize)]
pub struct SweepReport {
    pub as_of: Option<DateTime<Utc>>,
    pub consumer: u64,
    pub business: u64,
    pub retailer: u64,
    pub company: u64,
}

impl SweepReport {
    pub fn total(&self) -> u64 {
        self.consumer + self.business + self.retailer + self.company
    }
}

/// Mark every pending due with due_date before `as_of` as overdue.
/// Idempotent: a second sweep with the same `as_of` changes nothing.
pub async fn sweep_overdue(db: &Database, as_of: DateTime<Utc>) -> Result<SweepReport, sqlx::Error> {
    let mut report = SweepReport {
        as_of: Some(as_of),
        ..Default::default()
    };

    for tier in Tier::ALL {
        let sql = format!(
            "UPDATE {} SET status = 'overdue', updated_at = ? WHERE status = 'pending' AND due_date < ?",
            tier.table()
        );
        let marked = sqlx::query(&sql)
            .bind(Utc::now().to_rfc3339())
            .bind(as_of.to_rfc3339())
            .execute(db.pool())
            .await?
            .rows_affected();

        match tier {
            Tier::Consumer => report.consumer = marked,
            Tier::Business => report.business = marked,
            Tier::Retailer => report.retailer = marked,
            Tier::Company => report.company = marked,
        }
    }

    if report.total() > 0 {
        tracing::info!(
            consumer = report.consumer,
            business = report.business,
            retailer = report.retailer,
            company = report.company,
            "Marked dues overdue"
        );
    }

    Ok(report)
}

#[derive(Debug, Default, Deserialize)]
pub struct SweepRequest {
    /// Cutoff for the sweep; defaults to now.
    pub as_of: Option<DateTime<Utc>>,
}

/// Trigger a sweep. Stateless, safe to call from an external cron.
pub async fn sweep_handler(
    State(state): State<AppState>,
    body: Option<Json<SweepRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let as_of = body.and_then(|Json(b)| b.as_of).unwrap_or_else(Utc::now);
    let report = sweep_overdue(&state.db, as_of).await?;
    Ok(Json(report))
}

/// Background sweep loop, spawned when SWEEP_INTERVAL_SECS is configured.
/// Deployments with an external cron hit POST /api/dues/sweep instead.
pub async fn run_periodic_sweeper(db: Database, interval_secs: u64) {
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
    loop {
        ticker.tick().await;
        if let Err(e) = sweep_overdue(&db, Utc::now()).await {
            tracing::error!("Overdue sweep failed: {:?}", e);
        }
    }
}
