// =============================================================================
// Ecoledger Backend - Reporting API
// =============================================================================
// Read-only projections over the ledger: due lists, per-party summaries,
// monthly trends, top counterparties, inventory snapshots. Advisory queries;
// missing related parties are labeled "Unknown" rather than failing the
// aggregation.
// =============================================================================

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::db::Database;
use crate::dues::{Due, Tier};
use crate::error::ApiError;
use crate::AppState;

// =============================================================================
// Response Types
// =============================================================================

/// Per-party due totals at one tier.
#[derive(Debug, Serialize)]
pub struct DueSummary {
    pub tier: Tier,
    pub owner_id: String,
    pub total_paise: i64,
    pub paid_paise: i64,
    /// Pending + overdue; what the party still owes.
    pub outstanding_paise: i64,
    pub pending_count: i64,
    pub overdue_count: i64,
    pub paid_count: i64,
}

/// One calendar month of due activity.
#[derive(Debug, Serialize)]
pub struct MonthBucket {
    /// "YYYY-MM"
    pub month: String,
    pub total_paise: i64,
    pub count: i64,
}

/// A seller ranked by consumer transaction volume.
#[derive(Debug, Serialize)]
pub struct Counterparty {
    pub counterparty: String,
    pub transactions: i64,
    pub volume_paise: i64,
}

// =============================================================================
// Queries
// =============================================================================

/// List dues at a tier, optionally filtered by status and owner.
pub async fn list_dues(
    db: &Database,
    tier: Tier,
    status: Option<&str>,
    owner_id: Option<&str>,
) -> Result<Vec<Due>, sqlx::Error> {
    let mut sql = format!("SELECT * FROM {} WHERE 1=1", tier.table());
    if status.is_some() {
        sql.push_str(" AND status = ?");
    }
    if owner_id.is_some() {
        sql.push_str(" AND owner_id = ?");
    }
    sql.push_str(" ORDER BY created_at DESC");

    let mut query = sqlx::query_as::<_, Due>(&sql);
    if let Some(status) = status {
        query = query.bind(status.to_string());
    }
    if let Some(owner_id) = owner_id {
        query = query.bind(owner_id.to_string());
    }
    query.fetch_all(db.pool()).await
}

/// Totals for one party at one tier.
pub async fn due_summary(
    db: &Database,
    tier: Tier,
    owner_id: &str,
) -> Result<DueSummary, sqlx::Error> {
    let sql = format!(
        r#"
        SELECT
            COALESCE(SUM(amount_paise), 0),
            COALESCE(SUM(CASE WHEN status = 'paid' THEN amount_paise ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN status != 'paid' THEN amount_paise ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN status = 'pending' THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN status = 'overdue' THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN status = 'paid' THEN 1 ELSE 0 END), 0)
        FROM {} WHERE owner_id = ?
        "#,
        tier.table()
    );
    let row: (i64, i64, i64, i64, i64, i64) = sqlx::query_as(&sql)
        .bind(owner_id)
        .fetch_one(db.pool())
        .await?;

    Ok(DueSummary {
        tier,
        owner_id: owner_id.to_string(),
        total_paise: row.0,
        paid_paise: row.1,
        outstanding_paise: row.2,
        pending_count: row.3,
        overdue_count: row.4,
        paid_count: row.5,
    })
}

/// Due totals bucketed by calendar month of creation.
pub async fn monthly_trend(
    db: &Database,
    tier: Tier,
    owner_id: &str,
) -> Result<Vec<MonthBucket>, sqlx::Error> {
    let sql = format!(
        r#"
        SELECT strftime('%Y-%m', created_at) AS month, COALESCE(SUM(amount_paise), 0), COUNT(*)
        FROM {} WHERE owner_id = ?
        GROUP BY month ORDER BY month
        "#,
        tier.table()
    );
    let rows: Vec<(String, i64, i64)> = sqlx::query_as(&sql)
        .bind(owner_id)
        .fetch_all(db.pool())
        .await?;

    Ok(rows
        .into_iter()
        .map(|(month, total_paise, count)| MonthBucket {
            month,
            total_paise,
            count,
        })
        .collect())
}

/// Top sellers by consumer transaction volume. Sales with no recorded
/// business land under "Unknown".
pub async fn top_counterparties(
    db: &Database,
    limit: i64,
) -> Result<Vec<Counterparty>, sqlx::Error> {
    let rows: Vec<(String, i64, i64)> = sqlx::query_as(
        r#"
        SELECT COALESCE(business_id, 'Unknown') AS counterparty, COUNT(*), COALESCE(SUM(cost_paid_paise), 0) AS volume
        FROM consumer_transactions
        GROUP BY counterparty
        ORDER BY volume DESC, COUNT(*) DESC
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(db.pool())
    .await?;

    Ok(rows
        .into_iter()
        .map(|(counterparty, transactions, volume_paise)| Counterparty {
            counterparty,
            transactions,
            volume_paise,
        })
        .collect())
}

// =============================================================================
// Handlers
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct DueListQuery {
    pub status: Option<String>,
    pub owner_id: Option<String>,
}

pub async fn list_dues_handler(
    State(state): State<AppState>,
    Path(tier): Path<String>,
    Query(filter): Query<DueListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let tier = parse_tier(&tier)?;
    let dues = list_dues(
        &state.db,
        tier,
        filter.status.as_deref(),
        filter.owner_id.as_deref(),
    )
    .await?;
    Ok(Json(dues))
}

pub async fn get_due_handler(
    State(state): State<AppState>,
    Path((tier, due_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let tier = parse_tier(&tier)?;
    let mut conn = state.db.pool().acquire().await?;
    let due = crate::dues::fetch_due(&mut conn, tier, &due_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("{} due {} not found", tier.as_str(), due_id)))?;
    Ok(Json(due))
}

pub async fn due_summary_handler(
    State(state): State<AppState>,
    Path((tier, owner_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let tier = parse_tier(&tier)?;
    let summary = due_summary(&state.db, tier, &owner_id).await?;
    Ok(Json(summary))
}

pub async fn monthly_trend_handler(
    State(state): State<AppState>,
    Path((tier, owner_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let tier = parse_tier(&tier)?;
    let trend = monthly_trend(&state.db, tier, &owner_id).await?;
    Ok(Json(trend))
}

#[derive(Debug, Deserialize)]
pub struct TopCounterpartiesQuery {
    pub limit: Option<i64>,
}

pub async fn top_counterparties_handler(
    State(state): State<AppState>,
    Query(query): Query<TopCounterpartiesQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = query.limit.unwrap_or(10).clamp(1, 100);
    let top = top_counterparties(&state.db, limit).await?;
    Ok(Json(top))
}

pub async fn inventory_snapshot_handler(
    State(state): State<AppState>,
    Path(retailer_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let items = state.db.get_inventory_for_retailer(&retailer_id).await?;
    Ok(Json(items))
}

fn parse_tier(s: &str) -> Result<Tier, ApiError> {
    Tier::parse(s).ok_or_else(|| ApiError::Validation(format!("unknown tier: {}", s)))
}
