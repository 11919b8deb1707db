// =============================================================================
// Ecoledger Backend - Purchase Recording API
// =============================================================================
// Inbound operations at the boundary with the UI shell. Each multi-step flow
// (accounting + transaction log + due creation) runs in one transaction; a
// failed step rolls the whole operation back.
// =============================================================================

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::db::{BusinessTransaction, CollectionTransaction, ConsumerTransaction, Database, InventoryItem};
use crate::dues::{self, Due, Tier};
use crate::error::ApiError;
use crate::inventory::{self, MovementKind, NewInventoryItem};
use crate::AppState;

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ConsumerPurchaseRequest {
    pub buyer_id: String,
    pub inventory_id: String,
    /// The selling business, when the sale went through one.
    pub business_id: Option<String>,
    pub cost_paid_paise: i64,
    #[serde(default)]
    pub disposal_fee_paise: i64,
}

#[derive(Debug, Serialize)]
pub struct ConsumerPurchaseResponse {
    pub transaction: ConsumerTransaction,
    /// Present when the sale carried a positive disposal fee.
    pub due: Option<Due>,
}

#[derive(Debug, Deserialize)]
pub struct BusinessPurchaseRequest {
    pub business_id: String,
    pub inventory_id: String,
    pub quantity: i64,
    pub unit_price_paise: i64,
    /// Total plastic mass across the purchase, in grams.
    #[serde(default)]
    pub plastic_grams: i64,
    #[serde(default)]
    pub plastic_cost_per_gram_paise: i64,
}

#[derive(Debug, Serialize)]
pub struct BusinessPurchaseResponse {
    pub transaction: BusinessTransaction,
    pub due: Option<Due>,
}

#[derive(Debug, Deserialize)]
pub struct RetailerCompanyPurchaseRequest {
    pub retailer_id: String,
    pub company_id: String,
    pub quantity: i64,
    pub disposal_cost_per_unit_paise: i64,
    /// Existing inventory row to top up; a new row is created when absent.
    pub inventory_id: Option<String>,
    pub name: Option<String>,
    #[serde(default)]
    pub unit_price_paise: i64,
    #[serde(default)]
    pub plastic_grams_per_unit: i64,
    #[serde(default)]
    pub plastic_cost_per_gram_paise: i64,
}

#[derive(Debug, Serialize)]
pub struct RetailerCompanyPurchaseResponse {
    pub transaction: CollectionTransaction,
    pub inventory: InventoryItem,
    pub retailer_due: Option<Due>,
    pub company_due: Option<Due>,
}

// =============================================================================
// Core operations
// =============================================================================

/// Record a consumer sale: one unit leaves stock, the sale is logged, and a
/// positive disposal fee originates the root consumer due.
pub async fn record_consumer_purchase(
    db: &Database,
    req: ConsumerPurchaseRequest,
) -> Result<ConsumerPurchaseResponse, ApiError> {
    if req.cost_paid_paise <= 0 {
        return Err(ApiError::Validation("cost_paid_paise must be positive".into()));
    }
    if req.disposal_fee_paise < 0 {
        return Err(ApiError::Validation("disposal_fee_paise must be non-negative".into()));
    }

    let mut tx = db.pool().begin().await?;

    inventory::apply_inventory_movement(&mut tx, &req.inventory_id, 1, MovementKind::Purchase).await?;

    let txn = insert_consumer_transaction(&mut tx, &req).await?;

    let due = if req.disposal_fee_paise > 0 {
        Some(
            dues::open_root_due(
                &mut tx,
                Tier::Consumer,
                &req.buyer_id,
                Some(&txn.id),
                req.disposal_fee_paise,
            )
            .await?,
        )
    } else {
        None
    };

    tx.commit().await?;

    Ok(ConsumerPurchaseResponse { transaction: txn, due })
}

/// Record a business stocking up from a retailer: quantity leaves stock, the
/// purchase is logged with its plastic totals, and the plastic cost opens a
/// root business due (the chain starting at a non-root tier).
pub async fn record_business_purchase(
    db: &Database,
    req: BusinessPurchaseRequest,
) -> Result<BusinessPurchaseResponse, ApiError> {
    if req.quantity <= 0 {
        return Err(ApiError::Validation("quantity must be positive".into()));
    }
    if req.unit_price_paise < 0 || req.plastic_grams < 0 || req.plastic_cost_per_gram_paise < 0 {
        return Err(ApiError::Validation("prices and plastic figures must be non-negative".into()));
    }

    let plastic_cost_paise = req
        .plastic_grams
        .checked_mul(req.plastic_cost_per_gram_paise)
        .ok_or_else(|| ApiError::Validation("plastic cost overflows the paise range".into()))?;

    let mut tx = db.pool().begin().await?;

    inventory::apply_inventory_movement(&mut tx, &req.inventory_id, req.quantity, MovementKind::Purchase)
        .await?;

    let txn = insert_business_transaction(&mut tx, &req, plastic_cost_paise).await?;

    let due = if plastic_cost_paise > 0 {
        Some(
            dues::open_root_due(
                &mut tx,
                Tier::Business,
                &req.business_id,
                Some(&txn.id),
                plastic_cost_paise,
            )
            .await?,
        )
    } else {
        None
    };

    tx.commit().await?;

    Ok(BusinessPurchaseResponse { transaction: txn, due })
}

/// Record a retailer buying material directly from a company: inventory is
/// stocked in, the collection is logged, and the disposal cost opens the
/// direct retailer/company due pair, with no consumer or business dues.
pub async fn record_retailer_company_purchase(
    db: &Database,
    req: RetailerCompanyPurchaseRequest,
) -> Result<RetailerCompanyPurchaseResponse, ApiError> {
    if req.quantity <= 0 {
        return Err(ApiError::Validation("quantity must be positive".into()));
    }
    if req.disposal_cost_per_unit_paise < 0 {
        return Err(ApiError::Validation(
            "disposal_cost_per_unit_paise must be non-negative".into(),
        ));
    }

    let total_disposal_cost = req
        .quantity
        .checked_mul(req.disposal_cost_per_unit_paise)
        .ok_or_else(|| ApiError::Validation("disposal cost overflows the paise range".into()))?;

    let mut tx = db.pool().begin().await?;

    let item = match &req.inventory_id {
        Some(inventory_id) => {
            let item =
                inventory::apply_inventory_movement(&mut tx, inventory_id, req.quantity, MovementKind::Return)
                    .await?;
            if item.retailer_id != req.retailer_id {
                return Err(ApiError::Validation(format!(
                    "inventory item {} does not belong to retailer {}",
                    inventory_id, req.retailer_id
                )));
            }
            item
        }
        None => {
            inventory::create_inventory_item(
                &mut tx,
                NewInventoryItem {
                    retailer_id: &req.retailer_id,
                    company_id: Some(&req.company_id),
                    name: req.name.as_deref().unwrap_or("material"),
                    quantity: req.quantity,
                    unit_price_paise: req.unit_price_paise,
                    plastic_grams_per_unit: req.plastic_grams_per_unit,
                    plastic_cost_per_gram_paise: req.plastic_cost_per_gram_paise,
                },
            )
            .await?
        }
    };

    let txn = insert_collection_transaction(&mut tx, &req, total_disposal_cost).await?;

    let (retailer_due, company_due) = if total_disposal_cost > 0 {
        let (r, c) = dues::open_direct_retailer_company_dues(
            &mut tx,
            &req.retailer_id,
            &req.company_id,
            total_disposal_cost,
            &txn.id,
        )
        .await?;
        (Some(r), Some(c))
    } else {
        (None, None)
    };

    tx.commit().await?;

    Ok(RetailerCompanyPurchaseResponse {
        transaction: txn,
        inventory: item,
        retailer_due,
        company_due,
    })
}

// =============================================================================
// Transaction-log inserts
// =============================================================================

async fn insert_consumer_transaction(
    conn: &mut SqliteConnection,
    req: &ConsumerPurchaseRequest,
) -> Result<ConsumerTransaction, sqlx::Error> {
    let id = Uuid::new_v4().to_string();
    sqlx::query(
        r#"
        INSERT INTO consumer_transactions (id, buyer_id, business_id, inventory_id, cost_paid_paise, plastic_disposal_fee_paise, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&req.buyer_id)
    .bind(&req.business_id)
    .bind(&req.inventory_id)
    .bind(req.cost_paid_paise)
    .bind(req.disposal_fee_paise)
    .bind(Utc::now().to_rfc3339())
    .execute(&mut *conn)
    .await?;

    sqlx::query_as("SELECT * FROM consumer_transactions WHERE id = ?")
        .bind(&id)
        .fetch_one(conn)
        .await
}

async fn insert_business_transaction(
    conn: &mut SqliteConnection,
    req: &BusinessPurchaseRequest,
    plastic_cost_paise: i64,
) -> Result<BusinessTransaction, sqlx::Error> {
    let id = Uuid::new_v4().to_string();
    sqlx::query(
        r#"
        INSERT INTO business_transactions (id, business_id, inventory_id, quantity, unit_price_paise, plastic_grams, plastic_cost_per_gram_paise, total_plastic_cost_paise, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&req.business_id)
    .bind(&req.inventory_id)
    .bind(req.quantity)
    .bind(req.unit_price_paise)
    .bind(req.plastic_grams)
    .bind(req.plastic_cost_per_gram_paise)
    .bind(plastic_cost_paise)
    .bind(Utc::now().to_rfc3339())
    .execute(&mut *conn)
    .await?;

    sqlx::query_as("SELECT * FROM business_transactions WHERE id = ?")
        .bind(&id)
        .fetch_one(conn)
        .await
}

async fn insert_collection_transaction(
    conn: &mut SqliteConnection,
    req: &RetailerCompanyPurchaseRequest,
    total_disposal_cost: i64,
) -> Result<CollectionTransaction, sqlx::Error> {
    let id = Uuid::new_v4().to_string();
    sqlx::query(
        r#"
        INSERT INTO collection_transactions (id, retailer_id, company_id, quantity, disposal_cost_per_unit_paise, total_disposal_cost_paise, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&req.retailer_id)
    .bind(&req.company_id)
    .bind(req.quantity)
    .bind(req.disposal_cost_per_unit_paise)
    .bind(total_disposal_cost)
    .bind(Utc::now().to_rfc3339())
    .execute(&mut *conn)
    .await?;

    sqlx::query_as("SELECT * FROM collection_transactions WHERE id = ?")
        .bind(&id)
        .fetch_one(conn)
        .await
}

// =============================================================================
// Handlers
// =============================================================================

pub async fn consumer_purchase_handler(
    State(state): State<AppState>,
    Json(req): Json<ConsumerPurchaseRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = record_consumer_purchase(&state.db, req).await?;
    Ok(Json(outcome))
}

pub async fn business_purchase_handler(
    State(state): State<AppState>,
    Json(req): Json<BusinessPurchaseRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = record_business_purchase(&state.db, req).await?;
    Ok(Json(outcome))
}

pub async fn retailer_company_purchase_handler(
    State(state): State<AppState>,
    Json(req): Json<RetailerCompanyPurchaseRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = record_retailer_company_purchase(&state.db, req).await?;
    Ok(Json(outcome))
}

/// Pay a due. The cascade outcome rides along in the response so the caller
/// can tell a spawned next-tier due from chain completion or an unresolved
/// party.
pub async fn settle_due_handler(
    State(state): State<AppState>,
    Path((tier, due_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let tier = Tier::parse(&tier)
        .ok_or_else(|| ApiError::Validation(format!("unknown tier: {}", tier)))?;
    let outcome = dues::settle(&state.db, tier, &due_id).await?;
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
pub struct InventoryMovementRequest {
    pub delta: i64,
    pub kind: MovementKind,
}

/// Apply a stock movement directly (returns and corrections; sales go
/// through the purchase endpoints so the due side stays consistent).
pub async fn inventory_movement_handler(
    State(state): State<AppState>,
    Path(inventory_id): Path<String>,
    Json(req): Json<InventoryMovementRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut tx = state.db.pool().begin().await?;
    let item =
        inventory::apply_inventory_movement(&mut tx, &inventory_id, req.delta, req.kind).await?;
    tx.commit().await?;
    Ok(Json(item))
}

#[derive(Debug, Deserialize)]
pub struct RegisterBusinessRequest {
    pub business_id: String,
}

/// Link a business to a retailer for due resolution. Idempotent.
pub async fn register_business_handler(
    State(state): State<AppState>,
    Path(retailer_id): Path<String>,
    Json(req): Json<RegisterBusinessRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .db
        .register_business_link(&retailer_id, &req.business_id)
        .await?;
    Ok(Json(serde_json::json!({
        "retailer_id": retailer_id,
        "business_id": req.business_id,
    })))
}
