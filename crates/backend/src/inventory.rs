// =============================================================================
// Ecoledger Backend - Inventory Accounting
// =============================================================================
// Computes quantity, cost and plastic-mass deltas for stock movements.
// =============================================================================

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::db::InventoryItem;
use crate::error::ApiError;

/// Kind of stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    /// Units leaving stock to a buyer; fails hard rather than going negative.
    Purchase,
    /// Units coming back into stock.
    Return,
    /// Absolute set, used for corrections.
    Adjustment,
}

/// Inventory status derived from quantity.
pub fn derive_status(quantity: i64) -> &'static str {
    if quantity == 0 {
        "out_of_stock"
    } else {
        "available"
    }
}

/// Apply a stock movement to an inventory item and return the updated row.
///
/// Purchases that would drive the quantity below zero are rejected with
/// `InsufficientStock` and write nothing; there is no clamping.
pub async fn apply_inventory_movement(
    conn: &mut SqliteConnection,
    inventory_id: &str,
    delta: i64,
    kind: MovementKind,
) -> Result<InventoryItem, ApiError> {
    if delta < 0 {
        return Err(ApiError::Validation(format!(
            "movement delta must be non-negative, got {}",
            delta
        )));
    }
    if kind == MovementKind::Purchase && delta == 0 {
        return Err(ApiError::Validation("purchase quantity must be positive".into()));
    }

    let item: InventoryItem = sqlx::query_as("SELECT * FROM inventory WHERE id = ?")
        .bind(inventory_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("inventory item {} not found", inventory_id)))?;

    let new_quantity = match kind {
        MovementKind::Purchase => {
            let remaining = item.quantity - delta;
            if remaining < 0 {
                return Err(ApiError::InsufficientStock {
                    available: item.quantity,
                    requested: delta,
                });
            }
            remaining
        }
        MovementKind::Return => item.quantity + delta,
        MovementKind::Adjustment => delta,
    };

    sqlx::query("UPDATE inventory SET quantity = ?, status = ?, updated_at = ? WHERE id = ?")
        .bind(new_quantity)
        .bind(derive_status(new_quantity))
        .bind(Utc::now().to_rfc3339())
        .bind(inventory_id)
        .execute(&mut *conn)
        .await?;

    let updated = sqlx::query_as("SELECT * FROM inventory WHERE id = ?")
        .bind(inventory_id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(updated)
}

/// Fields for a new inventory row created on first stock-in.
pub struct NewInventoryItem<'a> {
    pub retailer_id: &'a str,
    pub company_id: Option<&'a str>,
    pub name: &'a str,
    pub quantity: i64,
    pub unit_price_paise: i64,
    pub plastic_grams_per_unit: i64,
    pub plastic_cost_per_gram_paise: i64,
}

/// Create an inventory row (first stock-in of an item). The total plastic
/// cost per unit is derived, never supplied.
pub async fn create_inventory_item(
    conn: &mut SqliteConnection,
    new: NewInventoryItem<'_>,
) -> Result<InventoryItem, ApiError> {
    if new.quantity < 0 {
        return Err(ApiError::Validation("initial quantity must be non-negative".into()));
    }

    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();
    let total_plastic_cost = new
        .plastic_grams_per_unit
        .checked_mul(new.plastic_cost_per_gram_paise)
        .ok_or_else(|| {
            ApiError::Validation("plastic cost per unit overflows the paise range".into())
        })?;

    sqlx::query(
        r#"
        INSERT INTO inventory (id, retailer_id, company_id, name, quantity, unit_price_paise,
                               plastic_grams_per_unit, plastic_cost_per_gram_paise,
                               total_plastic_cost_paise, status, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(new.retailer_id)
    .bind(new.company_id)
    .bind(new.name)
    .bind(new.quantity)
    .bind(new.unit_price_paise)
    .bind(new.plastic_grams_per_unit)
    .bind(new.plastic_cost_per_gram_paise)
    .bind(total_plastic_cost)
    .bind(derive_status(new.quantity))
    .bind(&now)
    .bind(&now)
    .execute(&mut *conn)
    .await?;

    let item = sqlx::query_as("SELECT * FROM inventory WHERE id = ?")
        .bind(&id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(item)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_follows_quantity() {
        assert_eq!(derive_status(0), "out_of_stock");
        assert_eq!(derive_status(1), "available");
        assert_eq!(derive_status(500), "available");
    }
}
