// =============================================================================
// Ecoledger Backend - Database Layer
// =============================================================================
// Table of Contents:
// 1. Database pool wrapper
// 2. Row models (inventory + transaction logs)
// 3. Migrations
// 4. Inventory methods
// 5. Business/retailer membership methods
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};

use crate::dues::Tier;

// -----------------------------------------------------------------------------
// 1. Database pool wrapper
// -----------------------------------------------------------------------------

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

// -----------------------------------------------------------------------------
// 2. Row models
// -----------------------------------------------------------------------------

/// Inventory item owned by a retailer. Rows are never hard-deleted;
/// depletion is reflected in `status`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct InventoryItem {
    pub id: String,
    pub retailer_id: String,
    /// Manufacturing company, when known. Used for retailer→company
    /// due resolution.
    pub company_id: Option<String>,
    pub name: String,
    pub quantity: i64,
    pub unit_price_paise: i64,
    pub plastic_grams_per_unit: i64,
    pub plastic_cost_per_gram_paise: i64,
    /// Derived: plastic_grams_per_unit × plastic_cost_per_gram_paise.
    pub total_plastic_cost_paise: i64,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Consumer-facing sale. A positive disposal fee on one of these is what
/// originates a root consumer due.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ConsumerTransaction {
    pub id: String,
    pub buyer_id: String,
    /// The selling business, when the sale went through one. Nullable:
    /// consumers can buy straight from a retailer-run counter.
    pub business_id: Option<String>,
    pub inventory_id: String,
    pub cost_paid_paise: i64,
    pub plastic_disposal_fee_paise: i64,
    pub created_at: DateTime<Utc>,
}

/// Business-side inventory purchase (a business stocking up from a retailer).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BusinessTransaction {
    pub id: String,
    pub business_id: String,
    pub inventory_id: String,
    pub quantity: i64,
    pub unit_price_paise: i64,
    pub plastic_grams: i64,
    pub plastic_cost_per_gram_paise: i64,
    pub total_plastic_cost_paise: i64,
    pub created_at: DateTime<Utc>,
}

/// Retailer→company direct stock purchase; seeds the direct due pair.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CollectionTransaction {
    pub id: String,
    pub retailer_id: String,
    pub company_id: String,
    pub quantity: i64,
    pub disposal_cost_per_unit_paise: i64,
    pub total_disposal_cost_paise: i64,
    pub created_at: DateTime<Utc>,
}

impl Database {
    /// Create a new database connection pool.
    pub async fn new(url: &str) -> Result<Self, sqlx::Error> {
        // Add create_if_missing option for SQLite
        let url_with_options = if url.starts_with("sqlite:") && !url.contains("?") {
            format!("{}?mode=rwc", url)
        } else if url.starts_with("sqlite:") && !url.contains("mode=") {
            format!("{}&mode=rwc", url)
        } else {
            url.to_string()
        };

        // An in-memory SQLite database exists per connection; a single
        // connection keeps every query on the same database.
        let max_connections = if url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(&url_with_options)
            .await?;

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    // -------------------------------------------------------------------------
    // 3. Migrations
    // -------------------------------------------------------------------------

    /// Run database migrations.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        // One obligation table per tier, linked by single-parent foreign keys
        // to the tier below. Identical shape, so one DDL template.
        for tier in Tier::ALL {
            let ddl = format!(
                r#"
                CREATE TABLE IF NOT EXISTS {table} (
                    id TEXT PRIMARY KEY,
                    owner_id TEXT NOT NULL,
                    parent_due_id TEXT,
                    origin_ref TEXT,
                    amount_paise INTEGER NOT NULL CHECK (amount_paise >= 0),
                    due_date TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'pending',
                    source_type TEXT NOT NULL,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                )
                "#,
                table = tier.table()
            );
            sqlx::query(&ddl).execute(&self.pool).await?;

            let idx_sweep = format!(
                "CREATE INDEX IF NOT EXISTS idx_{table}_status_due ON {table}(status, due_date)",
                table = tier.table()
            );
            sqlx::query(&idx_sweep).execute(&self.pool).await?;

            let idx_owner = format!(
                "CREATE INDEX IF NOT EXISTS idx_{table}_owner ON {table}(owner_id)",
                table = tier.table()
            );
            sqlx::query(&idx_owner).execute(&self.pool).await?;
        }

        // Inventory table
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS inventory (
                id TEXT PRIMARY KEY,
                retailer_id TEXT NOT NULL,
                company_id TEXT,
                name TEXT NOT NULL,
                quantity INTEGER NOT NULL DEFAULT 0 CHECK (quantity >= 0),
                unit_price_paise INTEGER NOT NULL DEFAULT 0,
                plastic_grams_per_unit INTEGER NOT NULL DEFAULT 0,
                plastic_cost_per_gram_paise INTEGER NOT NULL DEFAULT 0,
                total_plastic_cost_paise INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'available',
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Consumer sales
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS consumer_transactions (
                id TEXT PRIMARY KEY,
                buyer_id TEXT NOT NULL,
                business_id TEXT,
                inventory_id TEXT NOT NULL REFERENCES inventory(id),
                cost_paid_paise INTEGER NOT NULL,
                plastic_disposal_fee_paise INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Business-side inventory purchases
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS business_transactions (
                id TEXT PRIMARY KEY,
                business_id TEXT NOT NULL,
                inventory_id TEXT NOT NULL REFERENCES inventory(id),
                quantity INTEGER NOT NULL,
                unit_price_paise INTEGER NOT NULL DEFAULT 0,
                plastic_grams INTEGER NOT NULL DEFAULT 0,
                plastic_cost_per_gram_paise INTEGER NOT NULL DEFAULT 0,
                total_plastic_cost_paise INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Retailer→company direct stock purchases
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS collection_transactions (
                id TEXT PRIMARY KEY,
                retailer_id TEXT NOT NULL,
                company_id TEXT NOT NULL,
                quantity INTEGER NOT NULL,
                disposal_cost_per_unit_paise INTEGER NOT NULL,
                total_disposal_cost_paise INTEGER NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Business↔retailer membership (replaces a mutable id-array on the
        // retailer row; queried for business→retailer due resolution)
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS retailer_businesses (
                business_id TEXT NOT NULL,
                retailer_id TEXT NOT NULL,
                established_at TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (business_id, retailer_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Indexes for resolution and reporting paths
        let _ = sqlx::query("CREATE INDEX IF NOT EXISTS idx_inventory_retailer ON inventory(retailer_id)")
            .execute(&self.pool)
            .await;
        let _ = sqlx::query("CREATE INDEX IF NOT EXISTS idx_consumer_txn_business ON consumer_transactions(business_id)")
            .execute(&self.pool)
            .await;
        let _ = sqlx::query("CREATE INDEX IF NOT EXISTS idx_business_txn_business ON business_transactions(business_id)")
            .execute(&self.pool)
            .await;

        tracing::info!("Database migrations complete");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // 4. Inventory methods
    // -------------------------------------------------------------------------

    /// Find inventory item by ID.
    pub async fn find_inventory_by_id(&self, id: &str) -> Result<Option<InventoryItem>, sqlx::Error> {
        sqlx::query_as::<_, InventoryItem>("SELECT * FROM inventory WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Get a retailer's inventory snapshot.
    pub async fn get_inventory_for_retailer(
        &self,
        retailer_id: &str,
    ) -> Result<Vec<InventoryItem>, sqlx::Error> {
        sqlx::query_as::<_, InventoryItem>(
            "SELECT * FROM inventory WHERE retailer_id = ? ORDER BY updated_at DESC",
        )
        .bind(retailer_id)
        .fetch_all(&self.pool)
        .await
    }

    // -------------------------------------------------------------------------
    // 5. Business/retailer membership methods
    // -------------------------------------------------------------------------

    /// Register a business↔retailer link. Idempotent.
    pub async fn register_business_link(
        &self,
        retailer_id: &str,
        business_id: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO retailer_businesses (business_id, retailer_id, established_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(business_id)
        .bind(retailer_id)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
