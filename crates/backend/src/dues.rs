// =============================================================================
// Ecoledger Backend - Due Cascade Engine
// =============================================================================
// Table of Contents:
// 1. Tier (the four cascading levels of the obligation chain)
// 2. Due / NewDue (obligation row model)
// 3. Row helpers (insert/fetch against a tier's table)
// 4. open_root_due (originate a chain)
// 5. settle (pay a due and fire the cascade)
// 6. Party resolution policies
// 7. open_direct_retailer_company_dues (the short-circuit path)
// =============================================================================

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::db::Database;
use crate::error::ApiError;

// -----------------------------------------------------------------------------
// 1. Tier
// -----------------------------------------------------------------------------

/// A level of the disposal-due chain, leaf to root:
/// consumer → business → retailer → company.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Consumer,
    Business,
    Retailer,
    Company,
}

impl Tier {
    pub const ALL: [Tier; 4] = [Tier::Consumer, Tier::Business, Tier::Retailer, Tier::Company];

    /// Obligation table for this tier.
    pub fn table(self) -> &'static str {
        match self {
            Tier::Consumer => "consumer_dues",
            Tier::Business => "business_dues",
            Tier::Retailer => "retailer_dues",
            Tier::Company => "company_dues",
        }
    }

    /// The tier one level up, or None at the top of the chain.
    pub fn next(self) -> Option<Tier> {
        match self {
            Tier::Consumer => Some(Tier::Business),
            Tier::Business => Some(Tier::Retailer),
            Tier::Retailer => Some(Tier::Company),
            Tier::Company => None,
        }
    }

    /// Payment window for chain-derived dues at this tier, in days.
    pub fn chain_offset_days(self) -> i64 {
        match self {
            Tier::Consumer => 30,
            Tier::Business => 15,
            Tier::Retailer => 10,
            Tier::Company => 7,
        }
    }

    pub fn parse(s: &str) -> Option<Tier> {
        match s {
            "consumer" => Some(Tier::Consumer),
            "business" => Some(Tier::Business),
            "retailer" => Some(Tier::Retailer),
            "company" => Some(Tier::Company),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Consumer => "consumer",
            Tier::Business => "business",
            Tier::Retailer => "retailer",
            Tier::Company => "company",
        }
    }
}

/// Payment windows for the direct retailer→company purchase path, in days.
pub const DIRECT_RETAILER_OFFSET_DAYS: i64 = 30;
pub const DIRECT_COMPANY_OFFSET_DAYS: i64 = 37;

// Source-type tags. Cascade-derived tags record how the next-tier party was
// found; they also select cascade behavior on settle (a "company_purchase"
// retailer due already has its company due and must not spawn another).
pub const SOURCE_ORIGIN: &str = "origin";
pub const SOURCE_SALE_TRANSACTION: &str = "sale_transaction";
pub const SOURCE_BUSINESS_CHAIN: &str = "business_chain";
pub const SOURCE_PURCHASE_HISTORY: &str = "purchase_history";
pub const SOURCE_INVENTORY_LINK: &str = "inventory_link";
pub const SOURCE_COMPANY_PURCHASE: &str = "company_purchase";
pub const SOURCE_DIRECT_PURCHASE: &str = "direct_purchase";

// -----------------------------------------------------------------------------
// 2. Due / NewDue
// -----------------------------------------------------------------------------

/// Obligation row, identical across the four tier tables.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Due {
    pub id: String,
    pub owner_id: String,
    /// The due one tier below that spawned this one; null for origination
    /// points (roots and direct-purchase retailer dues).
    pub parent_due_id: Option<String>,
    /// Originating transaction id, carried down the chain for party
    /// resolution and audit.
    pub origin_ref: Option<String>,
    pub amount_paise: i64,
    pub due_date: DateTime<Utc>,
    /// "pending" | "paid" | "overdue". Paid is terminal.
    pub status: String,
    pub source_type: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for a due about to be inserted. The due date is derived inside the
/// insert from one creation timestamp, so due_date minus created_at is exactly
/// the offset.
pub struct NewDue {
    pub owner_id: String,
    pub parent_due_id: Option<String>,
    pub origin_ref: Option<String>,
    pub amount_paise: i64,
    pub due_offset_days: i64,
    pub source_type: &'static str,
}

/// What happened one tier up when a due was settled.
#[derive(Debug, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CascadeOutcome {
    /// A pending due was opened at the next tier.
    Spawned { tier: Tier, due: Due },
    /// Nothing above this due is owed: either the company tier was reached,
    /// or a direct-purchase pair already carries the upstream obligation.
    ChainComplete,
    /// No next-tier party could be determined. The payment stands; the chain
    /// ends here without a successor.
    Unresolved,
}

/// Result of a settle call: the paid due plus the cascade outcome.
#[derive(Debug, Serialize)]
pub struct SettleOutcome {
    pub tier: Tier,
    pub due: Due,
    pub cascade: CascadeOutcome,
}

// -----------------------------------------------------------------------------
// 3. Row helpers
// -----------------------------------------------------------------------------

/// Fetch a due by id from a tier's table.
pub async fn fetch_due(
    conn: &mut SqliteConnection,
    tier: Tier,
    id: &str,
) -> Result<Option<Due>, sqlx::Error> {
    let sql = format!("SELECT * FROM {} WHERE id = ?", tier.table());
    sqlx::query_as::<_, Due>(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await
}

/// Insert a pending due into a tier's table and return the stored row.
pub async fn insert_due(
    conn: &mut SqliteConnection,
    tier: Tier,
    new: NewDue,
) -> Result<Due, sqlx::Error> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now();
    let due_date = now + Duration::days(new.due_offset_days);

    let sql = format!(
        r#"
        INSERT INTO {} (id, owner_id, parent_due_id, origin_ref, amount_paise, due_date, status, source_type, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, 'pending', ?, ?, ?)
        "#,
        tier.table()
    );
    sqlx::query(&sql)
        .bind(&id)
        .bind(&new.owner_id)
        .bind(&new.parent_due_id)
        .bind(&new.origin_ref)
        .bind(new.amount_paise)
        .bind(due_date.to_rfc3339())
        .bind(new.source_type)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&mut *conn)
        .await?;

    fetch_due(conn, tier, &id)
        .await?
        .ok_or(sqlx::Error::RowNotFound)
}

// -----------------------------------------------------------------------------
// 4. open_root_due
// -----------------------------------------------------------------------------

/// Originate a chain at the given tier: a pending due with no parent and the
/// tier's chain payment window. The chain may start at any tier (a business
/// purchase opens a root business due directly).
pub async fn open_root_due(
    conn: &mut SqliteConnection,
    tier: Tier,
    owner_id: &str,
    origin_ref: Option<&str>,
    amount_paise: i64,
) -> Result<Due, sqlx::Error> {
    insert_due(
        conn,
        tier,
        NewDue {
            owner_id: owner_id.to_string(),
            parent_due_id: None,
            origin_ref: origin_ref.map(str::to_string),
            amount_paise,
            due_offset_days: tier.chain_offset_days(),
            source_type: SOURCE_ORIGIN,
        },
    )
    .await
}

// -----------------------------------------------------------------------------
// 5. settle
// -----------------------------------------------------------------------------

/// Pay a due. The only mutator for the paid transition.
///
/// Runs read-cascade-write inside one transaction:
/// - conditional update guards the paid transition, so two concurrent settles
///   on the same due fire exactly one cascade;
/// - a genuine pending|overdue → paid transition resolves the responsible
///   party one tier up and opens the next pending due with the amount copied
///   verbatim;
/// - an unresolvable party still commits the payment (the money is real) and
///   reports `CascadeOutcome::Unresolved`.
///
/// A due that is already paid yields `ApiError::AlreadySettled`.
pub async fn settle(db: &Database, tier: Tier, due_id: &str) -> Result<SettleOutcome, ApiError> {
    let mut tx = db.pool().begin().await?;
    let now = Utc::now();

    let sql = format!(
        "UPDATE {} SET status = 'paid', updated_at = ? WHERE id = ? AND status != 'paid'",
        tier.table()
    );
    let updated = sqlx::query(&sql)
        .bind(now.to_rfc3339())
        .bind(due_id)
        .execute(&mut *tx)
        .await?;

    if updated.rows_affected() == 0 {
        // Either the due is already paid or it never existed.
        return match fetch_due(&mut tx, tier, due_id).await? {
            Some(_) => Err(ApiError::AlreadySettled),
            None => Err(ApiError::NotFound(format!(
                "{} due {} not found",
                tier.as_str(),
                due_id
            ))),
        };
    }

    let due = fetch_due(&mut tx, tier, due_id)
        .await?
        .ok_or(sqlx::Error::RowNotFound)?;

    let cascade = if due.source_type == SOURCE_COMPANY_PURCHASE {
        // Direct-purchase retailer due: its company due was opened together
        // with it, so paying it spawns nothing.
        CascadeOutcome::ChainComplete
    } else {
        match tier.next() {
            None => CascadeOutcome::ChainComplete,
            Some(next_tier) => match resolve_next_party(&mut tx, tier, &due).await? {
                Some((owner_id, source_type)) => {
                    let spawned = insert_due(
                        &mut tx,
                        next_tier,
                        NewDue {
                            owner_id,
                            parent_due_id: Some(due.id.clone()),
                            origin_ref: due.origin_ref.clone(),
                            amount_paise: due.amount_paise,
                            due_offset_days: next_tier.chain_offset_days(),
                            source_type,
                        },
                    )
                    .await?;
                    tracing::info!(
                        parent = %due.id,
                        child = %spawned.id,
                        tier = next_tier.as_str(),
                        amount_paise = due.amount_paise,
                        "Cascade opened next-tier due"
                    );
                    CascadeOutcome::Spawned {
                        tier: next_tier,
                        due: spawned,
                    }
                }
                None => {
                    tracing::warn!(
                        due = %due.id,
                        tier = tier.as_str(),
                        "No next-tier party resolvable; chain terminates without successor"
                    );
                    CascadeOutcome::Unresolved
                }
            },
        }
    };

    tx.commit().await?;

    Ok(SettleOutcome { tier, due, cascade })
}

// -----------------------------------------------------------------------------
// 6. Party resolution policies
// -----------------------------------------------------------------------------

/// Resolve the party responsible one tier above `due`.
///
/// These are first-match lookup policies, not stored facts. When a business
/// sells through several retailers (or a retailer stocks several companies)
/// the first match by establishment/creation order is taken; no apportionment
/// is attempted.
async fn resolve_next_party(
    conn: &mut SqliteConnection,
    tier: Tier,
    due: &Due,
) -> Result<Option<(String, &'static str)>, sqlx::Error> {
    match tier {
        // The selling business recorded on the originating sale, when any.
        Tier::Consumer => {
            let Some(origin_ref) = due.origin_ref.as_deref() else {
                return Ok(None);
            };
            let business_id: Option<Option<String>> =
                sqlx::query_scalar("SELECT business_id FROM consumer_transactions WHERE id = ?")
                    .bind(origin_ref)
                    .fetch_optional(&mut *conn)
                    .await?;
            Ok(business_id
                .flatten()
                .map(|id| (id, SOURCE_SALE_TRANSACTION)))
        }

        // A retailer the business is registered with; failing that, any
        // retailer it has historically bought inventory from.
        Tier::Business => {
            let registered: Option<String> = sqlx::query_scalar(
                "SELECT retailer_id FROM retailer_businesses WHERE business_id = ? ORDER BY established_at LIMIT 1",
            )
            .bind(&due.owner_id)
            .fetch_optional(&mut *conn)
            .await?;
            if let Some(retailer_id) = registered {
                return Ok(Some((retailer_id, SOURCE_BUSINESS_CHAIN)));
            }

            let historical: Option<String> = sqlx::query_scalar(
                r#"
                SELECT i.retailer_id FROM business_transactions bt
                JOIN inventory i ON i.id = bt.inventory_id
                WHERE bt.business_id = ?
                ORDER BY bt.created_at LIMIT 1
                "#,
            )
            .bind(&due.owner_id)
            .fetch_optional(&mut *conn)
            .await?;
            Ok(historical.map(|id| (id, SOURCE_PURCHASE_HISTORY)))
        }

        // Any company whose product currently sits in the retailer's
        // inventory.
        Tier::Retailer => {
            let company: Option<String> = sqlx::query_scalar(
                "SELECT company_id FROM inventory WHERE retailer_id = ? AND company_id IS NOT NULL ORDER BY created_at LIMIT 1",
            )
            .bind(&due.owner_id)
            .fetch_optional(&mut *conn)
            .await?;
            Ok(company.map(|id| (id, SOURCE_INVENTORY_LINK)))
        }

        // Top of the chain; settle() never asks.
        Tier::Company => Ok(None),
    }
}

// -----------------------------------------------------------------------------
// 7. open_direct_retailer_company_dues
// -----------------------------------------------------------------------------

/// The short-circuit path for retailers buying material straight from a
/// company: opens the retailer due and its company due together, both
/// pending, bypassing the consumer and business tiers. Paying the retailer
/// due later does not spawn anything (see `settle`).
pub async fn open_direct_retailer_company_dues(
    conn: &mut SqliteConnection,
    retailer_id: &str,
    company_id: &str,
    amount_paise: i64,
    txn_ref: &str,
) -> Result<(Due, Due), sqlx::Error> {
    let retailer_due = insert_due(
        conn,
        Tier::Retailer,
        NewDue {
            owner_id: retailer_id.to_string(),
            parent_due_id: None,
            origin_ref: Some(txn_ref.to_string()),
            amount_paise,
            due_offset_days: DIRECT_RETAILER_OFFSET_DAYS,
            source_type: SOURCE_COMPANY_PURCHASE,
        },
    )
    .await?;

    let company_due = insert_due(
        conn,
        Tier::Company,
        NewDue {
            owner_id: company_id.to_string(),
            parent_due_id: Some(retailer_due.id.clone()),
            origin_ref: Some(txn_ref.to_string()),
            amount_paise,
            due_offset_days: DIRECT_COMPANY_OFFSET_DAYS,
            source_type: SOURCE_DIRECT_PURCHASE,
        },
    )
    .await?;

    Ok((retailer_due, company_due))
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
