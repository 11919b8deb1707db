// =============================================================================
// Ecoledger Backend - Cascade Scenarios
// =============================================================================
// End-to-end behavior of the due cascade engine, inventory accounting and the
// overdue sweeper against an in-memory SQLite database.
// =============================================================================

use chrono::{Duration, Utc};

use ecoledger_backend::db::Database;
use ecoledger_backend::dues::{
    self, CascadeOutcome, Tier, SOURCE_BUSINESS_CHAIN, SOURCE_COMPANY_PURCHASE,
    SOURCE_DIRECT_PURCHASE, SOURCE_INVENTORY_LINK, SOURCE_ORIGIN, SOURCE_PURCHASE_HISTORY,
    SOURCE_SALE_TRANSACTION,
};
use ecoledger_backend::error::ApiError;
use ecoledger_backend::inventory::{self, MovementKind, NewInventoryItem};
use ecoledger_backend::purchases::{
    self, BusinessPurchaseRequest, ConsumerPurchaseRequest, RetailerCompanyPurchaseRequest,
};
use ecoledger_backend::reports;
use ecoledger_backend::sweeper;

async fn test_db() -> Database {
    let db = Database::new("sqlite::memory:").await.expect("connect");
    db.run_migrations().await.expect("migrate");
    db
}

/// Inventory owned by retailer `R`, made by company `C`, with stock on hand.
async fn seed_item(db: &Database, retailer_id: &str, company_id: &str, quantity: i64) -> String {
    let mut conn = db.pool().acquire().await.unwrap();
    let item = inventory::create_inventory_item(
        &mut conn,
        NewInventoryItem {
            retailer_id,
            company_id: Some(company_id),
            name: "bottled water",
            quantity,
            unit_price_paise: 10_000,
            plastic_grams_per_unit: 25,
            plastic_cost_per_gram_paise: 8,
        },
    )
    .await
    .expect("seed inventory");
    item.id
}

async fn count_dues(db: &Database, tier: Tier) -> i64 {
    let sql = format!("SELECT COUNT(*) FROM {}", tier.table());
    sqlx::query_scalar(&sql).fetch_one(db.pool()).await.unwrap()
}

// -----------------------------------------------------------------------------
// The four-hop chain: consumer → business → retailer → company
// -----------------------------------------------------------------------------

#[tokio::test]
async fn consumer_payment_cascades_through_all_four_tiers() {
    let db = test_db().await;
    let item_id = seed_item(&db, "retailer-1", "company-1", 10).await;
    db.register_business_link("retailer-1", "business-1")
        .await
        .unwrap();

    // Consumer pays ₹100 with a ₹20 disposal fee.
    let sale = purchases::record_consumer_purchase(
        &db,
        ConsumerPurchaseRequest {
            buyer_id: "consumer-1".into(),
            inventory_id: item_id,
            business_id: Some("business-1".into()),
            cost_paid_paise: 10_000,
            disposal_fee_paise: 2_000,
        },
    )
    .await
    .expect("record sale");

    let consumer_due = sale.due.expect("root consumer due");
    assert_eq!(consumer_due.amount_paise, 2_000);
    assert_eq!(consumer_due.status, "pending");
    assert_eq!(consumer_due.source_type, SOURCE_ORIGIN);
    assert_eq!(consumer_due.parent_due_id, None);
    assert_eq!(consumer_due.due_date - consumer_due.created_at, Duration::days(30));

    // Hop 1: consumer → business, resolved through the sale transaction.
    let outcome = dues::settle(&db, Tier::Consumer, &consumer_due.id).await.unwrap();
    assert_eq!(outcome.due.status, "paid");
    let business_due = match outcome.cascade {
        CascadeOutcome::Spawned { tier, due } => {
            assert_eq!(tier, Tier::Business);
            due
        }
        other => panic!("expected spawned business due, got {:?}", other),
    };
    assert_eq!(business_due.owner_id, "business-1");
    assert_eq!(business_due.amount_paise, 2_000);
    assert_eq!(business_due.parent_due_id, Some(consumer_due.id.clone()));
    assert_eq!(business_due.source_type, SOURCE_SALE_TRANSACTION);
    assert_eq!(business_due.due_date - business_due.created_at, Duration::days(15));

    // Hop 2: business → retailer via the registered link.
    let outcome = dues::settle(&db, Tier::Business, &business_due.id).await.unwrap();
    let retailer_due = match outcome.cascade {
        CascadeOutcome::Spawned { tier, due } => {
            assert_eq!(tier, Tier::Retailer);
            due
        }
        other => panic!("expected spawned retailer due, got {:?}", other),
    };
    assert_eq!(retailer_due.owner_id, "retailer-1");
    assert_eq!(retailer_due.amount_paise, 2_000);
    assert_eq!(retailer_due.source_type, SOURCE_BUSINESS_CHAIN);
    assert_eq!(retailer_due.due_date - retailer_due.created_at, Duration::days(10));

    // Hop 3: retailer → company via the inventory link.
    let outcome = dues::settle(&db, Tier::Retailer, &retailer_due.id).await.unwrap();
    let company_due = match outcome.cascade {
        CascadeOutcome::Spawned { tier, due } => {
            assert_eq!(tier, Tier::Company);
            due
        }
        other => panic!("expected spawned company due, got {:?}", other),
    };
    assert_eq!(company_due.owner_id, "company-1");
    assert_eq!(company_due.amount_paise, 2_000);
    assert_eq!(company_due.source_type, SOURCE_INVENTORY_LINK);
    assert_eq!(company_due.due_date - company_due.created_at, Duration::days(7));

    // Hop 4: the company tier terminates the chain.
    let outcome = dues::settle(&db, Tier::Company, &company_due.id).await.unwrap();
    assert!(matches!(outcome.cascade, CascadeOutcome::ChainComplete));

    // One due per tier, all paid, amount never drifted.
    for tier in Tier::ALL {
        assert_eq!(count_dues(&db, tier).await, 1);
    }
}

#[tokio::test]
async fn second_settle_reports_already_settled_and_fires_no_second_cascade() {
    let db = test_db().await;
    let item_id = seed_item(&db, "retailer-1", "company-1", 10).await;

    let sale = purchases::record_consumer_purchase(
        &db,
        ConsumerPurchaseRequest {
            buyer_id: "consumer-1".into(),
            inventory_id: item_id,
            business_id: Some("business-1".into()),
            cost_paid_paise: 10_000,
            disposal_fee_paise: 2_000,
        },
    )
    .await
    .unwrap();
    let due = sale.due.unwrap();

    dues::settle(&db, Tier::Consumer, &due.id).await.unwrap();
    let second = dues::settle(&db, Tier::Consumer, &due.id).await;
    assert!(matches!(second, Err(ApiError::AlreadySettled)));

    // Exactly one business due, not two.
    assert_eq!(count_dues(&db, Tier::Business).await, 1);
}

#[tokio::test]
async fn settle_unknown_due_is_not_found() {
    let db = test_db().await;
    let result = dues::settle(&db, Tier::Consumer, "no-such-due").await;
    assert!(matches!(result, Err(ApiError::NotFound(_))));
}

// -----------------------------------------------------------------------------
// Party resolution policies
// -----------------------------------------------------------------------------

#[tokio::test]
async fn business_resolution_falls_back_to_purchase_history() {
    let db = test_db().await;
    let item_id = seed_item(&db, "retailer-9", "company-9", 100).await;

    // No registered link; the business has bought inventory before.
    let purchase = purchases::record_business_purchase(
        &db,
        BusinessPurchaseRequest {
            business_id: "business-9".into(),
            inventory_id: item_id,
            quantity: 20,
            unit_price_paise: 9_000,
            plastic_grams: 500,
            plastic_cost_per_gram_paise: 4,
        },
    )
    .await
    .unwrap();

    let business_due = purchase.due.expect("plastic cost opens a business due");
    assert_eq!(business_due.amount_paise, 500 * 4);
    assert_eq!(business_due.source_type, SOURCE_ORIGIN);

    let outcome = dues::settle(&db, Tier::Business, &business_due.id).await.unwrap();
    match outcome.cascade {
        CascadeOutcome::Spawned { tier, due } => {
            assert_eq!(tier, Tier::Retailer);
            assert_eq!(due.owner_id, "retailer-9");
            assert_eq!(due.source_type, SOURCE_PURCHASE_HISTORY);
        }
        other => panic!("expected retailer due via purchase history, got {:?}", other),
    }
}

#[tokio::test]
async fn unresolvable_business_still_pays_but_spawns_nothing() {
    let db = test_db().await;

    // A business with no registered retailer and no purchase history.
    let mut conn = db.pool().acquire().await.unwrap();
    let due = dues::open_root_due(&mut conn, Tier::Business, "loner-business", None, 500)
        .await
        .unwrap();
    drop(conn);

    let outcome = dues::settle(&db, Tier::Business, &due.id).await.unwrap();
    assert_eq!(outcome.due.status, "paid");
    assert!(matches!(outcome.cascade, CascadeOutcome::Unresolved));
    assert_eq!(count_dues(&db, Tier::Retailer).await, 0);
}

// -----------------------------------------------------------------------------
// Direct retailer→company purchases
// -----------------------------------------------------------------------------

#[tokio::test]
async fn direct_purchase_opens_due_pair_and_skips_lower_tiers() {
    let db = test_db().await;

    // 500 g of material at ₹0.10/g → ₹50 disposal cost.
    let outcome = purchases::record_retailer_company_purchase(
        &db,
        RetailerCompanyPurchaseRequest {
            retailer_id: "retailer-2".into(),
            company_id: "company-2".into(),
            quantity: 500,
            disposal_cost_per_unit_paise: 10,
            inventory_id: None,
            name: Some("PET granulate".into()),
            unit_price_paise: 50,
            plastic_grams_per_unit: 1,
            plastic_cost_per_gram_paise: 10,
        },
    )
    .await
    .unwrap();

    let retailer_due = outcome.retailer_due.expect("retailer due");
    let company_due = outcome.company_due.expect("company due");

    assert_eq!(retailer_due.amount_paise, 5_000);
    assert_eq!(retailer_due.status, "pending");
    assert_eq!(retailer_due.source_type, SOURCE_COMPANY_PURCHASE);
    assert_eq!(retailer_due.parent_due_id, None);
    assert_eq!(retailer_due.due_date - retailer_due.created_at, Duration::days(30));

    assert_eq!(company_due.amount_paise, 5_000);
    assert_eq!(company_due.status, "pending");
    assert_eq!(company_due.source_type, SOURCE_DIRECT_PURCHASE);
    assert_eq!(company_due.parent_due_id, Some(retailer_due.id.clone()));
    assert_eq!(company_due.due_date - company_due.created_at, Duration::days(37));

    assert_eq!(count_dues(&db, Tier::Consumer).await, 0);
    assert_eq!(count_dues(&db, Tier::Business).await, 0);

    assert_eq!(outcome.inventory.quantity, 500);
    assert_eq!(outcome.transaction.total_disposal_cost_paise, 5_000);

    // The company due already exists; paying the retailer due spawns nothing.
    let settled = dues::settle(&db, Tier::Retailer, &retailer_due.id).await.unwrap();
    assert!(matches!(settled.cascade, CascadeOutcome::ChainComplete));
    assert_eq!(count_dues(&db, Tier::Company).await, 1);
}

// -----------------------------------------------------------------------------
// Inventory accounting
// -----------------------------------------------------------------------------

#[tokio::test]
async fn purchase_below_zero_fails_and_leaves_quantity_unchanged() {
    let db = test_db().await;
    let item_id = seed_item(&db, "retailer-3", "company-3", 3).await;

    let mut conn = db.pool().acquire().await.unwrap();
    let err = inventory::apply_inventory_movement(&mut conn, &item_id, 5, MovementKind::Purchase)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ApiError::InsufficientStock {
            available: 3,
            requested: 5
        }
    ));
    drop(conn);

    let item = db.find_inventory_by_id(&item_id).await.unwrap().unwrap();
    assert_eq!(item.quantity, 3);
    assert_eq!(item.status, "available");
}

#[tokio::test]
async fn depletion_flips_status_and_returns_restock_it() {
    let db = test_db().await;
    let item_id = seed_item(&db, "retailer-4", "company-4", 1).await;

    let mut conn = db.pool().acquire().await.unwrap();
    let item = inventory::apply_inventory_movement(&mut conn, &item_id, 1, MovementKind::Purchase)
        .await
        .unwrap();
    assert_eq!(item.quantity, 0);
    assert_eq!(item.status, "out_of_stock");

    let item = inventory::apply_inventory_movement(&mut conn, &item_id, 4, MovementKind::Return)
        .await
        .unwrap();
    assert_eq!(item.quantity, 4);
    assert_eq!(item.status, "available");

    // Adjustment sets absolutely.
    let item = inventory::apply_inventory_movement(&mut conn, &item_id, 2, MovementKind::Adjustment)
        .await
        .unwrap();
    assert_eq!(item.quantity, 2);
}

#[tokio::test]
async fn zero_disposal_fee_records_sale_without_a_due() {
    let db = test_db().await;
    let item_id = seed_item(&db, "retailer-5", "company-5", 2).await;

    let sale = purchases::record_consumer_purchase(
        &db,
        ConsumerPurchaseRequest {
            buyer_id: "consumer-5".into(),
            inventory_id: item_id,
            business_id: None,
            cost_paid_paise: 7_500,
            disposal_fee_paise: 0,
        },
    )
    .await
    .unwrap();

    assert!(sale.due.is_none());
    assert_eq!(count_dues(&db, Tier::Consumer).await, 0);
}

#[tokio::test]
async fn overflowing_money_totals_are_rejected() {
    let db = test_db().await;

    // Figures individually valid but whose product exceeds i64.
    let err = purchases::record_retailer_company_purchase(
        &db,
        RetailerCompanyPurchaseRequest {
            retailer_id: "retailer-10".into(),
            company_id: "company-10".into(),
            quantity: i64::MAX / 2,
            disposal_cost_per_unit_paise: 4,
            inventory_id: None,
            name: Some("bulk granulate".into()),
            unit_price_paise: 0,
            plastic_grams_per_unit: 0,
            plastic_cost_per_gram_paise: 0,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));

    let item_id = seed_item(&db, "retailer-10", "company-10", 100).await;
    let err = purchases::record_business_purchase(
        &db,
        BusinessPurchaseRequest {
            business_id: "business-10".into(),
            inventory_id: item_id.clone(),
            quantity: 1,
            unit_price_paise: 0,
            plastic_grams: i64::MAX / 2,
            plastic_cost_per_gram_paise: 4,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));

    // Neither rejected purchase wrote a transaction, a due or a stock change.
    for tier in Tier::ALL {
        assert_eq!(count_dues(&db, tier).await, 0);
    }
    let collections: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM collection_transactions")
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(collections, 0);
    let item = db.find_inventory_by_id(&item_id).await.unwrap().unwrap();
    assert_eq!(item.quantity, 100);
}

// -----------------------------------------------------------------------------
// Overdue sweeper
// -----------------------------------------------------------------------------

#[tokio::test]
async fn sweep_is_idempotent_and_overdue_dues_stay_payable() {
    let db = test_db().await;
    let mut conn = db.pool().acquire().await.unwrap();
    let due = dues::open_root_due(&mut conn, Tier::Consumer, "consumer-7", None, 1_000)
        .await
        .unwrap();
    drop(conn);

    // Past the 30-day consumer window.
    let as_of = Utc::now() + Duration::days(40);
    let first = sweeper::sweep_overdue(&db, as_of).await.unwrap();
    assert_eq!(first.consumer, 1);
    assert_eq!(first.total(), 1);

    let second = sweeper::sweep_overdue(&db, as_of).await.unwrap();
    assert_eq!(second.total(), 0);

    let overdue = reports::list_dues(&db, Tier::Consumer, Some("overdue"), None)
        .await
        .unwrap();
    assert_eq!(overdue.len(), 1);
    assert_eq!(overdue[0].id, due.id);

    // Late payment: overdue → paid still settles (and cascades if it can).
    let outcome = dues::settle(&db, Tier::Consumer, &due.id).await.unwrap();
    assert_eq!(outcome.due.status, "paid");
}

#[tokio::test]
async fn sweep_before_due_date_marks_nothing() {
    let db = test_db().await;
    let mut conn = db.pool().acquire().await.unwrap();
    dues::open_root_due(&mut conn, Tier::Consumer, "consumer-8", None, 1_000)
        .await
        .unwrap();
    drop(conn);

    let report = sweeper::sweep_overdue(&db, Utc::now()).await.unwrap();
    assert_eq!(report.total(), 0);
}

// -----------------------------------------------------------------------------
// Reporting
// -----------------------------------------------------------------------------

#[tokio::test]
async fn summary_and_trend_track_paid_versus_outstanding() {
    let db = test_db().await;
    let mut conn = db.pool().acquire().await.unwrap();
    let paid = dues::open_root_due(&mut conn, Tier::Business, "biz-1", None, 3_000)
        .await
        .unwrap();
    dues::open_root_due(&mut conn, Tier::Business, "biz-1", None, 2_000)
        .await
        .unwrap();
    drop(conn);

    dues::settle(&db, Tier::Business, &paid.id).await.unwrap();

    let summary = reports::due_summary(&db, Tier::Business, "biz-1").await.unwrap();
    assert_eq!(summary.total_paise, 5_000);
    assert_eq!(summary.paid_paise, 3_000);
    assert_eq!(summary.outstanding_paise, 2_000);
    assert_eq!(summary.paid_count, 1);
    assert_eq!(summary.pending_count, 1);
    assert_eq!(summary.overdue_count, 0);

    let trend = reports::monthly_trend(&db, Tier::Business, "biz-1").await.unwrap();
    assert_eq!(trend.len(), 1);
    assert_eq!(trend[0].month, Utc::now().format("%Y-%m").to_string());
    assert_eq!(trend[0].total_paise, 5_000);
    assert_eq!(trend[0].count, 2);
}

#[tokio::test]
async fn top_counterparties_label_missing_business_as_unknown() {
    let db = test_db().await;
    let item_id = seed_item(&db, "retailer-6", "company-6", 10).await;

    for business_id in [Some("business-6".to_string()), None, None] {
        purchases::record_consumer_purchase(
            &db,
            ConsumerPurchaseRequest {
                buyer_id: "consumer-6".into(),
                inventory_id: item_id.clone(),
                business_id,
                cost_paid_paise: 1_000,
                disposal_fee_paise: 0,
            },
        )
        .await
        .unwrap();
    }

    let top = reports::top_counterparties(&db, 10).await.unwrap();
    assert_eq!(top.len(), 2);
    assert_eq!(top[0].counterparty, "Unknown");
    assert_eq!(top[0].transactions, 2);
    assert_eq!(top[0].volume_paise, 2_000);
    assert_eq!(top[1].counterparty, "business-6");
}
