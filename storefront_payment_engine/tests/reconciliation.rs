//! End-to-end reconciliation tests: normalized webhook notifications driven through the registry, settling real
//! pending transactions or landing in the manual-review queue.
use chrono::Duration;
use spg_common::Vnd;
use storefront_payment_engine::{
    db_types::{InboundNotification, Order, PaymentMethod, PaymentRail, PaymentTransaction},
    events::{EventProducers, TransactionPublisher},
    helpers::numeric_suffix,
    matcher::MatchRule,
    test_utils::{
        prepare_env::{prepare_test_env, random_db_path},
        seed::*,
    },
    CheckoutApi,
    PaymentRegistry,
    ReconciliationOutcome,
    SqliteDatabase,
    StatusReport,
};

async fn new_test_db() -> SqliteDatabase {
    let url = random_db_path();
    prepare_test_env(&url).await;
    SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database")
}

fn registry(db: &SqliteDatabase) -> PaymentRegistry<SqliteDatabase> {
    PaymentRegistry::new(
        db.clone(),
        Duration::seconds(300),
        Vnd::from(1000),
        EventProducers::default(),
        TransactionPublisher::new(),
    )
}

/// An order paying `price` for one unit, with a pending bank transaction.
async fn pending_payment(
    db: &SqliteDatabase,
    reg: &PaymentRegistry<SqliteDatabase>,
    customer_id: i64,
    price: i64,
) -> (Order, PaymentTransaction) {
    let api = CheckoutApi::new(db.clone());
    let product = seed_product(db, &format!("SKU-{customer_id}"), "Ca phe sua da 1kg", price, 100).await;
    let line = add_cart_item(db, customer_id, product, 1).await;
    let order = api.place_order(checkout_request(customer_id, vec![line], PaymentMethod::Bank, None)).await.unwrap();
    let tx = reg.create_pending(&order.order_code, PaymentRail::Bank).await.unwrap();
    (order, tx)
}

fn notification(amount: i64, memo: &str) -> InboundNotification {
    InboundNotification {
        amount: Vnd::from(amount),
        memo: memo.to_string(),
        external_ref: "sepay-42".to_string(),
        source_account: "0346176591".to_string(),
        rail_code: "MB".to_string(),
    }
}

#[tokio::test]
async fn full_memo_settles_the_right_twin() {
    let db = new_test_db().await;
    let reg = registry(&db);
    // Two customers paying the same amount: the classic amount-only collision.
    let (order_a, tx_a) = pending_payment(&db, &reg, 7, 150_000).await;
    let (_order_b, tx_b) = pending_payment(&db, &reg, 8, 150_000).await;

    let memo = format!("NGAN HANG {} chuyen tien", tx_a.memo);
    let outcome = reg.match_notification(&notification(150_000, &memo)).await.unwrap();
    match outcome {
        ReconciliationOutcome::Settled { transaction, order, rule } => {
            assert_eq!(transaction.id, tx_a.id);
            assert_eq!(rule, MatchRule::Token);
            assert_eq!(order.order_code, order_a.order_code);
            assert!(order.paid);
        },
        other => panic!("Expected settlement, got {other:?}"),
    }
    // The twin is untouched and still waiting for its own payment.
    assert_eq!(reg.status(&tx_b.id).await.unwrap(), StatusReport::Pending);
    assert_eq!(unmatched_notification_count(&db).await, 0);
}

#[tokio::test]
async fn truncated_memo_falls_through_to_the_numeric_suffix_rule() {
    let db = new_test_db().await;
    let reg = registry(&db);
    let (_order, tx) = pending_payment(&db, &reg, 7, 90_000).await;

    // The bank stripped everything except some digits: no token, no DH prefix.
    let digits = numeric_suffix(tx.order_code.as_str()).expect("generated codes have digits");
    let memo = format!("thanh toan {digits}");
    let outcome = reg.match_notification(&notification(90_000, &memo)).await.unwrap();
    match outcome {
        ReconciliationOutcome::Settled { transaction, rule, .. } => {
            assert_eq!(transaction.id, tx.id);
            assert_eq!(rule, MatchRule::NumericSuffix);
        },
        other => panic!("Expected settlement via numeric suffix, got {other:?}"),
    }
}

#[tokio::test]
async fn gateway_reference_is_recorded_on_settlement() {
    let db = new_test_db().await;
    let reg = registry(&db);
    let (_order, tx) = pending_payment(&db, &reg, 7, 75_000).await;

    let outcome = reg.match_notification(&notification(75_000, &tx.memo)).await.unwrap();
    let ReconciliationOutcome::Settled { transaction, .. } = outcome else {
        panic!("Expected settlement");
    };
    assert_eq!(transaction.gateway_ref.as_deref(), Some("sepay-42"));
    assert_eq!(transaction.confirmed_by.as_deref(), Some("BANK_WEBHOOK_AUTO"));
}

#[tokio::test]
async fn amount_matching_memo_matching_nothing_is_logged_not_guessed() {
    let db = new_test_db().await;
    let reg = registry(&db);
    let (_order_a, tx_a) = pending_payment(&db, &reg, 7, 120_000).await;
    let (_order_b, tx_b) = pending_payment(&db, &reg, 8, 120_000).await;

    let outcome = reg.match_notification(&notification(120_000, "ck tien hang thang 5")).await.unwrap();
    assert!(matches!(outcome, ReconciliationOutcome::Unmatched));
    // Nothing was mutated and the delivery is in the review queue.
    assert_eq!(reg.status(&tx_a.id).await.unwrap(), StatusReport::Pending);
    assert_eq!(reg.status(&tx_b.id).await.unwrap(), StatusReport::Pending);
    assert_eq!(unmatched_notification_count(&db).await, 1);
}

#[tokio::test]
async fn ambiguous_memo_is_escalated_not_guessed() {
    let db = new_test_db().await;
    let reg = registry(&db);
    let (order_a, tx_a) = pending_payment(&db, &reg, 7, 200_000).await;
    let (order_b, tx_b) = pending_payment(&db, &reg, 8, 200_000).await;

    // A memo naming both order codes ties at the order-code level.
    let memo = format!("tra {} va {}", order_a.order_code, order_b.order_code);
    let outcome = reg.match_notification(&notification(200_000, &memo)).await.unwrap();
    match outcome {
        ReconciliationOutcome::Ambiguous { candidates } => assert_eq!(candidates, 2),
        other => panic!("Expected escalation, got {other:?}"),
    }
    assert_eq!(reg.status(&tx_a.id).await.unwrap(), StatusReport::Pending);
    assert_eq!(reg.status(&tx_b.id).await.unwrap(), StatusReport::Pending);
    assert_eq!(unmatched_notification_count(&db).await, 1);
}

#[tokio::test]
async fn amount_gate_rejects_even_a_perfect_memo() {
    let db = new_test_db().await;
    let reg = registry(&db);
    let (_order, tx) = pending_payment(&db, &reg, 7, 100_000).await;

    // Right memo, wrong amount by more than the tolerance.
    let outcome = reg.match_notification(&notification(98_000, &tx.memo)).await.unwrap();
    assert!(matches!(outcome, ReconciliationOutcome::Unmatched));
    assert_eq!(reg.status(&tx.id).await.unwrap(), StatusReport::Pending);

    // Sub-tolerance rounding is absorbed.
    let outcome = reg.match_notification(&notification(99_501, &tx.memo)).await.unwrap();
    assert!(matches!(outcome, ReconciliationOutcome::Settled { .. }));
}

#[tokio::test]
async fn duplicate_webhook_delivery_is_idempotent() {
    let db = new_test_db().await;
    let reg = registry(&db);
    let (_order, tx) = pending_payment(&db, &reg, 7, 88_000).await;

    let first = reg.match_notification(&notification(88_000, &tx.memo)).await.unwrap();
    assert!(matches!(first, ReconciliationOutcome::Settled { .. }));

    // The gateway redelivers. The transaction is no longer pending, so there is nothing to match; the redelivery
    // lands in the review queue instead of corrupting state.
    let second = reg.match_notification(&notification(88_000, &tx.memo)).await.unwrap();
    assert!(matches!(second, ReconciliationOutcome::Unmatched));
    let status = reg.status(&tx.id).await.unwrap();
    assert_eq!(status, StatusReport::Confirmed);
}

#[tokio::test]
async fn expired_transactions_are_not_candidates() {
    let db = new_test_db().await;
    let reg = PaymentRegistry::new(
        db.clone(),
        Duration::milliseconds(50),
        Vnd::from(1000),
        EventProducers::default(),
        TransactionPublisher::new(),
    );
    let (_order, tx) = pending_payment(&db, &reg, 7, 64_000).await;
    tokio::time::sleep(std::time::Duration::from_millis(150)).await;

    // The transfer arrived after the TTL. The lapsed transaction must not settle; the delivery is recorded.
    let outcome = reg.match_notification(&notification(64_000, &tx.memo)).await.unwrap();
    assert!(matches!(outcome, ReconciliationOutcome::Unmatched));
    assert_eq!(unmatched_notification_count(&db).await, 1);
    assert_eq!(reg.status(&tx.id).await.unwrap(), StatusReport::Expired);

    let reloaded = CheckoutApi::new(db.clone()).order_by_code(&tx.order_code).await.unwrap().unwrap().0;
    assert!(!reloaded.paid);
}
