//! Endpoint tests against a real temp-SQLite registry: the full request path including JSON (de)serialization,
//! identity headers, and error mapping, with no mocked storage.
use actix_web::{http::StatusCode, middleware::Logger, test, web, App};
use chrono::Duration;
use serde_json::json;
use spg_common::Vnd;
use storefront_payment_engine::{
    events::{EventProducers, TransactionPublisher},
    test_utils::{
        prepare_env::{prepare_test_env, random_db_path},
        seed::*,
    },
    CheckoutApi,
    PaymentRegistry,
    SqliteDatabase,
    StatusReport,
};

use crate::{
    config::ServerConfig,
    data_objects::{PaymentTransactionResult, TransactionStatusResult, WebhookAck},
    routes::{
        health,
        AdminConfirmRoute,
        BankWebhookRoute,
        CancelOrderRoute,
        CreatePaymentRoute,
        MyOrdersRoute,
        OrderByCodeRoute,
        PaymentStatusRoute,
        PlaceOrderRoute,
    },
};

struct TestHarness {
    db: SqliteDatabase,
    registry: PaymentRegistry<SqliteDatabase>,
    config: ServerConfig,
}

async fn harness() -> TestHarness {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    let mut config = ServerConfig::default();
    config.bank.account_number = "0346176591".to_string();
    config.bank.bank_code = "MB".to_string();
    let registry = PaymentRegistry::new(
        db.clone(),
        Duration::seconds(300),
        Vnd::from(1000),
        EventProducers::default(),
        TransactionPublisher::new(),
    );
    TestHarness { db, registry, config }
}

macro_rules! app {
    ($h:expr) => {
        test::init_service(
            App::new()
                .wrap(Logger::default())
                .app_data(web::Data::new(CheckoutApi::new($h.db.clone())))
                .app_data(web::Data::new($h.registry.clone()))
                .app_data(web::Data::new($h.config.clone()))
                .service(health)
                .service(PlaceOrderRoute::<SqliteDatabase>::new())
                .service(MyOrdersRoute::<SqliteDatabase>::new())
                .service(OrderByCodeRoute::<SqliteDatabase>::new())
                .service(CancelOrderRoute::<SqliteDatabase>::new())
                .service(CreatePaymentRoute::<SqliteDatabase>::new())
                .service(PaymentStatusRoute::<SqliteDatabase>::new())
                .service(BankWebhookRoute::<SqliteDatabase>::new())
                .service(AdminConfirmRoute::<SqliteDatabase>::new()),
        )
        .await
    };
}

fn order_body() -> serde_json::Value {
    json!({
        "selected_item_ids": [1],
        "delivery": {
            "address": "12 Nguyen Trai, Q1",
            "recipient_name": "Tran Thi B",
            "phone": "0901234567"
        },
        "payment_method": "bank"
    })
}

#[actix_web::test]
async fn health_check() {
    let h = harness().await;
    let app = app!(h);
    let req = test::TestRequest::get().uri("/health").to_request();
    let res = test::call_service(&app, req).await;
    assert!(res.status().is_success());
}

#[actix_web::test]
async fn placing_an_order_requires_an_identity() {
    let h = harness().await;
    let app = app!(h);
    let req = test::TestRequest::post().uri("/api/orders").set_json(order_body()).to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn checkout_to_settlement_via_webhook() {
    let h = harness().await;
    let product = seed_product(&h.db, "GAO-01", "Gao ST25 5kg", 150_000, 10).await;
    let line = add_cart_item(&h.db, 7, product, 1).await;
    let app = app!(h);

    // Place the order.
    let mut body = order_body();
    body["selected_item_ids"] = json!([line]);
    let req = test::TestRequest::post()
        .uri("/api/orders")
        .insert_header(("spg-customer-id", "7"))
        .set_json(body)
        .to_request();
    let res = test::call_service(&app, req).await;
    assert!(res.status().is_success());
    let order: serde_json::Value = test::read_body_json(res).await;
    let order_code = order["order_code"].as_str().expect("order code in response").to_string();

    // Create the QR payment transaction.
    let req = test::TestRequest::post()
        .uri(&format!("/api/payments/{order_code}/bank"))
        .insert_header(("spg-customer-id", "7"))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert!(res.status().is_success());
    let payment: PaymentTransactionResult = test::read_body_json(res).await;
    assert_eq!(payment.amount, Vnd::from(150_000));
    assert!(payment.qr_image_url.contains("acc=0346176591"));
    assert!(payment.memo.contains(&order_code));

    // Poll: still pending.
    let req = test::TestRequest::get()
        .uri(&format!("/api/payments/status/{}", payment.transaction_id))
        .to_request();
    let status: TransactionStatusResult = test::call_and_read_body_json(&app, req).await;
    assert_eq!(status.status, StatusReport::Pending);

    // The bank delivers the transfer notification.
    let webhook = json!({
        "type": "transfer_in",
        "data": {
            "amount": 150000,
            "content": format!("NGAN HANG {} chuyen tien", payment.memo),
            "tid": "FT24999",
            "accountNumber": "0346176591"
        }
    });
    let req = test::TestRequest::post().uri("/webhook/bank").set_json(webhook).to_request();
    let ack: WebhookAck = test::call_and_read_body_json(&app, req).await;
    assert!(ack.matched);
    assert_eq!(ack.transaction_id.as_deref(), Some(payment.transaction_id.as_str()));

    // Poll again: confirmed, and the order is settled.
    let req = test::TestRequest::get()
        .uri(&format!("/api/payments/status/{}", payment.transaction_id))
        .to_request();
    let status: TransactionStatusResult = test::call_and_read_body_json(&app, req).await;
    assert_eq!(status.status, StatusReport::Confirmed);

    let req = test::TestRequest::get()
        .uri(&format!("/api/orders/{order_code}"))
        .insert_header(("spg-customer-id", "7"))
        .to_request();
    let result: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(result["order"]["paid"], json!(true));
    assert_eq!(result["order"]["status"], json!("Confirmed"));
}

#[actix_web::test]
async fn webhook_for_unknown_transfer_is_acknowledged_but_unmatched() {
    let h = harness().await;
    let db = h.db.clone();
    let app = app!(h);
    let webhook = json!({ "amount": 99000, "description": "ck nham shop khac", "accountNumber": "0346176591" });
    let req = test::TestRequest::post().uri("/webhook/bank").set_json(webhook).to_request();
    let ack: WebhookAck = test::call_and_read_body_json(&app, req).await;
    assert!(ack.success);
    assert!(!ack.matched);
    assert_eq!(unmatched_notification_count(&db).await, 1);
}

#[actix_web::test]
async fn webhook_for_another_account_is_ignored() {
    let h = harness().await;
    let db = h.db.clone();
    let app = app!(h);
    let webhook = json!({ "amount": 99000, "description": "tien thue nha", "accountNumber": "999999" });
    let req = test::TestRequest::post().uri("/webhook/bank").set_json(webhook).to_request();
    let ack: WebhookAck = test::call_and_read_body_json(&app, req).await;
    assert_eq!(ack.ignored, Some(true));
    // Not our account, so it is not part of our review queue either.
    assert_eq!(unmatched_notification_count(&db).await, 0);
}

#[actix_web::test]
async fn admin_confirm_goes_through_the_guarded_path() {
    let h = harness().await;
    let product = seed_product(&h.db, "GAO-01", "Gao ST25 5kg", 150_000, 10).await;
    let line = add_cart_item(&h.db, 7, product, 1).await;
    let app = app!(h);

    let mut body = order_body();
    body["selected_item_ids"] = json!([line]);
    let req = test::TestRequest::post()
        .uri("/api/orders")
        .insert_header(("spg-customer-id", "7"))
        .set_json(body)
        .to_request();
    let order: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    let order_code = order["order_code"].as_str().unwrap().to_string();

    let req = test::TestRequest::post()
        .uri(&format!("/api/payments/{order_code}/wallet"))
        .insert_header(("spg-customer-id", "7"))
        .to_request();
    let payment: PaymentTransactionResult = test::call_and_read_body_json(&app, req).await;

    // No admin header, no override.
    let req = test::TestRequest::post().uri(&format!("/api/admin/confirm/{}", payment.transaction_id)).to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::post()
        .uri(&format!("/api/admin/confirm/{}", payment.transaction_id))
        .insert_header(("spg-admin-id", "42"))
        .to_request();
    let settled: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(settled["paid"], json!(true));

    // Idempotent: a second confirm reports the same settled order instead of erroring.
    let req = test::TestRequest::post()
        .uri(&format!("/api/admin/confirm/{}", payment.transaction_id))
        .insert_header(("spg-admin-id", "43"))
        .to_request();
    let settled: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(settled["paid"], json!(true));
}

#[actix_web::test]
async fn cancelling_an_order_restores_stock() {
    let h = harness().await;
    let product = seed_product(&h.db, "GAO-01", "Gao ST25 5kg", 150_000, 10).await;
    let line = add_cart_item(&h.db, 7, product, 2).await;
    let db = h.db.clone();
    let app = app!(h);

    let mut body = order_body();
    body["selected_item_ids"] = json!([line]);
    body["payment_method"] = json!("cod");
    let req = test::TestRequest::post()
        .uri("/api/orders")
        .insert_header(("spg-customer-id", "7"))
        .set_json(body)
        .to_request();
    let order: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    let order_code = order["order_code"].as_str().unwrap();
    assert_eq!(stock_of(&db, product).await, 8);

    let req = test::TestRequest::post()
        .uri(&format!("/api/orders/{order_code}/cancel"))
        .insert_header(("spg-customer-id", "7"))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert!(res.status().is_success());
    assert_eq!(stock_of(&db, product).await, 10);

    // A second cancel is a conflict, not a surprise.
    let req = test::TestRequest::post()
        .uri(&format!("/api/orders/{order_code}/cancel"))
        .insert_header(("spg-customer-id", "7"))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
}
