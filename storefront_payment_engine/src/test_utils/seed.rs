//! Fixture helpers for integration tests: a tiny catalog, carts and vouchers, plus direct reads of the bits of
//! state the tests assert on.
use chrono::{Duration, Utc};
use spg_common::Vnd;

use crate::{
    db_types::{DeliveryInfo, DiscountKind, NewOrderRequest, PaymentMethod},
    sqlite::db::{carts, notifications, products, vouchers},
    SqliteDatabase,
};

pub async fn seed_product(db: &SqliteDatabase, sku: &str, name: &str, unit_price: i64, stock: i64) -> i64 {
    let mut conn = db.pool().acquire().await.expect("Error acquiring connection");
    products::insert_product(sku, name, Vnd::from(unit_price), stock, &mut conn).await.expect("Error seeding product")
}

pub async fn add_cart_item(db: &SqliteDatabase, customer_id: i64, product_id: i64, quantity: i64) -> i64 {
    let mut conn = db.pool().acquire().await.expect("Error acquiring connection");
    carts::add_item(customer_id, product_id, quantity, &mut conn).await.expect("Error seeding cart item")
}

/// A voucher valid from yesterday until tomorrow.
pub async fn seed_voucher(
    db: &SqliteDatabase,
    code: &str,
    kind: DiscountKind,
    value: i64,
    min_order: Option<i64>,
    max_discount: Option<i64>,
    allowance: i64,
) -> i64 {
    let mut conn = db.pool().acquire().await.expect("Error acquiring connection");
    let now = Utc::now();
    vouchers::insert_voucher(
        code,
        kind,
        value,
        min_order.map(Vnd::from),
        max_discount.map(Vnd::from),
        allowance,
        now - Duration::days(1),
        now + Duration::days(1),
        &mut conn,
    )
    .await
    .expect("Error seeding voucher")
}

pub fn checkout_request(
    customer_id: i64,
    selected_item_ids: Vec<i64>,
    payment_method: PaymentMethod,
    voucher_code: Option<&str>,
) -> NewOrderRequest {
    NewOrderRequest {
        customer_id,
        selected_item_ids,
        delivery: DeliveryInfo {
            address: "12 Nguyen Trai, Q1".to_string(),
            recipient_name: "Tran Thi B".to_string(),
            phone: "0901234567".to_string(),
            note: None,
        },
        payment_method,
        voucher_code: voucher_code.map(String::from),
    }
}

pub async fn stock_of(db: &SqliteDatabase, product_id: i64) -> i64 {
    let mut conn = db.pool().acquire().await.expect("Error acquiring connection");
    products::fetch_product(product_id, &mut conn)
        .await
        .expect("Error fetching product")
        .expect("Product should exist")
        .stock
}

pub async fn voucher_used_count(db: &SqliteDatabase, code: &str) -> i64 {
    let mut conn = db.pool().acquire().await.expect("Error acquiring connection");
    vouchers::fetch_by_code(code, &mut conn).await.expect("Error fetching voucher").expect("Voucher should exist").used
}

pub async fn unmatched_notification_count(db: &SqliteDatabase) -> i64 {
    let mut conn = db.pool().acquire().await.expect("Error acquiring connection");
    notifications::unmatched_count(&mut conn).await.expect("Error counting unmatched notifications")
}
