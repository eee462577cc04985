use log::trace;
use spg_common::Vnd;
use sqlx::SqliteConnection;

use crate::{db_types::Product, traits::CheckoutDbError};

/// Decrements on-hand stock if and only if enough remains. Returns `false` when the guard fails, which closes the
/// check-then-act window between the cart pre-check and the decrement under concurrent checkouts.
pub async fn decrement_stock(
    product_id: i64,
    quantity: i64,
    conn: &mut SqliteConnection,
) -> Result<bool, CheckoutDbError> {
    let result = sqlx::query(
        "UPDATE products SET stock = stock - $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 AND stock >= $1",
    )
    .bind(quantity)
    .bind(product_id)
    .execute(conn)
    .await?;
    trace!("🗃️ Stock decrement of {quantity} for product #{product_id}: {} row(s)", result.rows_affected());
    Ok(result.rows_affected() > 0)
}

pub async fn restore_stock(
    product_id: i64,
    quantity: i64,
    conn: &mut SqliteConnection,
) -> Result<(), CheckoutDbError> {
    sqlx::query("UPDATE products SET stock = stock + $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2")
        .bind(quantity)
        .bind(product_id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn fetch_product(product_id: i64, conn: &mut SqliteConnection) -> Result<Option<Product>, CheckoutDbError> {
    let product = sqlx::query_as("SELECT id, sku, name, unit_price, stock, unit FROM products WHERE id = $1")
        .bind(product_id)
        .fetch_optional(conn)
        .await?;
    Ok(product)
}

/// Test and seed helper.
pub async fn insert_product(
    sku: &str,
    name: &str,
    unit_price: Vnd,
    stock: i64,
    conn: &mut SqliteConnection,
) -> Result<i64, CheckoutDbError> {
    let id = sqlx::query_scalar(
        "INSERT INTO products (sku, name, unit_price, stock) VALUES ($1, $2, $3, $4) RETURNING id",
    )
    .bind(sku)
    .bind(name)
    .bind(unit_price)
    .bind(stock)
    .fetch_one(conn)
    .await?;
    Ok(id)
}
