use log::{debug, trace};
use spg_common::Vnd;
use sqlx::SqliteConnection;

use crate::{
    db_types::{CartLine, NewOrderRequest, Order, OrderId, OrderItem},
    traits::CheckoutDbError,
};

/// Inserts the order row. Amounts arrive pre-computed: `total` must equal `subtotal - discount`, which the checkout
/// unit guarantees by construction.
pub async fn insert_order(
    order_code: &OrderId,
    request: &NewOrderRequest,
    subtotal: Vnd,
    discount: Vnd,
    voucher_id: Option<i64>,
    conn: &mut SqliteConnection,
) -> Result<Order, CheckoutDbError> {
    let order: Order = sqlx::query_as(
        r#"
            INSERT INTO orders (
                order_code,
                customer_id,
                subtotal,
                discount,
                total,
                voucher_id,
                delivery_address,
                recipient_name,
                phone,
                note,
                payment_method
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *;
        "#,
    )
    .bind(order_code.as_str())
    .bind(request.customer_id)
    .bind(subtotal)
    .bind(discount)
    .bind(subtotal - discount)
    .bind(voucher_id)
    .bind(&request.delivery.address)
    .bind(&request.delivery.recipient_name)
    .bind(&request.delivery.phone)
    .bind(&request.delivery.note)
    .bind(request.payment_method.to_string())
    .fetch_one(conn)
    .await?;
    debug!("🗃️ Order [{}] inserted with id {}", order.order_code, order.id);
    Ok(order)
}

/// Writes the line-item snapshots for an order. Names and unit prices are frozen here and never re-read from the
/// catalog.
pub async fn insert_order_items(
    order_id: i64,
    lines: &[CartLine],
    conn: &mut SqliteConnection,
) -> Result<(), CheckoutDbError> {
    for line in lines {
        sqlx::query(
            "INSERT INTO order_items (order_id, product_id, name, quantity, unit_price) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(order_id)
        .bind(line.product_id)
        .bind(&line.name)
        .bind(line.quantity)
        .bind(line.unit_price)
        .execute(&mut *conn)
        .await?;
    }
    trace!("🗃️ {} line item(s) recorded for order #{order_id}", lines.len());
    Ok(())
}

pub async fn fetch_order_by_code(
    order_code: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE order_code = $1")
        .bind(order_code.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(order)
}

pub async fn fetch_order_items(order_id: i64, conn: &mut SqliteConnection) -> Result<Vec<OrderItem>, sqlx::Error> {
    let items =
        sqlx::query_as("SELECT * FROM order_items WHERE order_id = $1 ORDER BY id").bind(order_id).fetch_all(conn).await?;
    Ok(items)
}

pub async fn fetch_orders_for_customer(
    customer_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, sqlx::Error> {
    let orders = sqlx::query_as("SELECT * FROM orders WHERE customer_id = $1 ORDER BY created_at DESC")
        .bind(customer_id)
        .fetch_all(conn)
        .await?;
    Ok(orders)
}

/// Marks the order as settled. The guard on `paid` means the flag can only ever go `false` to `true`; a second
/// settlement attempt returns `None` and the caller falls back to the already-settled row.
pub async fn settle_order(order_code: &OrderId, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as(
        r#"
            UPDATE orders SET paid = 1, status = 'Confirmed', updated_at = CURRENT_TIMESTAMP
            WHERE order_code = $1 AND paid = 0 AND status = 'AwaitingConfirmation'
            RETURNING *
        "#,
    )
    .bind(order_code.as_str())
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

/// Flips the order to `Cancelled`, but only while it is still awaiting confirmation and unpaid. Returns `None` when
/// the guard fails (already confirmed, already cancelled, or a settlement race won first).
pub async fn cancel_order(order_code: &OrderId, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as(
        r#"
            UPDATE orders SET status = 'Cancelled', updated_at = CURRENT_TIMESTAMP
            WHERE order_code = $1 AND paid = 0 AND status = 'AwaitingConfirmation'
            RETURNING *
        "#,
    )
    .bind(order_code.as_str())
    .fetch_optional(conn)
    .await?;
    Ok(order)
}
