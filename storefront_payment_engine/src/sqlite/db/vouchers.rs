use chrono::{DateTime, Utc};
use log::trace;
use spg_common::Vnd;
use sqlx::SqliteConnection;

use crate::{
    db_types::{DiscountKind, Voucher},
    traits::CheckoutDbError,
};

pub async fn fetch_by_code(code: &str, conn: &mut SqliteConnection) -> Result<Option<Voucher>, CheckoutDbError> {
    let voucher = sqlx::query_as("SELECT * FROM vouchers WHERE code = $1").bind(code).fetch_optional(conn).await?;
    Ok(voucher)
}

/// Records a redemption and bumps the used-count in one guarded step. The `used < allowance` condition makes the
/// increment safe under concurrent checkouts racing for the last redemption slot; the loser sees `false` and the
/// surrounding checkout transaction rolls back.
pub async fn redeem(
    voucher_id: i64,
    order_id: i64,
    customer_id: i64,
    amount: Vnd,
    conn: &mut SqliteConnection,
) -> Result<bool, CheckoutDbError> {
    let result = sqlx::query("UPDATE vouchers SET used = used + 1 WHERE id = $1 AND used < allowance")
        .bind(voucher_id)
        .execute(&mut *conn)
        .await?;
    if result.rows_affected() == 0 {
        trace!("🗃️ Voucher #{voucher_id} has no redemption slots left");
        return Ok(false);
    }
    sqlx::query(
        "INSERT INTO voucher_redemptions (voucher_id, order_id, customer_id, amount) VALUES ($1, $2, $3, $4)",
    )
    .bind(voucher_id)
    .bind(order_id)
    .bind(customer_id)
    .bind(amount)
    .execute(conn)
    .await?;
    Ok(true)
}

pub async fn redemption_count_for_order(order_id: i64, conn: &mut SqliteConnection) -> Result<i64, CheckoutDbError> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM voucher_redemptions WHERE order_id = $1")
        .bind(order_id)
        .fetch_one(conn)
        .await?;
    Ok(count)
}

/// Test and seed helper.
#[allow(clippy::too_many_arguments)]
pub async fn insert_voucher(
    code: &str,
    kind: DiscountKind,
    value: i64,
    min_order: Option<Vnd>,
    max_discount: Option<Vnd>,
    allowance: i64,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<i64, CheckoutDbError> {
    let id = sqlx::query_scalar(
        r#"
            INSERT INTO vouchers (code, kind, value, min_order, max_discount, allowance, starts_at, ends_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING id
        "#,
    )
    .bind(code)
    .bind(kind.to_string())
    .bind(value)
    .bind(min_order)
    .bind(max_discount)
    .bind(allowance)
    .bind(starts_at)
    .bind(ends_at)
    .fetch_one(conn)
    .await?;
    Ok(id)
}
