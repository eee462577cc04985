use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewPaymentTransaction, OrderId, PaymentTransaction},
    traits::CheckoutDbError,
};

/// Inserts a new pending transaction. The partial unique index `one_pending_tx_per_order` turns a second pending
/// transaction for the same order into a unique violation, which is reported as
/// [`CheckoutDbError::PendingTransactionExists`].
pub async fn insert_pending(
    transaction: NewPaymentTransaction,
    conn: &mut SqliteConnection,
) -> Result<PaymentTransaction, CheckoutDbError> {
    let order_code = transaction.order_code.clone();
    let tx = sqlx::query_as(
        r#"
            INSERT INTO payment_transactions (id, order_code, rail, amount, token, memo, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *;
        "#,
    )
    .bind(transaction.id)
    .bind(transaction.order_code)
    .bind(transaction.rail.to_string())
    .bind(transaction.amount)
    .bind(transaction.token)
    .bind(transaction.memo)
    .bind(transaction.expires_at)
    .fetch_one(conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(err) if err.is_unique_violation() => {
            CheckoutDbError::PendingTransactionExists(order_code)
        },
        _ => CheckoutDbError::from(e),
    })?;
    Ok(tx)
}

pub async fn fetch_transaction(
    id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentTransaction>, CheckoutDbError> {
    let tx = sqlx::query_as("SELECT * FROM payment_transactions WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(tx)
}

pub async fn fetch_pending(conn: &mut SqliteConnection) -> Result<Vec<PaymentTransaction>, CheckoutDbError> {
    let txs = sqlx::query_as("SELECT * FROM payment_transactions WHERE status = 'Pending' ORDER BY created_at")
        .fetch_all(conn)
        .await?;
    Ok(txs)
}

/// The matcher's candidate set: pending transactions that have not lapsed as of `now`. The set is bounded in
/// practice because every member is at most one TTL old.
pub async fn fetch_pending_unexpired(
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<PaymentTransaction>, CheckoutDbError> {
    let txs = sqlx::query_as(
        r#"
            SELECT * FROM payment_transactions
            WHERE status = 'Pending' AND unixepoch(expires_at) > unixepoch($1)
            ORDER BY created_at
        "#,
    )
    .bind(now)
    .fetch_all(conn)
    .await?;
    Ok(txs)
}

/// The guarded `Pending -> Confirmed` transition. Only succeeds while the transaction is pending and unexpired as
/// of `now`; everyone else gets `None` and must inspect the row the winner left behind.
pub async fn confirm(
    id: &str,
    confirmed_by: &str,
    gateway_ref: Option<&str>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentTransaction>, CheckoutDbError> {
    let tx: Option<PaymentTransaction> = sqlx::query_as(
        r#"
            UPDATE payment_transactions
            SET status = 'Confirmed',
                confirmed_by = $2,
                gateway_ref = COALESCE($3, gateway_ref),
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $1 AND status = 'Pending' AND unixepoch(expires_at) > unixepoch($4)
            RETURNING *
        "#,
    )
    .bind(id)
    .bind(confirmed_by)
    .bind(gateway_ref)
    .bind(now)
    .fetch_optional(conn)
    .await?;
    if let Some(tx) = &tx {
        debug!("🗃️ Transaction {id} confirmed by {confirmed_by} for order [{}]", tx.order_code);
    }
    Ok(tx)
}

/// The guarded `Pending -> Rejected` transition, symmetric to [`confirm`].
pub async fn reject(
    id: &str,
    reason: &str,
    rejected_by: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentTransaction>, CheckoutDbError> {
    let tx = sqlx::query_as(
        r#"
            UPDATE payment_transactions
            SET status = 'Rejected', note = $2, confirmed_by = $3, updated_at = CURRENT_TIMESTAMP
            WHERE id = $1 AND status = 'Pending' AND unixepoch(expires_at) > unixepoch($4)
            RETURNING *
        "#,
    )
    .bind(id)
    .bind(reason)
    .bind(rejected_by)
    .bind(now)
    .fetch_optional(conn)
    .await?;
    if tx.is_some() {
        debug!("🗃️ Transaction {id} rejected by {rejected_by}: {reason}");
    }
    Ok(tx)
}

/// Rejects whatever pending transaction the order still has. Used when an order is cancelled so that a racing
/// webhook confirmation finds a terminal transaction instead of settling a dead order.
pub async fn reject_pending_for_order(
    order_code: &OrderId,
    reason: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentTransaction>, CheckoutDbError> {
    let tx = sqlx::query_as(
        r#"
            UPDATE payment_transactions
            SET status = 'Rejected', note = $2, updated_at = CURRENT_TIMESTAMP
            WHERE order_code = $1 AND status = 'Pending'
            RETURNING *
        "#,
    )
    .bind(order_code.as_str())
    .bind(reason)
    .fetch_optional(conn)
    .await?;
    Ok(tx)
}

/// Bulk `Pending -> Expired` sweep for transactions whose expiry lies at or before `now`. Returns only the rows
/// this call transitioned, so racing sweeps never double-report.
pub async fn expire_due(
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<PaymentTransaction>, CheckoutDbError> {
    let rows: Vec<PaymentTransaction> = sqlx::query_as(
        r#"
            UPDATE payment_transactions
            SET status = 'Expired', updated_at = CURRENT_TIMESTAMP
            WHERE status = 'Pending' AND unixepoch(expires_at) <= unixepoch($1)
            RETURNING *
        "#,
    )
    .bind(now)
    .fetch_all(conn)
    .await?;
    trace!("🗃️ {} transaction(s) expired by sweep", rows.len());
    Ok(rows)
}
