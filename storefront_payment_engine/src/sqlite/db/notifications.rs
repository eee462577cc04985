use sqlx::SqliteConnection;

use crate::{db_types::InboundNotification, traits::CheckoutDbError};

/// Durably records a webhook delivery that could not be matched. These rows are the manual-review queue; dropping a
/// notification on the floor means somebody's payment vanishes.
pub async fn insert_unmatched(
    notification: &InboundNotification,
    reason: &str,
    conn: &mut SqliteConnection,
) -> Result<i64, CheckoutDbError> {
    let id = sqlx::query_scalar(
        r#"
            INSERT INTO unmatched_notifications (amount, memo, external_ref, source_account, rail_code, reason)
            VALUES ($1, $2, $3, $4, $5, $6) RETURNING id
        "#,
    )
    .bind(notification.amount)
    .bind(&notification.memo)
    .bind(&notification.external_ref)
    .bind(&notification.source_account)
    .bind(&notification.rail_code)
    .bind(reason)
    .fetch_one(conn)
    .await?;
    Ok(id)
}

pub async fn unmatched_count(conn: &mut SqliteConnection) -> Result<i64, CheckoutDbError> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM unmatched_notifications").fetch_one(conn).await?;
    Ok(count)
}
