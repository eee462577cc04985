use sqlx::{QueryBuilder, SqliteConnection};

use crate::{db_types::CartLine, traits::CheckoutDbError};

/// Fetches the selected cart lines for the customer, joined with the live catalog row for each product. Lines that
/// do not belong to the customer are silently excluded, so the result can be shorter than the id list.
pub async fn fetch_selected_lines(
    customer_id: i64,
    item_ids: &[i64],
    conn: &mut SqliteConnection,
) -> Result<Vec<CartLine>, CheckoutDbError> {
    if item_ids.is_empty() {
        return Ok(Vec::new());
    }
    let mut builder = QueryBuilder::new(
        r#"
        SELECT
            cart_items.id as cart_id,
            cart_items.product_id as product_id,
            products.sku as sku,
            products.name as name,
            cart_items.quantity as quantity,
            products.unit_price as unit_price,
            products.stock as stock
        FROM cart_items JOIN products ON cart_items.product_id = products.id
        WHERE cart_items.customer_id = "#,
    );
    builder.push_bind(customer_id);
    builder.push(" AND cart_items.id IN (");
    let mut ids = builder.separated(", ");
    for id in item_ids {
        ids.push_bind(*id);
    }
    builder.push(") ORDER BY cart_items.id");
    let lines = builder.build_query_as::<CartLine>().fetch_all(conn).await?;
    Ok(lines)
}

/// Removes only the consumed cart lines; the rest of the customer's cart is left alone.
pub async fn delete_lines(
    customer_id: i64,
    item_ids: &[i64],
    conn: &mut SqliteConnection,
) -> Result<u64, CheckoutDbError> {
    if item_ids.is_empty() {
        return Ok(0);
    }
    let mut builder = QueryBuilder::new("DELETE FROM cart_items WHERE customer_id = ");
    builder.push_bind(customer_id);
    builder.push(" AND id IN (");
    let mut ids = builder.separated(", ");
    for id in item_ids {
        ids.push_bind(*id);
    }
    builder.push(")");
    let result = builder.build().execute(conn).await?;
    Ok(result.rows_affected())
}

/// Test and seed helper: drops a line into a customer's cart.
pub async fn add_item(
    customer_id: i64,
    product_id: i64,
    quantity: i64,
    conn: &mut SqliteConnection,
) -> Result<i64, CheckoutDbError> {
    let id = sqlx::query_scalar(
        "INSERT INTO cart_items (customer_id, product_id, quantity) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(customer_id)
    .bind(product_id)
    .bind(quantity)
    .fetch_one(conn)
    .await?;
    Ok(id)
}
