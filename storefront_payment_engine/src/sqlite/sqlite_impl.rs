//! `SqliteDatabase` is a concrete implementation of a storefront payment gateway backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements the [`CheckoutDatabase`] trait. Every method that
//! must be all-or-nothing runs inside a single `pool.begin()` / `commit()` pair; an early return drops the
//! transaction and rolls the whole unit back.
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use spg_common::Vnd;
use sqlx::SqlitePool;

use super::db::{carts, new_pool, notifications, orders, products, transactions, vouchers};
use crate::{
    db_types::{
        InboundNotification,
        NewOrderRequest,
        NewPaymentTransaction,
        Order,
        OrderId,
        OrderItem,
        PaymentTransaction,
        Voucher,
    },
    helpers::new_order_code,
    traits::{CheckoutDatabase, CheckoutDbError, SettleOutcome, TransitionOutcome},
    voucher,
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, CheckoutDbError> {
        let pool = new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl CheckoutDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn create_order_from_cart(&self, request: NewOrderRequest) -> Result<Order, CheckoutDbError> {
        if request.selected_item_ids.is_empty() {
            return Err(CheckoutDbError::EmptySelection);
        }
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let lines = carts::fetch_selected_lines(request.customer_id, &request.selected_item_ids, &mut tx).await?;
        if lines.is_empty() {
            return Err(CheckoutDbError::EmptySelection);
        }
        let subtotal: Vnd = lines.iter().map(|l| l.line_total()).sum();
        let (discount, applied_voucher) = match &request.voucher_code {
            Some(code) => {
                let record = vouchers::fetch_by_code(code, &mut tx)
                    .await?
                    .ok_or_else(|| CheckoutDbError::VoucherNotFound(code.clone()))?;
                let result = voucher::evaluate(&record, subtotal, now)?;
                (result.discount, Some(record))
            },
            None => (Vnd::from(0), None),
        };
        let order_code = new_order_code(now);
        let voucher_id = applied_voucher.as_ref().map(|v| v.id);
        let order = orders::insert_order(&order_code, &request, subtotal, discount, voucher_id, &mut tx).await?;
        orders::insert_order_items(order.id, &lines, &mut tx).await?;
        if let Some(record) = applied_voucher {
            let redeemed = vouchers::redeem(record.id, order.id, request.customer_id, discount, &mut tx).await?;
            if !redeemed {
                // The allowance race was lost between evaluation and redemption.
                return Err(CheckoutDbError::VoucherRejected(voucher::VoucherError::Exhausted));
            }
        }
        for line in &lines {
            let decremented = products::decrement_stock(line.product_id, line.quantity, &mut tx).await?;
            if !decremented {
                return Err(CheckoutDbError::OutOfStock { sku: line.sku.clone() });
            }
        }
        carts::delete_lines(request.customer_id, &request.selected_item_ids, &mut tx).await?;
        tx.commit().await?;
        debug!(
            "🗃️ Order [{}] created for customer #{}: {} - {} = {}",
            order.order_code, order.customer_id, order.subtotal, order.discount, order.total
        );
        Ok(order)
    }

    async fn cancel_order(&self, order_code: &OrderId, customer_id: i64) -> Result<Order, CheckoutDbError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::fetch_order_by_code(order_code, &mut tx)
            .await?
            .filter(|o| o.customer_id == customer_id)
            .ok_or_else(|| CheckoutDbError::OrderNotFound(order_code.clone()))?;
        let cancelled = orders::cancel_order(order_code, &mut tx)
            .await?
            .ok_or_else(|| CheckoutDbError::OrderNotCancellable(order_code.clone()))?;
        let items = orders::fetch_order_items(order.id, &mut tx).await?;
        for item in &items {
            products::restore_stock(item.product_id, item.quantity, &mut tx).await?;
        }
        // Any in-flight payment attempt dies with the order, so a racing webhook match finds a terminal
        // transaction instead of settling a cancelled order. The voucher redemption slot stays consumed.
        if let Some(dead) = transactions::reject_pending_for_order(order_code, "Order cancelled", &mut tx).await? {
            debug!("🗃️ Pending transaction {} rejected because order [{order_code}] was cancelled", dead.id);
        }
        tx.commit().await?;
        info!("🗃️ Order [{order_code}] cancelled; stock restored for {} line item(s)", items.len());
        Ok(cancelled)
    }

    async fn fetch_order_by_code(&self, order_code: &OrderId) -> Result<Option<Order>, CheckoutDbError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_code(order_code, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_order_items(&self, order_id: i64) -> Result<Vec<OrderItem>, CheckoutDbError> {
        let mut conn = self.pool.acquire().await?;
        let items = orders::fetch_order_items(order_id, &mut conn).await?;
        Ok(items)
    }

    async fn fetch_orders_for_customer(&self, customer_id: i64) -> Result<Vec<Order>, CheckoutDbError> {
        let mut conn = self.pool.acquire().await?;
        let result = orders::fetch_orders_for_customer(customer_id, &mut conn).await?;
        Ok(result)
    }

    async fn insert_pending_transaction(
        &self,
        transaction: NewPaymentTransaction,
    ) -> Result<PaymentTransaction, CheckoutDbError> {
        let mut conn = self.pool.acquire().await?;
        let tx = transactions::insert_pending(transaction, &mut conn).await?;
        debug!("🗃️ Pending transaction {} recorded for order [{}], expires {}", tx.id, tx.order_code, tx.expires_at);
        Ok(tx)
    }

    async fn fetch_transaction(&self, id: &str) -> Result<Option<PaymentTransaction>, CheckoutDbError> {
        let mut conn = self.pool.acquire().await?;
        let tx = transactions::fetch_transaction(id, &mut conn).await?;
        Ok(tx)
    }

    async fn fetch_pending_transactions(&self) -> Result<Vec<PaymentTransaction>, CheckoutDbError> {
        let mut conn = self.pool.acquire().await?;
        let txs = transactions::fetch_pending(&mut conn).await?;
        Ok(txs)
    }

    async fn fetch_pending_unexpired(&self, now: DateTime<Utc>) -> Result<Vec<PaymentTransaction>, CheckoutDbError> {
        let mut conn = self.pool.acquire().await?;
        let txs = transactions::fetch_pending_unexpired(now, &mut conn).await?;
        Ok(txs)
    }

    async fn settle_transaction(
        &self,
        id: &str,
        confirmed_by: &str,
        gateway_ref: Option<&str>,
    ) -> Result<SettleOutcome, CheckoutDbError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        match transactions::confirm(id, confirmed_by, gateway_ref, now, &mut tx).await? {
            Some(confirmed) => {
                let order = match orders::settle_order(&confirmed.order_code, &mut tx).await? {
                    Some(order) => order,
                    // The paid flag was already set; fall back to the row as it stands.
                    None => orders::fetch_order_by_code(&confirmed.order_code, &mut tx)
                        .await?
                        .ok_or_else(|| CheckoutDbError::OrderNotFound(confirmed.order_code.clone()))?,
                };
                tx.commit().await?;
                Ok(SettleOutcome { transition: TransitionOutcome::Transitioned(confirmed), order })
            },
            None => {
                let existing = transactions::fetch_transaction(id, &mut tx)
                    .await?
                    .ok_or_else(|| CheckoutDbError::TransactionNotFound(id.to_string()))?;
                let order = orders::fetch_order_by_code(&existing.order_code, &mut tx)
                    .await?
                    .ok_or_else(|| CheckoutDbError::OrderNotFound(existing.order_code.clone()))?;
                tx.commit().await?;
                trace!("🗃️ Settle of {id} was a no-op; transaction is {}", existing.effective_status(now));
                Ok(SettleOutcome { transition: TransitionOutcome::AlreadyTerminal(existing), order })
            },
        }
    }

    async fn reject_transaction(
        &self,
        id: &str,
        reason: &str,
        rejected_by: &str,
    ) -> Result<TransitionOutcome, CheckoutDbError> {
        let now = Utc::now();
        let mut conn = self.pool.acquire().await?;
        match transactions::reject(id, reason, rejected_by, now, &mut conn).await? {
            Some(rejected) => Ok(TransitionOutcome::Transitioned(rejected)),
            None => {
                let existing = transactions::fetch_transaction(id, &mut conn)
                    .await?
                    .ok_or_else(|| CheckoutDbError::TransactionNotFound(id.to_string()))?;
                Ok(TransitionOutcome::AlreadyTerminal(existing))
            },
        }
    }

    async fn expire_transactions(&self, now: DateTime<Utc>) -> Result<Vec<PaymentTransaction>, CheckoutDbError> {
        let mut conn = self.pool.acquire().await?;
        let expired = transactions::expire_due(now, &mut conn).await?;
        Ok(expired)
    }

    async fn record_unmatched_notification(
        &self,
        notification: &InboundNotification,
        reason: &str,
    ) -> Result<i64, CheckoutDbError> {
        let mut conn = self.pool.acquire().await?;
        let id = notifications::insert_unmatched(notification, reason, &mut conn).await?;
        warn!(
            "🗃️ Unmatched notification #{id} recorded: {} / \"{}\" ({reason})",
            notification.amount, notification.memo
        );
        Ok(id)
    }

    async fn fetch_voucher_by_code(&self, code: &str) -> Result<Option<Voucher>, CheckoutDbError> {
        let mut conn = self.pool.acquire().await?;
        let voucher = vouchers::fetch_by_code(code, &mut conn).await?;
        Ok(voucher)
    }
}
