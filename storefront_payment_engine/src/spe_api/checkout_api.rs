use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{NewOrderRequest, Order, OrderId, OrderItem},
    traits::{CheckoutDatabase, CheckoutDbError},
};

/// `CheckoutApi` is the order transaction coordinator: the API that turns a cart selection into a durable, payable
/// order, and handles customer-side order management.
///
/// All the atomicity lives in the backend; this layer validates nothing it cannot see and adds the logging and
/// orchestration around the single `create_order_from_cart` unit.
pub struct CheckoutApi<B> {
    db: B,
}

impl<B> Debug for CheckoutApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CheckoutApi")
    }
}

impl<B> CheckoutApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> CheckoutApi<B>
where B: CheckoutDatabase
{
    /// Places a new order from the customer's selected cart lines.
    ///
    /// Cart validation, voucher redemption, line-item snapshotting, stock decrement and cart cleanup all commit or
    /// roll back together. On success the order is payable: CoD orders simply await the merchant, QR orders proceed
    /// to [`crate::PaymentRegistry::create_pending`].
    pub async fn place_order(&self, request: NewOrderRequest) -> Result<Order, CheckoutDbError> {
        let customer_id = request.customer_id;
        let order = self.db.create_order_from_cart(request).await?;
        info!(
            "🛒️ Order [{}] placed by customer #{customer_id}. Total {} via {}",
            order.order_code, order.total, order.payment_method
        );
        Ok(order)
    }

    /// Cancels an order that is still awaiting confirmation. Stock is restored; the voucher redemption slot is not.
    pub async fn cancel_order(&self, order_code: &OrderId, customer_id: i64) -> Result<Order, CheckoutDbError> {
        let order = self.db.cancel_order(order_code, customer_id).await?;
        info!("🛒️ Order [{}] cancelled by customer #{customer_id}", order.order_code);
        Ok(order)
    }

    /// The order and its line-item snapshots, or `None` if the code is unknown.
    pub async fn order_by_code(&self, order_code: &OrderId) -> Result<Option<(Order, Vec<OrderItem>)>, CheckoutDbError> {
        let Some(order) = self.db.fetch_order_by_code(order_code).await? else {
            return Ok(None);
        };
        let items = self.db.fetch_order_items(order.id).await?;
        Ok(Some((order, items)))
    }

    /// A customer's orders, newest first.
    pub async fn orders_for_customer(&self, customer_id: i64) -> Result<Vec<Order>, CheckoutDbError> {
        self.db.fetch_orders_for_customer(customer_id).await
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}
