use chrono::{DateTime, Utc};
use thiserror::Error;

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
    traits::{SettleOutcome, TransitionOutcome},
    voucher::VoucherError,
};

/// This trait defines the storage behaviour backing the storefront payment gateway.
///
/// The behaviour includes:
/// * Turning a cart selection into a durable order in a single atomic unit
/// * The pending payment-transaction lifecycle, with every terminal transition expressed as a conditional update
/// * Durable capture of webhook notifications that could not be matched
#[allow(async_fn_in_trait)]
pub trait CheckoutDatabase: Clone {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Takes a checkout request and, in a single atomic transaction:
    /// * loads the selected cart lines and snapshots live catalog prices into the order,
    /// * evaluates and redeems the voucher (if any), incrementing its used-count conditionally,
    /// * inserts the order and its line items with `total = subtotal - discount`,
    /// * decrements stock per SKU with a conditional update that fails the whole unit if any SKU would go negative,
    /// * removes only the consumed cart lines.
    ///
    /// Either a fully-formed payable order exists afterwards, or nothing changed.
    async fn create_order_from_cart(&self, request: NewOrderRequest) -> Result<Order, CheckoutDbError>;

    /// Cancels an order that is still awaiting confirmation, restoring stock for each line item in the same
    /// transaction. The voucher redemption slot is deliberately not released.
    async fn cancel_order(&self, order_code: &OrderId, customer_id: i64) -> Result<Order, CheckoutDbError>;

    async fn fetch_order_by_code(&self, order_code: &OrderId) -> Result<Option<Order>, CheckoutDbError>;

    async fn fetch_order_items(&self, order_id: i64) -> Result<Vec<OrderItem>, CheckoutDbError>;

    /// Orders for a customer, newest first.
    async fn fetch_orders_for_customer(&self, customer_id: i64) -> Result<Vec<Order>, CheckoutDbError>;

    /// Persists a new pending transaction. The backend enforces at most one pending transaction per order; a
    /// violation surfaces as [`CheckoutDbError::PendingTransactionExists`].
    async fn insert_pending_transaction(
        &self,
        transaction: NewPaymentTransaction,
    ) -> Result<PaymentTransaction, CheckoutDbError>;

    async fn fetch_transaction(&self, id: &str) -> Result<Option<PaymentTransaction>, CheckoutDbError>;

    /// All transactions still marked pending, regardless of expiry. Used to rebuild the in-memory index.
    async fn fetch_pending_transactions(&self) -> Result<Vec<PaymentTransaction>, CheckoutDbError>;

    /// Pending transactions whose expiry lies after `now` -- the matcher's candidate set.
    async fn fetch_pending_unexpired(&self, now: DateTime<Utc>) -> Result<Vec<PaymentTransaction>, CheckoutDbError>;

    /// Conditionally transitions the transaction to `Confirmed` and, in the same unit, marks the linked order paid
    /// and confirmed. Only succeeds while the transaction is pending and unexpired; a transaction past its expiry is
    /// flipped to `Expired` instead so that read-time and settle-time agree. Never an error when losing a race.
    async fn settle_transaction(
        &self,
        id: &str,
        confirmed_by: &str,
        gateway_ref: Option<&str>,
    ) -> Result<SettleOutcome, CheckoutDbError>;

    /// Conditionally transitions the transaction to `Rejected`. The linked order is untouched and can accept a new
    /// payment attempt.
    async fn reject_transaction(
        &self,
        id: &str,
        reason: &str,
        rejected_by: &str,
    ) -> Result<TransitionOutcome, CheckoutDbError>;

    /// Transitions every pending transaction whose expiry has passed to `Expired`, returning the rows that were
    /// actually transitioned by this call. Linked orders keep awaiting confirmation.
    async fn expire_transactions(&self, now: DateTime<Utc>) -> Result<Vec<PaymentTransaction>, CheckoutDbError>;

    /// Records a webhook notification that could not be matched (or matched ambiguously) for manual review.
    async fn record_unmatched_notification(
        &self,
        notification: &InboundNotification,
        reason: &str,
    ) -> Result<i64, CheckoutDbError>;

    async fn fetch_voucher_by_code(&self, code: &str) -> Result<Option<Voucher>, CheckoutDbError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), CheckoutDbError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum CheckoutDbError {
    #[error("We have an internal database engine error (configuration/uptime etc.): {0}")]
    DatabaseError(String),
    #[error("No cart items were selected for checkout")]
    EmptySelection,
    #[error("Insufficient stock for {sku}")]
    OutOfStock { sku: String },
    #[error("Voucher {0} does not exist")]
    VoucherNotFound(String),
    #[error("{0}")]
    VoucherRejected(#[from] VoucherError),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("Order {0} can no longer be cancelled")]
    OrderNotCancellable(OrderId),
    #[error("Order {0} is not payable: {1}")]
    OrderNotPayable(OrderId, String),
    #[error("Order {0} already has a pending payment transaction")]
    PendingTransactionExists(OrderId),
    #[error("The requested payment transaction {0} does not exist")]
    TransactionNotFound(String),
}

impl From<sqlx::Error> for CheckoutDbError {
    fn from(e: sqlx::Error) -> Self {
        CheckoutDbError::DatabaseError(e.to_string())
    }
}
