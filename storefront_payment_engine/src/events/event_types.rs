use serde::{Deserialize, Serialize};

use crate::db_types::{Order, PaymentTransaction, TxStatus};

/// The terminal state a payment transaction reached. This is the only thing a listener waiting on a specific
/// transaction needs to know.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionEventKind {
    Confirmed,
    Rejected,
    Expired,
}

impl TransactionEventKind {
    /// The terminal status this event corresponds to. `Pending` has no event; transactions only announce endings.
    pub fn from_status(status: TxStatus) -> Option<Self> {
        match status {
            TxStatus::Confirmed => Some(Self::Confirmed),
            TxStatus::Rejected => Some(Self::Rejected),
            TxStatus::Expired => Some(Self::Expired),
            TxStatus::Pending => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionEvent {
    pub transaction_id: String,
    pub kind: TransactionEventKind,
}

impl TransactionEvent {
    pub fn new(transaction: &PaymentTransaction, kind: TransactionEventKind) -> Self {
        Self { transaction_id: transaction.id.clone(), kind }
    }
}

/// Emitted when an order's payment settles, whichever actor won the race to confirm it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPaidEvent {
    pub order: Order,
}

impl OrderPaidEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}
