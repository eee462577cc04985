use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use spg_common::Vnd;
use storefront_payment_engine::{
    db_types::{DeliveryInfo, Order, OrderItem, PaymentTransaction},
    StatusReport,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }

    pub fn failure<S: Display>(message: S) -> Self {
        Self { success: false, message: message.to_string() }
    }
}

/// Body of `POST /api/orders`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderParams {
    pub selected_item_ids: Vec<i64>,
    pub delivery: DeliveryInfo,
    /// One of `cod`, `bank`, `wallet`, `card`.
    pub payment_method: String,
    #[serde(default)]
    pub voucher_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResult {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

/// Everything the checkout UI needs to drive a QR payment: the rendered memo and amount for a manual transfer, the
/// QR image for a scanned one, and the id + expiry to poll against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentTransactionResult {
    pub transaction_id: String,
    pub order_code: String,
    pub amount: Vnd,
    pub memo: String,
    pub expires_at: DateTime<Utc>,
    pub qr_image_url: String,
}

impl PaymentTransactionResult {
    pub fn new(tx: &PaymentTransaction, qr_image_url: String) -> Self {
        Self {
            transaction_id: tx.id.clone(),
            order_code: tx.order_code.to_string(),
            amount: tx.amount,
            memo: tx.memo.clone(),
            expires_at: tx.expires_at,
            qr_image_url,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionStatusResult {
    pub transaction_id: String,
    pub status: StatusReport,
}

/// Body of the admin reject endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectParams {
    pub reason: String,
}

/// Acknowledgement returned to the webhook gateway. Always 200 once the payload is authenticated and parseable;
/// `matched` tells the gateway (and our logs) what became of the delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookAck {
    pub success: bool,
    pub matched: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignored: Option<bool>,
}

impl WebhookAck {
    pub fn matched(transaction_id: &str) -> Self {
        Self { success: true, matched: true, transaction_id: Some(transaction_id.to_string()), ignored: None }
    }

    pub fn unmatched() -> Self {
        Self { success: true, matched: false, transaction_id: None, ignored: None }
    }

    pub fn ignored() -> Self {
        Self { success: true, matched: false, transaction_id: None, ignored: Some(true) }
    }
}
