use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use log::error;
use serde::{Deserialize, Serialize};
use spg_common::Vnd;
use sqlx::{FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ConversionError(String);

//--------------------------------------        OrderId        -------------------------------------------------------
/// The human-readable order code, e.g. `DH1716203993411042`. This is the string a payer is asked to include in their
/// transfer memo, so it is kept short, alphanumeric, and prefix-stable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct OrderId(pub String);

impl FromStr for OrderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl OrderId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------   OrderStatusType     -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum OrderStatusType {
    /// The order exists and is waiting for payment and/or merchant confirmation.
    AwaitingConfirmation,
    /// Payment has been settled (or the merchant confirmed a CoD order).
    Confirmed,
    /// The order was cancelled by the customer while still awaiting confirmation.
    Cancelled,
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatusType::AwaitingConfirmation => write!(f, "AwaitingConfirmation"),
            OrderStatusType::Confirmed => write!(f, "Confirmed"),
            OrderStatusType::Cancelled => write!(f, "Cancelled"),
        }
    }
}

impl FromStr for OrderStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AwaitingConfirmation" => Ok(Self::AwaitingConfirmation),
            "Confirmed" => Ok(Self::Confirmed),
            "Cancelled" => Ok(Self::Cancelled),
            s => Err(ConversionError(format!("Invalid order status: {s}"))),
        }
    }
}

impl From<String> for OrderStatusType {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid order status: {value}. But this conversion cannot fail. Defaulting to AwaitingConfirmation");
            OrderStatusType::AwaitingConfirmation
        })
    }
}

//--------------------------------------    PaymentMethod      -------------------------------------------------------
/// How the customer intends to settle the order. `Bank` and `Wallet` settle through QR payment transactions; `Cod`
/// settles on delivery; `Card` settles through the hosted card checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum PaymentMethod {
    Cod,
    Bank,
    Wallet,
    Card,
}

impl Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentMethod::Cod => write!(f, "Cod"),
            PaymentMethod::Bank => write!(f, "Bank"),
            PaymentMethod::Wallet => write!(f, "Wallet"),
            PaymentMethod::Card => write!(f, "Card"),
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cod" => Ok(Self::Cod),
            "bank" => Ok(Self::Bank),
            "wallet" => Ok(Self::Wallet),
            "card" => Ok(Self::Card),
            s => Err(ConversionError(format!("Invalid payment method: {s}"))),
        }
    }
}

impl From<String> for PaymentMethod {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid payment method: {value}. But this conversion cannot fail. Defaulting to Cod");
            PaymentMethod::Cod
        })
    }
}

//--------------------------------------     PaymentRail       -------------------------------------------------------
/// The out-of-band settlement rails that require a pending payment transaction and reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum PaymentRail {
    Bank,
    Wallet,
}

impl Display for PaymentRail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentRail::Bank => write!(f, "Bank"),
            PaymentRail::Wallet => write!(f, "Wallet"),
        }
    }
}

impl FromStr for PaymentRail {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bank" => Ok(Self::Bank),
            "wallet" => Ok(Self::Wallet),
            s => Err(ConversionError(format!("Invalid payment rail: {s}"))),
        }
    }
}

impl From<String> for PaymentRail {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid payment rail: {value}. But this conversion cannot fail. Defaulting to Bank");
            PaymentRail::Bank
        })
    }
}

impl PaymentRail {
    /// The prefix used when minting transaction ids, e.g. `bank_DH1716203993411042_1716204000123`.
    pub fn id_prefix(&self) -> &'static str {
        match self {
            PaymentRail::Bank => "bank",
            PaymentRail::Wallet => "wallet",
        }
    }
}

//--------------------------------------       TxStatus        -------------------------------------------------------
/// Lifecycle of a payment transaction. Transitions are monotonic: `Pending` moves to exactly one of the terminal
/// states and never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum TxStatus {
    Pending,
    Confirmed,
    Rejected,
    Expired,
}

impl TxStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TxStatus::Pending)
    }
}

impl Display for TxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TxStatus::Pending => write!(f, "Pending"),
            TxStatus::Confirmed => write!(f, "Confirmed"),
            TxStatus::Rejected => write!(f, "Rejected"),
            TxStatus::Expired => write!(f, "Expired"),
        }
    }
}

impl FromStr for TxStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Confirmed" => Ok(Self::Confirmed),
            "Rejected" => Ok(Self::Rejected),
            "Expired" => Ok(Self::Expired),
            s => Err(ConversionError(format!("Invalid transaction status: {s}"))),
        }
    }
}

impl From<String> for TxStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid transaction status: {value}. But this conversion cannot fail. Defaulting to Pending");
            TxStatus::Pending
        })
    }
}

//--------------------------------------        Order        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub order_code: OrderId,
    pub customer_id: i64,
    pub subtotal: Vnd,
    pub discount: Vnd,
    pub total: Vnd,
    pub voucher_id: Option<i64>,
    pub delivery_address: String,
    pub recipient_name: String,
    pub phone: String,
    pub note: Option<String>,
    pub payment_method: PaymentMethod,
    pub paid: bool,
    pub status: OrderStatusType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// An order can accept a new payment transaction while it is awaiting confirmation and unpaid.
    pub fn is_payable(&self) -> bool {
        self.status == OrderStatusType::AwaitingConfirmation && !self.paid
    }
}

//--------------------------------------      OrderItem      ---------------------------------------------------------
/// A line item snapshot. Name and unit price are copied from the catalog at order-creation time and never re-read.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub product_id: i64,
    pub name: String,
    pub quantity: i64,
    pub unit_price: Vnd,
}

//--------------------------------------     DeliveryInfo    ---------------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryInfo {
    pub address: String,
    pub recipient_name: String,
    pub phone: String,
    #[serde(default)]
    pub note: Option<String>,
}

//--------------------------------------   NewOrderRequest   ---------------------------------------------------------
/// Everything the Order Transaction Coordinator needs to turn a cart selection into a durable order.
#[derive(Debug, Clone)]
pub struct NewOrderRequest {
    pub customer_id: i64,
    /// The cart line ids the customer chose at checkout. The rest of the cart is left untouched.
    pub selected_item_ids: Vec<i64>,
    pub delivery: DeliveryInfo,
    pub payment_method: PaymentMethod,
    pub voucher_code: Option<String>,
}

//--------------------------------------       CartLine      ---------------------------------------------------------
/// A cart item joined with its live catalog row, as read at the start of the checkout transaction.
#[derive(Debug, Clone, FromRow)]
pub struct CartLine {
    pub cart_id: i64,
    pub product_id: i64,
    pub sku: String,
    pub name: String,
    pub quantity: i64,
    pub unit_price: Vnd,
    pub stock: i64,
}

impl CartLine {
    pub fn line_total(&self) -> Vnd {
        self.unit_price * self.quantity
    }
}

//--------------------------------------       Product       ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub sku: String,
    pub name: String,
    pub unit_price: Vnd,
    pub stock: i64,
    pub unit: String,
}

//--------------------------------------  PaymentTransaction  --------------------------------------------------------
/// One attempt to settle one order through one QR rail. Retained indefinitely for audit once terminal.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PaymentTransaction {
    pub id: String,
    pub order_code: OrderId,
    pub rail: PaymentRail,
    /// Equal to the order's total at creation time. Immutable thereafter.
    pub amount: Vnd,
    /// Short numeric verification token embedded in the rendered memo.
    pub token: String,
    /// The transfer memo the payer is instructed to use, e.g. `TT DH100 CODE 55213`.
    pub memo: String,
    pub status: TxStatus,
    /// Free-form annotation, e.g. a rejection reason or the source bank code recorded on settlement.
    pub note: Option<String>,
    pub confirmed_by: Option<String>,
    pub gateway_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentTransaction {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// The status as observed at `now`. A transaction past its expiry reads as `Expired` even if the sweeper has not
    /// caught up with it yet.
    pub fn effective_status(&self, now: DateTime<Utc>) -> TxStatus {
        if self.status == TxStatus::Pending && self.is_expired_at(now) {
            TxStatus::Expired
        } else {
            self.status
        }
    }
}

//------------------------------------ NewPaymentTransaction ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewPaymentTransaction {
    pub id: String,
    pub order_code: OrderId,
    pub rail: PaymentRail,
    pub amount: Vnd,
    pub token: String,
    pub memo: String,
    pub expires_at: DateTime<Utc>,
}

//--------------------------------------       Voucher       ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum DiscountKind {
    Percent,
    Fixed,
}

impl Display for DiscountKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiscountKind::Percent => write!(f, "Percent"),
            DiscountKind::Fixed => write!(f, "Fixed"),
        }
    }
}

impl FromStr for DiscountKind {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Percent" => Ok(Self::Percent),
            "Fixed" => Ok(Self::Fixed),
            s => Err(ConversionError(format!("Invalid discount kind: {s}"))),
        }
    }
}

impl From<String> for DiscountKind {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid discount kind: {value}. But this conversion cannot fail. Defaulting to Fixed");
            DiscountKind::Fixed
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum VoucherStatus {
    Active,
    Disabled,
}

impl Display for VoucherStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VoucherStatus::Active => write!(f, "Active"),
            VoucherStatus::Disabled => write!(f, "Disabled"),
        }
    }
}

impl FromStr for VoucherStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Active" => Ok(Self::Active),
            "Disabled" => Ok(Self::Disabled),
            s => Err(ConversionError(format!("Invalid voucher status: {s}"))),
        }
    }
}

impl From<String> for VoucherStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid voucher status: {value}. But this conversion cannot fail. Defaulting to Disabled");
            VoucherStatus::Disabled
        })
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Voucher {
    pub id: i64,
    pub code: String,
    pub kind: DiscountKind,
    /// Percentage points for `Percent`, a flat đồng amount for `Fixed`.
    pub value: i64,
    pub min_order: Option<Vnd>,
    pub max_discount: Option<Vnd>,
    pub allowance: i64,
    pub used: i64,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub status: VoucherStatus,
}

//---------------------------------- InboundNotification -------------------------------------------------------------
/// One webhook delivery, normalized from whichever vendor format it arrived in. Never persisted as-is: it is consumed
/// once by the matcher and then either becomes a transaction transition or an unmatched-notification record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundNotification {
    pub amount: Vnd,
    pub memo: String,
    pub external_ref: String,
    pub source_account: String,
    pub rail_code: String,
}
