//! Inbound gateway integrations.
//!
//! Each vendor gets a normalization adapter that turns its webhook payload into the engine's
//! [`InboundNotification`](storefront_payment_engine::db_types::InboundNotification). Supporting a new gateway
//! means adding an adapter here; the matcher never changes.
pub mod bank_webhook;
