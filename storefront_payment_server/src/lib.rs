//! # Storefront payment server
//! This crate hosts the HTTP surface of the storefront payment gateway. It is responsible for:
//! * The checkout-facing API: placing orders, creating QR payment transactions, polling their status.
//! * Listening for incoming bank/wallet webhook notifications, normalizing them, and feeding them to the
//!   reconciliation matcher.
//! * The administrative manual-override endpoints, which go through the same guarded settlement path as the
//!   automated matcher.
//! * The expiry sweeper that retires lapsed payment transactions in the background.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config] for more information.
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod expiry_worker;
pub mod integrations;
pub mod routes;
pub mod server;

#[cfg(test)]
mod endpoint_tests;
