//! The trait seam between the engine's public API and a concrete storage backend.
//!
//! Backends implement [`CheckoutDatabase`]; everything above it (the checkout coordinator, the payment registry,
//! the HTTP server) is written against the trait, never against SQLite directly.
mod checkout_database;
mod data_objects;

pub use checkout_database::{CheckoutDatabase, CheckoutDbError};
pub use data_objects::{SettleOutcome, TransitionOutcome};
