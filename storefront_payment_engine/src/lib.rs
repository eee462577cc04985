//! Storefront Payment Engine
//!
//! The core of the storefront's checkout and payment-settlement subsystem. This library is transport-agnostic: it
//! knows nothing about HTTP, QR image rendering or webhook signatures, only about orders, payment transactions and
//! how the two are reconciled.
//!
//! The library is divided into three main sections:
//! 1. Database management and control ([`mod@sqlite`]). You should never need to access the database directly;
//!    use the public APIs instead. The exception is the data types stored in the database, which are defined in
//!    [`mod@db_types`] and are public.
//! 2. The engine public API ([`mod@spe_api`]): [`CheckoutApi`] for the atomic order-creation flow and
//!    [`PaymentRegistry`] for the pending-transaction lifecycle and webhook reconciliation. Backends implement the
//!    traits in [`mod@traits`] to plug in under these APIs.
//! 3. The pure decision logic: the layered reconciliation [`mod@matcher`] and the [`mod@voucher`] evaluator. Both
//!    are side-effect free and exhaustively unit-tested.
//!
//! The engine also emits events when transactions reach a terminal state and when orders settle. Subscribe through
//! [`events::EventHooks`] for fire-and-forget handlers, or through [`events::TransactionPublisher`] to wait on one
//! specific transaction.
pub mod db_types;
pub mod events;
pub mod helpers;
pub mod matcher;
pub mod voucher;

mod spe_api;
mod traits;

#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use spe_api::{CheckoutApi, PaymentRegistry, ReconciliationOutcome, StatusReport};
pub use traits::{CheckoutDatabase, CheckoutDbError, SettleOutcome, TransitionOutcome};
