pub mod checkout_api;
pub mod registry_api;

pub use checkout_api::CheckoutApi;
pub use registry_api::{PaymentRegistry, ReconciliationOutcome, StatusReport};
