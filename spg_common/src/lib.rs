pub mod op;

mod secret;
mod vnd;

pub use secret::Secret;
pub use vnd::{Vnd, VndConversionError, VND_CURRENCY_CODE, VND_CURRENCY_CODE_LOWER};
