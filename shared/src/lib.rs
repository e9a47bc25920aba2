//! Shared types for the box office
//!
//! Domain models, money arithmetic and error codes used by the order
//! engine and by anything that talks to it.

pub mod error;
pub mod models;
pub mod money;
pub mod util;

// Re-exports
pub use error::{AppError, AppResult, ErrorCategory, ErrorCode};
pub use money::{Currency, ExchangeRates, Money, MoneyError, MoneyResult, StaticRates};
pub use serde::{Deserialize, Serialize};
