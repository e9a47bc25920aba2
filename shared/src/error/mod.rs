//! Error codes and the boundary error type
//!
//! Everything the order engine reports to a caller ends up as an
//! [`AppError`]: a numeric [`ErrorCode`], a message and optional details.
//!
//! ```
//! use shared::error::{AppError, ErrorCategory, ErrorCode};
//!
//! let err = AppError::new(ErrorCode::DonationBelowMinimum).with_detail("minimum", "1.00");
//! assert_eq!(err.code.category(), ErrorCategory::Order);
//! ```

mod codes;
mod types;

pub use codes::{ErrorCategory, ErrorCode, InvalidErrorCode};
pub use types::{AppError, AppResult};
