//! Numeric error codes
//!
//! Codes travel as plain `u16` on the wire. The thousands digit names the
//! area the failure comes from, see [`ErrorCategory`].

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! error_codes {
    ($($(#[$doc:meta])* $name:ident = $value:literal => $message:literal,)+) => {
        /// Error code carried by [`AppError`](super::AppError)
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(into = "u16", try_from = "u16")]
        #[repr(u16)]
        pub enum ErrorCode {
            $($(#[$doc])* $name = $value,)+
        }

        impl ErrorCode {
            /// Default message, used when no specific one is given
            pub const fn message(&self) -> &'static str {
                match self {
                    $(ErrorCode::$name => $message,)+
                }
            }
        }

        impl TryFrom<u16> for ErrorCode {
            type Error = InvalidErrorCode;

            fn try_from(value: u16) -> Result<Self, Self::Error> {
                match value {
                    $($value => Ok(ErrorCode::$name),)+
                    _ => Err(InvalidErrorCode(value)),
                }
            }
        }
    };
}

error_codes! {
    // ==================== 0xxx: Request ====================
    InvalidRequest = 1 => "Invalid request",
    ValueOutOfRange = 2 => "Value is out of range",
    AlreadyExists = 3 => "Resource already exists",

    // ==================== 4xxx: Order ====================
    OrderNotFound = 4001 => "Order not found",
    OrderEmpty = 4002 => "Order has no tickets or donations",
    /// Deleted order never completed payment
    OrderNotRestorable = 4003 => "Order never completed payment and cannot be restored",
    InvalidTransition = 4004 => "Order status does not allow this operation",
    /// A live order already holds the payment, session, transfer or checkout reference
    DuplicateReference = 4005 => "Reference is already used by another order",
    DonationBelowMinimum = 4006 => "Donation is below the minimum amount",
    TicketPriceMissing = 4007 => "Ticket has no price",
    InvalidDiscount = 4008 => "Discount is invalid",

    // ==================== 5xxx: Payment ====================
    /// The gateway refused the request outright
    PaymentFailed = 5001 => "Payment processing failed",
    GatewayNotConfigured = 5002 => "Organiser has no payment gateway configured",
    GatewayError = 5003 => "Payment gateway error",

    // ==================== 6xxx: Catalog ====================
    EventNotFound = 6001 => "Event not found",
    AccountNotFound = 6002 => "Account not found",
    OrganisationNotFound = 6003 => "Organisation not found",
    UnknownCurrency = 6004 => "Unknown currency",
    UnknownExchangeRate = 6005 => "No exchange rate available",

    // ==================== 9xxx: System ====================
    InternalError = 9001 => "Internal error",
    ConfigError = 9002 => "Configuration error",
    /// Disk space exhausted
    StorageFull = 9101 => "Storage full",
    StorageCorrupted = 9102 => "Storage corrupted",
    /// Transient IO failure
    SystemBusy = 9103 => "System busy, please retry later",
}

/// Area an error code belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Request,
    Order,
    Payment,
    Catalog,
    System,
}

impl ErrorCode {
    #[inline]
    pub const fn code(&self) -> u16 {
        *self as u16
    }

    pub const fn category(&self) -> ErrorCategory {
        match self.code() / 1000 {
            0 => ErrorCategory::Request,
            4 => ErrorCategory::Order,
            5 => ErrorCategory::Payment,
            6 => ErrorCategory::Catalog,
            _ => ErrorCategory::System,
        }
    }

    /// Whether the same request may succeed later
    pub const fn is_retryable(&self) -> bool {
        matches!(self, ErrorCode::SystemBusy | ErrorCode::GatewayError)
    }
}

impl From<ErrorCode> for u16 {
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{:04}", self.code())
    }
}

/// A `u16` that names no known code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidErrorCode(pub u16);

impl fmt::Display for InvalidErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid error code: {}", self.0)
    }
}

impl std::error::Error for InvalidErrorCode {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_value_and_display() {
        assert_eq!(ErrorCode::OrderNotFound.code(), 4001);
        assert_eq!(ErrorCode::DuplicateReference.to_string(), "E4005");
        assert_eq!(serde_json::to_string(&ErrorCode::GatewayError).unwrap(), "5003");

        let code: ErrorCode = serde_json::from_str("6004").unwrap();
        assert_eq!(code, ErrorCode::UnknownCurrency);
        assert!(serde_json::from_str::<ErrorCode>("4999").is_err());
        assert_eq!(ErrorCode::try_from(7), Err(InvalidErrorCode(7)));
    }

    #[test]
    fn test_category_by_range() {
        assert_eq!(ErrorCode::InvalidRequest.category(), ErrorCategory::Request);
        assert_eq!(ErrorCode::OrderEmpty.category(), ErrorCategory::Order);
        assert_eq!(ErrorCode::PaymentFailed.category(), ErrorCategory::Payment);
        assert_eq!(ErrorCode::EventNotFound.category(), ErrorCategory::Catalog);
        assert_eq!(ErrorCode::StorageFull.category(), ErrorCategory::System);
    }

    #[test]
    fn test_retryable_codes() {
        assert!(ErrorCode::SystemBusy.is_retryable());
        assert!(ErrorCode::GatewayError.is_retryable());
        assert!(!ErrorCode::PaymentFailed.is_retryable());
        assert!(!ErrorCode::DonationBelowMinimum.is_retryable());
    }
}
