use crate::gateway::GatewayError;
use crate::orders::error::OrderError;
use crate::orders::storage::StorageError;
use shared::{AppError, ErrorCode, MoneyError};
use thiserror::Error;

/// Manager errors
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Money(#[from] MoneyError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("No order holds payment reference: {0}")]
    PaymentReferenceNotFound(String),

    #[error("Event not found: {0}")]
    EventNotFound(String),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Organisation not found: {0}")]
    OrganisationNotFound(String),

    #[error("Payment processing not configured for organisation: {0}")]
    GatewayNotConfigured(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type ManagerResult<T> = Result<T, ManagerError>;

/// Map a storage error to an error code
fn classify_storage_error(e: &StorageError) -> ErrorCode {
    match e {
        StorageError::Serialization(_) => return ErrorCode::InternalError,
        StorageError::OrderExists(_) => return ErrorCode::AlreadyExists,
        StorageError::DuplicateReference { .. } => return ErrorCode::DuplicateReference,
        _ => {}
    }

    // redb errors are classified by message
    let err_str = e.to_string().to_lowercase();

    if err_str.contains("no space") || err_str.contains("disk full") || err_str.contains("enospc")
    {
        return ErrorCode::StorageFull;
    }

    if err_str.contains("corrupt") || err_str.contains("invalid database") {
        return ErrorCode::StorageCorrupted;
    }

    ErrorCode::SystemBusy
}

fn order_error_code(e: &OrderError) -> ErrorCode {
    match e {
        OrderError::Empty => ErrorCode::OrderEmpty,
        OrderError::TicketPriceMissing(_) => ErrorCode::TicketPriceMissing,
        OrderError::DonationBelowMinimum { .. } => ErrorCode::DonationBelowMinimum,
        OrderError::InvalidAmount(_) => ErrorCode::ValueOutOfRange,
        OrderError::InvalidDiscount(_) => ErrorCode::InvalidDiscount,
        OrderError::InvalidTransition { .. } => ErrorCode::InvalidTransition,
        OrderError::NotRestorable(_) => ErrorCode::OrderNotRestorable,
        OrderError::Money(e) => money_error_code(e),
    }
}

fn money_error_code(e: &MoneyError) -> ErrorCode {
    match e {
        MoneyError::UnknownCurrency(_) => ErrorCode::UnknownCurrency,
        MoneyError::UnknownRate { .. } => ErrorCode::UnknownExchangeRate,
        MoneyError::CurrencyMismatch { .. } => ErrorCode::InternalError,
    }
}

impl From<ManagerError> for AppError {
    fn from(err: ManagerError) -> Self {
        let code = match &err {
            ManagerError::Storage(e) => {
                let code = classify_storage_error(e);
                tracing::error!(error = %e, error_code = ?code, "Storage error occurred");
                code
            }
            ManagerError::Order(e) => order_error_code(e),
            ManagerError::Money(e) => money_error_code(e),
            ManagerError::Gateway(e) if e.is_invalid_request() => ErrorCode::PaymentFailed,
            ManagerError::Gateway(_) => ErrorCode::GatewayError,
            ManagerError::OrderNotFound(_) | ManagerError::PaymentReferenceNotFound(_) => {
                ErrorCode::OrderNotFound
            }
            ManagerError::EventNotFound(_) => ErrorCode::EventNotFound,
            ManagerError::AccountNotFound(_) => ErrorCode::AccountNotFound,
            ManagerError::OrganisationNotFound(_) => ErrorCode::OrganisationNotFound,
            ManagerError::GatewayNotConfigured(_) => ErrorCode::GatewayNotConfigured,
            ManagerError::Internal(_) => ErrorCode::InternalError,
        };
        AppError::with_message(code, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_order_errors_keep_their_codes() {
        let err: AppError = ManagerError::from(OrderError::DonationBelowMinimum {
            amount: Decimal::ZERO,
            minimum: Decimal::ONE,
        })
        .into();
        assert_eq!(err.code, ErrorCode::DonationBelowMinimum);

        let err: AppError = ManagerError::from(OrderError::NotRestorable("o-1".into())).into();
        assert_eq!(err.code, ErrorCode::OrderNotRestorable);
    }

    #[test]
    fn test_duplicate_reference_code() {
        let err: AppError = ManagerError::from(StorageError::DuplicateReference {
            field: "payment_intent",
            reference: "pi_1".into(),
            order_id: "o-1".into(),
        })
        .into();
        assert_eq!(err.code, ErrorCode::DuplicateReference);
        assert!(err.message.contains("pi_1"));
    }

    #[test]
    fn test_lookup_failures() {
        let err: AppError = ManagerError::PaymentReferenceNotFound("pi_x".into()).into();
        assert_eq!(err.code, ErrorCode::OrderNotFound);
        let err: AppError = ManagerError::Gateway(GatewayError::Transport("reset".into())).into();
        assert_eq!(err.code, ErrorCode::GatewayError);
    }
}
