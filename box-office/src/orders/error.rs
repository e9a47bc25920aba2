use rust_decimal::Decimal;
use shared::MoneyError;
use shared::models::OrderStatus;
use thiserror::Error;

/// Order validation and lifecycle errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OrderError {
    #[error("Order has no tickets or donations")]
    Empty,

    #[error("Ticket has no price: {0}")]
    TicketPriceMissing(String),

    #[error("Donation of {amount} is below the minimum of {minimum}")]
    DonationBelowMinimum { amount: Decimal, minimum: Decimal },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid discount: {0}")]
    InvalidDiscount(String),

    #[error("Cannot {action} order {order_id} with status {status}")]
    InvalidTransition {
        order_id: String,
        status: OrderStatus,
        action: &'static str,
    },

    #[error("Order {0} never completed payment and cannot be restored")]
    NotRestorable(String),

    #[error(transparent)]
    Money(#[from] MoneyError),
}

pub type OrderResult<T> = Result<T, OrderError>;
