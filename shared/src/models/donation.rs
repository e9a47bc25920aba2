//! Donation Model

use crate::money::{Currency, Money};
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};

/// Smallest accepted donation
pub const MINIMUM_DONATION: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Donation line item of an order (never discounted)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Donation {
    pub id: String,
    pub order_id: String,
    pub event_id: String,
    pub account_id: String,
    pub amount: Decimal,
    pub currency: Currency,
    #[serde(default)]
    pub payment_completed: bool,
    pub deleted_at: Option<i64>,
}

impl Donation {
    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }

    pub fn money(&self) -> Money {
        Money::new(self.amount, self.currency.clone())
    }

    /// Donations are stored to 2 decimal places
    pub fn round_amount(amount: Decimal) -> Decimal {
        amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    }
}

/// Requested donation when creating an order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DonationInput {
    pub amount: Decimal,
}
