//! Order Model
//!
//! The order is the aggregate root of a purchase: it owns its tickets and
//! donations, carries the financial figures fixed at creation and tracks the
//! payment lifecycle through [`OrderStatus`].

use super::donation::Donation;
use super::ticket::Ticket;
use crate::error::{AppError, ErrorCode};
use crate::money::Currency;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Status
// ============================================================================

/// Lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Awaiting payment confirmation
    #[default]
    Pending,
    PaymentCompleted,
    /// Soft-deleted, line items hidden
    Deleted,
    /// Deleted and brought back; behaves as completed
    Restored,
}

impl OrderStatus {
    /// Live and paid
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::PaymentCompleted | Self::Restored)
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self, Self::Deleted)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::PaymentCompleted => "PAYMENT_COMPLETED",
            Self::Deleted => "DELETED",
            Self::Restored => "RESTORED",
        };
        f.write_str(s)
    }
}

// ============================================================================
// Affiliate
// ============================================================================

/// Who referred the purchase
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Affiliate {
    #[default]
    None,
    Account(String),
    Organisation(String),
}

// ============================================================================
// Payment references
// ============================================================================

/// External references that must be unique among live orders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
    PaymentIntent,
    Session,
    Transfer,
    Checkout,
}

impl ReferenceKind {
    pub const ALL: [ReferenceKind; 4] = [
        ReferenceKind::PaymentIntent,
        ReferenceKind::Session,
        ReferenceKind::Transfer,
        ReferenceKind::Checkout,
    ];

    pub fn field_name(&self) -> &'static str {
        match self {
            Self::PaymentIntent => "payment_intent",
            Self::Session => "session_id",
            Self::Transfer => "transfer_id",
            Self::Checkout => "checkout_id",
        }
    }
}

// ============================================================================
// Order
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub event_id: String,
    pub account_id: String,
    /// Co-host sharing ticket revenue, copied from the event
    pub revenue_sharer_id: Option<String>,
    pub discount_code_id: Option<String>,
    pub currency: Currency,

    // === Financials ===
    /// Total payable
    pub value: Option<Decimal>,
    pub percentage_discount: Option<Decimal>,
    pub percentage_discount_monthly_donor: Option<Decimal>,
    pub credit_applied: Option<Decimal>,
    /// Copied from the event at creation
    pub organisation_revenue_share: Option<Decimal>,
    pub application_fee_amount: Option<Decimal>,

    // === References ===
    pub payment_intent: Option<String>,
    pub session_id: Option<String>,
    pub transfer_id: Option<String>,
    pub checkout_id: Option<String>,

    #[serde(default)]
    pub affiliate: Affiliate,
    #[serde(default)]
    pub opt_in_organisation: bool,

    #[serde(default)]
    pub tickets: Vec<Ticket>,
    #[serde(default)]
    pub donations: Vec<Donation>,

    #[serde(default)]
    pub status: OrderStatus,
    #[serde(default)]
    pub payment_completed: bool,
    pub created_at: i64,
    pub updated_at: i64,
    pub deleted_at: Option<i64>,
}

impl Order {
    pub fn reference(&self, kind: ReferenceKind) -> Option<&str> {
        match kind {
            ReferenceKind::PaymentIntent => self.payment_intent.as_deref(),
            ReferenceKind::Session => self.session_id.as_deref(),
            ReferenceKind::Transfer => self.transfer_id.as_deref(),
            ReferenceKind::Checkout => self.checkout_id.as_deref(),
        }
    }

    /// All references currently set
    pub fn references(&self) -> impl Iterator<Item = (ReferenceKind, &str)> {
        ReferenceKind::ALL
            .into_iter()
            .filter_map(|kind| self.reference(kind).map(|r| (kind, r)))
    }

    pub fn is_deleted(&self) -> bool {
        self.status.is_deleted()
    }

    pub fn live_tickets(&self) -> impl Iterator<Item = &Ticket> {
        self.tickets.iter().filter(|t| t.is_live())
    }

    pub fn live_donations(&self) -> impl Iterator<Item = &Donation> {
        self.donations.iter().filter(|d| d.is_live())
    }

    /// Discount percentages to apply to ticket prices, in order
    pub fn discount_percentages(&self) -> Vec<Decimal> {
        [self.percentage_discount, self.percentage_discount_monthly_donor]
            .into_iter()
            .flatten()
            .filter(|p| !p.is_zero())
            .collect()
    }

    /// At most one of the two discounts may be nonzero, each within 0-100
    pub fn validate_discounts(&self) -> Result<(), AppError> {
        let pcts = [self.percentage_discount, self.percentage_discount_monthly_donor];
        for pct in pcts.iter().flatten() {
            if *pct < Decimal::ZERO || *pct > Decimal::ONE_HUNDRED {
                return Err(AppError::with_message(
                    ErrorCode::InvalidDiscount,
                    format!("percentage discount out of range: {pct}"),
                ));
            }
        }
        let nonzero = pcts.iter().flatten().filter(|p| !p.is_zero()).count();
        if nonzero > 1 {
            return Err(AppError::with_message(
                ErrorCode::InvalidDiscount,
                "code discount and monthly donor discount cannot both apply",
            ));
        }
        Ok(())
    }
}
