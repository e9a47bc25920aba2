//! Discount resolution at order creation
//!
//! Two independent percentages can reduce ticket prices: the one from a
//! discount code, and the monthly-donor discount an organiser grants its
//! regular supporters. Resolution is side-effect free.

use rust_decimal::Decimal;
use shared::models::{DiscountCode, Event, Organisationship};

/// Outcome of discount resolution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedDiscounts {
    /// Code kept on the order; `None` when absent or not applicable
    pub discount_code_id: Option<String>,
    pub percentage_discount: Option<Decimal>,
    pub percentage_discount_monthly_donor: Option<Decimal>,
}

/// Resolve the discounts for `event`
///
/// - A code that does not apply to the event is discarded as if absent.
/// - The monthly-donor discount applies only when the code produced no
///   nonzero discount, the event allows discounts, and the buyer's
///   organisationship with the organiser is discount eligible.
pub fn resolve(
    event: &Event,
    code: Option<&DiscountCode>,
    organiser_relationship: Option<&Organisationship>,
) -> ResolvedDiscounts {
    let code = code.filter(|c| {
        let applies = c.applies_to(event);
        if !applies {
            tracing::debug!(code = %c.code, event_id = %event.id, "Discarding inapplicable discount code");
        }
        applies
    });

    let percentage_discount = code.map(|c| c.percentage_discount);
    let code_discounted = percentage_discount.is_some_and(|p| !p.is_zero());

    let percentage_discount_monthly_donor = if code_discounted || event.no_discounts {
        None
    } else {
        organiser_relationship
            .filter(|os| os.organisation_id == event.organisation_id && os.is_discount_eligible())
            .and_then(|os| os.monthly_donor_discount)
    };

    ResolvedDiscounts {
        discount_code_id: code.map(|c| c.id.clone()),
        percentage_discount,
        percentage_discount_monthly_donor,
    }
}
