//! Account credit
//!
//! Buyers may hold store credit with an organiser (kept on their
//! organisationship, in whatever currency it was issued). At order creation
//! the credit is applied against the payable amount and the balance is drawn
//! down by the same value.
//!
//! [`apply_credit`] only computes and mutates in memory. The order manager
//! runs it inside the storage write transaction that persists both the order
//! and the organisationship, so concurrent orders against one balance are
//! serialised and the balance never goes below zero.

use super::revenue::RevenueCalculator;
use rust_decimal::Decimal;
use shared::models::{Order, Organisationship};
use shared::{ExchangeRates, Money, MoneyResult};

/// Credit to apply to a payable amount
///
/// `None` when there is no balance, when the balance cannot be converted
/// into the payable currency, or when either side is not positive.
pub fn credit_to_apply(
    balance: Option<&Money>,
    payable: &Money,
    rates: &dyn ExchangeRates,
) -> Option<Money> {
    let balance = balance?;
    let converted = match balance.exchange_to(payable.currency(), rates) {
        Ok(converted) => converted,
        Err(e) => {
            tracing::debug!(error = %e, "Credit balance not convertible, skipping credit");
            return None;
        }
    };
    // Both sides in whole minor units; the balance never rounds up
    let available = converted.rounded_down();
    let payable = payable.rounded();
    if !available.is_positive() || !payable.is_positive() {
        return None;
    }
    Some(if available.amount() < payable.amount() {
        available
    } else {
        payable
    })
}

/// Apply the buyer's credit to `order` and draw down the organisationship
///
/// Sets `order.credit_applied` and returns the applied amount (order
/// currency). The balance is reduced proportionally in its own currency and
/// floored at zero.
pub fn apply_credit(
    order: &mut Order,
    organisationship: Option<&mut Organisationship>,
    rates: &dyn ExchangeRates,
) -> MoneyResult<Option<Money>> {
    let Some(organisationship) = organisationship else {
        return Ok(None);
    };

    let payable = RevenueCalculator::new(order, rates).gross()?;

    let Some(credit) = credit_to_apply(organisationship.credit_balance.as_ref(), &payable, rates)
    else {
        return Ok(None);
    };

    if let Some(balance) = organisationship.credit_balance.take() {
        organisationship.credit_balance = Some(draw_down(&balance, &credit, rates));
    }
    order.credit_applied = Some(credit.amount());
    Ok(Some(credit))
}

/// Balance left after consuming `used` (expressed in another currency)
fn draw_down(balance: &Money, used: &Money, rates: &dyn ExchangeRates) -> Money {
    let zero = Money::zero(balance.currency().clone());
    let Ok(available) = balance.exchange_to(used.currency(), rates) else {
        return zero;
    };
    let consumed_fraction = match used.ratio_to(&available) {
        Ok(Some(fraction)) => fraction.min(Decimal::ONE),
        _ => Decimal::ONE,
    };
    let remaining = balance.scale(Decimal::ONE - consumed_fraction).rounded();
    if remaining.is_negative() { zero } else { remaining }
}
