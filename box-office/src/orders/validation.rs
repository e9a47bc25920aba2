//! Line-item validation at order creation
//!
//! Turns requested tickets and donations into stored line items. Rejects
//! empty orders, unpriced or negative tickets, out-of-range revenue shares
//! (per ticket or per event) and donations below the minimum.

use super::error::{OrderError, OrderResult};
use rust_decimal::Decimal;
use shared::models::{Donation, DonationInput, Event, MINIMUM_DONATION, Ticket, TicketInput};
use shared::util::new_id;
use shared::Currency;

fn check_share(label: &str, share: Decimal) -> OrderResult<()> {
    if share < Decimal::ZERO || share > Decimal::ONE {
        return Err(OrderError::InvalidAmount(format!(
            "{label} has revenue share {share} outside 0-1"
        )));
    }
    Ok(())
}

/// The event's organiser share is copied onto every order it sells
pub fn validate_event_share(event: &Event) -> OrderResult<()> {
    match event.organisation_revenue_share {
        Some(share) => check_share(&format!("event {}", event.id), share),
        None => Ok(()),
    }
}

/// Identity shared by every line item of one order
pub struct LineItemContext<'a> {
    pub order_id: &'a str,
    pub event: &'a Event,
    pub account_id: &'a str,
    pub currency: &'a Currency,
}

pub fn build_tickets(ctx: &LineItemContext<'_>, inputs: &[TicketInput]) -> OrderResult<Vec<Ticket>> {
    inputs
        .iter()
        .map(|input| {
            let label = input
                .ticket_type_name
                .clone()
                .or_else(|| input.ticket_type_id.clone())
                .unwrap_or_else(|| "ticket".to_string());

            let price = input
                .price
                .ok_or_else(|| OrderError::TicketPriceMissing(label.clone()))?;
            if price < Decimal::ZERO {
                return Err(OrderError::InvalidAmount(format!(
                    "{label} has negative price {price}"
                )));
            }
            if let Some(share) = input.organisation_revenue_share {
                check_share(&label, share)?;
            }

            Ok(Ticket {
                id: new_id(),
                order_id: ctx.order_id.to_string(),
                event_id: ctx.event.id.clone(),
                account_id: ctx.account_id.to_string(),
                ticket_type_id: input.ticket_type_id.clone(),
                ticket_type_name: input.ticket_type_name.clone(),
                price: Some(price),
                currency: input.currency.clone().unwrap_or_else(|| ctx.currency.clone()),
                organisation_revenue_share: input.organisation_revenue_share,
                payment_completed: false,
                deleted_at: None,
            })
        })
        .collect()
}

/// Donations are rounded to 2dp before the minimum check
pub fn build_donations(
    ctx: &LineItemContext<'_>,
    inputs: &[DonationInput],
) -> OrderResult<Vec<Donation>> {
    let minimum = ctx
        .event
        .minimum_donation
        .map_or(MINIMUM_DONATION, |m| m.max(MINIMUM_DONATION));

    inputs
        .iter()
        .map(|input| {
            let amount = Donation::round_amount(input.amount);
            if amount < minimum {
                return Err(OrderError::DonationBelowMinimum { amount, minimum });
            }
            Ok(Donation {
                id: new_id(),
                order_id: ctx.order_id.to_string(),
                event_id: ctx.event.id.clone(),
                account_id: ctx.account_id.to_string(),
                amount,
                currency: ctx.currency.clone(),
                payment_completed: false,
                deleted_at: None,
            })
        })
        .collect()
}

/// Build every line item; an order needs at least one
pub fn build_line_items(
    ctx: &LineItemContext<'_>,
    tickets: &[TicketInput],
    donations: &[DonationInput],
) -> OrderResult<(Vec<Ticket>, Vec<Donation>)> {
    if tickets.is_empty() && donations.is_empty() {
        return Err(OrderError::Empty);
    }
    Ok((build_tickets(ctx, tickets)?, build_donations(ctx, donations)?))
}
