//! Charge metadata and human-readable order descriptions
//!
//! Both are attached to gateway objects (transfers, destination charges) so
//! organisers can reconcile payouts against orders.

use super::revenue::RevenueCalculator;
use crate::gateway::Metadata;
use rust_decimal::Decimal;
use shared::models::{Event, Order};
use shared::{ExchangeRates, Money, MoneyResult};

/// Metadata keys, in the order they are sent
pub const EVENT_ID: &str = "de_event_id";
pub const ORDER_ID: &str = "de_order_id";
pub const ACCOUNT_ID: &str = "de_account_id";
pub const DONATION_REVENUE: &str = "de_donation_revenue";
pub const TICKET_REVENUE: &str = "de_ticket_revenue";
pub const DISCOUNTED_TICKET_REVENUE: &str = "de_discounted_ticket_revenue";
pub const PERCENTAGE_DISCOUNT: &str = "de_percentage_discount";
pub const PERCENTAGE_DISCOUNT_MONTHLY_DONOR: &str = "de_percentage_discount_monthly_donor";
pub const CREDIT_APPLIED: &str = "de_credit_applied";

fn amount_string(money: &Money) -> String {
    format!(
        "{:.*}",
        money.currency().exponent() as usize,
        money.rounded().amount()
    )
}

fn percentage_string(pct: Decimal) -> String {
    pct.normalize().to_string()
}

/// Reconciliation metadata for an order
///
/// Every key is always present: absent discounts are sent as `0` and absent
/// credit as a zero amount.
pub fn charge_metadata(order: &Order, rates: &dyn ExchangeRates) -> MoneyResult<Metadata> {
    let summary = RevenueCalculator::new(order, rates).summary()?;
    let pct = |p: Option<Decimal>| percentage_string(p.unwrap_or(Decimal::ZERO));

    Ok(vec![
        (EVENT_ID, order.event_id.clone()),
        (ORDER_ID, order.id.clone()),
        (ACCOUNT_ID, order.account_id.clone()),
        (DONATION_REVENUE, amount_string(&summary.donation_revenue)),
        (TICKET_REVENUE, amount_string(&summary.ticket_revenue)),
        (
            DISCOUNTED_TICKET_REVENUE,
            amount_string(&summary.discounted_ticket_revenue),
        ),
        (PERCENTAGE_DISCOUNT, pct(order.percentage_discount)),
        (
            PERCENTAGE_DISCOUNT_MONTHLY_DONOR,
            pct(order.percentage_discount_monthly_donor),
        ),
        (CREDIT_APPLIED, amount_string(&summary.credit_applied)),
    ])
}

/// Line-by-line summary, e.g. `["Standard £50x2", "10% discount", "£5 donation"]`
///
/// Tickets are grouped by type in order of first appearance.
pub fn description_elements(order: &Order) -> Vec<String> {
    let mut groups: Vec<(Option<&str>, Option<&str>, Option<Decimal>, usize)> = Vec::new();
    for ticket in order.live_tickets() {
        let type_id = ticket.ticket_type_id.as_deref();
        let name = ticket.ticket_type_name.as_deref();
        match groups
            .iter_mut()
            .find(|(id, n, price, _)| *id == type_id && *n == name && *price == ticket.price)
        {
            Some(group) => group.3 += 1,
            None => groups.push((type_id, name, ticket.price, 1)),
        }
    }

    let mut elements: Vec<String> = groups
        .into_iter()
        .map(|(_, name, price, count)| {
            let name = name.map(|n| format!("{n} ")).unwrap_or_default();
            let price = price
                .map(|p| Money::new(p, order.currency.clone()).format_short())
                .unwrap_or_default();
            format!("{name}{price}x{count}")
        })
        .collect();

    for pct in [order.percentage_discount, order.percentage_discount_monthly_donor]
        .into_iter()
        .flatten()
    {
        elements.push(format!("{}% discount", percentage_string(pct)));
    }

    for donation in order.live_donations() {
        elements.push(format!(
            "{} donation",
            Money::new(donation.amount, order.currency.clone()).format_short()
        ));
    }

    if let Some(credit) = order.credit_applied.filter(|c| *c > Decimal::ZERO) {
        elements.push(format!(
            "{} credit applied",
            Money::new(credit, order.currency.clone()).format_short()
        ));
    }

    elements
}

/// `"<event>, <when>[ at <location>][: <elements>]"`
pub fn description(order: &Order, event: &Event) -> String {
    let location = match event.location.as_deref() {
        Some(location) if !event.is_online() => format!(" at {location}"),
        _ => String::new(),
    };
    let elements = description_elements(order);
    let items = if elements.is_empty() {
        String::new()
    } else {
        format!(": {}", elements.join(", "))
    };
    format!("{}, {}{}{}", event.name, event.when_details(), location, items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use shared::models::{Affiliate, Donation, OrderStatus, Ticket};
    use shared::{Currency, StaticRates};
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn gbp() -> Currency {
        Currency::parse("GBP").unwrap()
    }

    fn ticket(name: &str, price: &str) -> Ticket {
        Ticket {
            id: shared::util::new_id(),
            order_id: "o-1".into(),
            event_id: "ev-1".into(),
            account_id: "acc-1".into(),
            ticket_type_id: Some(format!("tt-{name}")),
            ticket_type_name: Some(name.into()),
            price: Some(dec(price)),
            currency: gbp(),
            organisation_revenue_share: None,
            payment_completed: true,
            deleted_at: None,
        }
    }

    fn order() -> Order {
        Order {
            id: "o-1".into(),
            event_id: "ev-1".into(),
            account_id: "acc-1".into(),
            revenue_sharer_id: None,
            discount_code_id: None,
            currency: gbp(),
            value: Some(dec("105")),
            percentage_discount: Some(dec("10")),
            percentage_discount_monthly_donor: None,
            credit_applied: Some(dec("5")),
            organisation_revenue_share: None,
            application_fee_amount: None,
            payment_intent: None,
            session_id: None,
            transfer_id: None,
            checkout_id: None,
            affiliate: Affiliate::None,
            opt_in_organisation: false,
            tickets: vec![
                ticket("Standard", "50"),
                ticket("Standard", "50"),
                ticket("Concession", "12.5"),
            ],
            donations: vec![Donation {
                id: "d-1".into(),
                order_id: "o-1".into(),
                event_id: "ev-1".into(),
                account_id: "acc-1".into(),
                amount: dec("10"),
                currency: gbp(),
                payment_completed: true,
                deleted_at: None,
            }],
            status: OrderStatus::PaymentCompleted,
            payment_completed: true,
            created_at: 0,
            updated_at: 0,
            deleted_at: None,
        }
    }

    fn event(location: Option<&str>) -> Event {
        Event {
            id: "ev-1".into(),
            name: "Spring Gathering".into(),
            organisation_id: "org-1".into(),
            starts_at: Utc.with_ymd_and_hms(2026, 3, 14, 19, 30, 0).unwrap(),
            location: location.map(String::from),
            currency: gbp(),
            organisation_revenue_share: None,
            revenue_sharer_id: None,
            cohost_ids: vec![],
            no_discounts: false,
            refund_deleted_orders: false,
            send_order_notifications: false,
            minimum_donation: None,
        }
    }

    #[test]
    fn test_description_elements() {
        assert_eq!(
            description_elements(&order()),
            vec![
                "Standard £50x2",
                "Concession £12.50x1",
                "10% discount",
                "£10 donation",
                "£5 credit applied"
            ]
        );
    }

    #[test]
    fn test_description_with_and_without_location() {
        let o = order();
        let text = description(&o, &event(Some("Town Hall")));
        assert!(text.starts_with("Spring Gathering, Sat 14 Mar 2026, 19:30 UTC at Town Hall: Standard £50x2"));

        let online = description(&o, &event(Some("Online")));
        assert!(online.starts_with("Spring Gathering, Sat 14 Mar 2026, 19:30 UTC: "));

        let mut empty = o;
        empty.tickets.clear();
        empty.donations.clear();
        empty.percentage_discount = None;
        empty.credit_applied = None;
        assert_eq!(
            description(&empty, &event(None)),
            "Spring Gathering, Sat 14 Mar 2026, 19:30 UTC"
        );
    }

    #[test]
    fn test_charge_metadata() {
        let metadata = charge_metadata(&order(), &StaticRates::new()).unwrap();
        let get = |key: &str| {
            metadata
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.clone())
        };

        assert_eq!(get(EVENT_ID).as_deref(), Some("ev-1"));
        assert_eq!(get(ORDER_ID).as_deref(), Some("o-1"));
        assert_eq!(get(TICKET_REVENUE).as_deref(), Some("112.50"));
        // (50 + 50 + 12.5) * 0.9 = 101.25
        assert_eq!(get(DISCOUNTED_TICKET_REVENUE).as_deref(), Some("101.25"));
        assert_eq!(get(DONATION_REVENUE).as_deref(), Some("10.00"));
        assert_eq!(get(PERCENTAGE_DISCOUNT).as_deref(), Some("10"));
        assert_eq!(get(PERCENTAGE_DISCOUNT_MONTHLY_DONOR).as_deref(), Some("0"));
        assert_eq!(get(CREDIT_APPLIED).as_deref(), Some("5.00"));
    }

    #[test]
    fn test_charge_metadata_has_fixed_shape() {
        let mut plain = order();
        plain.percentage_discount = None;
        plain.credit_applied = None;
        let metadata = charge_metadata(&plain, &StaticRates::new()).unwrap();

        let keys: Vec<&str> = metadata.iter().map(|(k, _)| *k).collect();
        assert_eq!(
            keys,
            vec![
                EVENT_ID,
                ORDER_ID,
                ACCOUNT_ID,
                DONATION_REVENUE,
                TICKET_REVENUE,
                DISCOUNTED_TICKET_REVENUE,
                PERCENTAGE_DISCOUNT,
                PERCENTAGE_DISCOUNT_MONTHLY_DONOR,
                CREDIT_APPLIED,
            ]
        );
        assert_eq!(metadata[6].1, "0");
        assert_eq!(metadata[7].1, "0");
        assert_eq!(metadata[8].1, "0.00");
    }
}
