//! Ticket Model

use crate::money::{Currency, Money};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Ticket line item of an order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: String,
    pub order_id: String,
    pub event_id: String,
    pub account_id: String,
    pub ticket_type_id: Option<String>,
    pub ticket_type_name: Option<String>,
    /// Listed price; required at order creation
    pub price: Option<Decimal>,
    pub currency: Currency,
    /// Share of this ticket's revenue kept by the organiser (default 1)
    pub organisation_revenue_share: Option<Decimal>,
    #[serde(default)]
    pub payment_completed: bool,
    pub deleted_at: Option<i64>,
}

impl Ticket {
    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }

    pub fn price_money(&self) -> Option<Money> {
        self.price.map(|p| Money::new(p, self.currency.clone()))
    }

    /// Price after applying each percentage in turn (successive, not additive)
    ///
    /// 10% then 20% off 100 is 72, not 70.
    pub fn discounted_price(&self, percentages: &[Decimal]) -> Option<Money> {
        let price = self.price_money()?;
        Some(percentages.iter().fold(price, |acc, pct| {
            acc.scale((Decimal::ONE_HUNDRED - pct) / Decimal::ONE_HUNDRED)
        }))
    }
}

/// Requested ticket when creating an order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketInput {
    pub ticket_type_id: Option<String>,
    pub ticket_type_name: Option<String>,
    pub price: Option<Decimal>,
    /// Defaults to the order currency
    pub currency: Option<Currency>,
    pub organisation_revenue_share: Option<Decimal>,
}

impl TicketInput {
    pub fn priced(name: impl Into<String>, price: Decimal) -> Self {
        Self {
            ticket_type_id: None,
            ticket_type_name: Some(name.into()),
            price: Some(price),
            currency: None,
            organisation_revenue_share: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn ticket(price: &str) -> Ticket {
        Ticket {
            id: "t-1".into(),
            order_id: "o-1".into(),
            event_id: "ev-1".into(),
            account_id: "acc-1".into(),
            ticket_type_id: Some("tt-1".into()),
            ticket_type_name: Some("Standard".into()),
            price: Some(Decimal::from_str(price).unwrap()),
            currency: Currency::parse("GBP").unwrap(),
            organisation_revenue_share: None,
            payment_completed: false,
            deleted_at: None,
        }
    }

    #[test]
    fn test_successive_discounts() {
        let t = ticket("100");
        let price = t
            .discounted_price(&[Decimal::from(10), Decimal::from(20)])
            .unwrap();
        assert_eq!(price.amount(), Decimal::from(72));
    }

    #[test]
    fn test_no_discounts_keeps_price() {
        let t = ticket("12.50");
        assert_eq!(
            t.discounted_price(&[]).unwrap().amount(),
            Decimal::from_str("12.50").unwrap()
        );
    }

    #[test]
    fn test_missing_price() {
        let mut t = ticket("1");
        t.price = None;
        assert!(t.discounted_price(&[Decimal::from(10)]).is_none());
    }
}
