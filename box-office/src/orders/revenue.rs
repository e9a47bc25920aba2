//! Revenue calculation
//!
//! Figures are derived from an order's live line items and expressed in the
//! order currency. Intermediate values keep full decimal precision; callers
//! round with [`Money::rounded`] when a figure is persisted or sent to the
//! payment gateway.
//!
//! ```text
//! total           = discounted_ticket_revenue + donation_revenue - credit_applied
//! fee             = discounted_ticket_revenue * share + donation_revenue
//!                   - credit_payable_to_organisation
//! credit (co-host) = dtr / (dtr + dr) * credit_applied * (1 - share)
//! credit (org)     = credit_applied - credit (co-host)
//! ```

use rust_decimal::Decimal;
use shared::models::Order;
use shared::{Currency, ExchangeRates, Money, MoneyResult};

/// Revenue figures of one order
pub struct RevenueCalculator<'a> {
    order: &'a Order,
    rates: &'a dyn ExchangeRates,
}

impl<'a> RevenueCalculator<'a> {
    pub fn new(order: &'a Order, rates: &'a dyn ExchangeRates) -> Self {
        Self { order, rates }
    }

    fn currency(&self) -> &Currency {
        &self.order.currency
    }

    fn zero(&self) -> Money {
        Money::zero(self.currency().clone())
    }

    fn sum(&self, items: impl IntoIterator<Item = Money>) -> MoneyResult<Money> {
        let mut total = self.zero();
        for item in items {
            total = total.checked_add(&item.exchange_to(self.currency(), self.rates)?)?;
        }
        Ok(total)
    }

    /// Listed ticket prices
    pub fn ticket_revenue(&self) -> MoneyResult<Money> {
        self.sum(self.order.live_tickets().filter_map(|t| t.price_money()))
    }

    /// Ticket prices after the code and monthly-donor discounts
    pub fn discounted_ticket_revenue(&self) -> MoneyResult<Money> {
        let percentages = self.order.discount_percentages();
        self.sum(
            self.order
                .live_tickets()
                .filter_map(|t| t.discounted_price(&percentages)),
        )
    }

    /// Discounted ticket revenue weighted by each ticket's own revenue share
    pub fn organisation_discounted_ticket_revenue(&self) -> MoneyResult<Money> {
        let percentages = self.order.discount_percentages();
        self.sum(self.order.live_tickets().filter_map(|t| {
            t.discounted_price(&percentages)
                .map(|p| p.scale(t.organisation_revenue_share.unwrap_or(Decimal::ONE)))
        }))
    }

    /// Donations (never discounted)
    pub fn donation_revenue(&self) -> MoneyResult<Money> {
        self.sum(self.order.live_donations().map(|d| d.money()))
    }

    pub fn credit_applied(&self) -> Money {
        Money::new(
            self.order.credit_applied.unwrap_or_default(),
            self.currency().clone(),
        )
    }

    /// Co-host's share of the applied credit
    ///
    /// Only defined with a co-host, a revenue share, positive credit and
    /// positive revenue.
    pub fn credit_payable_to_revenue_sharer(&self) -> MoneyResult<Option<Money>> {
        let (Some(_), Some(share)) = (
            self.order.revenue_sharer_id.as_ref(),
            self.order.organisation_revenue_share,
        ) else {
            return Ok(None);
        };
        let credit = self.credit_applied();
        if !credit.is_positive() {
            return Ok(None);
        }
        let dtr = self.discounted_ticket_revenue()?;
        let revenue = dtr.checked_add(&self.donation_revenue()?)?;
        if !revenue.is_positive() {
            return Ok(None);
        }
        let Some(ticket_fraction) = dtr.ratio_to(&revenue)? else {
            return Ok(None);
        };
        Ok(Some(credit.scale(ticket_fraction * (Decimal::ONE - share))))
    }

    /// Organiser's share of the applied credit
    pub fn credit_payable_to_organisation(&self) -> MoneyResult<Option<Money>> {
        let credit = self.credit_applied();
        if !credit.is_positive() {
            return Ok(None);
        }
        match self.credit_payable_to_revenue_sharer()? {
            Some(to_sharer) => Ok(Some(credit.checked_sub(&to_sharer)?)),
            None => Ok(Some(credit)),
        }
    }

    /// Platform application fee; a missing revenue share counts as 1
    pub fn application_fee_amount(&self) -> MoneyResult<Money> {
        let share = self.order.organisation_revenue_share.unwrap_or(Decimal::ONE);
        let gross = self
            .discounted_ticket_revenue()?
            .scale(share)
            .checked_add(&self.donation_revenue()?)?;
        match self.credit_payable_to_organisation()? {
            Some(credit) => gross.checked_sub(&credit),
            None => Ok(gross),
        }
    }

    /// Discounted ticket revenue plus donations, before credit
    pub fn gross(&self) -> MoneyResult<Money> {
        self.discounted_ticket_revenue()?
            .checked_add(&self.donation_revenue()?)
    }

    /// Amount payable
    pub fn total(&self) -> MoneyResult<Money> {
        self.gross()?.checked_sub(&self.credit_applied())
    }

    /// Amount payable in minor units: rounded gross less the applied credit
    ///
    /// Never negative as long as the credit was capped at the rounded gross.
    pub fn total_rounded(&self) -> MoneyResult<Money> {
        self.gross()?.rounded().checked_sub(&self.credit_applied())
    }

    /// Every figure at once, rounded to minor units
    pub fn summary(&self) -> MoneyResult<RevenueSummary> {
        Ok(RevenueSummary {
            ticket_revenue: self.ticket_revenue()?.rounded(),
            discounted_ticket_revenue: self.discounted_ticket_revenue()?.rounded(),
            donation_revenue: self.donation_revenue()?.rounded(),
            credit_applied: self.credit_applied().rounded(),
            total: self.total_rounded()?,
        })
    }
}

/// Rounded revenue figures, as reported to the gateway
#[derive(Debug, Clone, PartialEq)]
pub struct RevenueSummary {
    pub ticket_revenue: Money,
    pub discounted_ticket_revenue: Money,
    pub donation_revenue: Money,
    pub credit_applied: Money,
    pub total: Money,
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::StaticRates;
    use shared::models::{Affiliate, Donation, OrderStatus, Ticket};
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn gbp() -> Currency {
        Currency::parse("GBP").unwrap()
    }

    fn ticket(price: &str, currency: &str) -> Ticket {
        Ticket {
            id: shared::util::new_id(),
            order_id: "o-1".into(),
            event_id: "ev-1".into(),
            account_id: "acc-1".into(),
            ticket_type_id: None,
            ticket_type_name: Some("Standard".into()),
            price: Some(dec(price)),
            currency: Currency::parse(currency).unwrap(),
            organisation_revenue_share: None,
            payment_completed: false,
            deleted_at: None,
        }
    }

    fn donation(amount: &str) -> Donation {
        Donation {
            id: shared::util::new_id(),
            order_id: "o-1".into(),
            event_id: "ev-1".into(),
            account_id: "acc-1".into(),
            amount: dec(amount),
            currency: gbp(),
            payment_completed: false,
            deleted_at: None,
        }
    }

    fn order(tickets: Vec<Ticket>, donations: Vec<Donation>) -> Order {
        Order {
            id: "o-1".into(),
            event_id: "ev-1".into(),
            account_id: "acc-1".into(),
            revenue_sharer_id: Some("acc-cohost".into()),
            discount_code_id: None,
            currency: gbp(),
            value: None,
            percentage_discount: None,
            percentage_discount_monthly_donor: None,
            credit_applied: None,
            organisation_revenue_share: Some(dec("0.8")),
            application_fee_amount: None,
            payment_intent: None,
            session_id: None,
            transfer_id: None,
            checkout_id: None,
            affiliate: Affiliate::None,
            opt_in_organisation: false,
            tickets,
            donations,
            status: OrderStatus::Pending,
            payment_completed: false,
            created_at: 0,
            updated_at: 0,
            deleted_at: None,
        }
    }

    #[test]
    fn test_share_scenario_without_credit() {
        let o = order(vec![ticket("50", "GBP")], vec![donation("10")]);
        let rates = StaticRates::new();
        let calc = RevenueCalculator::new(&o, &rates);

        assert_eq!(calc.discounted_ticket_revenue().unwrap().amount(), dec("50"));
        assert_eq!(calc.donation_revenue().unwrap().amount(), dec("10"));
        assert_eq!(calc.total().unwrap().amount(), dec("60"));
        assert_eq!(calc.application_fee_amount().unwrap().amount(), dec("50"));
        assert_eq!(calc.credit_payable_to_revenue_sharer().unwrap(), None);
    }

    #[test]
    fn test_share_scenario_with_credit() {
        let mut o = order(vec![ticket("50", "GBP")], vec![donation("10")]);
        o.credit_applied = Some(dec("60"));
        let rates = StaticRates::new();
        let calc = RevenueCalculator::new(&o, &rates);

        assert_eq!(calc.total().unwrap().amount(), dec("0"));
        // 50/60 * 60 * 0.2
        let to_sharer = calc.credit_payable_to_revenue_sharer().unwrap().unwrap();
        assert_eq!(to_sharer.rounded().amount(), dec("10.00"));
        let to_org = calc.credit_payable_to_organisation().unwrap().unwrap();
        assert_eq!(to_org.rounded().amount(), dec("50.00"));
        assert_eq!(calc.application_fee_amount().unwrap().rounded().amount(), dec("0.00"));
    }

    #[test]
    fn test_sharer_credit_requires_every_condition() {
        let rates = StaticRates::new();

        let mut no_cohost = order(vec![ticket("50", "GBP")], vec![]);
        no_cohost.credit_applied = Some(dec("10"));
        no_cohost.revenue_sharer_id = None;
        assert_eq!(
            RevenueCalculator::new(&no_cohost, &rates).credit_payable_to_revenue_sharer().unwrap(),
            None
        );

        let mut no_share = order(vec![ticket("50", "GBP")], vec![]);
        no_share.credit_applied = Some(dec("10"));
        no_share.organisation_revenue_share = None;
        assert_eq!(
            RevenueCalculator::new(&no_share, &rates).credit_payable_to_revenue_sharer().unwrap(),
            None
        );

        let no_credit = order(vec![ticket("50", "GBP")], vec![]);
        assert_eq!(
            RevenueCalculator::new(&no_credit, &rates).credit_payable_to_revenue_sharer().unwrap(),
            None
        );

        let mut free = order(vec![ticket("0", "GBP")], vec![]);
        free.credit_applied = Some(dec("5"));
        assert_eq!(
            RevenueCalculator::new(&free, &rates).credit_payable_to_revenue_sharer().unwrap(),
            None
        );
    }

    #[test]
    fn test_discounts_are_successive_and_skip_donations() {
        let mut o = order(vec![ticket("100", "GBP"), ticket("20", "GBP")], vec![donation("10")]);
        o.percentage_discount = Some(dec("25"));
        let rates = StaticRates::new();
        let calc = RevenueCalculator::new(&o, &rates);

        assert_eq!(calc.ticket_revenue().unwrap().amount(), dec("120"));
        assert_eq!(calc.discounted_ticket_revenue().unwrap().amount(), dec("90"));
        assert_eq!(calc.donation_revenue().unwrap().amount(), dec("10"));
        assert_eq!(calc.total().unwrap().amount(), dec("100"));
    }

    #[test]
    fn test_ticket_prices_converted_to_order_currency() {
        let o = order(vec![ticket("10", "EUR"), ticket("10", "GBP")], vec![]);
        let rates = StaticRates::new().with_rate(&Currency::parse("EUR").unwrap(), &gbp(), dec("0.85"));
        let calc = RevenueCalculator::new(&o, &rates);
        assert_eq!(calc.ticket_revenue().unwrap().amount(), dec("18.50"));

        let no_rates = StaticRates::new();
        assert!(RevenueCalculator::new(&o, &no_rates).ticket_revenue().is_err());
    }

    #[test]
    fn test_deleted_items_ignored_and_per_ticket_share() {
        let mut shared_ticket = ticket("40", "GBP");
        shared_ticket.organisation_revenue_share = Some(dec("0.5"));
        let mut gone = ticket("99", "GBP");
        gone.deleted_at = Some(1);
        let o = order(vec![shared_ticket, ticket("10", "GBP"), gone], vec![]);
        let rates = StaticRates::new();
        let calc = RevenueCalculator::new(&o, &rates);

        assert_eq!(calc.ticket_revenue().unwrap().amount(), dec("50"));
        assert_eq!(calc.organisation_discounted_ticket_revenue().unwrap().amount(), dec("30"));
    }

    #[test]
    fn test_missing_share_treated_as_one_for_fee() {
        let mut o = order(vec![ticket("30", "GBP")], vec![donation("5")]);
        o.organisation_revenue_share = None;
        let rates = StaticRates::new();
        assert_eq!(
            RevenueCalculator::new(&o, &rates).application_fee_amount().unwrap().amount(),
            dec("35")
        );
    }

    #[test]
    fn test_total_invariant() {
        let mut o = order(vec![ticket("12.34", "GBP"), ticket("7.66", "GBP")], vec![donation("3.5")]);
        o.percentage_discount_monthly_donor = Some(dec("10"));
        o.credit_applied = Some(dec("4.25"));
        let rates = StaticRates::new();
        let calc = RevenueCalculator::new(&o, &rates);

        let expected = calc
            .discounted_ticket_revenue()
            .unwrap()
            .checked_add(&calc.donation_revenue().unwrap())
            .unwrap()
            .checked_sub(&calc.credit_applied())
            .unwrap();
        assert_eq!(calc.total().unwrap(), expected);
        assert_eq!(calc.summary().unwrap().total.amount(), dec("17.25"));
    }
}
