//! Money calculation utilities using rust_decimal for precision
//!
//! [`Money`] pairs an exact `Decimal` amount with a [`Currency`]. Amounts keep
//! full precision while they are being combined; rounding to the currency's
//! minor unit happens only where a value leaves the engine, through
//! [`Money::rounded`] and [`Money::to_minor_units`].
//!
//! Arithmetic never mixes currencies silently: every combining operation is
//! checked and conversion goes through an injected [`ExchangeRates`] source.

use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Rounding strategy for monetary values (half away from zero)
const ROUNDING: RoundingStrategy = RoundingStrategy::MidpointAwayFromZero;

/// Supported currencies: (ISO 4217 code, minor unit exponent, display symbol)
const CURRENCIES: &[(&str, u32, Option<&str>)] = &[
    ("GBP", 2, Some("£")),
    ("EUR", 2, Some("€")),
    ("USD", 2, Some("$")),
    ("CAD", 2, Some("$")),
    ("AUD", 2, Some("$")),
    ("NZD", 2, Some("$")),
    ("MXN", 2, Some("$")),
    ("BRL", 2, Some("R$")),
    ("INR", 2, Some("₹")),
    ("ZAR", 2, Some("R")),
    ("CHF", 2, None),
    ("SEK", 2, None),
    ("NOK", 2, None),
    ("DKK", 2, None),
    ("PLN", 2, None),
    ("CZK", 2, None),
    ("HUF", 2, None),
    ("JPY", 0, Some("¥")),
    ("KRW", 0, Some("₩")),
];

/// Money errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
    #[error("Unknown currency: {0}")]
    UnknownCurrency(String),

    #[error("No exchange rate from {from} to {to}")]
    UnknownRate { from: String, to: String },

    #[error("Currency mismatch: {left} vs {right}")]
    CurrencyMismatch { left: String, right: String },
}

pub type MoneyResult<T> = Result<T, MoneyError>;

fn lookup(code: &str) -> Option<&'static (&'static str, u32, Option<&'static str>)> {
    CURRENCIES.iter().find(|(c, _, _)| *c == code)
}

// ============================================================================
// Currency
// ============================================================================

/// ISO 4217 currency code, validated against the supported list
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    /// Parse a currency code (case-insensitive)
    pub fn parse(code: &str) -> MoneyResult<Self> {
        let upper = code.trim().to_ascii_uppercase();
        match lookup(&upper) {
            Some(_) => Ok(Self(upper)),
            None => Err(MoneyError::UnknownCurrency(code.to_string())),
        }
    }

    pub fn code(&self) -> &str {
        &self.0
    }

    /// Number of decimal places in the minor unit (2 for GBP, 0 for JPY)
    pub fn exponent(&self) -> u32 {
        lookup(&self.0).map(|(_, exp, _)| *exp).unwrap_or(2)
    }

    pub fn symbol(&self) -> Option<&'static str> {
        lookup(&self.0).and_then(|(_, _, symbol)| *symbol)
    }

    /// Lowercase code, as payment gateways expect it
    pub fn to_lowercase(&self) -> String {
        self.0.to_ascii_lowercase()
    }
}

impl TryFrom<String> for Currency {
    type Error = MoneyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Exchange rates
// ============================================================================

/// Source of currency conversion rates
pub trait ExchangeRates: Send + Sync {
    /// Rate to multiply an amount in `from` by to obtain `to`
    fn rate(&self, from: &Currency, to: &Currency) -> Option<Decimal>;
}

/// Fixed table of exchange rates
///
/// Inverse rates are derived automatically when only one direction is known.
#[derive(Debug, Clone, Default)]
pub struct StaticRates {
    rates: HashMap<(String, String), Decimal>,
}

impl StaticRates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rate (builder style)
    pub fn with_rate(mut self, from: &Currency, to: &Currency, rate: Decimal) -> Self {
        self.insert(from, to, rate);
        self
    }

    pub fn insert(&mut self, from: &Currency, to: &Currency, rate: Decimal) {
        self.rates
            .insert((from.code().to_string(), to.code().to_string()), rate);
    }

    /// Load from JSON of the form `{"GBP": {"EUR": "1.17", "USD": "1.27"}}`
    ///
    /// Unknown currency codes are rejected.
    pub fn from_json(json: &str) -> Result<Self, StaticRatesError> {
        let table: HashMap<String, HashMap<String, Decimal>> = serde_json::from_str(json)?;
        let mut rates = Self::new();
        for (from, targets) in table {
            let from = Currency::parse(&from)?;
            for (to, rate) in targets {
                let to = Currency::parse(&to)?;
                rates.insert(&from, &to, rate);
            }
        }
        Ok(rates)
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

impl ExchangeRates for StaticRates {
    fn rate(&self, from: &Currency, to: &Currency) -> Option<Decimal> {
        if from == to {
            return Some(Decimal::ONE);
        }
        let key = (from.code().to_string(), to.code().to_string());
        if let Some(rate) = self.rates.get(&key) {
            return Some(*rate);
        }
        let inverse = (to.code().to_string(), from.code().to_string());
        self.rates
            .get(&inverse)
            .filter(|r| !r.is_zero())
            .and_then(|r| Decimal::ONE.checked_div(*r))
    }
}

/// Errors loading a rate table
#[derive(Debug, Error)]
pub enum StaticRatesError {
    #[error("Invalid rates JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Money(#[from] MoneyError),
}

// ============================================================================
// Money
// ============================================================================

/// An exact amount of a given currency
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    amount: Decimal,
    currency: Currency,
}

impl Money {
    pub fn new(amount: Decimal, currency: Currency) -> Self {
        Self { amount, currency }
    }

    pub fn zero(currency: Currency) -> Self {
        Self::new(Decimal::ZERO, currency)
    }

    /// Build from an integer count of minor units (pence, cents, yen)
    pub fn from_minor_units(units: i64, currency: Currency) -> Self {
        let amount = Decimal::new(units, currency.exponent());
        Self::new(amount, currency)
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn currency(&self) -> &Currency {
        &self.currency
    }

    pub fn is_positive(&self) -> bool {
        self.amount > Decimal::ZERO
    }

    pub fn is_negative(&self) -> bool {
        self.amount < Decimal::ZERO
    }

    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    fn ensure_same_currency(&self, other: &Money) -> MoneyResult<()> {
        if self.currency != other.currency {
            return Err(MoneyError::CurrencyMismatch {
                left: self.currency.to_string(),
                right: other.currency.to_string(),
            });
        }
        Ok(())
    }

    pub fn checked_add(&self, other: &Money) -> MoneyResult<Money> {
        self.ensure_same_currency(other)?;
        Ok(Self::new(self.amount + other.amount, self.currency.clone()))
    }

    pub fn checked_sub(&self, other: &Money) -> MoneyResult<Money> {
        self.ensure_same_currency(other)?;
        Ok(Self::new(self.amount - other.amount, self.currency.clone()))
    }

    /// Multiply by a plain factor (revenue share, discount multiplier)
    pub fn scale(&self, factor: Decimal) -> Money {
        Self::new(self.amount * factor, self.currency.clone())
    }

    /// `self / other` as a plain ratio; `None` when `other` is zero
    pub fn ratio_to(&self, other: &Money) -> MoneyResult<Option<Decimal>> {
        self.ensure_same_currency(other)?;
        Ok(self.amount.checked_div(other.amount))
    }

    /// Smaller of two amounts in the same currency
    pub fn min(self, other: Money) -> MoneyResult<Money> {
        self.ensure_same_currency(&other)?;
        Ok(if other.amount < self.amount { other } else { self })
    }

    /// Sum amounts that are already in `currency`
    pub fn sum<'a>(
        currency: &Currency,
        items: impl IntoIterator<Item = &'a Money>,
    ) -> MoneyResult<Money> {
        let mut total = Money::zero(currency.clone());
        for item in items {
            total = total.checked_add(item)?;
        }
        Ok(total)
    }

    /// Round to the currency's minor unit
    pub fn rounded(&self) -> Money {
        Self::new(
            self.amount
                .round_dp_with_strategy(self.currency.exponent(), ROUNDING),
            self.currency.clone(),
        )
    }

    /// Round toward zero to the currency's minor unit
    ///
    /// For amounts that must never exceed what is actually held.
    pub fn rounded_down(&self) -> Money {
        Self::new(
            self.amount
                .round_dp_with_strategy(self.currency.exponent(), RoundingStrategy::ToZero),
            self.currency.clone(),
        )
    }

    /// Integer minor units (rounded), as sent to payment gateways
    pub fn to_minor_units(&self) -> i64 {
        let factor = Decimal::from(10i64.pow(self.currency.exponent()));
        (self.amount * factor)
            .round_dp_with_strategy(0, ROUNDING)
            .to_i64()
            .unwrap_or_default()
    }

    /// Convert into another currency
    ///
    /// Same-currency conversion is the identity and never consults `rates`.
    pub fn exchange_to(&self, to: &Currency, rates: &dyn ExchangeRates) -> MoneyResult<Money> {
        if &self.currency == to {
            return Ok(self.clone());
        }
        let rate = rates
            .rate(&self.currency, to)
            .ok_or_else(|| MoneyError::UnknownRate {
                from: self.currency.to_string(),
                to: to.to_string(),
            })?;
        Ok(Self::new(self.amount * rate, to.clone()))
    }

    /// Short human format, dropping the minor part when whole: `£50`, `£12.50`, `30 CHF`
    pub fn format_short(&self) -> String {
        let rounded = self.rounded().amount;
        let number = if rounded.fract().is_zero() {
            rounded.trunc().to_string()
        } else {
            format!("{:.*}", self.currency.exponent() as usize, rounded)
        };
        let (sign, number) = match number.strip_prefix('-') {
            Some(rest) => ("-", rest.to_string()),
            None => ("", number),
        };
        match self.currency.symbol() {
            Some(symbol) => format!("{sign}{symbol}{number}"),
            None => format!("{sign}{number} {}", self.currency),
        }
    }
}

impl PartialOrd for Money {
    /// Only amounts of the same currency are comparable
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.currency != other.currency {
            return None;
        }
        self.amount.partial_cmp(&other.amount)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.*} {}",
            self.currency.exponent() as usize,
            self.rounded().amount,
            self.currency
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gbp() -> Currency {
        Currency::parse("GBP").unwrap()
    }

    fn eur() -> Currency {
        Currency::parse("EUR").unwrap()
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_currency_parse() {
        assert_eq!(Currency::parse("gbp").unwrap().code(), "GBP");
        assert_eq!(
            Currency::parse("XYZ"),
            Err(MoneyError::UnknownCurrency("XYZ".to_string()))
        );
        assert_eq!(Currency::parse("JPY").unwrap().exponent(), 0);
    }

    #[test]
    fn test_currency_serde_rejects_unknown() {
        let ok: Currency = serde_json::from_str("\"EUR\"").unwrap();
        assert_eq!(ok, eur());
        assert!(serde_json::from_str::<Currency>("\"ZZZ\"").is_err());
    }

    #[test]
    fn test_minor_units() {
        let m = Money::from_minor_units(1050, gbp());
        assert_eq!(m.amount(), dec("10.50"));
        assert_eq!(m.to_minor_units(), 1050);

        let yen = Money::from_minor_units(1000, Currency::parse("JPY").unwrap());
        assert_eq!(yen.amount(), dec("1000"));
    }

    #[test]
    fn test_rounding_half_away_from_zero() {
        let m = Money::new(dec("0.125"), gbp());
        assert_eq!(m.rounded().amount(), dec("0.13"));
        assert_eq!(m.to_minor_units(), 13);

        let m = Money::new(dec("33.3333333"), gbp());
        assert_eq!(m.to_minor_units(), 3333);
    }

    #[test]
    fn test_rounded_down_never_exceeds_amount() {
        let m = Money::new(dec("10.005"), gbp());
        assert_eq!(m.rounded_down().amount(), dec("10.00"));
        assert_eq!(m.rounded().amount(), dec("10.01"));
        assert_eq!(Money::new(dec("-0.019"), gbp()).rounded_down().amount(), dec("-0.01"));
    }

    #[test]
    fn test_checked_add_currency_mismatch() {
        let a = Money::new(dec("1"), gbp());
        let b = Money::new(dec("1"), eur());
        assert!(matches!(
            a.checked_add(&b),
            Err(MoneyError::CurrencyMismatch { .. })
        ));
        assert_eq!(a.partial_cmp(&b), None);
    }

    #[test]
    fn test_full_precision_until_rounded() {
        let third = Money::new(dec("10"), gbp()).scale(Decimal::ONE / Decimal::from(3));
        let sum = Money::sum(&gbp(), [&third, &third, &third]).unwrap();
        // 9.99 if each third were rounded first
        assert_eq!(sum.rounded().amount(), dec("10.00"));
    }

    #[test]
    fn test_ratio_guarded_against_zero() {
        let a = Money::new(dec("50"), gbp());
        let zero = Money::zero(gbp());
        assert_eq!(a.ratio_to(&zero).unwrap(), None);
        assert_eq!(a.ratio_to(&Money::new(dec("100"), gbp())).unwrap(), Some(dec("0.5")));
    }

    #[test]
    fn test_exchange() {
        let rates = StaticRates::new().with_rate(&gbp(), &eur(), dec("1.2"));
        let m = Money::new(dec("10"), gbp());
        assert_eq!(m.exchange_to(&eur(), &rates).unwrap().amount(), dec("12.0"));

        // Derived inverse
        let back = Money::new(dec("12"), eur()).exchange_to(&gbp(), &rates).unwrap();
        assert_eq!(back.rounded().amount(), dec("10.00"));

        let usd = Currency::parse("USD").unwrap();
        assert!(matches!(
            m.exchange_to(&usd, &rates),
            Err(MoneyError::UnknownRate { .. })
        ));

        // Identity never needs a rate
        assert_eq!(m.exchange_to(&gbp(), &StaticRates::new()).unwrap(), m);
    }

    #[test]
    fn test_static_rates_from_json() {
        let rates = StaticRates::from_json(r#"{"GBP": {"EUR": "1.17", "USD": 1.27}}"#).unwrap();
        assert_eq!(rates.len(), 2);
        assert_eq!(rates.rate(&gbp(), &eur()), Some(dec("1.17")));

        assert!(StaticRates::from_json(r#"{"GBP": {"XXX": "1"}}"#).is_err());
        assert!(StaticRates::from_json("not json").is_err());
    }

    #[test]
    fn test_min() {
        let a = Money::new(dec("70"), gbp());
        let b = Money::new(dec("60"), gbp());
        assert_eq!(a.min(b.clone()).unwrap(), b);
    }

    #[test]
    fn test_format_short() {
        assert_eq!(Money::new(dec("50"), gbp()).format_short(), "£50");
        assert_eq!(Money::new(dec("12.5"), gbp()).format_short(), "£12.50");
        assert_eq!(
            Money::new(dec("30"), Currency::parse("CHF").unwrap()).format_short(),
            "30 CHF"
        );
        assert_eq!(Money::new(dec("-5"), eur()).format_short(), "-€5");
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::new(dec("60"), gbp()).to_string(), "60.00 GBP");
    }
}
