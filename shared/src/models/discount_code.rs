//! Discount Code Model

use super::event::Event;
use crate::error::{AppError, ErrorCode};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Where a discount code may be redeemed
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum DiscountScope {
    #[default]
    Everywhere,
    Organisation(String),
    Event(String),
}

/// Percentage discount code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscountCode {
    pub id: String,
    pub code: String,
    pub percentage_discount: Decimal,
    #[serde(default)]
    pub scope: DiscountScope,
}

impl DiscountCode {
    /// Build a code, rejecting percentages outside 0-100
    pub fn new(
        id: impl Into<String>,
        code: impl Into<String>,
        percentage_discount: Decimal,
        scope: DiscountScope,
    ) -> Result<Self, AppError> {
        if percentage_discount < Decimal::ZERO || percentage_discount > Decimal::ONE_HUNDRED {
            return Err(AppError::with_message(
                ErrorCode::InvalidDiscount,
                format!("percentage discount must be between 0 and 100, got {percentage_discount}"),
            ));
        }
        Ok(Self {
            id: id.into(),
            code: code.into(),
            percentage_discount,
            scope,
        })
    }

    pub fn applies_to(&self, event: &Event) -> bool {
        match &self.scope {
            DiscountScope::Everywhere => true,
            DiscountScope::Organisation(id) => {
                event.organisation_id == *id || event.cohost_ids.contains(id)
            }
            DiscountScope::Event(id) => event.id == *id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Currency;
    use chrono::Utc;

    fn event() -> Event {
        Event {
            id: "ev-1".into(),
            name: "Gig".into(),
            organisation_id: "org-1".into(),
            starts_at: Utc::now(),
            location: None,
            currency: Currency::parse("GBP").unwrap(),
            organisation_revenue_share: None,
            revenue_sharer_id: None,
            cohost_ids: vec!["org-3".into()],
            no_discounts: false,
            refund_deleted_orders: false,
            send_order_notifications: false,
            minimum_donation: None,
        }
    }

    #[test]
    fn test_percentage_bounds() {
        let scope = DiscountScope::Everywhere;
        assert!(DiscountCode::new("d", "SAVE", Decimal::from(101), scope.clone()).is_err());
        assert!(DiscountCode::new("d", "SAVE", Decimal::from(-1), scope.clone()).is_err());
        let err = DiscountCode::new("d", "SAVE", Decimal::from(150), scope.clone()).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidDiscount);
        assert!(DiscountCode::new("d", "SAVE", Decimal::from(100), scope).is_ok());
    }

    #[test]
    fn test_applies_to() {
        let e = event();
        let code = |scope| DiscountCode::new("d", "X", Decimal::from(10), scope).unwrap();

        assert!(code(DiscountScope::Everywhere).applies_to(&e));
        assert!(code(DiscountScope::Organisation("org-1".into())).applies_to(&e));
        assert!(code(DiscountScope::Organisation("org-3".into())).applies_to(&e));
        assert!(!code(DiscountScope::Organisation("org-2".into())).applies_to(&e));
        assert!(code(DiscountScope::Event("ev-1".into())).applies_to(&e));
        assert!(!code(DiscountScope::Event("ev-9".into())).applies_to(&e));
    }

    #[test]
    fn test_scope_serde() {
        let json = serde_json::to_string(&DiscountScope::Event("ev-1".into())).unwrap();
        assert_eq!(json, r#"{"type":"event","id":"ev-1"}"#);
        let everywhere: DiscountScope = serde_json::from_str(r#"{"type":"everywhere"}"#).unwrap();
        assert_eq!(everywhere, DiscountScope::Everywhere);
    }
}
