//! Event Model

use crate::money::Currency;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Location value used for events with no venue
pub const ONLINE_LOCATION: &str = "Online";

/// Ticketed event run by an organisation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub name: String,
    /// Organiser
    pub organisation_id: String,
    pub starts_at: DateTime<Utc>,
    pub location: Option<String>,
    pub currency: Currency,
    /// Fraction (0-1) of ticket revenue kept by the organiser when a co-host shares revenue
    pub organisation_revenue_share: Option<Decimal>,
    /// Revenue-sharing co-host account
    pub revenue_sharer_id: Option<String>,
    /// Co-hosting organisations
    #[serde(default)]
    pub cohost_ids: Vec<String>,
    #[serde(default)]
    pub no_discounts: bool,
    #[serde(default)]
    pub refund_deleted_orders: bool,
    #[serde(default)]
    pub send_order_notifications: bool,
    pub minimum_donation: Option<Decimal>,
}

impl Event {
    pub fn is_online(&self) -> bool {
        self.location.as_deref() == Some(ONLINE_LOCATION)
    }

    /// Human date line, e.g. `Sat 14 Mar 2026, 19:30 UTC`
    pub fn when_details(&self) -> String {
        self.starts_at.format("%a %-d %b %Y, %H:%M UTC").to_string()
    }

    /// Organisations that receive opt-in organisationships for buyers
    pub fn opt_in_organisation_ids(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.organisation_id.as_str())
            .chain(self.cohost_ids.iter().map(String::as_str))
    }
}
