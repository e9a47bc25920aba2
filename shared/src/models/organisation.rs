//! Organisation and Organisationship Models

use crate::money::Money;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Payment gateway credentials of an organiser
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayCredentials {
    pub secret_key: String,
}

impl fmt::Debug for GatewayCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayCredentials")
            .field("secret_key", &"[REDACTED]")
            .finish()
    }
}

/// Event organiser
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organisation {
    pub id: String,
    /// Unique URL slug, also accepted as a co-host affiliate shortcut
    pub slug: String,
    pub name: String,
    pub gateway: Option<GatewayCredentials>,
}

impl Organisation {
    /// Whether the organiser can take payments and issue refunds
    pub fn payment_processing_configured(&self) -> bool {
        self.gateway
            .as_ref()
            .is_some_and(|g| !g.secret_key.is_empty())
    }
}

/// A co-host's payout account on the payment gateway
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectedAccount {
    /// Gateway user id, used as transfer destination
    pub user_id: String,
    pub access_token: String,
}

impl fmt::Debug for ConnectedAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectedAccount")
            .field("user_id", &self.user_id)
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

/// Relationship between an account and an organisation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organisationship {
    pub account_id: String,
    pub organisation_id: String,
    /// Store credit, in whatever currency it was issued
    pub credit_balance: Option<Money>,
    #[serde(default)]
    pub monthly_donor: bool,
    pub monthly_donor_discount: Option<Decimal>,
    #[serde(default)]
    pub unsubscribed: bool,
    /// Payout account, for co-hosts sharing revenue
    pub payout_account: Option<ConnectedAccount>,
}

impl Organisationship {
    pub fn new(account_id: impl Into<String>, organisation_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            organisation_id: organisation_id.into(),
            credit_balance: None,
            monthly_donor: false,
            monthly_donor_discount: None,
            unsubscribed: false,
            payout_account: None,
        }
    }

    /// Storage key
    pub fn key_for(account_id: &str, organisation_id: &str) -> String {
        format!("{account_id}:{organisation_id}")
    }

    pub fn key(&self) -> String {
        Self::key_for(&self.account_id, &self.organisation_id)
    }

    /// Active monthly donor with a nonzero discount
    pub fn is_discount_eligible(&self) -> bool {
        self.monthly_donor
            && !self.unsubscribed
            && self
                .monthly_donor_discount
                .is_some_and(|d| d > Decimal::ZERO)
    }
}
