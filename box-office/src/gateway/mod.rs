//! Payment gateway adapter
//!
//! The order engine talks to the payment processor through [`PaymentGateway`].
//! A gateway client is always bound to one credential scope: the organiser's
//! secret key, or a co-host's connected-account access token. Clients are
//! obtained from a [`GatewayConnector`], so no call ever depends on ambient
//! global credentials.
//!
//! - [`stripe`] - REST client (form-encoded requests, pinned API version)
//! - [`mock`] - recording in-memory gateway for tests
//! - [`webhook`] - signed inbound event verification

pub mod mock;
pub mod stripe;
pub mod webhook;

pub use mock::{GatewayCall, MockGateway};
pub use stripe::StripeConnector;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared::Money;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Gateway errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// The gateway rejected the request as invalid (already refunded,
    /// already reversed, unknown object). Treated as "already settled".
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Gateway API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Unexpected gateway response: {0}")]
    Decode(String),
}

impl GatewayError {
    pub fn is_invalid_request(&self) -> bool {
        matches!(self, GatewayError::InvalidRequest(_))
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

// ============================================================================
// Gateway objects
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Charge {
    pub id: String,
    /// Transfer created for a destination charge
    pub transfer: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub charges: Vec<Charge>,
}

impl PaymentIntent {
    pub fn first_charge(&self) -> Option<&Charge> {
        self.charges.first()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub id: String,
    /// Charge created on the destination account
    pub destination_payment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Refund {
    pub id: String,
}

/// How much of a charge to unwind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefundMode {
    Full,
    /// Also refund the application fee and reverse the co-host transfer
    WithFeeAndTransferReversal,
}

/// Scalar string metadata attached to charges and transfers
pub type Metadata = Vec<(&'static str, String)>;

#[derive(Debug, Clone, PartialEq)]
pub struct TransferRequest {
    pub amount: Money,
    /// Connected account id
    pub destination: String,
    pub metadata: Metadata,
}

// ============================================================================
// Traits
// ============================================================================

/// Operations the order lifecycle needs from a payment processor
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn retrieve_payment_intent(&self, id: &str) -> GatewayResult<PaymentIntent>;

    async fn retrieve_transfer(&self, id: &str) -> GatewayResult<Transfer>;

    async fn create_transfer(&self, request: TransferRequest) -> GatewayResult<Transfer>;

    async fn update_charge(
        &self,
        charge_id: &str,
        description: &str,
        metadata: &Metadata,
    ) -> GatewayResult<()>;

    async fn create_refund(&self, charge_id: &str, mode: RefundMode) -> GatewayResult<Refund>;
}

/// Credentials a gateway client is bound to
#[derive(Clone, PartialEq, Eq)]
pub enum GatewayAuth {
    /// Organiser secret key
    SecretKey(String),
    /// Co-host connected account access token
    AccessToken(String),
}

impl GatewayAuth {
    pub fn key(&self) -> &str {
        match self {
            GatewayAuth::SecretKey(k) | GatewayAuth::AccessToken(k) => k,
        }
    }
}

impl fmt::Debug for GatewayAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayAuth::SecretKey(_) => f.write_str("SecretKey([REDACTED])"),
            GatewayAuth::AccessToken(_) => f.write_str("AccessToken([REDACTED])"),
        }
    }
}

/// Builds gateway clients per credential scope
pub trait GatewayConnector: Send + Sync {
    fn connect(&self, auth: GatewayAuth) -> Arc<dyn PaymentGateway>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_debug_is_redacted() {
        let auth = GatewayAuth::SecretKey("sk_test_abc".into());
        assert_eq!(format!("{:?}", auth), "SecretKey([REDACTED])");
        assert_eq!(auth.key(), "sk_test_abc");
    }

    #[test]
    fn test_invalid_request_classification() {
        assert!(GatewayError::InvalidRequest("already refunded".into()).is_invalid_request());
        assert!(!GatewayError::Transport("reset".into()).is_invalid_request());
    }

    #[test]
    fn test_first_charge() {
        let pi = PaymentIntent {
            id: "pi_1".into(),
            charges: vec![
                Charge { id: "ch_1".into(), transfer: None },
                Charge { id: "ch_2".into(), transfer: None },
            ],
        };
        assert_eq!(pi.first_charge().map(|c| c.id.as_str()), Some("ch_1"));
    }
}
