//! Inbound gateway webhooks
//!
//! Payment confirmations arrive as signed events. The signature header has
//! the form `t=<unix timestamp>,v1=<hex hmac-sha256>` computed over
//! `"<timestamp>.<payload>"` with the endpoint's signing secret.

use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use thiserror::Error;

/// Events older than this are rejected as replays
const TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WebhookError {
    #[error("Invalid signature header")]
    MalformedHeader,

    #[error("Webhook signature mismatch")]
    SignatureMismatch,

    #[error("Webhook timestamp outside tolerance")]
    Expired,

    #[error("Invalid webhook payload: {0}")]
    Payload(String),
}

/// Verify a signed payload against `now` (unix seconds)
pub fn verify_signature(
    payload: &str,
    sig_header: &str,
    secret: &str,
    now: i64,
) -> Result<(), WebhookError> {
    let mut timestamp = "";
    let mut signature = "";
    for part in sig_header.split(',') {
        if let Some(t) = part.trim().strip_prefix("t=") {
            timestamp = t;
        } else if let Some(v) = part.trim().strip_prefix("v1=") {
            signature = v;
        }
    }

    if timestamp.is_empty() || signature.is_empty() {
        return Err(WebhookError::MalformedHeader);
    }

    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|_| WebhookError::MalformedHeader)?;
    mac.update(format!("{timestamp}.{payload}").as_bytes());

    let sig_bytes = hex::decode(signature).map_err(|_| WebhookError::MalformedHeader)?;
    mac.verify_slice(&sig_bytes)
        .map_err(|_| WebhookError::SignatureMismatch)?;

    let ts: i64 = timestamp.parse().map_err(|_| WebhookError::MalformedHeader)?;
    if (now - ts).abs() > TOLERANCE_SECS {
        return Err(WebhookError::Expired);
    }

    Ok(())
}

/// Payment intent confirmed by an event, if the event confirms a payment
///
/// `payment_intent.succeeded` carries the intent itself;
/// `checkout.session.completed` references it. Other event types yield `None`.
pub fn confirmed_payment_intent(payload: &str) -> Result<Option<String>, WebhookError> {
    let event: Value =
        serde_json::from_str(payload).map_err(|e| WebhookError::Payload(e.to_string()))?;
    let object = &event["data"]["object"];
    let reference = match event["type"].as_str() {
        Some("payment_intent.succeeded") => object["id"].as_str(),
        Some("checkout.session.completed") => object["payment_intent"].as_str(),
        Some(_) => return Ok(None),
        None => return Err(WebhookError::Payload("missing event type".into())),
    };
    reference
        .map(|r| Some(r.to_string()))
        .ok_or_else(|| WebhookError::Payload("missing payment intent".into()))
}
