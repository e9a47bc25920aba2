//! Stripe integration via REST API (no SDK dependency)
//!
//! Requests are form-encoded, authenticated with HTTP basic auth (the key as
//! username) and pinned to one API version through the `Stripe-Version`
//! header. Responses are read as loose JSON and only the fields the order
//! lifecycle needs are extracted.

use super::{
    Charge, GatewayAuth, GatewayConnector, GatewayError, GatewayResult, Metadata, PaymentGateway,
    PaymentIntent, Refund, RefundMode, Transfer, TransferRequest,
};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Builds [`StripeClient`]s sharing one HTTP connection pool
#[derive(Clone)]
pub struct StripeConnector {
    http: reqwest::Client,
    api_base: String,
    api_version: String,
}

impl StripeConnector {
    pub fn new(
        api_base: impl Into<String>,
        api_version: impl Into<String>,
        timeout: Duration,
    ) -> GatewayResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_version: api_version.into(),
        })
    }
}

impl GatewayConnector for StripeConnector {
    fn connect(&self, auth: GatewayAuth) -> Arc<dyn PaymentGateway> {
        Arc::new(StripeClient {
            http: self.http.clone(),
            api_base: self.api_base.clone(),
            api_version: self.api_version.clone(),
            auth,
        })
    }
}

/// Client bound to one set of credentials
pub struct StripeClient {
    http: reqwest::Client,
    api_base: String,
    api_version: String,
    auth: GatewayAuth,
}

impl StripeClient {
    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.api_base, path)
    }

    async fn get(&self, path: &str) -> GatewayResult<Value> {
        self.send(self.http.get(self.url(path))).await
    }

    async fn post(&self, path: &str, form: &[(String, String)]) -> GatewayResult<Value> {
        self.send(self.http.post(self.url(path)).form(form)).await
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> GatewayResult<Value> {
        let resp = request
            .basic_auth(self.auth.key(), None::<&str>)
            .header("Stripe-Version", &self.api_version)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let status = resp.status();
        let body: Value = resp
            .json()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))?;

        if status.is_success() {
            Ok(body)
        } else {
            Err(api_error(status.as_u16(), &body))
        }
    }
}

#[async_trait]
impl PaymentGateway for StripeClient {
    async fn retrieve_payment_intent(&self, id: &str) -> GatewayResult<PaymentIntent> {
        let body = self.get(&format!("payment_intents/{id}")).await?;
        parse_payment_intent(&body)
    }

    async fn retrieve_transfer(&self, id: &str) -> GatewayResult<Transfer> {
        let body = self.get(&format!("transfers/{id}")).await?;
        parse_transfer(&body)
    }

    async fn create_transfer(&self, request: TransferRequest) -> GatewayResult<Transfer> {
        let mut form = vec![
            ("amount".to_string(), request.amount.to_minor_units().to_string()),
            ("currency".to_string(), request.amount.currency().to_lowercase()),
            ("destination".to_string(), request.destination.clone()),
        ];
        push_metadata(&mut form, &request.metadata);
        let body = self.post("transfers", &form).await?;
        parse_transfer(&body)
    }

    async fn update_charge(
        &self,
        charge_id: &str,
        description: &str,
        metadata: &Metadata,
    ) -> GatewayResult<()> {
        let mut form = vec![("description".to_string(), description.to_string())];
        push_metadata(&mut form, metadata);
        self.post(&format!("charges/{charge_id}"), &form).await?;
        Ok(())
    }

    async fn create_refund(&self, charge_id: &str, mode: RefundMode) -> GatewayResult<Refund> {
        let body = self.post("refunds", &refund_form(charge_id, mode)).await?;
        Ok(Refund {
            id: required_str(&body, "id")?,
        })
    }
}

// ========== Encoding ==========

fn push_metadata(form: &mut Vec<(String, String)>, metadata: &Metadata) {
    for (key, value) in metadata {
        form.push((format!("metadata[{key}]"), value.clone()));
    }
}

fn refund_form(charge_id: &str, mode: RefundMode) -> Vec<(String, String)> {
    let mut form = vec![("charge".to_string(), charge_id.to_string())];
    if mode == RefundMode::WithFeeAndTransferReversal {
        form.push(("refund_application_fee".to_string(), "true".to_string()));
        form.push(("reverse_transfer".to_string(), "true".to_string()));
    }
    form
}

// ========== Decoding ==========

fn required_str(body: &Value, field: &str) -> GatewayResult<String> {
    body[field]
        .as_str()
        .map(String::from)
        .ok_or_else(|| GatewayError::Decode(format!("missing `{field}` in {body}")))
}

/// Expanded objects come back as `{"id": ...}`, collapsed ones as a bare id
fn id_or_object(value: &Value) -> Option<String> {
    value
        .as_str()
        .or_else(|| value["id"].as_str())
        .map(String::from)
}

fn parse_payment_intent(body: &Value) -> GatewayResult<PaymentIntent> {
    let charges = body["charges"]["data"]
        .as_array()
        .map(|data| {
            data.iter()
                .filter_map(|c| {
                    Some(Charge {
                        id: c["id"].as_str()?.to_string(),
                        transfer: id_or_object(&c["transfer"]),
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    Ok(PaymentIntent {
        id: required_str(body, "id")?,
        charges,
    })
}

fn parse_transfer(body: &Value) -> GatewayResult<Transfer> {
    Ok(Transfer {
        id: required_str(body, "id")?,
        destination_payment: id_or_object(&body["destination_payment"]),
    })
}

fn api_error(status: u16, body: &Value) -> GatewayError {
    let error = &body["error"];
    let message = error["message"]
        .as_str()
        .unwrap_or("unknown gateway error")
        .to_string();
    if error["type"].as_str() == Some("invalid_request_error") {
        GatewayError::InvalidRequest(message)
    } else {
        GatewayError::Api { status, message }
    }
}
