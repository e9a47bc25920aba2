//! Inbound triggers
//!
//! The box office reacts to four triggers: order creation, payment
//! confirmation, order cancellation (deletion) and restoration. Triggers
//! arrive as JSON lines; each line gets exactly one JSON response line.
//!
//! ```text
//! {"type":"payment_confirmed","payment_intent":"pi_123"}
//! {"ok":true,"result":{...order...}}
//! ```
//!
//! Failures answer `{"ok":false,"retryable":bool,"error":{"code":4001,...}}`.
//!
//! Two more kinds are accepted: an event aggregates query, and raw gateway
//! webhooks, which are verified against the configured signing secret before
//! they confirm anything.

use crate::gateway::webhook;
use crate::orders::{CreateOrderRequest, OrdersManager};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use shared::{AppError, AppResult, ErrorCode};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundTrigger {
    CreateOrder(CreateOrderRequest),
    PaymentConfirmed {
        payment_intent: String,
    },
    OrderCancelled {
        order_id: String,
        #[serde(default)]
        prevent_refund: bool,
    },
    OrderRestored {
        order_id: String,
    },
    EventAggregates {
        event_id: String,
    },
    /// Raw gateway webhook body plus its signature header
    Webhook {
        payload: String,
        signature: String,
    },
}

impl InboundTrigger {
    pub fn name(&self) -> &'static str {
        match self {
            InboundTrigger::CreateOrder(_) => "create_order",
            InboundTrigger::PaymentConfirmed { .. } => "payment_confirmed",
            InboundTrigger::OrderCancelled { .. } => "order_cancelled",
            InboundTrigger::OrderRestored { .. } => "order_restored",
            InboundTrigger::EventAggregates { .. } => "event_aggregates",
            InboundTrigger::Webhook { .. } => "webhook",
        }
    }
}

/// Run one trigger against the manager
pub async fn dispatch(
    manager: &OrdersManager,
    trigger: InboundTrigger,
    webhook_secret: Option<&str>,
) -> AppResult<Value> {
    let name = trigger.name();
    tracing::debug!(trigger = name, "Dispatching trigger");

    let result = match trigger {
        InboundTrigger::CreateOrder(request) => to_value(manager.create_order(request).await?),
        InboundTrigger::PaymentConfirmed { payment_intent } => {
            to_value(manager.confirm_payment(&payment_intent).await?)
        }
        InboundTrigger::OrderCancelled {
            order_id,
            prevent_refund,
        } => to_value(manager.delete_order(&order_id, prevent_refund).await?),
        InboundTrigger::OrderRestored { order_id } => {
            to_value(manager.restore_order(&order_id).await?)
        }
        InboundTrigger::EventAggregates { event_id } => {
            to_value(manager.event_aggregates(&event_id)?)
        }
        InboundTrigger::Webhook { payload, signature } => {
            let secret = webhook_secret.ok_or_else(|| {
                AppError::with_message(ErrorCode::ConfigError, "Webhook signing secret not set")
            })?;
            let now = chrono::Utc::now().timestamp();
            webhook::verify_signature(&payload, &signature, secret, now)
                .map_err(|e| AppError::invalid_request(e.to_string()))?;

            match webhook::confirmed_payment_intent(&payload)
                .map_err(|e| AppError::invalid_request(e.to_string()))?
            {
                Some(payment_intent) => to_value(manager.confirm_payment(&payment_intent).await?),
                None => Ok(json!({ "ignored": true })),
            }
        }
    };

    if let Err(e) = &result {
        tracing::warn!(
            trigger = name,
            code = %e.code,
            category = ?e.code.category(),
            error = %e,
            "Trigger failed"
        );
    }
    result
}

fn to_value<T: Serialize>(value: T) -> AppResult<Value> {
    serde_json::to_value(value).map_err(|e| AppError::internal(e.to_string()))
}

/// Parse and dispatch one JSON line, producing the response line
pub async fn handle_line(manager: &OrdersManager, line: &str, webhook_secret: Option<&str>) -> Value {
    let outcome = match serde_json::from_str::<InboundTrigger>(line) {
        Ok(trigger) => dispatch(manager, trigger, webhook_secret).await,
        Err(e) => Err(AppError::invalid_request(format!("Malformed trigger: {e}"))),
    };
    match outcome {
        Ok(result) => json!({ "ok": true, "result": result }),
        Err(error) => json!({ "ok": false, "retryable": error.is_retryable(), "error": error }),
    }
}

/// Read triggers line by line until EOF or cancellation
///
/// Blank lines are skipped. Returns the number of triggers handled.
pub async fn listen<R, W>(
    manager: &OrdersManager,
    reader: R,
    mut writer: W,
    webhook_secret: Option<&str>,
    token: CancellationToken,
) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    let mut handled = 0;

    loop {
        let line = tokio::select! {
            _ = token.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        let response = handle_line(manager, &line, webhook_secret).await;
        writer.write_all(response.to_string().as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        handled += 1;
    }

    tracing::info!(handled, "Trigger listener stopped");
    Ok(handled)
}
