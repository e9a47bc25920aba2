//! Recording in-memory payment gateway
//!
//! Behaves like the real processor for the calls the order lifecycle makes:
//! payment intents and transfers are seeded or created in memory, a second
//! refund of the same charge is rejected as an invalid request, and every
//! call is recorded together with the credential it was made with.

use super::{
    Charge, GatewayAuth, GatewayConnector, GatewayError, GatewayResult, Metadata, PaymentGateway,
    PaymentIntent, Refund, RefundMode, Transfer, TransferRequest,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// One recorded gateway call
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayCall {
    RetrievePaymentIntent {
        id: String,
    },
    RetrieveTransfer {
        id: String,
    },
    CreateTransfer {
        amount_minor: i64,
        currency: String,
        destination: String,
        metadata: Metadata,
    },
    UpdateCharge {
        charge_id: String,
        description: String,
        metadata: Metadata,
    },
    CreateRefund {
        charge_id: String,
        mode: RefundMode,
    },
}

impl GatewayCall {
    fn op(&self) -> &'static str {
        match self {
            GatewayCall::RetrievePaymentIntent { .. } => "retrieve_payment_intent",
            GatewayCall::RetrieveTransfer { .. } => "retrieve_transfer",
            GatewayCall::CreateTransfer { .. } => "create_transfer",
            GatewayCall::UpdateCharge { .. } => "update_charge",
            GatewayCall::CreateRefund { .. } => "create_refund",
        }
    }
}

#[derive(Default)]
struct MockState {
    calls: Mutex<Vec<(String, GatewayCall)>>,
    payment_intents: Mutex<HashMap<String, PaymentIntent>>,
    transfers: Mutex<HashMap<String, Transfer>>,
    refunded: Mutex<HashSet<String>>,
    failures: Mutex<HashMap<&'static str, GatewayError>>,
    sequence: AtomicU64,
}

impl MockState {
    fn next_id(&self, prefix: &str) -> String {
        format!("{prefix}_mock_{}", self.sequence.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

/// Shared handle; every connected client records into the same log
#[derive(Clone, Default)]
pub struct MockGateway {
    state: Arc<MockState>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a payment intent with a single charge
    pub fn add_payment_intent(&self, id: &str, charge_id: &str, transfer: Option<&str>) {
        self.state.payment_intents.lock().insert(
            id.to_string(),
            PaymentIntent {
                id: id.to_string(),
                charges: vec![Charge {
                    id: charge_id.to_string(),
                    transfer: transfer.map(String::from),
                }],
            },
        );
    }

    pub fn add_transfer(&self, id: &str, destination_payment: Option<&str>) {
        self.state.transfers.lock().insert(
            id.to_string(),
            Transfer {
                id: id.to_string(),
                destination_payment: destination_payment.map(String::from),
            },
        );
    }

    /// Make the next call of `op` (e.g. `"create_refund"`) fail with `error`
    pub fn fail_next(&self, op: &'static str, error: GatewayError) {
        self.state.failures.lock().insert(op, error);
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.state
            .calls
            .lock()
            .iter()
            .map(|(_, call)| call.clone())
            .collect()
    }

    /// Calls together with the credential key they were made with
    pub fn scoped_calls(&self) -> Vec<(String, GatewayCall)> {
        self.state.calls.lock().clone()
    }

    pub fn refunds(&self) -> Vec<(String, RefundMode)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                GatewayCall::CreateRefund { charge_id, mode } => Some((charge_id, mode)),
                _ => None,
            })
            .collect()
    }

    pub fn transfers_created(&self) -> Vec<GatewayCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, GatewayCall::CreateTransfer { .. }))
            .collect()
    }

    pub fn charge_updates(&self) -> Vec<GatewayCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, GatewayCall::UpdateCharge { .. }))
            .collect()
    }
}

impl GatewayConnector for MockGateway {
    fn connect(&self, auth: GatewayAuth) -> Arc<dyn PaymentGateway> {
        Arc::new(ScopedMock {
            state: self.state.clone(),
            key: auth.key().to_string(),
        })
    }
}

struct ScopedMock {
    state: Arc<MockState>,
    key: String,
}

impl ScopedMock {
    fn record(&self, call: GatewayCall) -> GatewayResult<()> {
        let op = call.op();
        self.state.calls.lock().push((self.key.clone(), call));
        match self.state.failures.lock().remove(op) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn no_such(kind: &str, id: &str) -> GatewayError {
    GatewayError::InvalidRequest(format!("No such {kind}: '{id}'"))
}

#[async_trait]
impl PaymentGateway for ScopedMock {
    async fn retrieve_payment_intent(&self, id: &str) -> GatewayResult<PaymentIntent> {
        self.record(GatewayCall::RetrievePaymentIntent { id: id.to_string() })?;
        self.state
            .payment_intents
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| no_such("payment_intent", id))
    }

    async fn retrieve_transfer(&self, id: &str) -> GatewayResult<Transfer> {
        self.record(GatewayCall::RetrieveTransfer { id: id.to_string() })?;
        self.state
            .transfers
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| no_such("transfer", id))
    }

    async fn create_transfer(&self, request: TransferRequest) -> GatewayResult<Transfer> {
        self.record(GatewayCall::CreateTransfer {
            amount_minor: request.amount.to_minor_units(),
            currency: request.amount.currency().to_lowercase(),
            destination: request.destination.clone(),
            metadata: request.metadata.clone(),
        })?;
        let transfer = Transfer {
            id: self.state.next_id("tr"),
            destination_payment: Some(self.state.next_id("py")),
        };
        self.state
            .transfers
            .lock()
            .insert(transfer.id.clone(), transfer.clone());
        Ok(transfer)
    }

    async fn update_charge(
        &self,
        charge_id: &str,
        description: &str,
        metadata: &Metadata,
    ) -> GatewayResult<()> {
        self.record(GatewayCall::UpdateCharge {
            charge_id: charge_id.to_string(),
            description: description.to_string(),
            metadata: metadata.clone(),
        })
    }

    async fn create_refund(&self, charge_id: &str, mode: RefundMode) -> GatewayResult<Refund> {
        self.record(GatewayCall::CreateRefund {
            charge_id: charge_id.to_string(),
            mode,
        })?;
        if !self.state.refunded.lock().insert(charge_id.to_string()) {
            return Err(GatewayError::InvalidRequest(format!(
                "Charge {charge_id} has already been refunded."
            )));
        }
        Ok(Refund {
            id: self.state.next_id("re"),
        })
    }
}
