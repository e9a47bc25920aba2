//! OrdersManager - order creation and lifecycle transitions
//!
//! This module handles:
//! - Order creation (line items, discounts, credit, revenue figures)
//! - Payment confirmation, deletion and restoration
//! - Gateway follow-ups (co-host transfers, destination charge updates, refunds)
//! - Deferred job scheduling
//!
//! # Transition Flow
//!
//! ```text
//! confirm_payment / delete_order / restore_order
//!     ├─ 1. Acquire the per-order lock
//!     ├─ 2. Begin write transaction, load order
//!     ├─ 3. Plan the transition (no-op, apply, refund check only)
//!     ├─ 4. Apply state change, update reference index
//!     ├─ 5. Commit transaction
//!     ├─ 6. Gateway follow-ups (failures reported, never rolled back)
//!     └─ 7. Queue deferred jobs
//! ```
//!
//! Everything that mutates an order or a credit balance happens inside a
//! single redb write transaction; gateway calls only run after commit.

mod error;
pub use error::*;

#[cfg(test)]
mod tests;

use super::aggregates::{self, AggregateCache, EventAggregates};
use super::credit;
use super::discount;
use super::error::OrderError;
use super::lifecycle::{self, Plan, Transition};
use super::metadata;
use super::revenue::RevenueCalculator;
use super::storage::{OrderStorage, StorageError};
use super::validation::{LineItemContext, build_line_items, validate_event_share};
use crate::deferred::{DeferredJob, ErrorReporter, JobQueue, TracingReporter};
use crate::gateway::{
    GatewayAuth, GatewayConnector, GatewayError, RefundMode, TransferRequest,
};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use shared::models::{
    Affiliate, DonationInput, Event, Order, OrderStatus, Organisation, Organisationship,
    ReferenceKind, TicketInput,
};
use shared::util::{new_id, now_millis};
use shared::{Currency, ExchangeRates};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

// ========== Requests and reports ==========

/// Order creation request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    pub event_id: String,
    pub account_id: String,
    #[serde(default)]
    pub tickets: Vec<TicketInput>,
    #[serde(default)]
    pub donations: Vec<DonationInput>,
    /// Code string as typed by the buyer
    pub discount_code: Option<String>,
    #[serde(default)]
    pub affiliate: Affiliate,
    /// Slug of a co-hosting organisation that referred the buyer
    pub cohost: Option<String>,
    /// Defaults to the event currency
    pub currency: Option<Currency>,
    pub payment_intent: Option<String>,
    pub session_id: Option<String>,
    pub checkout_id: Option<String>,
    #[serde(default)]
    pub opt_in_organisation: bool,
}

/// Result of the refund check run on deletion
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RefundOutcome {
    NotRequired,
    Refunded { refund_id: String, mode: RefundMode },
    /// The gateway reported the charge as already refunded
    AlreadySettled,
    /// Reported to the error reporter; the deletion still stands
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct DeletionReport {
    pub order: Order,
    pub refund: RefundOutcome,
}

// ========== Per-order locks ==========

struct OrderLock<'a> {
    locks: &'a DashMap<String, Arc<Mutex<()>>>,
    order_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for OrderLock<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks
            .remove_if(&self.order_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

// ========== Manager ==========

/// Order engine
pub struct OrdersManager {
    storage: OrderStorage,
    connector: Arc<dyn GatewayConnector>,
    rates: Arc<dyn ExchangeRates>,
    jobs: JobQueue,
    reporter: Arc<dyn ErrorReporter>,
    locks: DashMap<String, Arc<Mutex<()>>>,
    aggregates: AggregateCache,
}

impl std::fmt::Debug for OrdersManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrdersManager")
            .field("storage", &"<OrderStorage>")
            .field("connector", &"<GatewayConnector>")
            .field("locks", &self.locks.len())
            .field("cached_aggregates", &self.aggregates.len())
            .finish()
    }
}

impl OrdersManager {
    pub fn new(
        storage: OrderStorage,
        connector: Arc<dyn GatewayConnector>,
        rates: Arc<dyn ExchangeRates>,
        jobs: JobQueue,
    ) -> Self {
        Self {
            storage,
            connector,
            rates,
            jobs,
            reporter: Arc::new(TracingReporter),
            locks: DashMap::new(),
            aggregates: AggregateCache::new(),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Share an aggregate cache with the deferred job handler
    pub fn with_aggregate_cache(mut self, aggregates: AggregateCache) -> Self {
        self.aggregates = aggregates;
        self
    }

    pub fn storage(&self) -> &OrderStorage {
        &self.storage
    }

    pub fn aggregate_cache(&self) -> &AggregateCache {
        &self.aggregates
    }

    async fn lock_order(&self, order_id: &str) -> OrderLock<'_> {
        let lock = self
            .locks
            .entry(order_id.to_string())
            .or_default()
            .clone();
        let guard = lock.lock_owned().await;
        OrderLock {
            locks: &self.locks,
            order_id: order_id.to_string(),
            guard: Some(guard),
        }
    }

    fn load_event(&self, event_id: &str) -> ManagerResult<Event> {
        self.storage
            .get_event(event_id)?
            .ok_or_else(|| ManagerError::EventNotFound(event_id.to_string()))
    }

    fn load_organisation(&self, organisation_id: &str) -> ManagerResult<Organisation> {
        self.storage
            .get_organisation(organisation_id)?
            .ok_or_else(|| ManagerError::OrganisationNotFound(organisation_id.to_string()))
    }

    fn organiser_gateway(
        &self,
        organisation: &Organisation,
    ) -> ManagerResult<Arc<dyn crate::gateway::PaymentGateway>> {
        let credentials = organisation
            .gateway
            .as_ref()
            .ok_or_else(|| ManagerError::GatewayNotConfigured(organisation.id.clone()))?;
        Ok(self
            .connector
            .connect(GatewayAuth::SecretKey(credentials.secret_key.clone())))
    }

    /// Organisationship of the event's revenue-sharing co-host with the organiser
    fn revenue_sharer_organisationship(
        &self,
        order: &Order,
        event: &Event,
    ) -> ManagerResult<Option<Organisationship>> {
        match order.revenue_sharer_id.as_deref() {
            Some(sharer_id) => Ok(self
                .storage
                .get_organisationship(sharer_id, &event.organisation_id)?),
            None => Ok(None),
        }
    }

    // ========== Queries ==========

    pub fn get_order(&self, order_id: &str) -> ManagerResult<Order> {
        self.storage
            .get_order(order_id)?
            .ok_or_else(|| ManagerError::OrderNotFound(order_id.to_string()))
    }

    /// Live order holding a payment intent
    pub fn find_by_payment_intent(&self, payment_intent: &str) -> ManagerResult<Option<Order>> {
        Ok(self
            .storage
            .find_order_by_reference(ReferenceKind::PaymentIntent, payment_intent)?)
    }

    /// Cached sales figures of an event, recomputed after invalidation
    pub fn event_aggregates(&self, event_id: &str) -> ManagerResult<EventAggregates> {
        if let Some(cached) = self.aggregates.get(event_id) {
            return Ok(cached);
        }
        let event = self.load_event(event_id)?;
        let orders = self.storage.orders_for_event(event_id)?;
        let computed = aggregates::compute(&event, &orders, self.rates.as_ref());
        self.aggregates.insert(computed.clone());
        Ok(computed)
    }

    // ========== Creation ==========

    pub async fn create_order(&self, request: CreateOrderRequest) -> ManagerResult<Order> {
        let event = self.load_event(&request.event_id)?;
        let account = self
            .storage
            .get_account(&request.account_id)?
            .ok_or_else(|| ManagerError::AccountNotFound(request.account_id.clone()))?;
        validate_event_share(&event)?;

        let currency = request
            .currency
            .clone()
            .unwrap_or_else(|| event.currency.clone());
        let order_id = new_id();

        let ctx = LineItemContext {
            order_id: &order_id,
            event: &event,
            account_id: &account.id,
            currency: &currency,
        };
        let (tickets, donations) = build_line_items(&ctx, &request.tickets, &request.donations)?;

        let code = match request
            .discount_code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
        {
            Some(code) => {
                let found = self.storage.find_discount_code(code)?;
                if found.is_none() {
                    tracing::debug!(code = %code, "Unknown discount code ignored");
                }
                found
            }
            None => None,
        };
        let organiser_relationship = self
            .storage
            .get_organisationship(&account.id, &event.organisation_id)?;
        let discounts = discount::resolve(&event, code.as_ref(), organiser_relationship.as_ref());
        let affiliate = self.resolve_affiliate(request.affiliate, request.cohost.as_deref())?;

        let now = now_millis();
        let mut order = Order {
            id: order_id,
            event_id: event.id.clone(),
            account_id: account.id.clone(),
            revenue_sharer_id: event.revenue_sharer_id.clone(),
            discount_code_id: discounts.discount_code_id,
            currency,
            value: None,
            percentage_discount: discounts.percentage_discount,
            percentage_discount_monthly_donor: discounts.percentage_discount_monthly_donor,
            credit_applied: None,
            organisation_revenue_share: event.organisation_revenue_share,
            application_fee_amount: None,
            payment_intent: request.payment_intent,
            session_id: request.session_id,
            transfer_id: None,
            checkout_id: request.checkout_id,
            affiliate,
            opt_in_organisation: request.opt_in_organisation,
            tickets,
            donations,
            status: OrderStatus::Pending,
            payment_completed: false,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        order
            .validate_discounts()
            .map_err(|e| OrderError::InvalidDiscount(e.message))?;

        // Credit balance read, drawn down and written in the same transaction
        let txn = self.storage.begin_write()?;
        let mut organisationship =
            OrderStorage::get_organisationship_txn(&txn, &account.id, &event.organisation_id)?;
        let credit = credit::apply_credit(&mut order, organisationship.as_mut(), self.rates.as_ref())?;

        let (value, fee) = {
            let calc = RevenueCalculator::new(&order, self.rates.as_ref());
            let value = calc.total_rounded()?;
            let fee = match order.revenue_sharer_id {
                Some(_) => Some(calc.application_fee_amount()?.rounded()),
                None => None,
            };
            (value, fee)
        };
        order.value = Some(value.amount());
        order.application_fee_amount = fee.map(|f| f.amount());

        if credit.is_some()
            && let Some(os) = &organisationship
        {
            OrderStorage::store_organisationship_txn(&txn, os)?;
        }
        OrderStorage::insert_order_txn(&txn, &order)?;

        if order.opt_in_organisation {
            for organisation_id in event.opt_in_organisation_ids() {
                if OrderStorage::get_organisationship_txn(&txn, &account.id, organisation_id)?
                    .is_none()
                {
                    OrderStorage::store_organisationship_txn(
                        &txn,
                        &Organisationship::new(account.id.clone(), organisation_id),
                    )?;
                }
            }
        }
        txn.commit().map_err(StorageError::from)?;

        tracing::info!(
            order_id = %order.id,
            event_id = %order.event_id,
            value = %value,
            credit_applied = ?credit.as_ref().map(|c| c.to_string()),
            "Order created"
        );
        self.jobs.enqueue(DeferredJob::InvalidateEventCache {
            event_id: order.event_id.clone(),
        });
        Ok(order)
    }

    /// A co-host slug takes precedence; references to missing records are dropped
    fn resolve_affiliate(
        &self,
        affiliate: Affiliate,
        cohost_slug: Option<&str>,
    ) -> ManagerResult<Affiliate> {
        if let Some(slug) = cohost_slug {
            return Ok(match self.storage.find_organisation_by_slug(slug)? {
                Some(organisation) => Affiliate::Organisation(organisation.id),
                None => {
                    tracing::debug!(slug = %slug, "Unknown co-host slug, no affiliate");
                    Affiliate::None
                }
            });
        }

        let exists = match &affiliate {
            Affiliate::None => true,
            Affiliate::Account(id) => self.storage.get_account(id)?.is_some(),
            Affiliate::Organisation(id) => self.storage.get_organisation(id)?.is_some(),
        };
        if exists {
            Ok(affiliate)
        } else {
            tracing::debug!(affiliate = ?affiliate, "Affiliate not found, dropping");
            Ok(Affiliate::None)
        }
    }

    // ========== Transitions ==========

    /// Mark the order holding `payment_intent` as paid
    ///
    /// Confirming an already paid order is a no-op.
    pub async fn confirm_payment(&self, payment_intent: &str) -> ManagerResult<Order> {
        let order_id = self
            .find_by_payment_intent(payment_intent)?
            .map(|o| o.id)
            .ok_or_else(|| ManagerError::PaymentReferenceNotFound(payment_intent.to_string()))?;
        let _lock = self.lock_order(&order_id).await;

        let txn = self.storage.begin_write()?;
        let mut order = OrderStorage::get_order_txn(&txn, &order_id)?
            .ok_or_else(|| ManagerError::OrderNotFound(order_id.clone()))?;
        if lifecycle::plan(&order, Transition::ConfirmPayment)? != Plan::Apply {
            tracing::debug!(order_id = %order.id, status = %order.status, "Payment already confirmed");
            return Ok(order);
        }
        lifecycle::apply(&mut order, Transition::ConfirmPayment, now_millis());
        OrderStorage::store_order_txn(&txn, &order)?;
        txn.commit().map_err(StorageError::from)?;

        tracing::info!(order_id = %order.id, payment_intent = %payment_intent, "Payment confirmed");
        self.jobs.enqueue(DeferredJob::InvalidateEventCache {
            event_id: order.event_id.clone(),
        });
        self.settle_payment(&mut order, true).await;
        Ok(order)
    }

    /// Soft-delete an order, refunding it when required
    ///
    /// Deleting a deleted order only re-runs the refund check.
    pub async fn delete_order(
        &self,
        order_id: &str,
        prevent_refund: bool,
    ) -> ManagerResult<DeletionReport> {
        let _lock = self.lock_order(order_id).await;

        let txn = self.storage.begin_write()?;
        let mut order = OrderStorage::get_order_txn(&txn, order_id)?
            .ok_or_else(|| ManagerError::OrderNotFound(order_id.to_string()))?;
        match lifecycle::plan(&order, Transition::Delete)? {
            Plan::Apply => {
                lifecycle::apply(&mut order, Transition::Delete, now_millis());
                OrderStorage::release_references_txn(&txn, &order)?;
                OrderStorage::store_order_txn(&txn, &order)?;
                txn.commit().map_err(StorageError::from)?;

                tracing::info!(order_id = %order.id, prevent_refund, "Order deleted");
                self.jobs.enqueue(DeferredJob::InvalidateEventCache {
                    event_id: order.event_id.clone(),
                });
            }
            Plan::RefundCheckOnly | Plan::NoOp => {
                drop(txn);
                tracing::debug!(order_id = %order.id, "Order already deleted, re-running refund check");
            }
        }

        let refund = self.refund_if_required(&order, prevent_refund).await?;
        Ok(DeletionReport { order, refund })
    }

    /// Bring back a deleted order that had completed payment
    ///
    /// Fails if one of its references was claimed by another order meanwhile.
    pub async fn restore_order(&self, order_id: &str) -> ManagerResult<Order> {
        let _lock = self.lock_order(order_id).await;

        let txn = self.storage.begin_write()?;
        let mut order = OrderStorage::get_order_txn(&txn, order_id)?
            .ok_or_else(|| ManagerError::OrderNotFound(order_id.to_string()))?;
        if lifecycle::plan(&order, Transition::Restore)? != Plan::Apply {
            tracing::debug!(order_id = %order.id, status = %order.status, "Order is live, nothing to restore");
            return Ok(order);
        }
        OrderStorage::claim_references_txn(&txn, &order)?;
        lifecycle::apply(&mut order, Transition::Restore, now_millis());
        OrderStorage::store_order_txn(&txn, &order)?;
        txn.commit().map_err(StorageError::from)?;

        tracing::info!(order_id = %order.id, "Order restored");
        self.jobs.enqueue(DeferredJob::InvalidateEventCache {
            event_id: order.event_id.clone(),
        });
        self.settle_payment(&mut order, false).await;
        Ok(order)
    }

    // ========== Gateway follow-ups ==========

    /// Post-payment work; failures are reported, the transition stands
    async fn settle_payment(&self, order: &mut Order, with_transfer: bool) {
        let event = match self.load_event(&order.event_id) {
            Ok(event) => event,
            Err(e) => {
                self.reporter.report("settle_payment", &e);
                return;
            }
        };

        if with_transfer && let Err(e) = self.make_transfer(order, &event).await {
            tracing::warn!(order_id = %order.id, error = %e, "Co-host transfer failed");
            self.reporter.report("make_transfer", &e);
        }
        if let Err(e) = self.update_destination_payment(order, &event).await {
            tracing::warn!(order_id = %order.id, error = %e, "Destination charge update failed");
            self.reporter.report("update_destination_payment", &e);
        }

        self.jobs.enqueue(DeferredJob::DeliverTickets {
            order_id: order.id.clone(),
        });
        if event.send_order_notifications {
            self.jobs.enqueue(DeferredJob::NotifyOrganiser {
                order_id: order.id.clone(),
            });
        }
    }

    /// Pay the co-host their share of the credit the buyer spent
    async fn make_transfer(&self, order: &mut Order, event: &Event) -> ManagerResult<()> {
        if order.transfer_id.is_some() {
            return Ok(());
        }
        let Some(amount) = RevenueCalculator::new(order, self.rates.as_ref())
            .credit_payable_to_revenue_sharer()?
            .map(|m| m.rounded())
            .filter(|m| m.is_positive())
        else {
            return Ok(());
        };

        let destination = self
            .revenue_sharer_organisationship(order, event)?
            .and_then(|os| os.payout_account)
            .map(|payout| payout.user_id)
            .ok_or_else(|| {
                ManagerError::Internal(format!(
                    "revenue sharer of order {} has no payout account",
                    order.id
                ))
            })?;
        let organisation = self.load_organisation(&event.organisation_id)?;
        let gateway = self.organiser_gateway(&organisation)?;

        let transfer = gateway
            .create_transfer(TransferRequest {
                amount: amount.clone(),
                destination,
                metadata: metadata::charge_metadata(order, self.rates.as_ref())?,
            })
            .await?;

        let txn = self.storage.begin_write()?;
        let mut stored = OrderStorage::get_order_txn(&txn, &order.id)?
            .ok_or_else(|| ManagerError::OrderNotFound(order.id.clone()))?;
        OrderStorage::claim_reference_txn(&txn, &order.id, ReferenceKind::Transfer, &transfer.id)?;
        stored.transfer_id = Some(transfer.id.clone());
        stored.updated_at = now_millis();
        OrderStorage::store_order_txn(&txn, &stored)?;
        txn.commit().map_err(StorageError::from)?;

        tracing::info!(order_id = %order.id, transfer_id = %transfer.id, amount = %amount, "Co-host transfer created");
        *order = stored;
        Ok(())
    }

    /// Describe the order on the charge created in the co-host's account
    async fn update_destination_payment(&self, order: &Order, event: &Event) -> ManagerResult<()> {
        if order.application_fee_amount.is_none() {
            return Ok(());
        }
        let Some(payment_intent) = order.payment_intent.as_deref() else {
            return Ok(());
        };
        let Some(payout) = self
            .revenue_sharer_organisationship(order, event)?
            .and_then(|os| os.payout_account)
        else {
            tracing::debug!(order_id = %order.id, "No co-host payout account, skipping charge update");
            return Ok(());
        };

        let organisation = self.load_organisation(&event.organisation_id)?;
        let gateway = self.organiser_gateway(&organisation)?;
        let intent = gateway.retrieve_payment_intent(payment_intent).await?;
        let Some(transfer_id) = intent.first_charge().and_then(|c| c.transfer.clone()) else {
            tracing::debug!(order_id = %order.id, "Charge has no transfer, skipping charge update");
            return Ok(());
        };
        let Some(destination_payment) = gateway.retrieve_transfer(&transfer_id).await?.destination_payment
        else {
            return Ok(());
        };

        let account = self
            .storage
            .get_account(&order.account_id)?
            .ok_or_else(|| ManagerError::AccountNotFound(order.account_id.clone()))?;
        let description = format!("{}: {}", account.name, metadata::description(order, event));
        let charge_metadata = metadata::charge_metadata(order, self.rates.as_ref())?;

        self.connector
            .connect(GatewayAuth::AccessToken(payout.access_token))
            .update_charge(&destination_payment, &description, &charge_metadata)
            .await?;
        tracing::info!(order_id = %order.id, charge_id = %destination_payment, "Destination charge updated");
        Ok(())
    }

    async fn refund_if_required(
        &self,
        order: &Order,
        prevent_refund: bool,
    ) -> ManagerResult<RefundOutcome> {
        let event = self.load_event(&order.event_id)?;
        let organisation = self.storage.get_organisation(&event.organisation_id)?;
        if !lifecycle::refund_required(order, &event, organisation.as_ref(), prevent_refund) {
            return Ok(RefundOutcome::NotRequired);
        }
        let (Some(organisation), Some(payment_intent)) =
            (organisation, order.payment_intent.as_deref())
        else {
            return Ok(RefundOutcome::NotRequired);
        };

        let mode = if self.revenue_sharer_organisationship(order, &event)?.is_some() {
            RefundMode::WithFeeAndTransferReversal
        } else {
            RefundMode::Full
        };
        let gateway = self.organiser_gateway(&organisation)?;

        let result = async {
            let intent = gateway.retrieve_payment_intent(payment_intent).await?;
            let charge = intent.first_charge().ok_or_else(|| {
                GatewayError::Decode(format!("payment intent {payment_intent} has no charges"))
            })?;
            gateway.create_refund(&charge.id, mode).await
        }
        .await;

        Ok(match result {
            Ok(refund) => {
                tracing::info!(order_id = %order.id, refund_id = %refund.id, mode = ?mode, "Order refunded");
                RefundOutcome::Refunded {
                    refund_id: refund.id,
                    mode,
                }
            }
            Err(e) if e.is_invalid_request() => {
                tracing::info!(order_id = %order.id, error = %e, "Charge already refunded");
                RefundOutcome::AlreadySettled
            }
            Err(e) => {
                tracing::error!(order_id = %order.id, error = %e, "Refund failed");
                self.reporter.report("refund", &e);
                RefundOutcome::Failed {
                    error: e.to_string(),
                }
            }
        })
    }
}
