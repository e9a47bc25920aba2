//! Order lifecycle state machine
//!
//! ```text
//!            confirm_payment             delete                 restore
//!  Pending ──────────────────► PaymentCompleted ─────► Deleted ─────────► Restored
//!     │                                                  ▲  │               │
//!     └──────────────── delete ─────────────────────────┘  └─ delete ◄────┘
//! ```
//!
//! [`plan`] decides what a trigger means for an order in a given state and
//! [`apply`] performs the in-memory state change, cascading flags to the
//! order's tickets and donations. Side effects (gateway calls, deferred
//! jobs) are driven by the order manager from the returned [`Plan`].

use super::error::{OrderError, OrderResult};
use rust_decimal::Decimal;
use shared::models::{Event, Order, OrderStatus, Organisation};

/// External trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    ConfirmPayment,
    Delete,
    Restore,
}

impl Transition {
    fn action(&self) -> &'static str {
        match self {
            Transition::ConfirmPayment => "confirm payment for",
            Transition::Delete => "delete",
            Transition::Restore => "restore",
        }
    }
}

/// What a transition should do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    /// Change state and run the transition's side effects
    Apply,
    /// Already in the target state; nothing to do
    NoOp,
    /// Deleting a deleted order: only re-run the refund check
    RefundCheckOnly,
}

pub fn plan(order: &Order, transition: Transition) -> OrderResult<Plan> {
    let invalid = || OrderError::InvalidTransition {
        order_id: order.id.clone(),
        status: order.status,
        action: transition.action(),
    };

    match (transition, order.status) {
        (Transition::ConfirmPayment, OrderStatus::Pending) => Ok(Plan::Apply),
        (Transition::ConfirmPayment, OrderStatus::PaymentCompleted | OrderStatus::Restored) => {
            Ok(Plan::NoOp)
        }
        (Transition::ConfirmPayment, OrderStatus::Deleted) => Err(invalid()),

        (Transition::Delete, OrderStatus::Deleted) => Ok(Plan::RefundCheckOnly),
        (Transition::Delete, _) => Ok(Plan::Apply),

        (Transition::Restore, OrderStatus::Deleted) if order.payment_completed => Ok(Plan::Apply),
        (Transition::Restore, OrderStatus::Deleted) => {
            Err(OrderError::NotRestorable(order.id.clone()))
        }
        (Transition::Restore, OrderStatus::PaymentCompleted | OrderStatus::Restored) => {
            Ok(Plan::NoOp)
        }
        (Transition::Restore, OrderStatus::Pending) => Err(invalid()),
    }
}

/// Apply a planned transition in memory
///
/// `now` is a millisecond timestamp.
pub fn apply(order: &mut Order, transition: Transition, now: i64) {
    match transition {
        Transition::ConfirmPayment => {
            order.status = OrderStatus::PaymentCompleted;
            mark_payment_completed(order);
        }
        Transition::Delete => {
            order.status = OrderStatus::Deleted;
            order.deleted_at = Some(now);
            for ticket in order.tickets.iter_mut().filter(|t| t.is_live()) {
                ticket.deleted_at = Some(now);
            }
            for donation in order.donations.iter_mut().filter(|d| d.is_live()) {
                donation.deleted_at = Some(now);
            }
        }
        Transition::Restore => {
            order.status = OrderStatus::Restored;
            order.deleted_at = None;
            for ticket in order.tickets.iter_mut() {
                ticket.deleted_at = None;
            }
            for donation in order.donations.iter_mut() {
                donation.deleted_at = None;
            }
            mark_payment_completed(order);
        }
    }
    order.updated_at = now;
}

fn mark_payment_completed(order: &mut Order) {
    order.payment_completed = true;
    for ticket in order.tickets.iter_mut() {
        ticket.payment_completed = true;
    }
    for donation in order.donations.iter_mut() {
        donation.payment_completed = true;
    }
}

/// Whether deleting `order` must refund its payment
///
/// All of: the event refunds deleted orders, the caller did not prevent it,
/// the organiser has payment processing configured, the order has a positive
/// value, completed payment, and a payment reference.
pub fn refund_required(
    order: &Order,
    event: &Event,
    organisation: Option<&Organisation>,
    prevent_refund: bool,
) -> bool {
    event.refund_deleted_orders
        && !prevent_refund
        && organisation.is_some_and(|o| o.payment_processing_configured())
        && order.value.is_some_and(|v| v > Decimal::ZERO)
        && order.payment_completed
        && order.payment_intent.is_some()
}
