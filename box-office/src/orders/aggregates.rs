//! Per-event sales aggregates
//!
//! Recomputed from stored orders on demand and cached until an order of the
//! event changes (the deferred `InvalidateEventCache` job drops the entry).

use dashmap::DashMap;
use serde::Serialize;
use shared::models::{Event, Order};
use shared::{ExchangeRates, Money};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventAggregates {
    pub event_id: String,
    pub completed_orders: usize,
    pub tickets_sold: usize,
    pub donations: usize,
    /// Sum of completed order values, in the event currency
    pub total_value: Money,
    pub computed_at: i64,
}

/// Summarise the completed orders of an event
///
/// Orders whose value cannot be converted into the event currency are
/// counted but left out of the total.
pub fn compute(event: &Event, orders: &[Order], rates: &dyn ExchangeRates) -> EventAggregates {
    let mut aggregates = EventAggregates {
        event_id: event.id.clone(),
        completed_orders: 0,
        tickets_sold: 0,
        donations: 0,
        total_value: Money::zero(event.currency.clone()),
        computed_at: shared::util::now_millis(),
    };

    for order in orders.iter().filter(|o| o.status.is_complete()) {
        aggregates.completed_orders += 1;
        aggregates.tickets_sold += order.live_tickets().count();
        aggregates.donations += order.live_donations().count();

        let Some(value) = order.value else { continue };
        let converted = Money::new(value, order.currency.clone())
            .exchange_to(&event.currency, rates)
            .and_then(|v| aggregates.total_value.checked_add(&v));
        match converted {
            Ok(total) => aggregates.total_value = total,
            Err(e) => {
                tracing::warn!(order_id = %order.id, event_id = %event.id, error = %e, "Order value left out of event total");
            }
        }
    }

    aggregates.total_value = aggregates.total_value.rounded();
    aggregates
}

/// Shared cache of [`EventAggregates`] keyed by event id
#[derive(Clone, Default)]
pub struct AggregateCache {
    entries: Arc<DashMap<String, EventAggregates>>,
}

impl AggregateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, event_id: &str) -> Option<EventAggregates> {
        self.entries.get(event_id).map(|entry| entry.value().clone())
    }

    pub fn insert(&self, aggregates: EventAggregates) {
        self.entries.insert(aggregates.event_id.clone(), aggregates);
    }

    /// Returns whether an entry was dropped
    pub fn invalidate(&self, event_id: &str) -> bool {
        self.entries.remove(event_id).is_some()
    }

    /// Drop entries computed before `cutoff_millis`, returning how many went
    pub fn evict_older_than(&self, cutoff_millis: i64) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, aggregates| aggregates.computed_at >= cutoff_millis);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
