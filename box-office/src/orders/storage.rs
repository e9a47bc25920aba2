//! redb-based storage for orders and the catalog they reference
//!
//! # Tables
//!
//! | Table | Key | Value | Purpose |
//! |-------|-----|-------|---------|
//! | `orders` | `order_id` | `Order` | Order aggregates (with line items) |
//! | `idx_payment_intent` | reference | `order_id` | Unique among live orders |
//! | `idx_session` | reference | `order_id` | Unique among live orders |
//! | `idx_transfer` | reference | `order_id` | Unique among live orders |
//! | `idx_checkout` | reference | `order_id` | Unique among live orders |
//! | `event_orders` | `event_id` | `Vec<String>` | Orders per event |
//! | `events` | `event_id` | `Event` | |
//! | `organisations` | `organisation_id` | `Organisation` | |
//! | `idx_organisation_slug` | slug | `organisation_id` | Co-host slug lookup |
//! | `accounts` | `account_id` | `Account` | |
//! | `organisationships` | `account:organisation` | `Organisationship` | Credit, donor status, payouts |
//! | `discount_codes` | `discount_code_id` | `DiscountCode` | |
//! | `idx_discount_code` | upper-cased code | `discount_code_id` | |
//!
//! Values are JSON. Reference indexes only ever point at live orders: a
//! deleted order releases its references and re-claims them on restore.
//!
//! # Concurrency
//!
//! redb serialises write transactions. Anything that must read and then write
//! atomically (credit balances, reference claims) happens inside one
//! [`WriteTransaction`] obtained from [`OrderStorage::begin_write`].

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction};
use serde::Serialize;
use serde::de::DeserializeOwned;
use shared::models::{
    Account, DiscountCode, Event, Order, Organisation, Organisationship, ReferenceKind,
};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

type JsonTable = TableDefinition<'static, &'static str, &'static [u8]>;
type IndexTable = TableDefinition<'static, &'static str, &'static str>;

const ORDERS_TABLE: JsonTable = TableDefinition::new("orders");
const PAYMENT_INTENT_INDEX: IndexTable = TableDefinition::new("idx_payment_intent");
const SESSION_INDEX: IndexTable = TableDefinition::new("idx_session");
const TRANSFER_INDEX: IndexTable = TableDefinition::new("idx_transfer");
const CHECKOUT_INDEX: IndexTable = TableDefinition::new("idx_checkout");
const EVENT_ORDERS_TABLE: JsonTable = TableDefinition::new("event_orders");

const EVENTS_TABLE: JsonTable = TableDefinition::new("events");
const ORGANISATIONS_TABLE: JsonTable = TableDefinition::new("organisations");
const ORGANISATION_SLUG_INDEX: IndexTable = TableDefinition::new("idx_organisation_slug");
const ACCOUNTS_TABLE: JsonTable = TableDefinition::new("accounts");
const ORGANISATIONSHIPS_TABLE: JsonTable = TableDefinition::new("organisationships");
const DISCOUNT_CODES_TABLE: JsonTable = TableDefinition::new("discount_codes");
const DISCOUNT_CODE_INDEX: IndexTable = TableDefinition::new("idx_discount_code");

fn reference_index(kind: ReferenceKind) -> IndexTable {
    match kind {
        ReferenceKind::PaymentIntent => PAYMENT_INTENT_INDEX,
        ReferenceKind::Session => SESSION_INDEX,
        ReferenceKind::Transfer => TRANSFER_INDEX,
        ReferenceKind::Checkout => CHECKOUT_INDEX,
    }
}

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Order already exists: {0}")]
    OrderExists(String),

    #[error("{field} {reference} is already used by order {order_id}")]
    DuplicateReference {
        field: &'static str,
        reference: String,
        order_id: String,
    },
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Order storage backed by redb
#[derive(Clone)]
pub struct OrderStorage {
    db: Arc<Database>,
}

impl OrderStorage {
    /// Open or create the database at the given path
    ///
    /// Commits are durable once `commit()` returns (redb's default
    /// `Durability::Immediate`).
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let db = Database::create(path)?;
        Self::init(db)
    }

    /// Open an in-memory database (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> StorageResult<Self> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        Self::init(db)
    }

    fn init(db: Database) -> StorageResult<Self> {
        let write_txn = db.begin_write()?;
        {
            for table in [
                ORDERS_TABLE,
                EVENT_ORDERS_TABLE,
                EVENTS_TABLE,
                ORGANISATIONS_TABLE,
                ACCOUNTS_TABLE,
                ORGANISATIONSHIPS_TABLE,
                DISCOUNT_CODES_TABLE,
            ] {
                let _ = write_txn.open_table(table)?;
            }
            for index in [
                PAYMENT_INTENT_INDEX,
                SESSION_INDEX,
                TRANSFER_INDEX,
                CHECKOUT_INDEX,
                ORGANISATION_SLUG_INDEX,
                DISCOUNT_CODE_INDEX,
            ] {
                let _ = write_txn.open_table(index)?;
            }
        }
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Begin a write transaction
    pub fn begin_write(&self) -> StorageResult<WriteTransaction> {
        Ok(self.db.begin_write()?)
    }

    // ========== JSON helpers ==========

    fn read_json<T: DeserializeOwned>(&self, def: JsonTable, key: &str) -> StorageResult<Option<T>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(def)?;
        match table.get(key)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    fn read_json_txn<T: DeserializeOwned>(
        txn: &WriteTransaction,
        def: JsonTable,
        key: &str,
    ) -> StorageResult<Option<T>> {
        let table = txn.open_table(def)?;
        match table.get(key)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    fn write_json_txn<T: Serialize>(
        txn: &WriteTransaction,
        def: JsonTable,
        key: &str,
        value: &T,
    ) -> StorageResult<()> {
        let bytes = serde_json::to_vec(value)?;
        let mut table = txn.open_table(def)?;
        table.insert(key, bytes.as_slice())?;
        Ok(())
    }

    fn read_index(&self, def: IndexTable, key: &str) -> StorageResult<Option<String>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(def)?;
        Ok(table.get(key)?.map(|guard| guard.value().to_string()))
    }

    fn write_index_txn(txn: &WriteTransaction, def: IndexTable, key: &str, value: &str) -> StorageResult<()> {
        let mut table = txn.open_table(def)?;
        table.insert(key, value)?;
        Ok(())
    }

    // ========== Catalog ==========

    pub fn store_event(&self, event: &Event) -> StorageResult<()> {
        let txn = self.begin_write()?;
        Self::write_json_txn(&txn, EVENTS_TABLE, &event.id, event)?;
        txn.commit()?;
        Ok(())
    }

    pub fn get_event(&self, event_id: &str) -> StorageResult<Option<Event>> {
        self.read_json(EVENTS_TABLE, event_id)
    }

    pub fn store_organisation(&self, organisation: &Organisation) -> StorageResult<()> {
        let txn = self.begin_write()?;
        Self::write_json_txn(&txn, ORGANISATIONS_TABLE, &organisation.id, organisation)?;
        Self::write_index_txn(&txn, ORGANISATION_SLUG_INDEX, &organisation.slug, &organisation.id)?;
        txn.commit()?;
        Ok(())
    }

    pub fn get_organisation(&self, organisation_id: &str) -> StorageResult<Option<Organisation>> {
        self.read_json(ORGANISATIONS_TABLE, organisation_id)
    }

    pub fn find_organisation_by_slug(&self, slug: &str) -> StorageResult<Option<Organisation>> {
        match self.read_index(ORGANISATION_SLUG_INDEX, slug)? {
            Some(id) => self.get_organisation(&id),
            None => Ok(None),
        }
    }

    pub fn store_account(&self, account: &Account) -> StorageResult<()> {
        let txn = self.begin_write()?;
        Self::write_json_txn(&txn, ACCOUNTS_TABLE, &account.id, account)?;
        txn.commit()?;
        Ok(())
    }

    pub fn get_account(&self, account_id: &str) -> StorageResult<Option<Account>> {
        self.read_json(ACCOUNTS_TABLE, account_id)
    }

    pub fn store_organisationship(&self, organisationship: &Organisationship) -> StorageResult<()> {
        let txn = self.begin_write()?;
        Self::store_organisationship_txn(&txn, organisationship)?;
        txn.commit()?;
        Ok(())
    }

    pub fn store_organisationship_txn(
        txn: &WriteTransaction,
        organisationship: &Organisationship,
    ) -> StorageResult<()> {
        Self::write_json_txn(txn, ORGANISATIONSHIPS_TABLE, &organisationship.key(), organisationship)
    }

    pub fn get_organisationship(
        &self,
        account_id: &str,
        organisation_id: &str,
    ) -> StorageResult<Option<Organisationship>> {
        self.read_json(
            ORGANISATIONSHIPS_TABLE,
            &Organisationship::key_for(account_id, organisation_id),
        )
    }

    pub fn get_organisationship_txn(
        txn: &WriteTransaction,
        account_id: &str,
        organisation_id: &str,
    ) -> StorageResult<Option<Organisationship>> {
        Self::read_json_txn(
            txn,
            ORGANISATIONSHIPS_TABLE,
            &Organisationship::key_for(account_id, organisation_id),
        )
    }

    pub fn store_discount_code(&self, code: &DiscountCode) -> StorageResult<()> {
        let txn = self.begin_write()?;
        Self::write_json_txn(&txn, DISCOUNT_CODES_TABLE, &code.id, code)?;
        Self::write_index_txn(&txn, DISCOUNT_CODE_INDEX, &code.code.to_uppercase(), &code.id)?;
        txn.commit()?;
        Ok(())
    }

    pub fn get_discount_code(&self, id: &str) -> StorageResult<Option<DiscountCode>> {
        self.read_json(DISCOUNT_CODES_TABLE, id)
    }

    /// Case-insensitive lookup by code string
    pub fn find_discount_code(&self, code: &str) -> StorageResult<Option<DiscountCode>> {
        match self.read_index(DISCOUNT_CODE_INDEX, &code.trim().to_uppercase())? {
            Some(id) => self.get_discount_code(&id),
            None => Ok(None),
        }
    }

    // ========== Orders ==========

    pub fn get_order(&self, order_id: &str) -> StorageResult<Option<Order>> {
        self.read_json(ORDERS_TABLE, order_id)
    }

    pub fn get_order_txn(txn: &WriteTransaction, order_id: &str) -> StorageResult<Option<Order>> {
        Self::read_json_txn(txn, ORDERS_TABLE, order_id)
    }

    /// Overwrite an order (indexes untouched)
    pub fn store_order_txn(txn: &WriteTransaction, order: &Order) -> StorageResult<()> {
        Self::write_json_txn(txn, ORDERS_TABLE, &order.id, order)
    }

    /// Insert a new order, claiming its references and listing it under its event
    pub fn insert_order_txn(txn: &WriteTransaction, order: &Order) -> StorageResult<()> {
        if Self::get_order_txn(txn, &order.id)?.is_some() {
            return Err(StorageError::OrderExists(order.id.clone()));
        }
        Self::claim_references_txn(txn, order)?;
        Self::store_order_txn(txn, order)?;

        let mut ids: Vec<String> =
            Self::read_json_txn(txn, EVENT_ORDERS_TABLE, &order.event_id)?.unwrap_or_default();
        ids.push(order.id.clone());
        Self::write_json_txn(txn, EVENT_ORDERS_TABLE, &order.event_id, &ids)
    }

    /// Claim every reference the order carries
    ///
    /// Fails if a reference is held by another (live) order. The caller drops
    /// the transaction on error, so nothing is partially claimed.
    pub fn claim_references_txn(txn: &WriteTransaction, order: &Order) -> StorageResult<()> {
        for (kind, reference) in order.references() {
            Self::claim_reference_txn(txn, &order.id, kind, reference)?;
        }
        Ok(())
    }

    pub fn claim_reference_txn(
        txn: &WriteTransaction,
        order_id: &str,
        kind: ReferenceKind,
        reference: &str,
    ) -> StorageResult<()> {
        let mut table = txn.open_table(reference_index(kind))?;
        let holder = table.get(reference)?.map(|guard| guard.value().to_string());
        if let Some(holder) = holder
            && holder != order_id
        {
            return Err(StorageError::DuplicateReference {
                field: kind.field_name(),
                reference: reference.to_string(),
                order_id: holder,
            });
        }
        table.insert(reference, order_id)?;
        Ok(())
    }

    /// Release references held by this order
    pub fn release_references_txn(txn: &WriteTransaction, order: &Order) -> StorageResult<()> {
        for (kind, reference) in order.references() {
            let mut table = txn.open_table(reference_index(kind))?;
            let held = table
                .get(reference)?
                .is_some_and(|guard| guard.value() == order.id);
            if held {
                table.remove(reference)?;
            }
        }
        Ok(())
    }

    /// Live order holding a reference
    pub fn find_order_by_reference(
        &self,
        kind: ReferenceKind,
        reference: &str,
    ) -> StorageResult<Option<Order>> {
        match self.read_index(reference_index(kind), reference)? {
            Some(order_id) => self.get_order(&order_id),
            None => Ok(None),
        }
    }

    /// All orders of an event, including deleted ones
    pub fn orders_for_event(&self, event_id: &str) -> StorageResult<Vec<Order>> {
        let ids: Vec<String> = self.read_json(EVENT_ORDERS_TABLE, event_id)?.unwrap_or_default();
        let mut orders = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(order) = self.get_order(&id)? {
                orders.push(order);
            }
        }
        Ok(orders)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::Currency;
    use shared::models::{Affiliate, OrderStatus};

    fn order(id: &str, payment_intent: Option<&str>) -> Order {
        Order {
            id: id.into(),
            event_id: "ev-1".into(),
            account_id: "acc-1".into(),
            revenue_sharer_id: None,
            discount_code_id: None,
            currency: Currency::parse("GBP").unwrap(),
            value: None,
            percentage_discount: None,
            percentage_discount_monthly_donor: None,
            credit_applied: None,
            organisation_revenue_share: None,
            application_fee_amount: None,
            payment_intent: payment_intent.map(String::from),
            session_id: Some(format!("cs_{id}")),
            transfer_id: None,
            checkout_id: None,
            affiliate: Affiliate::None,
            opt_in_organisation: false,
            tickets: vec![],
            donations: vec![],
            status: OrderStatus::Pending,
            payment_completed: false,
            created_at: 0,
            updated_at: 0,
            deleted_at: None,
        }
    }

    fn insert(storage: &OrderStorage, order: &Order) -> StorageResult<()> {
        let txn = storage.begin_write()?;
        OrderStorage::insert_order_txn(&txn, order)?;
        txn.commit()?;
        Ok(())
    }

    #[test]
    fn test_insert_and_lookup_by_reference() {
        let storage = OrderStorage::open_in_memory().unwrap();
        insert(&storage, &order("o-1", Some("pi_1"))).unwrap();

        let found = storage
            .find_order_by_reference(ReferenceKind::PaymentIntent, "pi_1")
            .unwrap()
            .unwrap();
        assert_eq!(found.id, "o-1");
        assert!(storage
            .find_order_by_reference(ReferenceKind::Session, "cs_o-1")
            .unwrap()
            .is_some());
        assert_eq!(storage.orders_for_event("ev-1").unwrap().len(), 1);
    }

    #[test]
    fn test_duplicate_reference_rejected_atomically() {
        let storage = OrderStorage::open_in_memory().unwrap();
        insert(&storage, &order("o-1", Some("pi_1"))).unwrap();

        let err = insert(&storage, &order("o-2", Some("pi_1"))).unwrap_err();
        assert!(matches!(
            err,
            StorageError::DuplicateReference { field: "payment_intent", ref order_id, .. } if order_id == "o-1"
        ));
        // Nothing from the failed insert is visible
        assert!(storage.get_order("o-2").unwrap().is_none());
        assert!(storage
            .find_order_by_reference(ReferenceKind::Session, "cs_o-2")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_reinsert_same_id_rejected() {
        let storage = OrderStorage::open_in_memory().unwrap();
        insert(&storage, &order("o-1", None)).unwrap();
        assert!(matches!(
            insert(&storage, &order("o-1", None)),
            Err(StorageError::OrderExists(_))
        ));
    }

    #[test]
    fn test_release_then_reclaim() {
        let storage = OrderStorage::open_in_memory().unwrap();
        let o1 = order("o-1", Some("pi_1"));
        insert(&storage, &o1).unwrap();

        let txn = storage.begin_write().unwrap();
        OrderStorage::release_references_txn(&txn, &o1).unwrap();
        txn.commit().unwrap();
        assert!(storage
            .find_order_by_reference(ReferenceKind::PaymentIntent, "pi_1")
            .unwrap()
            .is_none());

        // Another order may now take the reference
        insert(&storage, &order("o-2", Some("pi_1"))).unwrap();

        // ...which blocks the first from re-claiming it
        let txn = storage.begin_write().unwrap();
        assert!(OrderStorage::claim_references_txn(&txn, &o1).is_err());
    }

    #[test]
    fn test_catalog_lookups() {
        let storage = OrderStorage::open_in_memory().unwrap();
        storage
            .store_organisation(&Organisation {
                id: "org-1".into(),
                slug: "river-arts".into(),
                name: "River Arts".into(),
                gateway: None,
            })
            .unwrap();
        assert_eq!(
            storage.find_organisation_by_slug("river-arts").unwrap().unwrap().id,
            "org-1"
        );
        assert!(storage.find_organisation_by_slug("nope").unwrap().is_none());

        let code = DiscountCode::new(
            "dc-1",
            "Spring10",
            rust_decimal::Decimal::from(10),
            Default::default(),
        )
        .unwrap();
        storage.store_discount_code(&code).unwrap();
        assert_eq!(storage.find_discount_code("spring10").unwrap().unwrap().id, "dc-1");

        let mut os = Organisationship::new("acc-1", "org-1");
        os.monthly_donor = true;
        storage.store_organisationship(&os).unwrap();
        assert!(storage
            .get_organisationship("acc-1", "org-1")
            .unwrap()
            .unwrap()
            .monthly_donor);
    }
}
