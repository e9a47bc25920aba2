//! Orders module - order money and lifecycle
//!
//! # Module Structure
//!
//! ```text
//! orders/
//! ├── validation.rs  # Line item construction
//! ├── discount.rs    # Discount resolution
//! ├── credit.rs      # Organiser credit application
//! ├── revenue.rs     # Value, revenue splits, application fee
//! ├── lifecycle.rs   # Status transitions
//! ├── metadata.rs    # Gateway charge metadata and descriptions
//! ├── aggregates.rs  # Per-event totals cache
//! ├── storage.rs     # redb persistence
//! ├── error.rs       # Order errors
//! └── manager/       # OrdersManager
//! ```

pub mod aggregates;
pub mod credit;
pub mod discount;
pub mod error;
pub mod lifecycle;
pub mod manager;
pub mod metadata;
pub mod revenue;
pub mod storage;
pub mod validation;

pub use aggregates::{AggregateCache, EventAggregates};
pub use error::{OrderError, OrderResult};
pub use manager::{
    CreateOrderRequest, DeletionReport, ManagerError, ManagerResult, OrdersManager, RefundOutcome,
};
pub use storage::{OrderStorage, StorageError};
