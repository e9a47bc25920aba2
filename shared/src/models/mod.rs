//! Data models
//!
//! Catalog records (events, organisations, accounts, discount codes) and the
//! order aggregate with its line items. IDs are opaque strings.

pub mod account;
pub mod discount_code;
pub mod donation;
pub mod event;
pub mod order;
pub mod organisation;
pub mod ticket;

// Re-exports
pub use account::*;
pub use discount_code::*;
pub use donation::*;
pub use event::*;
pub use order::*;
pub use organisation::*;
pub use ticket::*;
