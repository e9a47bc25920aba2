//! Box Office - order money and lifecycle engine for event tickets and donations
//!
//! # Overview
//!
//! - **Orders** (`orders`): line items, discounts, organiser credit, revenue
//!   splits and the order status lifecycle, persisted in redb
//! - **Gateway** (`gateway`): payment processor adapter (transfers, charge
//!   updates, refunds, signed webhooks)
//! - **Deferred jobs** (`deferred`): ticket delivery, organiser notification
//!   and aggregate invalidation, retried off the request path
//! - **Triggers** (`triggers`): JSON-line inbound trigger dispatch
//!
//! # Module Structure
//!
//! ```text
//! box-office/src/
//! ├── core/       # Config, startup, background tasks
//! ├── orders/     # Order engine and storage
//! ├── gateway/    # Payment gateway adapter
//! ├── deferred/   # Deferred job queue and worker
//! ├── triggers.rs # Inbound trigger dispatch
//! └── utils/      # Logging
//! ```

pub mod core;
pub mod deferred;
pub mod gateway;
pub mod orders;
pub mod triggers;
pub mod utils;

pub use core::{BoxOffice, Collaborators, Config, StartupError};
pub use orders::{CreateOrderRequest, DeletionReport, OrdersManager, OrderStorage, RefundOutcome};
pub use triggers::InboundTrigger;
pub use utils::{init_logger, init_logger_with_file};

pub use shared::{AppError, AppResult, ErrorCategory, ErrorCode};

/// Load `.env`, read configuration and initialize logging
pub fn setup_environment() -> Config {
    dotenv::dotenv().ok();

    let config = Config::from_env();
    if let Some(dir) = config.log_dir.as_deref()
        && let Err(e) = std::fs::create_dir_all(dir)
    {
        eprintln!("Failed to create log directory {dir}: {e}");
    }
    init_logger_with_file(
        Some(&config.log_level),
        Some(config.log_json),
        config.log_dir.as_deref(),
    );
    config
}
