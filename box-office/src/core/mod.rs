//! Core module - configuration, startup and background tasks

pub mod config;
pub mod state;
pub mod tasks;

pub use config::Config;
pub use state::{BoxOffice, Collaborators, StartupError};
pub use tasks::{BackgroundTasks, TaskKind};
