//! Account Model

use serde::{Deserialize, Serialize};

/// Purchasing (or co-hosting) account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
}
