use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::provider::BackendId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountStatus {
    Active,
    Invalid,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Invalid => "invalid",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(AccountStatus::Active),
            "invalid" => Some(AccountStatus::Invalid),
            _ => None,
        }
    }
}

/// A configured backend credential. The API key itself lives in the keyring,
/// addressed by backend and account id, never in this struct or the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub backend: BackendId,
    pub label: String,
    pub api_base_url: Option<String>,
    pub model: String,
    pub enabled: bool,
    pub is_default: bool,
    pub status: AccountStatus,
    pub total_tokens_in: i64,
    pub total_tokens_out: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Base URL to dispatch against, falling back to the backend default.
    pub fn base_url(&self) -> &str {
        self.api_base_url
            .as_deref()
            .unwrap_or_else(|| self.backend.default_base_url())
    }
}
