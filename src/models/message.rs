use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::provider::ModelId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

/// One persisted chat message. Assistant messages carry the model tag that
/// produced them; user messages leave it unset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub role: Role,
    pub content: String,
    pub model: Option<ModelId>,
    pub tokens_in: Option<i64>,
    pub tokens_out: Option<i64>,
    pub created_at: DateTime<Utc>,
}
