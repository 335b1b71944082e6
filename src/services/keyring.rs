use std::sync::Arc;

use anyhow::{Context, Result};
use oo7::Keyring;

use crate::config::APP_ID;
use crate::models::BackendId;

const ATTR_APPLICATION: &str = "application";
const ATTR_ACCOUNT: &str = "key-ref";

/// API keys live in the Secret Service, never in the database. Entries are
/// addressed by the backend tag plus the owning account id.
#[derive(Debug, Clone)]
pub struct KeyringService {
    keyring: Arc<Keyring>,
}

impl KeyringService {
    pub async fn new() -> Result<Self> {
        let keyring = Keyring::new()
            .await
            .context("Failed to initialize keyring")?;
        Ok(Self {
            keyring: Arc::new(keyring),
        })
    }

    pub async fn store(&self, backend: BackendId, account_id: &str, secret: &str) -> Result<()> {
        let entry = Self::entry_ref(backend, account_id);
        let label = format!("{} API key ({})", backend.display_name(), account_id);
        self.keyring
            .create_item(&label, &Self::attributes(&entry), secret, true)
            .await
            .with_context(|| format!("Failed to store {} API key in keyring", backend.as_str()))?;
        Ok(())
    }

    pub async fn retrieve(&self, backend: BackendId, account_id: &str) -> Result<Option<String>> {
        let entry = Self::entry_ref(backend, account_id);
        let items = self
            .keyring
            .search_items(&Self::attributes(&entry))
            .await
            .context("Failed to search keyring")?;

        let Some(item) = items.first() else {
            return Ok(None);
        };
        let secret = item.secret().await.context("Failed to read secret")?;
        let secret = String::from_utf8(secret.to_vec()).context("Secret is not valid UTF-8")?;
        Ok(Some(secret))
    }

    pub async fn delete(&self, backend: BackendId, account_id: &str) -> Result<()> {
        let entry = Self::entry_ref(backend, account_id);
        self.keyring
            .delete(&Self::attributes(&entry))
            .await
            .with_context(|| {
                format!("Failed to delete {} API key from keyring", backend.as_str())
            })?;
        Ok(())
    }

    fn entry_ref(backend: BackendId, account_id: &str) -> String {
        format!("{}:{}", backend.as_str(), account_id)
    }

    fn attributes<'a>(entry: &'a str) -> Vec<(&'a str, &'a str)> {
        vec![(ATTR_APPLICATION, APP_ID), (ATTR_ACCOUNT, entry)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_ref_combines_backend_and_account() {
        assert_eq!(
            KeyringService::entry_ref(BackendId::Anthropic, "abc-123"),
            "anthropic:abc-123"
        );
        assert_eq!(
            KeyringService::entry_ref(BackendId::OpenRouter, "x"),
            "openrouter:x"
        );
    }
}
