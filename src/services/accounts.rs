use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use url::Url;
use uuid::Uuid;

use crate::models::{Account, AccountStatus, BackendId};
use crate::providers::types::ModelInfo;
use crate::providers::Dispatcher;
use crate::services::database::Database;
use crate::services::keyring::KeyringService;

pub struct AccountService {
    db: Database,
    keyring: KeyringService,
    dispatcher: Arc<Dispatcher>,
}

impl AccountService {
    pub fn new(db: Database, keyring: KeyringService, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            db,
            keyring,
            dispatcher,
        }
    }

    pub async fn add_account(
        &self,
        backend: BackendId,
        label: String,
        api_key: String,
        base_url: Option<String>,
        model: Option<String>,
        set_as_default: bool,
    ) -> Result<Account> {
        if let Some(ref custom) = base_url {
            Url::parse(custom).with_context(|| format!("Invalid base URL: {}", custom))?;
        }

        let effective_base = base_url
            .as_deref()
            .unwrap_or_else(|| backend.default_base_url());

        // Validate the key against the live backend before anything is saved.
        self.dispatcher
            .validate_credentials(&backend, &api_key, effective_base)
            .await
            .context("Failed to validate credentials")?;

        let now = Utc::now();
        let account_id = Uuid::new_v4().to_string();
        self.keyring.store(backend, &account_id, &api_key).await?;

        let account = Account {
            id: account_id,
            backend,
            label,
            api_base_url: base_url,
            model: model.unwrap_or_else(|| backend.default_model().to_string()),
            enabled: true,
            is_default: set_as_default,
            status: AccountStatus::Active,
            total_tokens_in: 0,
            total_tokens_out: 0,
            created_at: now,
            updated_at: now,
        };

        self.db
            .insert_account(&account)
            .await
            .context("Failed to save account to database")?;

        if set_as_default {
            self.db
                .set_default_account(&account.id, backend)
                .await
                .context("Failed to set account as default")?;
        }

        Ok(account)
    }

    pub async fn list_accounts(&self) -> Result<Vec<Account>> {
        self.db.list_accounts().await
    }

    /// Resolve the account and API key that should serve a backend.
    pub async fn resolve_for_backend(&self, backend: BackendId) -> Result<(Account, String)> {
        let account = self
            .db
            .account_for_backend(backend)
            .await?
            .with_context(|| {
                format!(
                    "No enabled {} account configured",
                    backend.display_name()
                )
            })?;

        let api_key = self
            .keyring
            .retrieve(account.backend, &account.id)
            .await?
            .context("API key not found in keyring")?;

        Ok((account, api_key))
    }

    /// Ask the backend which models the configured account can use.
    pub async fn list_models(&self, backend: BackendId) -> Result<Vec<ModelInfo>> {
        let (account, api_key) = self.resolve_for_backend(backend).await?;
        self.dispatcher
            .validate_credentials(&backend, &api_key, account.base_url())
            .await
            .context("Failed to list models")
    }

    pub async fn delete_account(&self, account_id: &str) -> Result<()> {
        let account = self
            .db
            .get_account(account_id)
            .await?
            .context("Account not found")?;

        // Delete from keyring (ignore errors if key doesn't exist)
        let _ = self.keyring.delete(account.backend, &account.id).await;

        self.db
            .delete_account(account_id)
            .await
            .context("Failed to delete account from database")?;

        Ok(())
    }

    pub async fn set_enabled(&self, account_id: &str, enabled: bool) -> Result<()> {
        self.db.set_account_enabled(account_id, enabled).await
    }

    /// Mark an account's credentials as rejected by the backend.
    pub async fn mark_invalid(&self, account_id: &str) -> Result<()> {
        self.db
            .set_account_status(account_id, AccountStatus::Invalid)
            .await
    }
}
