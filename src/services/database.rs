use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::task;

use crate::config::APP_NAME;
use crate::models::{Account, AccountStatus, BackendId, Conversation, Message, ModelId, Role};

#[derive(Debug, Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub async fn new() -> Result<Self> {
        let path = Self::db_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create data directory: {}", parent.display()))?;
        }

        let conn = Connection::open(&path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;

        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;

        Ok(db)
    }

    /// Create an in-memory database (used for testing)
    pub fn new_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn db_path() -> Result<PathBuf> {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").expect("HOME not set");
                PathBuf::from(home).join(".local/share")
            });
        Ok(data_dir.join(APP_NAME).join(format!("{}.db", APP_NAME)))
    }

    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER NOT NULL
            );",
        )?;

        let version: i32 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM schema_version",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        if version < 1 {
            conn.execute_batch(
                "CREATE TABLE accounts (
                    id TEXT PRIMARY KEY,
                    backend TEXT NOT NULL,
                    label TEXT NOT NULL,
                    api_base_url TEXT,
                    model TEXT NOT NULL,
                    enabled INTEGER NOT NULL DEFAULT 1,
                    is_default INTEGER NOT NULL DEFAULT 0,
                    status TEXT NOT NULL DEFAULT 'active',
                    total_tokens_in BIGINT NOT NULL DEFAULT 0,
                    total_tokens_out BIGINT NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE conversations (
                    id TEXT PRIMARY KEY,
                    title TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE messages (
                    id TEXT PRIMARY KEY,
                    conversation_id TEXT NOT NULL,
                    role TEXT NOT NULL,
                    content TEXT NOT NULL,
                    model TEXT,
                    tokens_in BIGINT,
                    tokens_out BIGINT,
                    created_at TEXT NOT NULL,
                    FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
                );

                CREATE TABLE settings (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                );

                CREATE INDEX idx_accounts_backend ON accounts(backend);
                CREATE INDEX idx_conversations_updated ON conversations(updated_at DESC);
                CREATE INDEX idx_messages_conversation ON messages(conversation_id);
                CREATE INDEX idx_messages_created ON messages(created_at);

                INSERT INTO schema_version (version) VALUES (1);",
            )?;
        }

        Ok(())
    }

    // --- Account CRUD ---

    pub async fn insert_account(&self, account: &Account) -> Result<()> {
        let conn = self.conn.clone();
        let account = account.clone();
        task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            conn.execute(
                "INSERT INTO accounts (id, backend, label, api_base_url, model, enabled, is_default, status, total_tokens_in, total_tokens_out, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    account.id,
                    account.backend.as_str(),
                    account.label,
                    account.api_base_url,
                    account.model,
                    account.enabled as i32,
                    account.is_default as i32,
                    account.status.as_str(),
                    account.total_tokens_in,
                    account.total_tokens_out,
                    account.created_at.to_rfc3339(),
                    account.updated_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await?
    }

    pub async fn get_account(&self, id: &str) -> Result<Option<Account>> {
        let conn = self.conn.clone();
        let id = id.to_string();
        task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            let mut stmt = conn.prepare(
                "SELECT id, backend, label, api_base_url, model, enabled, is_default, status, total_tokens_in, total_tokens_out, created_at, updated_at
                 FROM accounts WHERE id = ?1",
            )?;
            let result = stmt
                .query_row(params![id], |row| Ok(Self::row_to_account(row)))
                .optional()?;
            match result {
                Some(Ok(account)) => Ok(Some(account)),
                Some(Err(e)) => Err(e),
                None => Ok(None),
            }
        })
        .await?
    }

    pub async fn list_accounts(&self) -> Result<Vec<Account>> {
        let conn = self.conn.clone();
        task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            let mut stmt = conn.prepare(
                "SELECT id, backend, label, api_base_url, model, enabled, is_default, status, total_tokens_in, total_tokens_out, created_at, updated_at
                 FROM accounts ORDER BY backend, label",
            )?;
            let accounts = stmt
                .query_map([], |row| Ok(Self::row_to_account(row)))?
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .collect::<Result<Vec<_>, _>>()?;
            Ok(accounts)
        })
        .await?
    }

    /// The account that should serve a backend: the default one if marked,
    /// otherwise any enabled account for that backend.
    pub async fn account_for_backend(&self, backend: BackendId) -> Result<Option<Account>> {
        let conn = self.conn.clone();
        task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            let mut stmt = conn.prepare(
                "SELECT id, backend, label, api_base_url, model, enabled, is_default, status, total_tokens_in, total_tokens_out, created_at, updated_at
                 FROM accounts WHERE backend = ?1 AND enabled = 1 ORDER BY is_default DESC, created_at ASC LIMIT 1",
            )?;
            let result = stmt
                .query_row(params![backend.as_str()], |row| {
                    Ok(Self::row_to_account(row))
                })
                .optional()?;
            match result {
                Some(Ok(account)) => Ok(Some(account)),
                Some(Err(e)) => Err(e),
                None => Ok(None),
            }
        })
        .await?
    }

    pub async fn delete_account(&self, id: &str) -> Result<()> {
        let conn = self.conn.clone();
        let id = id.to_string();
        task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            conn.execute("DELETE FROM accounts WHERE id = ?1", params![id])?;
            Ok(())
        })
        .await?
    }

    pub async fn set_default_account(&self, id: &str, backend: BackendId) -> Result<()> {
        let conn = self.conn.clone();
        let id = id.to_string();
        task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            conn.execute(
                "UPDATE accounts SET is_default = 0 WHERE backend = ?1",
                params![backend.as_str()],
            )?;
            conn.execute(
                "UPDATE accounts SET is_default = 1 WHERE id = ?1",
                params![id],
            )?;
            Ok(())
        })
        .await?
    }

    pub async fn set_account_enabled(&self, id: &str, enabled: bool) -> Result<()> {
        let conn = self.conn.clone();
        let id = id.to_string();
        task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            conn.execute(
                "UPDATE accounts SET enabled = ?1, updated_at = ?2 WHERE id = ?3",
                params![enabled as i32, Utc::now().to_rfc3339(), id],
            )?;
            Ok(())
        })
        .await?
    }

    pub async fn set_account_status(&self, id: &str, status: AccountStatus) -> Result<()> {
        let conn = self.conn.clone();
        let id = id.to_string();
        task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            conn.execute(
                "UPDATE accounts SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![status.as_str(), Utc::now().to_rfc3339(), id],
            )?;
            Ok(())
        })
        .await?
    }

    pub async fn update_account_usage(
        &self,
        id: &str,
        tokens_in: i64,
        tokens_out: i64,
    ) -> Result<()> {
        let conn = self.conn.clone();
        let id = id.to_string();
        task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            conn.execute(
                "UPDATE accounts SET total_tokens_in = total_tokens_in + ?1, total_tokens_out = total_tokens_out + ?2, updated_at = ?3 WHERE id = ?4",
                params![tokens_in, tokens_out, Utc::now().to_rfc3339(), id],
            )?;
            Ok(())
        })
        .await?
    }

    pub async fn has_any_accounts(&self) -> Result<bool> {
        let conn = self.conn.clone();
        task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM accounts", [], |row| row.get(0))?;
            Ok(count > 0)
        })
        .await?
    }

    // --- Conversation CRUD ---

    pub async fn insert_conversation(&self, conversation: &Conversation) -> Result<()> {
        let conn = self.conn.clone();
        let conv = conversation.clone();
        task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            conn.execute(
                "INSERT INTO conversations (id, title, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    conv.id,
                    conv.title,
                    conv.created_at.to_rfc3339(),
                    conv.updated_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await?
    }

    pub async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>> {
        let conn = self.conn.clone();
        let id = id.to_string();
        task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            let mut stmt = conn.prepare(
                "SELECT c.id, c.title, c.created_at, c.updated_at,
                        (SELECT SUBSTR(m.content, 1, 100) FROM messages m WHERE m.conversation_id = c.id ORDER BY m.created_at DESC LIMIT 1) as last_preview
                 FROM conversations c WHERE c.id = ?1",
            )?;
            let result = stmt
                .query_row(params![id], |row| Ok(Self::row_to_conversation(row)))
                .optional()?;
            match result {
                Some(Ok(conv)) => Ok(Some(conv)),
                Some(Err(e)) => Err(e),
                None => Ok(None),
            }
        })
        .await?
    }

    pub async fn list_conversations(&self) -> Result<Vec<Conversation>> {
        let conn = self.conn.clone();
        task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            let mut stmt = conn.prepare(
                "SELECT c.id, c.title, c.created_at, c.updated_at,
                        (SELECT SUBSTR(m.content, 1, 100) FROM messages m WHERE m.conversation_id = c.id ORDER BY m.created_at DESC LIMIT 1) as last_preview
                 FROM conversations c ORDER BY c.updated_at DESC",
            )?;
            let conversations = stmt
                .query_map([], |row| Ok(Self::row_to_conversation(row)))?
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .collect::<Result<Vec<_>, _>>()?;
            Ok(conversations)
        })
        .await?
    }

    pub async fn update_conversation_title(&self, id: &str, title: &str) -> Result<()> {
        let conn = self.conn.clone();
        let id = id.to_string();
        let title = title.to_string();
        task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            conn.execute(
                "UPDATE conversations SET title = ?1, updated_at = ?2 WHERE id = ?3",
                params![title, Utc::now().to_rfc3339(), id],
            )?;
            Ok(())
        })
        .await?
    }

    pub async fn update_conversation_timestamp(&self, id: &str) -> Result<()> {
        let conn = self.conn.clone();
        let id = id.to_string();
        task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            conn.execute(
                "UPDATE conversations SET updated_at = ?1 WHERE id = ?2",
                params![Utc::now().to_rfc3339(), id],
            )?;
            Ok(())
        })
        .await?
    }

    pub async fn delete_conversation(&self, id: &str) -> Result<()> {
        let conn = self.conn.clone();
        let id = id.to_string();
        task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            conn.execute("DELETE FROM conversations WHERE id = ?1", params![id])?;
            Ok(())
        })
        .await?
    }

    // --- Message CRUD ---

    pub async fn insert_message(&self, message: &Message) -> Result<()> {
        let conn = self.conn.clone();
        let msg = message.clone();
        task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            conn.execute(
                "INSERT INTO messages (id, conversation_id, role, content, model, tokens_in, tokens_out, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    msg.id,
                    msg.conversation_id,
                    msg.role.as_str(),
                    msg.content,
                    msg.model.map(|m| m.as_str()),
                    msg.tokens_in,
                    msg.tokens_out,
                    msg.created_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await?
    }

    pub async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        let conn = self.conn.clone();
        let conversation_id = conversation_id.to_string();
        task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            let mut stmt = conn.prepare(
                "SELECT id, conversation_id, role, content, model, tokens_in, tokens_out, created_at
                 FROM messages WHERE conversation_id = ?1 ORDER BY created_at ASC",
            )?;
            let messages = stmt
                .query_map(params![conversation_id], |row| {
                    Ok(Self::row_to_message(row))
                })?
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .collect::<Result<Vec<_>, _>>()?;
            Ok(messages)
        })
        .await?
    }

    // --- Settings ---

    pub async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.clone();
        let key = key.to_string();
        task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            let result: Option<String> = conn
                .query_row(
                    "SELECT value FROM settings WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(result)
        })
        .await?
    }

    pub async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.clone();
        let key = key.to_string();
        let value = value.to_string();
        task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            conn.execute(
                "INSERT INTO settings (key, value) VALUES (?1, ?2) ON CONFLICT(key) DO UPDATE SET value = ?2",
                params![key, value],
            )?;
            Ok(())
        })
        .await?
    }

    // --- Row helpers ---

    fn row_to_account(row: &rusqlite::Row) -> Result<Account> {
        let backend_str: String = row.get(1)?;
        let enabled_int: i32 = row.get(5)?;
        let is_default_int: i32 = row.get(6)?;
        let status_str: String = row.get(7)?;
        let created_str: String = row.get(10)?;
        let updated_str: String = row.get(11)?;

        Ok(Account {
            id: row.get(0)?,
            backend: BackendId::from_str(&backend_str)
                .ok_or_else(|| anyhow::anyhow!("Unknown backend: {}", backend_str))?,
            label: row.get(2)?,
            api_base_url: row.get(3)?,
            model: row.get(4)?,
            enabled: enabled_int != 0,
            is_default: is_default_int != 0,
            status: AccountStatus::from_str(&status_str)
                .ok_or_else(|| anyhow::anyhow!("Unknown status: {}", status_str))?,
            total_tokens_in: row.get(8)?,
            total_tokens_out: row.get(9)?,
            created_at: DateTime::parse_from_rfc3339(&created_str)?.with_timezone(&Utc),
            updated_at: DateTime::parse_from_rfc3339(&updated_str)?.with_timezone(&Utc),
        })
    }

    fn row_to_conversation(row: &rusqlite::Row) -> Result<Conversation> {
        let created_str: String = row.get(2)?;
        let updated_str: String = row.get(3)?;
        let last_message_preview: Option<String> = row.get(4)?;

        Ok(Conversation {
            id: row.get(0)?,
            title: row.get(1)?,
            last_message_preview,
            created_at: DateTime::parse_from_rfc3339(&created_str)?.with_timezone(&Utc),
            updated_at: DateTime::parse_from_rfc3339(&updated_str)?.with_timezone(&Utc),
        })
    }

    fn row_to_message(row: &rusqlite::Row) -> Result<Message> {
        let role_str: String = row.get(2)?;
        let model_str: Option<String> = row.get(4)?;
        let created_str: String = row.get(7)?;

        Ok(Message {
            id: row.get(0)?,
            conversation_id: row.get(1)?,
            role: Role::from_str(&role_str)
                .ok_or_else(|| anyhow::anyhow!("Unknown role: {}", role_str))?,
            content: row.get(3)?,
            model: model_str.as_deref().and_then(ModelId::from_str),
            tokens_in: row.get(5)?,
            tokens_out: row.get(6)?,
            created_at: DateTime::parse_from_rfc3339(&created_str)?.with_timezone(&Utc),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_account(backend: BackendId) -> Account {
        let now = Utc::now();
        Account {
            id: uuid::Uuid::new_v4().to_string(),
            backend,
            label: "Test Account".to_string(),
            api_base_url: None,
            model: backend.default_model().to_string(),
            enabled: true,
            is_default: false,
            status: AccountStatus::Active,
            total_tokens_in: 0,
            total_tokens_out: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_schema_initialization() {
        let db = Database::new_in_memory().unwrap();
        let accounts = db.list_accounts().await.unwrap();
        assert!(accounts.is_empty());
    }

    #[tokio::test]
    async fn test_account_crud() {
        let db = Database::new_in_memory().unwrap();

        let account = test_account(BackendId::Anthropic);
        db.insert_account(&account).await.unwrap();

        let fetched = db.get_account(&account.id).await.unwrap().unwrap();
        assert_eq!(fetched.label, "Test Account");
        assert_eq!(fetched.backend, BackendId::Anthropic);
        assert_eq!(fetched.model, "claude-3-haiku-20240307");

        assert!(db.has_any_accounts().await.unwrap());

        db.delete_account(&account.id).await.unwrap();
        assert!(!db.has_any_accounts().await.unwrap());
    }

    #[tokio::test]
    async fn test_account_for_backend_prefers_default() {
        let db = Database::new_in_memory().unwrap();

        let first = test_account(BackendId::Gemini);
        let second = test_account(BackendId::Gemini);
        db.insert_account(&first).await.unwrap();
        db.insert_account(&second).await.unwrap();

        db.set_default_account(&second.id, BackendId::Gemini)
            .await
            .unwrap();

        let picked = db
            .account_for_backend(BackendId::Gemini)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(picked.id, second.id);

        assert!(db
            .account_for_backend(BackendId::Groq)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_disabled_accounts_are_skipped() {
        let db = Database::new_in_memory().unwrap();

        let account = test_account(BackendId::OpenAi);
        db.insert_account(&account).await.unwrap();
        db.set_account_enabled(&account.id, false).await.unwrap();

        assert!(db
            .account_for_backend(BackendId::OpenAi)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_conversation_and_messages() {
        let db = Database::new_in_memory().unwrap();
        let now = Utc::now();

        let conv = Conversation {
            id: uuid::Uuid::new_v4().to_string(),
            title: "Test Chat".to_string(),
            last_message_preview: None,
            created_at: now,
            updated_at: now,
        };
        db.insert_conversation(&conv).await.unwrap();

        let user_msg = Message {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: conv.id.clone(),
            role: Role::User,
            content: "Explain this algorithm".to_string(),
            model: None,
            tokens_in: None,
            tokens_out: None,
            created_at: now,
        };
        db.insert_message(&user_msg).await.unwrap();

        let assistant_msg = Message {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: conv.id.clone(),
            role: Role::Assistant,
            content: "Here is how it works".to_string(),
            model: Some(ModelId::Claude),
            tokens_in: Some(12),
            tokens_out: Some(40),
            created_at: now + chrono::Duration::seconds(1),
        };
        db.insert_message(&assistant_msg).await.unwrap();

        let messages = db.list_messages(&conv.id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[1].model, Some(ModelId::Claude));

        let listed = db.list_conversations().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(
            listed[0].last_message_preview.as_deref(),
            Some("Here is how it works")
        );

        // Cascade: deleting the conversation removes its messages
        db.delete_conversation(&conv.id).await.unwrap();
        let messages = db.list_messages(&conv.id).await.unwrap();
        assert!(messages.is_empty());
    }

    #[tokio::test]
    async fn test_settings_roundtrip() {
        let db = Database::new_in_memory().unwrap();

        assert!(db.get_setting("missing").await.unwrap().is_none());

        db.set_setting("app_settings", "{}").await.unwrap();
        db.set_setting("app_settings", "{\"a\":1}").await.unwrap();

        let value = db.get_setting("app_settings").await.unwrap();
        assert_eq!(value.as_deref(), Some("{\"a\":1}"));
    }
}
