use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use uuid::Uuid;

use crate::models::{Account, BackendId, Conversation, Message, ModelId, ModelSelection, Role};
use crate::providers::types::{ChatMessage, ChatRequest, ChatResponse, ProviderError};
use crate::providers::Dispatcher;
use crate::routing::{route, RoutingRequest};
use crate::services::accounts::AccountService;
use crate::services::database::Database;
use crate::services::settings::AppSettings;

const TITLE_MAX_CHARS: usize = 50;

/// Reply handed back to the caller after a successful send.
#[derive(Debug, Clone)]
pub struct SessionReply {
    pub model: ModelId,
    pub content: String,
}

/// Everything a single exchange needs besides the shared services.
struct ExchangeParams<'a> {
    conversation_id: &'a str,
    model: ModelId,
    account: &'a Account,
    api_key: String,
    text: &'a str,
}

/// One chat session. Holds the conversation id and the model choice as
/// explicit request-scoped state; nothing here is global.
pub struct ChatSession {
    db: Database,
    accounts: Arc<AccountService>,
    dispatcher: Arc<Dispatcher>,
    settings: AppSettings,
    selection: ModelSelection,
    conversation_id: Option<String>,
}

impl ChatSession {
    pub fn new(
        db: Database,
        accounts: Arc<AccountService>,
        dispatcher: Arc<Dispatcher>,
        settings: AppSettings,
    ) -> Self {
        let selection = settings.model_selection;
        Self {
            db,
            accounts,
            dispatcher,
            settings,
            selection,
            conversation_id: None,
        }
    }

    pub fn selection(&self) -> ModelSelection {
        self.selection
    }

    pub fn set_selection(&mut self, selection: ModelSelection) {
        self.selection = selection;
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    /// Continue an existing conversation.
    pub async fn open(&mut self, conversation_id: &str) -> Result<Vec<Message>> {
        let conversation = self
            .db
            .get_conversation(conversation_id)
            .await?
            .context("Conversation not found")?;
        let messages = self.db.list_messages(&conversation.id).await?;
        self.conversation_id = Some(conversation.id);
        Ok(messages)
    }

    /// Start over; the next send creates a fresh conversation.
    pub fn reset(&mut self) {
        self.conversation_id = None;
    }

    /// Send a message: route it, resolve credentials, run the exchange. A
    /// rejected key marks the account invalid before the error surfaces.
    pub async fn send(&mut self, text: &str) -> Result<SessionReply> {
        let decision = route(&RoutingRequest {
            text,
            selection: self.selection,
        });
        let model = decision.model;
        tracing::debug!(model = model.as_str(), "routed message");

        let conversation_id = self.ensure_conversation(text).await?;
        let backend = model.backend();
        let (account, api_key) = self.accounts.resolve_for_backend(backend).await?;

        let params = ExchangeParams {
            conversation_id: &conversation_id,
            model,
            account: &account,
            api_key,
            text,
        };
        match run_exchange(&self.db, &self.dispatcher, &self.settings, params).await {
            Ok(reply) => Ok(reply),
            Err(e) => {
                if matches!(
                    e.downcast_ref::<ProviderError>(),
                    Some(ProviderError::AuthError(_))
                ) {
                    self.accounts.mark_invalid(&account.id).await?;
                    return Err(e.context(format!(
                        "{} rejected the API key",
                        backend.display_name()
                    )));
                }
                Err(e.context("AI request failed"))
            }
        }
    }

    async fn ensure_conversation(&mut self, first_text: &str) -> Result<String> {
        if let Some(id) = &self.conversation_id {
            return Ok(id.clone());
        }

        let now = Utc::now();
        let conversation = Conversation {
            id: Uuid::new_v4().to_string(),
            title: title_from(first_text),
            last_message_preview: None,
            created_at: now,
            updated_at: now,
        };
        self.db.insert_conversation(&conversation).await?;
        self.conversation_id = Some(conversation.id.clone());
        Ok(conversation.id)
    }
}

/// Persist the user message, dispatch with bounded retry, persist the reply.
/// The user row is committed before dispatch; an assistant row exists only
/// when the backend call succeeded, so a failed call never corrupts history.
async fn run_exchange(
    db: &Database,
    dispatcher: &Dispatcher,
    settings: &AppSettings,
    params: ExchangeParams<'_>,
) -> Result<SessionReply> {
    let user_msg = Message {
        id: Uuid::new_v4().to_string(),
        conversation_id: params.conversation_id.to_string(),
        role: Role::User,
        content: params.text.to_string(),
        model: None,
        tokens_in: None,
        tokens_out: None,
        created_at: Utc::now(),
    };
    db.insert_message(&user_msg).await?;

    let history = db.list_messages(params.conversation_id).await?;
    let request = ChatRequest {
        api_key: params.api_key,
        model: params.account.model.clone(),
        messages: messages_to_chat_messages(&history),
        base_url: params.account.base_url().to_string(),
        temperature: Some(settings.temperature),
        max_tokens: Some(settings.max_tokens),
    };

    let response = dispatch_with_retry(
        dispatcher,
        &params.account.backend,
        request,
        settings.max_retries,
    )
    .await?;

    let assistant_msg = Message {
        id: Uuid::new_v4().to_string(),
        conversation_id: params.conversation_id.to_string(),
        role: Role::Assistant,
        content: response.content.clone(),
        model: Some(params.model),
        tokens_in: response.tokens_in,
        tokens_out: response.tokens_out,
        created_at: Utc::now(),
    };
    db.insert_message(&assistant_msg).await?;
    db.update_conversation_timestamp(params.conversation_id)
        .await?;

    if response.tokens_in.is_some() || response.tokens_out.is_some() {
        db.update_account_usage(
            &params.account.id,
            response.tokens_in.unwrap_or(0),
            response.tokens_out.unwrap_or(0),
        )
        .await?;
    }

    Ok(SessionReply {
        model: params.model,
        content: response.content,
    })
}

/// First message becomes the conversation title, clipped at a char boundary.
pub fn title_from(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return "New Conversation".to_string();
    }
    let mut title: String = trimmed.chars().take(TITLE_MAX_CHARS).collect();
    if trimmed.chars().count() > TITLE_MAX_CHARS {
        title.push('…');
    }
    title
}

/// Convert stored messages to the provider wire shape.
pub fn messages_to_chat_messages(messages: &[Message]) -> Vec<ChatMessage> {
    messages
        .iter()
        .map(|m| ChatMessage {
            role: m.role,
            content: m.content.clone(),
        })
        .collect()
}

/// Retry transient failures a bounded number of times. Auth and request
/// errors surface immediately; rate limits honor the server's retry-after
/// when it gives one.
pub async fn dispatch_with_retry(
    dispatcher: &Dispatcher,
    backend: &BackendId,
    request: ChatRequest,
    max_retries: u32,
) -> Result<ChatResponse, ProviderError> {
    let mut attempt = 0;
    loop {
        match dispatcher.send_message(backend, request.clone()).await {
            Ok(response) => return Ok(response),
            Err(e) if e.is_transient() && attempt < max_retries => {
                let delay = match &e {
                    ProviderError::RateLimited {
                        retry_after_secs: Some(secs),
                    } => Duration::from_secs(*secs),
                    _ => Duration::from_secs(1 << attempt),
                };
                attempt += 1;
                tracing::warn!(
                    backend = backend.as_str(),
                    attempt,
                    "transient backend error, retrying: {}",
                    e
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::models::AccountStatus;
    use crate::providers::traits::ChatBackend;
    use crate::providers::types::ModelInfo;

    /// Fake backend that replays a scripted sequence of results and counts
    /// how often it was called.
    struct ScriptedBackend {
        calls: AtomicU32,
        script: Mutex<VecDeque<Result<ChatResponse, ProviderError>>>,
    }

    impl ScriptedBackend {
        fn new(script: Vec<Result<ChatResponse, ProviderError>>) -> Self {
            Self {
                calls: AtomicU32::new(0),
                script: Mutex::new(script.into()),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }

        fn reply(content: &str) -> ChatResponse {
            ChatResponse {
                content: content.to_string(),
                model: "test-model".to_string(),
                tokens_in: Some(3),
                tokens_out: Some(5),
            }
        }
    }

    #[async_trait]
    impl ChatBackend for ScriptedBackend {
        async fn validate_credentials(
            &self,
            _api_key: &str,
            _base_url: &str,
        ) -> Result<Vec<ModelInfo>, ProviderError> {
            Ok(Vec::new())
        }

        async fn send_message(
            &self,
            _request: ChatRequest,
        ) -> Result<ChatResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ProviderError::RequestFailed("script exhausted".into())))
        }
    }

    fn scripted_dispatcher(
        backend_id: BackendId,
        script: Vec<Result<ChatResponse, ProviderError>>,
    ) -> (Arc<ScriptedBackend>, Dispatcher) {
        let backend = Arc::new(ScriptedBackend::new(script));
        let mut backends: HashMap<BackendId, Arc<dyn ChatBackend>> = HashMap::new();
        backends.insert(backend_id, backend.clone());
        (backend, Dispatcher::with_backends(backends))
    }

    fn test_request() -> ChatRequest {
        ChatRequest {
            api_key: "k".to_string(),
            model: "test-model".to_string(),
            messages: vec![ChatMessage {
                role: Role::User,
                content: "hi".to_string(),
            }],
            base_url: "http://localhost".to_string(),
            temperature: Some(0.7),
            max_tokens: Some(100),
        }
    }

    fn test_account(backend: BackendId) -> Account {
        let now = Utc::now();
        Account {
            id: "acct-1".to_string(),
            backend,
            label: "test".to_string(),
            api_base_url: Some("http://localhost".to_string()),
            model: "test-model".to_string(),
            enabled: true,
            is_default: true,
            status: AccountStatus::Active,
            total_tokens_in: 0,
            total_tokens_out: 0,
            created_at: now,
            updated_at: now,
        }
    }

    async fn seed_conversation(db: &Database) -> String {
        let now = Utc::now();
        let conversation = Conversation {
            id: Uuid::new_v4().to_string(),
            title: "test".to_string(),
            last_message_preview: None,
            created_at: now,
            updated_at: now,
        };
        db.insert_conversation(&conversation).await.unwrap();
        conversation.id
    }

    #[test]
    fn test_title_from_short_message() {
        assert_eq!(title_from("Hello there"), "Hello there");
    }

    #[test]
    fn test_title_from_long_message_is_clipped() {
        let long = "a".repeat(80);
        let title = title_from(&long);
        assert_eq!(title.chars().count(), TITLE_MAX_CHARS + 1);
        assert!(title.ends_with('…'));
    }

    #[test]
    fn test_title_from_empty_message() {
        assert_eq!(title_from("   "), "New Conversation");
    }

    #[test]
    fn test_messages_to_chat_messages_keeps_order_and_roles() {
        let now = Utc::now();
        let mk = |role, content: &str| Message {
            id: Uuid::new_v4().to_string(),
            conversation_id: "c".to_string(),
            role,
            content: content.to_string(),
            model: if role == Role::Assistant {
                Some(ModelId::Claude)
            } else {
                None
            },
            tokens_in: None,
            tokens_out: None,
            created_at: now,
        };

        let messages = vec![mk(Role::User, "hi"), mk(Role::Assistant, "hello")];
        let wire = messages_to_chat_messages(&messages);
        assert_eq!(wire.len(), 2);
        assert_eq!(wire[0].role, Role::User);
        assert_eq!(wire[1].content, "hello");
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_errors_retried_to_cap_then_surfaced() {
        let (backend, dispatcher) = scripted_dispatcher(
            BackendId::Anthropic,
            vec![
                Err(ProviderError::NetworkError("connection reset".into())),
                Err(ProviderError::NetworkError("connection reset".into())),
                Err(ProviderError::NetworkError("connection reset".into())),
            ],
        );

        let result =
            dispatch_with_retry(&dispatcher, &BackendId::Anthropic, test_request(), 2).await;

        assert!(matches!(result, Err(ProviderError::NetworkError(_))));
        // Initial attempt plus exactly max_retries retries.
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test]
    async fn test_auth_error_surfaces_after_one_attempt() {
        let (backend, dispatcher) = scripted_dispatcher(
            BackendId::Anthropic,
            vec![
                Err(ProviderError::AuthError("bad key".into())),
                Ok(ScriptedBackend::reply("never reached")),
            ],
        );

        let result =
            dispatch_with_retry(&dispatcher, &BackendId::Anthropic, test_request(), 2).await;

        assert!(matches!(result, Err(ProviderError::AuthError(_))));
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_waits_retry_after_then_succeeds() {
        let (backend, dispatcher) = scripted_dispatcher(
            BackendId::Anthropic,
            vec![
                Err(ProviderError::RateLimited {
                    retry_after_secs: Some(30),
                }),
                Ok(ScriptedBackend::reply("ok")),
            ],
        );

        let started = tokio::time::Instant::now();
        let result =
            dispatch_with_retry(&dispatcher, &BackendId::Anthropic, test_request(), 2).await;

        assert_eq!(result.unwrap().content, "ok");
        assert_eq!(backend.calls(), 2);
        assert!(started.elapsed() >= Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_failed_exchange_keeps_only_user_message() {
        let db = Database::new_in_memory().unwrap();
        let conversation_id = seed_conversation(&db).await;
        let account = test_account(BackendId::Anthropic);
        let (_, dispatcher) = scripted_dispatcher(
            BackendId::Anthropic,
            vec![Err(ProviderError::RequestFailed("boom".into()))],
        );

        let result = run_exchange(
            &db,
            &dispatcher,
            &AppSettings::default(),
            ExchangeParams {
                conversation_id: &conversation_id,
                model: ModelId::Claude,
                account: &account,
                api_key: "k".to_string(),
                text: "hello",
            },
        )
        .await;
        assert!(result.is_err());

        let messages = db.list_messages(&conversation_id).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].content, "hello");
    }

    #[tokio::test]
    async fn test_successful_exchange_records_both_sides_and_usage() {
        let db = Database::new_in_memory().unwrap();
        let conversation_id = seed_conversation(&db).await;
        let account = test_account(BackendId::Anthropic);
        db.insert_account(&account).await.unwrap();
        let (_, dispatcher) = scripted_dispatcher(
            BackendId::Anthropic,
            vec![Ok(ScriptedBackend::reply("hi back"))],
        );

        let reply = run_exchange(
            &db,
            &dispatcher,
            &AppSettings::default(),
            ExchangeParams {
                conversation_id: &conversation_id,
                model: ModelId::Claude,
                account: &account,
                api_key: "k".to_string(),
                text: "hello",
            },
        )
        .await
        .unwrap();
        assert_eq!(reply.model, ModelId::Claude);
        assert_eq!(reply.content, "hi back");

        let messages = db.list_messages(&conversation_id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].model, Some(ModelId::Claude));

        let stored = db.get_account(&account.id).await.unwrap().unwrap();
        assert_eq!(stored.total_tokens_in, 3);
        assert_eq!(stored.total_tokens_out, 5);
    }
}
