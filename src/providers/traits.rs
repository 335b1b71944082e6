use async_trait::async_trait;

use super::types::{ChatRequest, ChatResponse, ModelInfo, ProviderError};

/// One wire format. A single adapter can serve several backends that share a
/// payload shape (OpenAI-compatible covers OpenAI, DeepSeek, Groq and
/// OpenRouter).
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn validate_credentials(
        &self,
        api_key: &str,
        base_url: &str,
    ) -> Result<Vec<ModelInfo>, ProviderError>;

    async fn send_message(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError>;
}
