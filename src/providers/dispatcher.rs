use std::collections::HashMap;
use std::sync::Arc;

use super::anthropic::AnthropicBackend;
use super::gemini::GeminiBackend;
use super::openai::OpenAiCompatibleBackend;
use super::traits::ChatBackend;
use super::types::{ChatRequest, ChatResponse, ModelInfo, ProviderError};
use crate::models::BackendId;

/// Maps each configured backend to the adapter speaking its wire format.
pub struct Dispatcher {
    backends: HashMap<BackendId, Arc<dyn ChatBackend>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        let openai_compatible: Arc<dyn ChatBackend> = Arc::new(OpenAiCompatibleBackend::new());
        let anthropic: Arc<dyn ChatBackend> = Arc::new(AnthropicBackend::new());
        let gemini: Arc<dyn ChatBackend> = Arc::new(GeminiBackend::new());

        let mut backends: HashMap<BackendId, Arc<dyn ChatBackend>> = HashMap::new();
        backends.insert(BackendId::OpenAi, openai_compatible.clone());
        backends.insert(BackendId::DeepSeek, openai_compatible.clone());
        backends.insert(BackendId::Groq, openai_compatible.clone());
        backends.insert(BackendId::OpenRouter, openai_compatible);
        backends.insert(BackendId::Anthropic, anthropic);
        backends.insert(BackendId::Gemini, gemini);

        Self::with_backends(backends)
    }

    /// Build a dispatcher over an explicit adapter set. Tests register fake
    /// backends through here.
    pub fn with_backends(backends: HashMap<BackendId, Arc<dyn ChatBackend>>) -> Self {
        Self { backends }
    }

    fn backend(&self, id: &BackendId) -> Result<&Arc<dyn ChatBackend>, ProviderError> {
        self.backends.get(id).ok_or_else(|| {
            ProviderError::RequestFailed(format!("Unknown backend: {}", id.as_str()))
        })
    }

    pub async fn validate_credentials(
        &self,
        backend_id: &BackendId,
        api_key: &str,
        base_url: &str,
    ) -> Result<Vec<ModelInfo>, ProviderError> {
        self.backend(backend_id)?
            .validate_credentials(api_key, base_url)
            .await
    }

    pub async fn send_message(
        &self,
        backend_id: &BackendId,
        request: ChatRequest,
    ) -> Result<ChatResponse, ProviderError> {
        self.backend(backend_id)?.send_message(request).await
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}
