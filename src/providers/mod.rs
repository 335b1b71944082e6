pub mod anthropic;
pub mod dispatcher;
pub mod gemini;
pub mod openai;
pub mod traits;
pub mod types;

pub use dispatcher::Dispatcher;
pub use types::{ChatMessage, ChatRequest, ChatResponse, ProviderError};
