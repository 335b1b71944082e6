use serde::{Deserialize, Serialize};

/// Routable model tag. Closed set: unknown tags fail at parse time instead of
/// silently falling through to default behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelId {
    Claude,
    DeepSeek,
    Copilot,
    Gemini,
    NanoBanana,
}

impl ModelId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelId::Claude => "claude",
            ModelId::DeepSeek => "deepseek",
            ModelId::Copilot => "copilot",
            ModelId::Gemini => "gemini",
            ModelId::NanoBanana => "nanobanana",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ModelId::Claude => "Claude",
            ModelId::DeepSeek => "DeepSeek",
            ModelId::Copilot => "Copilot",
            ModelId::Gemini => "Gemini",
            ModelId::NanoBanana => "NanoBanana",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "claude" => Some(ModelId::Claude),
            "deepseek" => Some(ModelId::DeepSeek),
            "copilot" => Some(ModelId::Copilot),
            "gemini" => Some(ModelId::Gemini),
            "nanobanana" => Some(ModelId::NanoBanana),
            _ => None,
        }
    }

    /// Which configured backend serves this model tag.
    pub fn backend(&self) -> BackendId {
        match self {
            ModelId::Claude => BackendId::Anthropic,
            ModelId::DeepSeek => BackendId::DeepSeek,
            ModelId::Copilot => BackendId::OpenAi,
            ModelId::Gemini | ModelId::NanoBanana => BackendId::Gemini,
        }
    }
}

/// The user's model choice: a fixed model, or the auto sentinel meaning
/// "let the router decide".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelSelection {
    Auto,
    Fixed(ModelId),
}

impl ModelSelection {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelSelection::Auto => "auto",
            ModelSelection::Fixed(model) => model.as_str(),
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "auto" => Some(ModelSelection::Auto),
            other => ModelId::from_str(other).map(ModelSelection::Fixed),
        }
    }
}

impl Default for ModelSelection {
    fn default() -> Self {
        ModelSelection::Auto
    }
}

/// A configurable HTTP backend. Each has a default base URL and one of three
/// wire formats (OpenAI-compatible, Anthropic, Gemini).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendId {
    OpenAi,
    Anthropic,
    Gemini,
    DeepSeek,
    Groq,
    OpenRouter,
}

impl BackendId {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendId::OpenAi => "openai",
            BackendId::Anthropic => "anthropic",
            BackendId::Gemini => "gemini",
            BackendId::DeepSeek => "deepseek",
            BackendId::Groq => "groq",
            BackendId::OpenRouter => "openrouter",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            BackendId::OpenAi => "OpenAI",
            BackendId::Anthropic => "Claude (Anthropic)",
            BackendId::Gemini => "Gemini (Google)",
            BackendId::DeepSeek => "DeepSeek",
            BackendId::Groq => "Groq",
            BackendId::OpenRouter => "OpenRouter",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "openai" => Some(BackendId::OpenAi),
            "anthropic" => Some(BackendId::Anthropic),
            "gemini" => Some(BackendId::Gemini),
            "deepseek" => Some(BackendId::DeepSeek),
            "groq" => Some(BackendId::Groq),
            "openrouter" => Some(BackendId::OpenRouter),
            _ => None,
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            BackendId::OpenAi => "https://api.openai.com/v1",
            BackendId::Anthropic => "https://api.anthropic.com/v1",
            BackendId::Gemini => "https://generativelanguage.googleapis.com/v1beta",
            BackendId::DeepSeek => "https://api.deepseek.com/v1",
            BackendId::Groq => "https://api.groq.com/openai/v1",
            BackendId::OpenRouter => "https://openrouter.ai/api/v1",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            BackendId::OpenAi => "gpt-3.5-turbo",
            BackendId::Anthropic => "claude-3-haiku-20240307",
            BackendId::Gemini => "gemini-pro",
            BackendId::DeepSeek => "deepseek-chat",
            BackendId::Groq => "llama3-70b-8192",
            BackendId::OpenRouter => "openai/gpt-3.5-turbo",
        }
    }
}
