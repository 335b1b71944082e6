mod adapter;
mod models;

pub use adapter::AnthropicBackend;
