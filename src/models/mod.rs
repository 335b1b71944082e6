pub mod account;
pub mod conversation;
pub mod message;
pub mod provider;

pub use account::{Account, AccountStatus};
pub use conversation::Conversation;
pub use message::{Message, Role};
pub use provider::{BackendId, ModelId, ModelSelection};
