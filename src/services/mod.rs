pub mod accounts;
pub mod chat;
pub mod database;
pub mod keyring;
pub mod settings;

pub use accounts::AccountService;
pub use chat::ChatSession;
pub use database::Database;
pub use keyring::KeyringService;
pub use settings::{AppSettings, SettingsService};
