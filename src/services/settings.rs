use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::database::Database;
use crate::models::ModelSelection;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    /// Default model choice for new sessions; `Auto` lets the router decide.
    #[serde(default)]
    pub model_selection: ModelSelection,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Upper bound on retries for transient backend failures.
    pub max_retries: u32,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            model_selection: ModelSelection::Auto,
            temperature: 0.7,
            max_tokens: 1000,
            max_retries: 2,
        }
    }
}

pub struct SettingsService;

impl SettingsService {
    pub async fn load(db: &Database) -> AppSettings {
        match db.get_setting("app_settings").await {
            Ok(Some(json)) => serde_json::from_str(&json).unwrap_or_default(),
            _ => AppSettings::default(),
        }
    }

    pub async fn save(db: &Database, settings: &AppSettings) -> Result<()> {
        let json = serde_json::to_string(settings)?;
        db.set_setting("app_settings", &json).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModelId;

    #[tokio::test]
    async fn test_defaults_when_unset() {
        let db = Database::new_in_memory().unwrap();
        let settings = SettingsService::load(&db).await;
        assert_eq!(settings.model_selection, ModelSelection::Auto);
        assert_eq!(settings.max_retries, 2);
    }

    #[tokio::test]
    async fn test_save_and_reload() {
        let db = Database::new_in_memory().unwrap();

        let mut settings = AppSettings::default();
        settings.model_selection = ModelSelection::Fixed(ModelId::Gemini);
        settings.temperature = 0.2;
        SettingsService::save(&db, &settings).await.unwrap();

        let loaded = SettingsService::load(&db).await;
        assert_eq!(
            loaded.model_selection,
            ModelSelection::Fixed(ModelId::Gemini)
        );
        assert!((loaded.temperature - 0.2).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_corrupt_blob_falls_back_to_defaults() {
        let db = Database::new_in_memory().unwrap();
        db.set_setting("app_settings", "not json").await.unwrap();

        let settings = SettingsService::load(&db).await;
        assert_eq!(settings.model_selection, ModelSelection::Auto);
    }
}
