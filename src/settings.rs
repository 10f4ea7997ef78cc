use anyhow::Context as AnyhowContext;
use nalda_types::settings::ExportSettings;

const CONFIG_DIR: &str = "cfg.d";
const SETTINGS_FILE: &str = "settings.json";

/// Export configuration stored as a JSON file. Read once per run so every
/// component works against an immutable snapshot.
pub struct FileSystemSettingsRepository {}

impl FileSystemSettingsRepository {
    pub fn new() -> Self {
        Self {}
    }

    pub async fn load(&self) -> Result<ExportSettings, anyhow::Error> {
        let path = format!("{CONFIG_DIR}/{SETTINGS_FILE}");
        match tokio::fs::read_to_string(&path).await {
            Ok(raw) => {
                serde_json::from_str(&raw).with_context(|| format!("Unable to parse {path}"))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Ok(ExportSettings::default())
            }
            Err(err) => Err(err).context(format!("Unable to read {path}")),
        }
    }

    pub async fn save(&self, settings: &ExportSettings) -> Result<(), anyhow::Error> {
        tokio::fs::create_dir_all(CONFIG_DIR).await?;
        let path = format!("{CONFIG_DIR}/{SETTINGS_FILE}");
        tokio::fs::write(&path, serde_json::to_string_pretty(settings)?).await?;
        Ok(())
    }
}

impl Default for FileSystemSettingsRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use nalda_types::settings::{Condition, ExportSettings};

    #[test]
    fn missing_fields_fall_back_to_marketplace_defaults() {
        let settings: ExportSettings = serde_json::from_str("{}").unwrap();
        assert_eq!("CH", settings.country);
        assert_eq!("CHF", settings.currency);
        assert_eq!("8.1", settings.tax_rate);
        assert_eq!("14", settings.return_days);
        assert_eq!("1", settings.delivery_days);
        assert_eq!(Condition::New, settings.condition);
        assert!(settings.require_gtin);
        assert!(!settings.upload.enabled);
    }

    #[test]
    fn partial_settings_override_defaults() {
        let settings: ExportSettings = serde_json::from_str(
            r#"{"country": "DE", "require_gtin": false, "upload": {"enabled": true, "protocol": "sftp", "host": "sftp.nalda.ch"}}"#,
        )
        .unwrap();
        assert_eq!("DE", settings.country);
        assert!(!settings.require_gtin);
        assert!(settings.upload.enabled);
        assert_eq!(22, settings.upload.port());
    }
}
