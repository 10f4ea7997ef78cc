use derive_more::Display;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    #[default]
    New,
    Used,
    Refurbished,
}

impl Condition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Used => "used",
            Self::Refurbished => "refurbished",
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default, Display)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    #[default]
    #[display("FTP")]
    Ftp,
    #[display("SFTP")]
    Sftp,
}

impl Protocol {
    pub fn default_port(&self) -> u16 {
        match self {
            Self::Ftp => 21,
            Self::Sftp => 22,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct FtpCredentials {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub protocol: Protocol,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub remote_path: String,
    #[serde(default)]
    pub tls: bool,
}

impl FtpCredentials {
    pub fn port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.protocol.default_port())
    }

    /// Remote directory with a single leading slash, or empty for the root.
    pub fn normalized_path(&self) -> String {
        let trimmed = self.remote_path.trim_matches('/');
        if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{trimmed}")
        }
    }
}

/// Immutable snapshot of the export configuration, taken once per run and
/// passed explicitly through the pipeline.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ExportSettings {
    #[serde(default = "default_country")]
    pub country: String,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_tax_rate")]
    pub tax_rate: String,
    #[serde(default = "default_return_days")]
    pub return_days: String,
    #[serde(default = "default_delivery_days")]
    pub delivery_days: String,
    #[serde(default)]
    pub condition: Condition,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub default_brand: String,
    #[serde(default = "default_require_gtin")]
    pub require_gtin: bool,
    /// Interval between scheduled exports, e.g. "24h". None disables the
    /// schedule.
    #[serde(default)]
    pub schedule: Option<String>,
    #[serde(default)]
    pub upload: FtpCredentials,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            country: default_country(),
            currency: default_currency(),
            tax_rate: default_tax_rate(),
            return_days: default_return_days(),
            delivery_days: default_delivery_days(),
            condition: Condition::default(),
            language: String::new(),
            default_brand: String::new(),
            require_gtin: default_require_gtin(),
            schedule: None,
            upload: FtpCredentials::default(),
        }
    }
}

fn default_country() -> String {
    "CH".to_string()
}

fn default_currency() -> String {
    "CHF".to_string()
}

fn default_tax_rate() -> String {
    "8.1".to_string()
}

fn default_return_days() -> String {
    "14".to_string()
}

fn default_delivery_days() -> String {
    "1".to_string()
}

fn default_require_gtin() -> bool {
    true
}
