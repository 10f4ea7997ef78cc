use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Per-reason counters for units skipped during an export.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SkipTally {
    pub no_gtin: usize,
    pub no_price: usize,
    pub product_not_found: usize,
}

impl SkipTally {
    pub fn total(&self) -> usize {
        self.no_gtin + self.no_price + self.product_not_found
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct UploadOutcome {
    pub attempted: bool,
    pub success: bool,
    pub error: Option<String>,
}

impl UploadOutcome {
    /// Upload disabled in settings; nothing was attempted.
    pub fn skipped() -> Self {
        Self {
            attempted: false,
            success: false,
            error: None,
        }
    }
}

/// Final result of one export run, appended to the capped history log.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ExportReport {
    pub success: bool,
    pub message: String,
    pub exported: usize,
    pub skipped: usize,
    #[serde(default)]
    pub skip_reasons: SkipTally,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload: Option<UploadOutcome>,
    #[serde(with = "time::serde::rfc3339")]
    pub finished_at: OffsetDateTime,
}

impl ExportReport {
    pub fn completed(exported: usize, skipped: usize, skip_reasons: SkipTally) -> Self {
        Self {
            success: true,
            message: format!(
                "CSV export completed. Exported: {exported} products, Skipped: {skipped}"
            ),
            exported,
            skipped,
            skip_reasons,
            upload: None,
            finished_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            exported: 0,
            skipped: 0,
            skip_reasons: SkipTally::default(),
            upload: None,
            finished_at: OffsetDateTime::now_utc(),
        }
    }
}
