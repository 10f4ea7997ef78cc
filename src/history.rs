use anyhow::Context as AnyhowContext;
use nalda_types::report::ExportReport;

/// Oldest entries are evicted beyond this count.
pub const MAX_LOG_ENTRIES: usize = 20;

const CONFIG_DIR: &str = "cfg.d";
const LOG_FILE: &str = "export_log.json";

/// Append-only export log stored as a JSON file, newest last.
pub struct FileSystemHistoryRepository {}

impl FileSystemHistoryRepository {
    pub fn new() -> Self {
        Self {}
    }

    pub async fn list(&self) -> Result<Vec<ExportReport>, anyhow::Error> {
        let path = format!("{CONFIG_DIR}/{LOG_FILE}");
        match tokio::fs::read_to_string(&path).await {
            Ok(raw) => serde_json::from_str(&raw).with_context(|| format!("Unable to parse {path}")),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(vec![]),
            Err(err) => Err(err).context(format!("Unable to read {path}")),
        }
    }

    pub async fn append(&self, report: ExportReport) -> Result<(), anyhow::Error> {
        let mut reports = self.list().await?;
        reports.push(report);
        if reports.len() > MAX_LOG_ENTRIES {
            let excess = reports.len() - MAX_LOG_ENTRIES;
            reports.drain(..excess);
        }
        tokio::fs::create_dir_all(CONFIG_DIR).await?;
        let path = format!("{CONFIG_DIR}/{LOG_FILE}");
        tokio::fs::write(&path, serde_json::to_string_pretty(&reports)?).await?;
        Ok(())
    }

    pub async fn clear(&self) -> Result<(), anyhow::Error> {
        let path = format!("{CONFIG_DIR}/{LOG_FILE}");
        match tokio::fs::remove_file(&path).await {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).context(format!("Unable to remove {path}")),
        }
    }
}

impl Default for FileSystemHistoryRepository {
    fn default() -> Self {
        Self::new()
    }
}
