use serde::Serialize;
use std::collections::HashMap;
use time::{Duration, OffsetDateTime};

/// Records of finished or abandoned runs disappear after this window, so a
/// worker that died mid-run does not wedge the active pointer forever.
pub const RECORD_TTL: Duration = Duration::hours(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Init,
    Running,
    Complete,
    Error,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressRecord {
    pub status: RunStatus,
    pub step: String,
    pub percent: u8,
    pub message: String,
    pub exported: usize,
    pub skipped: usize,
    pub total: usize,
}

impl Default for ProgressRecord {
    fn default() -> Self {
        Self {
            status: RunStatus::Init,
            step: "init".to_string(),
            percent: 0,
            message: String::new(),
            exported: 0,
            skipped: 0,
            total: 0,
        }
    }
}

/// A partial update; unset fields keep their current value. Mirrors the
/// merge-on-write semantics of the progress transients this replaces.
#[derive(Debug, Clone, Default)]
pub struct ProgressPatch {
    pub status: Option<RunStatus>,
    pub step: Option<String>,
    pub percent: Option<u8>,
    pub message: Option<String>,
    pub exported: Option<usize>,
    pub skipped: Option<usize>,
    pub total: Option<usize>,
}

struct Entry {
    record: ProgressRecord,
    updated_at: OffsetDateTime,
}

/// Keyed progress records plus the single active-run pointer. Shared behind
/// `Arc<RwLock<_>>` between the export actor and its worker tasks; the worker
/// that owns a run id is its only writer.
#[derive(Default)]
pub struct ProgressStore {
    records: HashMap<String, Entry>,
    active: Option<String>,
}

impl ProgressStore {
    pub fn merge(&mut self, run_id: &str, patch: ProgressPatch) {
        let entry = self
            .records
            .entry(run_id.to_string())
            .or_insert_with(|| Entry {
                record: ProgressRecord::default(),
                updated_at: OffsetDateTime::now_utc(),
            });
        let record = &mut entry.record;
        if let Some(status) = patch.status {
            record.status = status;
        }
        if let Some(step) = patch.step {
            record.step = step;
        }
        if let Some(percent) = patch.percent {
            record.percent = percent;
        }
        if let Some(message) = patch.message {
            record.message = message;
        }
        if let Some(exported) = patch.exported {
            record.exported = exported;
        }
        if let Some(skipped) = patch.skipped {
            record.skipped = skipped;
        }
        if let Some(total) = patch.total {
            record.total = total;
        }
        entry.updated_at = OffsetDateTime::now_utc();
    }

    pub fn get(&self, run_id: &str) -> Option<&ProgressRecord> {
        self.records
            .get(run_id)
            .filter(|e| OffsetDateTime::now_utc() - e.updated_at < RECORD_TTL)
            .map(|e| &e.record)
    }

    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn set_active(&mut self, run_id: String) {
        self.active = Some(run_id);
    }

    /// Clears the pointer when it still names the given run.
    pub fn clear_active(&mut self, run_id: &str) {
        if self.active.as_deref() == Some(run_id) {
            self.active = None;
        }
    }

    pub fn purge_expired(&mut self) {
        let now = OffsetDateTime::now_utc();
        self.records
            .retain(|_, entry| now - entry.updated_at < RECORD_TTL);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn merge_keeps_unpatched_fields() {
        let mut store = ProgressStore::default();
        store.merge(
            "run",
            ProgressPatch {
                status: Some(RunStatus::Running),
                step: Some("counting".to_string()),
                percent: Some(5),
                message: Some("Counting products...".to_string()),
                ..Default::default()
            },
        );
        store.merge(
            "run",
            ProgressPatch {
                percent: Some(10),
                total: Some(40),
                ..Default::default()
            },
        );

        let record = store.get("run").unwrap();
        assert_eq!(RunStatus::Running, record.status);
        assert_eq!("counting", record.step);
        assert_eq!(10, record.percent);
        assert_eq!(40, record.total);
        assert_eq!("Counting products...", record.message);
    }

    #[test]
    fn unknown_run_is_absent() {
        let store = ProgressStore::default();
        assert!(store.get("nope").is_none());
    }

    #[test]
    fn active_pointer_clears_only_for_its_run() {
        let mut store = ProgressStore::default();
        store.set_active("a".to_string());
        store.clear_active("b");
        assert_eq!(Some("a"), store.active());
        store.clear_active("a");
        assert_eq!(None, store.active());
    }
}
