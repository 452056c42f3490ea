use chrono::{DateTime, Utc};
use serde::Serialize;

/// How the bytes for one remote file were obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransferOutcome {
    /// Content was downloaded over the network.
    Fetched,
    /// The cached copy was still fresh and was read from disk.
    CachedHit,
}

/// Per-file transfer record, one per resolved remote file.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadRecord {
    pub url: String,
    pub cache_key: String,
    pub size_bytes: u64,
    pub elapsed_ms: u64,
    pub fetched_at: DateTime<Utc>,
    pub outcome: TransferOutcome,
}

/// Append-only collector shared by every pipeline stage. When disabled, all
/// appends are no-ops so large retrievals carry no diagnostics cost.
#[derive(Debug)]
pub struct DiagRecorder {
    enabled: bool,
    steps: Vec<String>,
    warnings: Vec<String>,
    downloads: Vec<DownloadRecord>,
}

/// Immutable snapshot of a finished recorder.
#[derive(Debug, Clone, Default)]
pub struct DiagSnapshot {
    pub processing_steps: Vec<String>,
    pub warnings: Vec<String>,
    pub download_diagnostics: Vec<DownloadRecord>,
}

impl DiagRecorder {
    pub fn new(enabled: bool) -> Self {
        DiagRecorder {
            enabled,
            steps: Vec::new(),
            warnings: Vec::new(),
            downloads: Vec::new(),
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn step(&mut self, text: impl Into<String>) {
        if self.enabled {
            self.steps.push(text.into());
        }
    }

    pub fn warning(&mut self, text: impl Into<String>) {
        if self.enabled {
            self.warnings.push(text.into());
        }
    }

    pub fn download(&mut self, record: DownloadRecord) {
        if self.enabled {
            self.downloads.push(record);
        }
    }

    /// Fold another recorder's entries into this one, preserving order.
    /// Mapping files are resolved concurrently against private recorders
    /// which are absorbed here once the join completes.
    pub fn merge_from(&mut self, other: DiagRecorder) {
        if self.enabled {
            self.steps.extend(other.steps);
            self.warnings.extend(other.warnings);
            self.downloads.extend(other.downloads);
        }
    }

    pub fn finalize(self) -> DiagSnapshot {
        DiagSnapshot {
            processing_steps: self.steps,
            warnings: self.warnings,
            download_diagnostics: self.downloads,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_in_order() {
        let mut diag = DiagRecorder::new(true);
        diag.step("first");
        diag.warning("careful");
        diag.step("second");
        let snap = diag.finalize();
        assert_eq!(snap.processing_steps, vec!["first", "second"]);
        assert_eq!(snap.warnings, vec!["careful"]);
    }

    #[test]
    fn disabled_recorder_stays_empty() {
        let mut diag = DiagRecorder::new(false);
        diag.step("ignored");
        diag.warning("ignored");
        diag.download(DownloadRecord {
            url: "http://example.invalid/x".into(),
            cache_key: "x".into(),
            size_bytes: 1,
            elapsed_ms: 0,
            fetched_at: Utc::now(),
            outcome: TransferOutcome::Fetched,
        });
        let snap = diag.finalize();
        assert!(snap.processing_steps.is_empty());
        assert!(snap.warnings.is_empty());
        assert!(snap.download_diagnostics.is_empty());
    }
}
