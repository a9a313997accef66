use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::{info, warn};
use utils::normalized_path_from_user_string;

use crate::{ProgressLog, ProgressMeter};

/// Point-in-time view of a [`TransferMeter`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MeterSnapshot {
    pub started: bool,
    pub finished: bool,

    /// Distinct objects handed to a transfer adapter.
    pub transfers_started: u64,
    pub transfers_finished: u64,

    pub skipped_files: u64,
    pub skipped_bytes: u64,

    /// Sum of the byte increments reported through `transfer_bytes`.
    pub transferred_bytes: u64,
}

/// Counts transfer events and optionally mirrors byte progress into a [`ProgressLog`].
#[derive(Debug, Default)]
pub struct TransferMeter {
    dry_run: bool,
    started: AtomicBool,
    finished: AtomicBool,
    transfers_finished: AtomicU64,
    skipped_files: AtomicU64,
    skipped_bytes: AtomicU64,
    transferred_bytes: AtomicU64,

    // 1-based position of each object in the order transfers were started.
    file_index: Mutex<HashMap<String, u64>>,

    progress_log: Option<ProgressLog>,
}

impl TransferMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_progress_log(mut self, log: ProgressLog) -> Self {
        self.progress_log = Some(log);
        self
    }

    /// Builds a meter from the optional progress log setting.  A log that cannot be opened
    /// is reported and otherwise ignored; progress reporting never fails a transfer.
    pub fn from_progress_log_setting(setting: Option<&str>) -> Self {
        let meter = Self::new();
        let Some(setting) = setting.filter(|s| !s.is_empty()) else {
            return meter;
        };

        match ProgressLog::open(normalized_path_from_user_string(setting)) {
            Ok(log) => meter.with_progress_log(log),
            Err(e) => {
                warn!("Unable to open progress log {setting:?}: {e}");
                meter
            },
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn snapshot(&self) -> MeterSnapshot {
        MeterSnapshot {
            started: self.started.load(Ordering::Acquire),
            finished: self.finished.load(Ordering::Acquire),
            transfers_started: self.file_index.lock().len() as u64,
            transfers_finished: self.transfers_finished.load(Ordering::Relaxed),
            skipped_files: self.skipped_files.load(Ordering::Relaxed),
            skipped_bytes: self.skipped_bytes.load(Ordering::Relaxed),
            transferred_bytes: self.transferred_bytes.load(Ordering::Relaxed),
        }
    }
}

impl ProgressMeter for TransferMeter {
    fn start(&self) {
        self.started.store(true, Ordering::Release);
    }

    fn transfer_bytes(&self, direction: &str, name: &str, read: u64, total: u64, current: u64) {
        self.transferred_bytes.fetch_add(current, Ordering::Relaxed);

        let Some(log) = &self.progress_log else {
            return;
        };

        let (index, total_files) = {
            let index = self.file_index.lock();
            (index.get(name).copied().unwrap_or(0), index.len() as u64)
        };
        log.write_progress(direction, index, total_files, read, total, name);
    }

    fn start_transfer(&self, name: &str) {
        let mut index = self.file_index.lock();
        let next = index.len() as u64 + 1;
        index.entry(name.to_owned()).or_insert(next);
    }

    fn finish_transfer(&self, _name: &str) {
        self.transfers_finished.fetch_add(1, Ordering::Relaxed);
    }

    fn skip(&self, size: u64) {
        self.skipped_files.fetch_add(1, Ordering::Relaxed);
        self.skipped_bytes.fetch_add(size, Ordering::Relaxed);
    }

    fn finish(&self) {
        if self.finished.swap(true, Ordering::AcqRel) {
            return;
        }

        if let Some(log) = &self.progress_log {
            log.flush();
        }

        let s = self.snapshot();
        if self.dry_run {
            info!("Dry run: {} objects would be transferred, {} skipped", s.transfers_finished, s.skipped_files);
        } else {
            info!(
                "Transferred {} of {} objects ({} bytes), {} skipped ({} bytes)",
                s.transfers_finished, s.transfers_started, s.transferred_bytes, s.skipped_files, s.skipped_bytes
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use more_asserts::assert_le;

    use super::*;

    #[test]
    fn test_counters() {
        let meter = TransferMeter::new();
        assert_eq!(meter.snapshot(), MeterSnapshot::default());

        meter.start();
        meter.start_transfer("a");
        meter.start_transfer("b");
        // A retried object keeps its original position.
        meter.start_transfer("a");
        meter.transfer_bytes("upload", "a", 10, 20, 10);
        meter.transfer_bytes("upload", "a", 20, 20, 10);
        meter.finish_transfer("a");
        meter.skip(100);
        meter.finish();

        let s = meter.snapshot();
        assert!(s.started);
        assert!(s.finished);
        assert_eq!(s.transfers_started, 2);
        assert_eq!(s.transfers_finished, 1);
        assert_eq!(s.skipped_files, 1);
        assert_eq!(s.skipped_bytes, 100);
        assert_eq!(s.transferred_bytes, 20);
        assert_le!(s.transfers_finished, s.transfers_started);
    }

    #[test]
    fn test_progress_log_lines() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("progress.log");

        let meter = TransferMeter::from_progress_log_setting(path.to_str());
        meter.start_transfer("first.bin");
        meter.start_transfer("second.bin");
        meter.transfer_bytes("download", "second.bin", 5, 10, 5);
        meter.transfer_bytes("download", "first.bin", 3, 3, 3);
        meter.finish();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "download 2/2 5/10 second.bin\ndownload 1/2 3/3 first.bin\n");
    }

    #[test]
    fn test_unusable_progress_log_is_ignored() {
        let meter = TransferMeter::from_progress_log_setting(Some(""));
        assert!(meter.progress_log.is_none());

        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("not_a_dir");
        std::fs::write(&file, b"x").unwrap();
        let meter = TransferMeter::from_progress_log_setting(file.join("progress.log").to_str());
        assert!(meter.progress_log.is_none());
    }

    #[test]
    fn test_dry_run_flag() {
        let meter = TransferMeter::new().with_dry_run(true);
        assert!(meter.is_dry_run());
        meter.finish();
        meter.finish();
        assert!(meter.snapshot().finished);
    }
}
