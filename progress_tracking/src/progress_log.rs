use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::warn;

/// Append-only progress file for external tools, one line per progress event:
///
/// `<direction> <index>/<total files> <bytes read>/<object size> <name>`
#[derive(Debug)]
pub struct ProgressLog {
    path: PathBuf,
    writer: Mutex<Option<BufWriter<File>>>,
}

impl ProgressLog {
    /// Opens (or creates) the file at `path` for appending.  The path must be absolute.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        if !path.is_absolute() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("progress log path {path:?} must be absolute"),
            ));
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(Some(BufWriter::new(file))),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_progress(&self, direction: &str, index: u64, total_files: u64, read: u64, total: u64, name: &str) {
        let mut guard = self.writer.lock();
        let Some(writer) = guard.as_mut() else {
            return;
        };

        let line = format!("{direction} {index}/{total_files} {read}/{total} {name}\n");
        if let Err(e) = writer.write_all(line.as_bytes()) {
            // Stop writing after the first failure rather than warning on every event.
            warn!("Error writing progress log {:?} ({e}); disabling progress log.", self.path);
            *guard = None;
        }
    }

    pub fn flush(&self) {
        if let Some(writer) = self.writer.lock().as_mut() {
            if let Err(e) = writer.flush() {
                warn!("Error flushing progress log {:?}: {e}", self.path);
            }
        }
    }
}
