// =============================================================================
// writers/file_writer.rs — THE FILING CABINET
// =============================================================================
//
// Shared plumbing for the writers that append to one file per station.
// Appends to the same file are serialized through a per-path async lock;
// appends to different files run in parallel.
// =============================================================================

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tracing::error;

/// Appends content to per-station files under a base directory.
#[derive(Debug, Default)]
pub struct FileWriter {
    path: String,
    locks: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
}

impl FileWriter {
    pub fn new(path: impl Into<String>) -> Self {
        let mut writer = Self::default();
        writer.set_path(path);
        writer
    }

    /// Set the directory at which the files will be saved.
    /// Always ends with a `/`.
    pub fn set_path(&mut self, path: impl Into<String>) {
        let mut path = path.into();
        if !path.ends_with('/') {
            path.push('/');
        }
        self.path = path;
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Full file path for a normalized station name and extension.
    pub fn station_file(&self, normalized_station: &str, extension: &str) -> PathBuf {
        PathBuf::from(format!("{}{}.{}", self.path, normalized_station, extension))
    }

    fn lock_for(&self, path: &Path) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock();
        Arc::clone(locks.entry(path.to_path_buf()).or_default())
    }

    /// Append `content` to `path`, creating the file if needed.
    ///
    /// Returns `false` if anything went wrong. The error has already been
    /// logged by then; callers only need the flag for their stats.
    pub async fn write_file(&self, path: &Path, content: &[u8], station: &str) -> bool {
        let lock = self.lock_for(path);
        let _guard = lock.lock().await;

        let mut options = tokio::fs::OpenOptions::new();
        options.append(true).create(true);
        #[cfg(unix)]
        options.mode(0o644);

        let mut file = match options.open(path).await {
            Ok(file) => file,
            Err(e) => {
                error!(
                    path = %path.display(),
                    station = station,
                    error = %e,
                    "Error while opening file"
                );
                return false;
            }
        };

        if let Err(e) = file.write_all(content).await {
            error!(
                path = %path.display(),
                station = station,
                error = %e,
                "Error while saving results to file"
            );
            return false;
        }

        if let Err(e) = file.flush().await {
            error!(path = %path.display(), error = %e, "Error while flushing file");
            return false;
        }

        true
    }
}
