use std::path::{Path, PathBuf};

pub const DOWNLOAD_FAILED: &str = "Download failed";

/// Callback notified once per `get`, whatever the outcome.
pub trait DownloadListener: Send + Sync {
    fn success(&self, file: &Path);
    fn failure(&self, file: Option<&Path>, reason: &str);
}

pub(crate) fn notify(listeners: &[&dyn DownloadListener], file: Option<&PathBuf>) {
    for listener in listeners {
        match file {
            Some(path) => listener.success(path),
            None => listener.failure(None, DOWNLOAD_FAILED),
        }
    }
}
