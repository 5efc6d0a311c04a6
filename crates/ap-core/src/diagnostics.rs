//! Last-resort record of failures that could not be written to an Action.

use std::path::PathBuf;
use std::sync::Mutex;

use chrono::Utc;

/// Sink for a terminal-status write that itself failed. Called at most once
/// per Action; must not fail.
pub trait DiagnosticSink: Send + Sync {
    fn record(&self, action_id: &str, error: &str, after: Option<&str>);
}

/// Logs at `error` and appends one line to a file.
pub struct FileSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }
}

impl DiagnosticSink for FileSink {
    fn record(&self, action_id: &str, error: &str, after: Option<&str>) {
        tracing::error!(action_id, error, after, "failed to write terminal status");
        let line = match after {
            Some(prior) => format!(
                "{} error updating status on {action_id}: '{error}' after error '{prior}'\n",
                Utc::now().to_rfc3339()
            ),
            None => format!(
                "{} error updating status on {action_id}: '{error}'\n",
                Utc::now().to_rfc3339()
            ),
        };
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        if let Err(e) = crate::io::append_text(&self.path, &line) {
            tracing::error!(path = %self.path.display(), error = %e, "diagnostic log unwritable");
        }
    }
}
