//! Reports of things the decoders could not name, kept once per reason.
//!
//! With feedback enabled a report goes straight to the notifier. Otherwise it
//! is written to a JSON file (`reason -> message`) and sent on the next start
//! that has feedback enabled.

use crate::applog;
use genmon_traits::{Category, Notifier};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const SUBMISSION_SUBJECT: &str = "Generator Monitor Submission";

pub struct FeedbackRecorder {
    enabled: bool,
    path: PathBuf,
    messages: Mutex<BTreeMap<String, String>>,
    notifier: Arc<dyn Notifier>,
}

impl FeedbackRecorder {
    /// Load any reports left over from a previous run.
    pub fn open(enabled: bool, path: PathBuf, notifier: Arc<dyn Notifier>) -> Self {
        let messages = match applog::read_or_empty(&path) {
            Ok(s) if s.trim().is_empty() => BTreeMap::new(),
            Ok(s) => serde_json::from_str(&s).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable feedback file");
                BTreeMap::new()
            }),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "read feedback file");
                BTreeMap::new()
            }
        };
        Self {
            enabled,
            path,
            messages: Mutex::new(messages),
            notifier,
        }
    }

    /// Send stored reports and remove the file. No-op while disabled.
    pub fn flush_outstanding(&self) {
        if !self.enabled {
            return;
        }
        for body in self.messages.lock().values() {
            self.notifier.send(SUBMISSION_SUBJECT, body, Category::Warning);
        }
        if self.path.is_file()
            && let Err(e) = std::fs::remove_file(&self.path)
        {
            tracing::error!(path = %self.path.display(), error = %e, "remove feedback file");
        }
    }

    pub fn contains(&self, reason: &str) -> bool {
        self.messages.lock().contains_key(reason)
    }

    /// Whether a report is waiting on disk.
    pub fn has_unsent(&self) -> bool {
        self.path.is_file()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record a report unless one for `reason` exists. `dump` is only
    /// evaluated for new reasons.
    pub fn record(&self, reason: &str, message: Option<&str>, dump: impl FnOnce() -> String) {
        let mut messages = self.messages.lock();
        if messages.contains_key(reason) {
            return;
        }
        let mut body = format!("Reason = {reason}\n");
        if let Some(m) = message {
            body.push_str(&format!("Message : {m}\n"));
        }
        body.push_str(&format!("Version: {}", env!("CARGO_PKG_VERSION")));
        body.push_str(&dump());
        tracing::info!(reason, "feedback recorded");

        if self.enabled {
            self.notifier.send(SUBMISSION_SUBJECT, &body, Category::Warning);
        }
        messages.insert(reason.to_string(), body);
        if !self.enabled
            && let Err(e) = write_json(&self.path, &messages)
        {
            tracing::error!(path = %self.path.display(), error = %e, "write feedback file");
        }
    }
}

/// Sorted keys, four-space indent.
fn write_json(path: &Path, messages: &BTreeMap<String, String>) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let fmt = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, fmt);
    messages.serialize(&mut ser).map_err(std::io::Error::other)?;
    applog::write_atomic(path, &buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::RecordingNotifier;

    #[test]
    fn disabled_writes_file_once_per_reason() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feedback.json");
        let notes = Arc::new(RecordingNotifier::default());
        let fb = FeedbackRecorder::open(false, path.clone(), notes.clone());

        let mut dumps = 0;
        fb.record("Alarm", Some("Reg 0001 = 00000045"), || {
            dumps += 1;
            "\nregs".to_string()
        });
        fb.record("Alarm", Some("other"), || {
            dumps += 1;
            String::new()
        });
        assert_eq!(dumps, 1);
        assert!(fb.has_unsent());
        assert!(notes.sent().is_empty());

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("{\n    \"Alarm\": \"Reason = Alarm\\nMessage : Reg 0001 = 00000045\\nVersion: "));
        let back: BTreeMap<String, String> = serde_json::from_str(&text).unwrap();
        assert!(back["Alarm"].ends_with("\nregs"));
    }

    #[test]
    fn enabled_resends_stored_reports_and_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feedback.json");
        std::fs::write(&path, r#"{"Logs": "Reason = Logs\nVersion: 0"}"#).unwrap();
        let notes = Arc::new(RecordingNotifier::default());
        let fb = FeedbackRecorder::open(true, path.clone(), notes.clone());
        assert!(fb.contains("Logs"));

        fb.flush_outstanding();
        assert!(!path.exists());
        let sent = notes.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, SUBMISSION_SUBJECT);

        fb.record("EngineState", None, String::new);
        assert_eq!(notes.sent().len(), 2);
        assert!(!path.exists());
    }
}
