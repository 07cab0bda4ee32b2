//! Test and helper mocks for genmon_core

use genmon_traits::{Category, Notifier};
use parking_lot::Mutex;

/// One notice captured by [`RecordingNotifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentNotice {
    pub subject: String,
    pub body: String,
    pub category: Category,
}

/// A notifier that keeps every notice in memory.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentNotice>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<SentNotice> {
        self.sent.lock().clone()
    }

    /// Notices whose subject starts with `prefix`.
    pub fn with_subject(&self, prefix: &str) -> Vec<SentNotice> {
        self.sent
            .lock()
            .iter()
            .filter(|n| n.subject.starts_with(prefix))
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }
}

impl Notifier for RecordingNotifier {
    fn send(&self, subject: &str, body: &str, category: Category) {
        self.sent.lock().push(SentNotice {
            subject: subject.to_string(),
            body: body.to_string(),
            category,
        });
    }
}

/// A notifier that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn send(&self, _subject: &str, _body: &str, _category: Category) {}
}
