//! Notices go to the log; mail and chat delivery are left to log shippers.

use genmon_traits::{Category, Notifier};

#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, subject: &str, body: &str, category: Category) {
        let body = body.trim();
        match category {
            Category::Alert => tracing::error!(target: "genmon::notice", subject, body, "notice"),
            Category::Warning => tracing::warn!(target: "genmon::notice", subject, body, "notice"),
            Category::Info => tracing::info!(target: "genmon::notice", subject, body, "notice"),
            Category::Register => {
                tracing::debug!(target: "genmon::notice", subject, body, "notice");
            }
        }
    }
}
