/// Severity bucket for an outgoing notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Info,
    Warning,
    Alert,
    /// Raw register change, usually only interesting while debugging.
    Register,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Alert => "alert",
            Self::Register => "register",
        }
    }
}

/// Sink for operator notices (mail, chat, log, ...).
pub trait Notifier: Send + Sync {
    fn send(&self, subject: &str, body: &str, category: Category);
}
