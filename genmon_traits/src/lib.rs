pub mod clock;
pub mod notify;
pub mod transport;

pub use clock::{Clock, MonotonicClock};
pub use notify::{Category, Notifier};
pub use transport::{Transport, TransportStats};

/// Error type carried across trait boundaries.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
