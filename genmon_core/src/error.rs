use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GenmonError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("timeout waiting for controller")]
    Timeout,
    #[error("validation error: {0}")]
    Validation(String),
    #[error("connection error: {0}")]
    Connection(String),
    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for GenmonError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;

/// Map a trait-boundary error to a typed `GenmonError`.
///
/// Attempts to downcast the hardware transport error first, then falls back
/// to string-based heuristics.
pub fn map_transport_error(e: &(dyn std::error::Error + 'static)) -> GenmonError {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(te) = e.downcast_ref::<genmon_hardware::error::TransportError>() {
            return match te {
                genmon_hardware::error::TransportError::Timeout => GenmonError::Timeout,
                other => GenmonError::Transport(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    if s.to_lowercase().contains("timeout") {
        GenmonError::Timeout
    } else {
        GenmonError::Transport(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_fallback_detects_timeouts() {
        let e = std::io::Error::other("read timeout on link");
        assert_eq!(map_transport_error(&e), GenmonError::Timeout);
        let e = std::io::Error::other("broken pipe");
        assert!(matches!(map_transport_error(&e), GenmonError::Transport(_)));
    }

    #[cfg(feature = "hardware-errors")]
    #[test]
    fn hardware_timeout_is_downcast() {
        let e = genmon_hardware::error::TransportError::Timeout;
        assert_eq!(map_transport_error(&e), GenmonError::Timeout);
        let e = genmon_hardware::error::TransportError::Crc {
            expected: 1,
            actual: 2,
        };
        assert!(matches!(map_transport_error(&e), GenmonError::Transport(_)));
    }
}
