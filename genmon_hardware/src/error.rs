use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport timeout")]
    Timeout,
    #[error("crc mismatch: computed {expected:#06x}, received {actual:#06x}")]
    Crc { expected: u16, actual: u16 },
    #[error("malformed frame: {0}")]
    Frame(String),
    #[error("payload length {actual} does not match expected {expected} bytes")]
    Length { expected: usize, actual: usize },
    #[error("controller exception {code:#04x} for function {function:#04x}")]
    Exception { function: u8, code: u8 },
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
