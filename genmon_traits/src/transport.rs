//! Register-level request/response link to the generator controller.

use crate::BoxError;
use std::time::Duration;

/// Link counters reported by the monitor surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportStats {
    /// Requests sent (master packets).
    pub tx_packets: u64,
    /// Valid responses received (slave packets).
    pub rx_packets: u64,
    pub crc_errors: u64,
    pub timeouts: u64,
    /// Bytes thrown away while resynchronising after a bad frame.
    pub discarded_bytes: u64,
    /// Times the link was flushed or reopened after an error.
    pub restarts: u64,
    /// Time since the link was opened.
    pub elapsed: Duration,
    /// Sum of request-to-response times over all successful transactions.
    pub transaction_time: Duration,
}

/// A half-duplex register transport.
///
/// Implementations are not required to be thread-safe; callers serialise
/// access through a single lock.
pub trait Transport: Send {
    /// Read `words` 16-bit registers starting at `address`.
    ///
    /// Returns lowercase hex text of length `4 * words`.
    fn read_registers(
        &mut self,
        address: u16,
        words: u16,
        timeout: Duration,
    ) -> Result<String, BoxError>;

    /// Write `words` 16-bit registers starting at `address`.
    ///
    /// `data.len()` must equal `2 * words`.
    fn write_registers(
        &mut self,
        address: u16,
        words: u16,
        data: &[u8],
        timeout: Duration,
    ) -> Result<(), BoxError>;

    fn stats(&self) -> TransportStats;

    /// Drop any buffered bytes on the link.
    fn flush(&mut self) -> Result<(), BoxError> {
        Ok(())
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn read_registers(
        &mut self,
        address: u16,
        words: u16,
        timeout: Duration,
    ) -> Result<String, BoxError> {
        (**self).read_registers(address, words, timeout)
    }

    fn write_registers(
        &mut self,
        address: u16,
        words: u16,
        data: &[u8],
        timeout: Duration,
    ) -> Result<(), BoxError> {
        (**self).write_registers(address, words, data, timeout)
    }

    fn stats(&self) -> TransportStats {
        (**self).stats()
    }

    fn flush(&mut self) -> Result<(), BoxError> {
        (**self).flush()
    }
}
