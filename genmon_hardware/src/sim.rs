//! In-memory controller used by tests, demos and `transport.kind = "sim"`.
//!
//! The register map is shared through [`SimHandle`], so a test can keep a
//! handle, hand the boxed transport to the monitor, and then poke values or
//! inspect the requests the monitor made.

use crate::error::{Result, TransportError};
use crate::rtu::{self, FN_READ_HOLDING, FN_WRITE_MULTIPLE, Link};
use crate::util::words_to_hex;
use genmon_traits::{BoxError, Transport, TransportStats};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};

const COMMAND_INDEX: u16 = 0x0003;
const COMMAND_VALUE: u16 = 0x0004;
const STATUS_HIGH_WORD: u16 = 0x0001;

/// One write observed by the simulated controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    pub address: u16,
    pub data: Vec<u8>,
}

#[derive(Debug, Default)]
struct SimState {
    words: HashMap<u16, u16>,
    reads: Vec<(u16, u16)>,
    writes: Vec<WriteRecord>,
    failing: HashSet<u16>,
    offline: bool,
    stats: TransportStats,
}

/// Shared view of a simulated controller's registers and request log.
#[derive(Debug, Clone, Default)]
pub struct SimHandle {
    state: Arc<Mutex<SimState>>,
}

impl SimHandle {
    pub fn set_word(&self, address: u16, value: u16) {
        self.state.lock().words.insert(address, value);
    }

    pub fn set_words(&self, address: u16, values: &[u16]) {
        let mut st = self.state.lock();
        for (i, v) in values.iter().enumerate() {
            st.words.insert(address.wrapping_add(i as u16), *v);
        }
    }

    pub fn word(&self, address: u16) -> u16 {
        self.state.lock().words.get(&address).copied().unwrap_or(0)
    }

    /// Every `(address, words)` read request seen so far.
    pub fn reads(&self) -> Vec<(u16, u16)> {
        self.state.lock().reads.clone()
    }

    pub fn writes(&self) -> Vec<WriteRecord> {
        self.state.lock().writes.clone()
    }

    pub fn clear_log(&self) {
        let mut st = self.state.lock();
        st.reads.clear();
        st.writes.clear();
    }

    /// Make reads of `address` time out until [`SimHandle::heal`].
    pub fn fail_register(&self, address: u16) {
        self.state.lock().failing.insert(address);
    }

    pub fn heal(&self) {
        let mut st = self.state.lock();
        st.failing.clear();
        st.offline = false;
    }

    /// Make every request time out.
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
    }

    fn read(&self, address: u16, words: u16) -> Result<Vec<u16>> {
        let mut st = self.state.lock();
        st.reads.push((address, words));
        st.stats.tx_packets += 1;
        if st.offline || st.failing.contains(&address) {
            st.stats.timeouts += 1;
            return Err(TransportError::Timeout);
        }
        st.stats.rx_packets += 1;
        let values = (0..words)
            .map(|i| {
                st.words
                    .get(&address.wrapping_add(i))
                    .copied()
                    .unwrap_or(0)
            })
            .collect();
        Ok(values)
    }

    fn write(&self, address: u16, words: u16, data: &[u8]) -> Result<()> {
        let expected = usize::from(words) * 2;
        if data.len() != expected {
            return Err(TransportError::Length {
                expected,
                actual: data.len(),
            });
        }
        let mut st = self.state.lock();
        st.stats.tx_packets += 1;
        if st.offline {
            st.stats.timeouts += 1;
            return Err(TransportError::Timeout);
        }
        st.stats.rx_packets += 1;
        st.writes.push(WriteRecord {
            address,
            data: data.to_vec(),
        });
        for (i, pair) in data.chunks_exact(2).enumerate() {
            st.words.insert(
                address.wrapping_add(i as u16),
                u16::from_be_bytes([pair[0], pair[1]]),
            );
        }
        if address == COMMAND_INDEX {
            let index = st.words.get(&COMMAND_INDEX).copied().unwrap_or(0);
            apply_remote_command(&mut st.words, index);
        }
        Ok(())
    }

    /// Answer one raw RTU request the way the controller would.
    ///
    /// Returns `None` when the controller stays silent (bad CRC, wrong slave,
    /// injected failure).
    pub fn serve_frame(&self, slave: u8, request: &[u8]) -> Option<Vec<u8>> {
        if request.len() < 8 || request[0] != slave || rtu::check_crc(request).is_err() {
            return None;
        }
        let address = u16::from_be_bytes([request[2], request[3]]);
        let words = u16::from_be_bytes([request[4], request[5]]);
        let mut reply = vec![slave, request[1]];
        match request[1] {
            FN_READ_HOLDING => {
                let values = self.read(address, words).ok()?;
                reply.push(u8::try_from(values.len() * 2).ok()?);
                for v in values {
                    reply.extend_from_slice(&v.to_be_bytes());
                }
            }
            FN_WRITE_MULTIPLE => {
                let count = usize::from(*request.get(6)?);
                let data = request.get(7..7 + count)?;
                if self.write(address, words, data).is_err() {
                    reply[1] |= 0x80;
                    reply.push(0x03);
                } else {
                    reply.extend_from_slice(&request[2..6]);
                }
            }
            _ => {
                reply[1] |= 0x80;
                reply.push(0x01);
            }
        }
        let crc = rtu::crc16(&reply);
        reply.extend_from_slice(&crc.to_le_bytes());
        Some(reply)
    }
}

/// Remote start/stop index protocol: 0 stop, 1 start, 2 start with
/// transfer, 3 quiet exercise. Other indices (legacy exercise 6) only
/// latch the value register.
fn apply_remote_command(words: &mut HashMap<u16, u16>, index: u16) {
    let engine = match index {
        0 => 0x0,
        1 | 2 => 0x3,
        3 => 0x4,
        _ => return,
    };
    let status = words.entry(STATUS_HIGH_WORD).or_insert(0);
    *status = (*status & 0xfff0) | engine;
    tracing::debug!(index, value = words.get(&COMMAND_VALUE).copied().unwrap_or(0), "remote command applied");
}

/// Simulated controller implementing [`Transport`] directly.
#[derive(Debug, Default)]
pub struct SimulatedController {
    handle: SimHandle,
    opened: Option<Instant>,
}

impl SimulatedController {
    pub fn new() -> Self {
        Self::with_handle(SimHandle::default())
    }

    pub fn with_handle(handle: SimHandle) -> Self {
        Self {
            handle,
            opened: Some(Instant::now()),
        }
    }

    /// Controller pre-loaded with plausible registers for the given
    /// controller code (0x03, 0x06, 0x09 or 0x0c).
    pub fn preset(controller: u8) -> Self {
        let sim = Self::new();
        load_preset(&sim.handle, controller);
        sim
    }

    pub fn handle(&self) -> SimHandle {
        self.handle.clone()
    }
}

impl Transport for SimulatedController {
    fn read_registers(
        &mut self,
        address: u16,
        words: u16,
        _timeout: Duration,
    ) -> std::result::Result<String, BoxError> {
        let values = self.handle.read(address, words)?;
        Ok(words_to_hex(&values))
    }

    fn write_registers(
        &mut self,
        address: u16,
        words: u16,
        data: &[u8],
        _timeout: Duration,
    ) -> std::result::Result<(), BoxError> {
        self.handle.write(address, words, data)?;
        Ok(())
    }

    fn stats(&self) -> TransportStats {
        let st = self.handle.state.lock();
        TransportStats {
            elapsed: self.opened.map(|t| t.elapsed()).unwrap_or_default(),
            ..st.stats
        }
    }
}

/// Byte-level loopback that answers RTU frames from a [`SimHandle`].
///
/// Pairs with [`crate::RtuTransport`] to exercise the real framer without
/// a serial port.
#[derive(Debug)]
pub struct SlaveLink {
    handle: SimHandle,
    slave: u8,
    request: Vec<u8>,
    reply: VecDeque<u8>,
    corrupt_next: bool,
    trailing_noise: usize,
}

impl SlaveLink {
    pub fn new(handle: SimHandle, slave: u8) -> Self {
        Self {
            handle,
            slave,
            request: Vec::new(),
            reply: VecDeque::new(),
            corrupt_next: false,
            trailing_noise: 0,
        }
    }

    /// Flip a CRC bit in the next reply.
    pub fn corrupt_next_reply(&mut self) {
        self.corrupt_next = true;
    }

    /// Append `n` junk bytes after the next reply.
    pub fn add_noise(&mut self, n: usize) {
        self.trailing_noise = n;
    }

    fn complete_request_len(&self) -> Option<usize> {
        match self.request.get(1)? {
            &FN_WRITE_MULTIPLE => Some(9 + usize::from(*self.request.get(6)?)),
            _ => Some(8),
        }
    }
}

impl Write for SlaveLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.request.extend_from_slice(buf);
        let Some(len) = self.complete_request_len() else {
            return Ok(buf.len());
        };
        if self.request.len() >= len {
            let request: Vec<u8> = self.request.drain(..len).collect();
            if let Some(mut reply) = self.handle.serve_frame(self.slave, &request) {
                if self.corrupt_next {
                    let last = reply.len() - 1;
                    reply[last] ^= 0x01;
                    self.corrupt_next = false;
                }
                self.reply.extend(reply);
                self.reply
                    .extend(std::iter::repeat_n(0xa5, std::mem::take(&mut self.trailing_noise)));
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Read for SlaveLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.reply.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no reply"));
        }
        let n = buf.len().min(self.reply.len());
        for (slot, byte) in buf.iter_mut().zip(self.reply.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Link for SlaveLink {
    fn set_read_timeout(&mut self, _timeout: Duration) -> io::Result<()> {
        Ok(())
    }

    fn drain(&mut self) -> io::Result<usize> {
        let n = self.reply.len();
        self.reply.clear();
        Ok(n)
    }
}

fn load_preset(handle: &SimHandle, controller: u8) {
    let evolution = controller > 0x06;
    let liquid_cooled = matches!(controller, 0x06 | 0x0c);

    handle.set_word(0x0000, u16::from(controller));
    // status: engine off, switch auto
    handle.set_words(0x0001, &[0x0000, 0x0000]);
    handle.set_word(0x0005, 0x0d1e); // exercise 13:30
    handle.set_word(0x0006, 0x0601); // Saturday, quiet mode on
    handle.set_word(0x0009, 240);
    handle.set_word(0x000a, 137);
    handle.set_words(0x000b, &[0x0000, 112]);
    handle.set_word(0x000e, 0x0c00); // 12:00
    handle.set_word(0x000f, 0x0a11); // October 17
    handle.set_word(0x0010, 0x0318); // Wednesday, 2024
    handle.set_word(0x0011, 143);
    handle.set_word(0x0019, 0x0004);
    handle.set_word(0x001a, 188);
    handle.set_word(0x001b, 20_400);
    handle.set_word(0x001e, 388);
    handle.set_word(0x001f, 20_500);
    handle.set_word(0x002a, 0x0f19);
    handle.set_word(0x002b, 5);

    // serial number 0007722987
    handle.set_words(0x01f4, &[0x3030, 0x3037, 0x3732, 0x3239, 0x3837]);
    // start log: Running - Exercise, 10/17/24 13:30:00
    handle.set_words(0x012c, &[0x2e01, 0x1e0d, 0x0a00, 0x1811]);

    if evolution {
        // alarm log: Low Battery, alarm code 1400
        handle.set_words(0x03e8, &[0x1401, 0x0508, 0x0903, 0x1810, 0x0578]);
        // service log: Service Schedule A
        handle.set_words(0x04e2, &[0x1701, 0x000a, 0x0300, 0x180f]);
    } else {
        handle.set_words(0x0064, &[0x1401, 0x0508, 0x0903, 0x1810]);
    }

    if liquid_cooled {
        handle.set_word(0x005c, 0x000d);
        handle.set_word(0x023b, 190);
        handle.set_word(0x0237, 240);
        handle.set_word(0x0239, 10);
        handle.set_word(0x023e, 12);
        handle.set_words(0x005e, &[0x0000, 6_720]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_start_sets_running_state() {
        let mut sim = SimulatedController::preset(0x09);
        let h = sim.handle();
        let t = Duration::from_millis(10);
        sim.write_registers(0x0004, 1, &[0, 0], t).unwrap();
        sim.write_registers(0x0003, 1, &[0, 1], t).unwrap();
        assert_eq!(h.word(0x0001) & 0x000f, 0x3);
        assert_eq!(sim.read_registers(0x0001, 2, t).unwrap(), "00030000");
    }

    #[test]
    fn failing_register_times_out_and_counts() {
        let mut sim = SimulatedController::new();
        sim.handle().fail_register(0x0009);
        let err = sim
            .read_registers(0x0009, 1, Duration::from_millis(10))
            .unwrap_err();
        assert!(err.to_string().contains("timeout"));
        assert_eq!(sim.stats().timeouts, 1);
    }
}
