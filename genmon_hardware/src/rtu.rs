//! Modbus-RTU master framing over any byte stream.
//!
//! Only the two function codes the controller understands are supported:
//! 0x03 (read holding registers) and 0x10 (write multiple registers).
//! Frames carry a CRC-16/MODBUS trailer, low byte first.

use crate::error::{Result, TransportError};
use crate::util::to_hex;
use crc::{CRC_16_MODBUS, Crc};
use genmon_traits::{BoxError, Transport, TransportStats};
use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

/// Slave address the controller answers to out of the box.
pub const DEFAULT_SLAVE_ADDRESS: u8 = 0x9d;
pub const FN_READ_HOLDING: u8 = 0x03;
pub const FN_WRITE_MULTIPLE: u8 = 0x10;
const EXCEPTION_BIT: u8 = 0x80;
/// Largest register count that fits a single write frame.
const MAX_WRITE_WORDS: u16 = 123;

const MODBUS_CRC: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

#[inline]
pub fn crc16(bytes: &[u8]) -> u16 {
    MODBUS_CRC.checksum(bytes)
}

fn append_crc(frame: &mut Vec<u8>) {
    let crc = crc16(frame);
    frame.extend_from_slice(&crc.to_le_bytes());
}

/// Verify the trailing CRC of a complete frame.
pub fn check_crc(frame: &[u8]) -> Result<()> {
    if frame.len() < 4 {
        return Err(TransportError::Frame(format!(
            "frame too short ({} bytes)",
            frame.len()
        )));
    }
    let (body, tail) = frame.split_at(frame.len() - 2);
    let expected = crc16(body);
    let actual = u16::from_le_bytes([tail[0], tail[1]]);
    if expected != actual {
        return Err(TransportError::Crc { expected, actual });
    }
    Ok(())
}

pub fn read_request(slave: u8, address: u16, words: u16) -> Vec<u8> {
    let mut frame = Vec::with_capacity(8);
    frame.push(slave);
    frame.push(FN_READ_HOLDING);
    frame.extend_from_slice(&address.to_be_bytes());
    frame.extend_from_slice(&words.to_be_bytes());
    append_crc(&mut frame);
    frame
}

pub fn write_request(slave: u8, address: u16, words: u16, data: &[u8]) -> Result<Vec<u8>> {
    let expected = usize::from(words) * 2;
    if data.len() != expected {
        return Err(TransportError::Length {
            expected,
            actual: data.len(),
        });
    }
    if words == 0 || words > MAX_WRITE_WORDS {
        return Err(TransportError::Frame(format!(
            "cannot write {words} registers in one frame"
        )));
    }
    let mut frame = Vec::with_capacity(9 + data.len());
    frame.push(slave);
    frame.push(FN_WRITE_MULTIPLE);
    frame.extend_from_slice(&address.to_be_bytes());
    frame.extend_from_slice(&words.to_be_bytes());
    // bounded by MAX_WRITE_WORDS above
    frame.push((words * 2) as u8);
    frame.extend_from_slice(data);
    append_crc(&mut frame);
    Ok(frame)
}

/// Byte stream with an adjustable read deadline.
pub trait Link: Read + Write + Send {
    fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()>;

    /// Discard unread input, returning the number of bytes dropped.
    fn drain(&mut self) -> io::Result<usize> {
        Ok(0)
    }
}

impl Link for TcpStream {
    fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        Self::set_read_timeout(self, Some(timeout.max(Duration::from_millis(1))))
    }

    fn drain(&mut self) -> io::Result<usize> {
        self.set_nonblocking(true)?;
        let mut buf = [0u8; 256];
        let mut total = 0;
        let outcome = loop {
            match self.read(&mut buf) {
                Ok(0) => break Ok(total),
                Ok(n) => total += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break Ok(total),
                Err(e) => break Err(e),
            }
        };
        self.set_nonblocking(false)?;
        outcome
    }
}

fn map_io(e: io::Error) -> TransportError {
    match e.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => TransportError::Timeout,
        _ => TransportError::Io(e),
    }
}

/// Modbus-RTU master bound to one slave address.
pub struct RtuTransport<L> {
    link: L,
    slave: u8,
    opened: Instant,
    stats: TransportStats,
}

impl RtuTransport<TcpStream> {
    /// Connect to a TCP serial bridge (raw RTU bytes, no MBAP header).
    pub fn connect_tcp(host: &str, port: u16, slave: u8, timeout: Duration) -> Result<Self> {
        let addr = (host, port).to_socket_addrs()?.next().ok_or_else(|| {
            TransportError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no address for {host}:{port}"),
            ))
        })?;
        let stream = TcpStream::connect_timeout(&addr, timeout)?;
        stream.set_nodelay(true)?;
        tracing::info!(%addr, slave, "connected to serial bridge");
        Ok(Self::new(stream, slave))
    }
}

impl<L: Link> RtuTransport<L> {
    pub fn new(link: L, slave: u8) -> Self {
        Self {
            link,
            slave,
            opened: Instant::now(),
            stats: TransportStats::default(),
        }
    }

    pub fn slave(&self) -> u8 {
        self.slave
    }

    fn transact(&mut self, request: &[u8], timeout: Duration) -> Result<Vec<u8>> {
        let started = Instant::now();
        self.link.set_read_timeout(timeout).map_err(map_io)?;
        self.link.write_all(request).map_err(map_io)?;
        self.link.flush().map_err(map_io)?;
        self.stats.tx_packets += 1;

        match self.read_response(request[1]) {
            Ok(frame) => {
                self.stats.rx_packets += 1;
                self.stats.transaction_time += started.elapsed();
                Ok(frame)
            }
            Err(e) => {
                match &e {
                    TransportError::Timeout => self.stats.timeouts += 1,
                    TransportError::Crc { .. } => self.stats.crc_errors += 1,
                    _ => {}
                }
                self.resync();
                Err(e)
            }
        }
    }

    fn resync(&mut self) {
        match self.link.drain() {
            Ok(n) => self.stats.discarded_bytes += n as u64,
            Err(e) => tracing::warn!(?e, "failed to drain link after bad frame"),
        }
        self.stats.restarts += 1;
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.link.read_exact(buf).map_err(map_io)
    }

    fn read_response(&mut self, function: u8) -> Result<Vec<u8>> {
        let mut frame = vec![0u8; 2];
        self.read_exact(&mut frame)?;
        if frame[0] != self.slave {
            return Err(TransportError::Frame(format!(
                "unexpected slave address {:#04x}",
                frame[0]
            )));
        }

        let remaining = if frame[1] == function | EXCEPTION_BIT {
            3
        } else if frame[1] != function {
            return Err(TransportError::Frame(format!(
                "unexpected function {:#04x}",
                frame[1]
            )));
        } else if function == FN_READ_HOLDING {
            let mut count = [0u8; 1];
            self.read_exact(&mut count)?;
            frame.push(count[0]);
            usize::from(count[0]) + 2
        } else {
            6
        };

        let start = frame.len();
        frame.resize(start + remaining, 0);
        self.read_exact(&mut frame[start..])?;
        check_crc(&frame)?;

        if frame[1] & EXCEPTION_BIT != 0 {
            return Err(TransportError::Exception {
                function,
                code: frame[2],
            });
        }
        Ok(frame)
    }
}

impl<L: Link> Transport for RtuTransport<L> {
    fn read_registers(
        &mut self,
        address: u16,
        words: u16,
        timeout: Duration,
    ) -> std::result::Result<String, BoxError> {
        let request = read_request(self.slave, address, words);
        let frame = self.transact(&request, timeout)?;
        let count = usize::from(frame[2]);
        let expected = usize::from(words) * 2;
        if count != expected {
            return Err(TransportError::Length {
                expected,
                actual: count,
            }
            .into());
        }
        Ok(to_hex(&frame[3..3 + count]))
    }

    fn write_registers(
        &mut self,
        address: u16,
        words: u16,
        data: &[u8],
        timeout: Duration,
    ) -> std::result::Result<(), BoxError> {
        let request = write_request(self.slave, address, words, data)?;
        let frame = self.transact(&request, timeout)?;
        let echoed = u16::from_be_bytes([frame[2], frame[3]]);
        if echoed != address {
            return Err(TransportError::Frame(format!(
                "write acknowledged register {echoed:04x}, expected {address:04x}"
            ))
            .into());
        }
        Ok(())
    }

    fn stats(&self) -> TransportStats {
        TransportStats {
            elapsed: self.opened.elapsed(),
            ..self.stats
        }
    }

    fn flush(&mut self) -> std::result::Result<(), BoxError> {
        let dropped = self.link.drain()?;
        self.stats.discarded_bytes += dropped as u64;
        Ok(())
    }
}
