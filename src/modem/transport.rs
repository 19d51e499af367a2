//! Line-oriented transport to the modem.
//!
//! A [`Transport`] is the open serial session: raw writes, and line reads
//! bounded by a timeout. Opening one is the job of a [`Connect`]
//! implementation so the driver can be pointed at a real port or at the
//! scripted transport used in tests.

use std::io::{self, Read};
#[cfg(feature = "serial")]
use std::io::Write;
use std::time::{Duration, Instant};

#[cfg(feature = "serial")]
use log::debug;
#[cfg(feature = "serial")]
use serialport::SerialPort;

/// An open, line-oriented session with the modem.
///
/// Implementations block for at most `timeout` in [`Transport::read_line`].
/// The driver moves the transport onto the blocking pool for reads, hence
/// the `Send + 'static` bound.
pub trait Transport: Send + 'static {
    /// Write raw bytes. No terminator is appended.
    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Read one line. `Ok(None)` means nothing arrived within `timeout`.
    /// A blank line is `Ok(Some(String::new()))`.
    fn read_line(&mut self, timeout: Duration) -> io::Result<Option<String>>;
}

/// Opens transports. Called once per `Modem::open`.
pub trait Connect: Send + Sync {
    fn connect(&self) -> io::Result<Box<dyn Transport>>;

    /// Human readable target, used in logs and errors.
    fn describe(&self) -> String;
}

/// Decode raw bytes into a trimmed line, dropping anything that is not UTF-8.
pub fn decode_line(raw: &[u8]) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    loop {
        match std::str::from_utf8(rest) {
            Ok(valid) => {
                out.push_str(valid);
                break;
            }
            Err(e) => {
                let (valid, after) = rest.split_at(e.valid_up_to());
                // valid_up_to guarantees this prefix decodes
                out.push_str(std::str::from_utf8(valid).unwrap_or_default());
                let skip = e.error_len().unwrap_or(after.len());
                rest = &after[skip..];
            }
        }
    }
    out.trim().to_string()
}

/// Splits a byte stream into lines, keeping partial data between reads.
#[derive(Debug, Default)]
pub struct LineAssembler {
    pending: Vec<u8>,
}

impl LineAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    /// Take the next complete (`\n`-terminated) line if one is buffered.
    pub fn next_line(&mut self) -> Option<String> {
        let pos = self.pending.iter().position(|&b| b == b'\n')?;
        let line: Vec<u8> = self.pending.drain(..=pos).collect();
        Some(decode_line(&line))
    }

    /// Take whatever partial line is buffered, as a read timeout would.
    pub fn take_partial(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.pending);
        Some(decode_line(&line))
    }
}

/// Read a line from any byte source whose reads time out on their own.
///
/// `set_timeout` is called before every read with the time left until the
/// deadline, so the total wait never exceeds `timeout`.
pub(crate) fn read_line_with<R, F>(
    source: &mut R,
    assembler: &mut LineAssembler,
    timeout: Duration,
    mut set_timeout: F,
) -> io::Result<Option<String>>
where
    R: Read,
    F: FnMut(&mut R, Duration) -> io::Result<()>,
{
    if let Some(line) = assembler.next_line() {
        return Ok(Some(line));
    }
    let deadline = Instant::now() + timeout;
    let mut buf = [0u8; 256];
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(assembler.take_partial());
        }
        set_timeout(source, remaining)?;
        match source.read(&mut buf) {
            Ok(0) => return Ok(assembler.take_partial()),
            Ok(n) => {
                assembler.push(&buf[..n]);
                if let Some(line) = assembler.next_line() {
                    return Ok(Some(line));
                }
            }
            Err(ref e) if e.kind() == io::ErrorKind::TimedOut => {
                return Ok(assembler.take_partial());
            }
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

/// Serial port session backed by the `serialport` crate.
#[cfg(feature = "serial")]
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    assembler: LineAssembler,
}

#[cfg(feature = "serial")]
impl SerialTransport {
    pub fn open(port_name: &str, baud_rate: u32) -> io::Result<Self> {
        debug!("Opening serial port {} at {} baud", port_name, baud_rate);
        // USB modems enumerate as plain 8N1 ACM/option ports
        let mut port = serialport::new(port_name, baud_rate)
            .timeout(Duration::from_millis(1000))
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None)
            .open()
            .map_err(io::Error::from)?;
        let _ = port.write_data_terminal_ready(true);
        let _ = port.write_request_to_send(true);
        Ok(SerialTransport {
            port,
            assembler: LineAssembler::new(),
        })
    }
}

#[cfg(feature = "serial")]
impl Transport for SerialTransport {
    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.port.write_all(bytes)?;
        self.port.flush()
    }

    fn read_line(&mut self, timeout: Duration) -> io::Result<Option<String>> {
        read_line_with(&mut self.port, &mut self.assembler, timeout, |port, left| {
            port.set_timeout(left).map_err(io::Error::from)
        })
    }
}

/// Connector for a serial device path.
#[derive(Debug, Clone)]
pub struct SerialConnector {
    pub port: String,
    pub baud_rate: u32,
}

impl SerialConnector {
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
        }
    }
}

impl Connect for SerialConnector {
    #[cfg(feature = "serial")]
    fn connect(&self) -> io::Result<Box<dyn Transport>> {
        let transport = SerialTransport::open(&self.port, self.baud_rate)?;
        Ok(Box::new(transport))
    }

    #[cfg(not(feature = "serial"))]
    fn connect(&self) -> io::Result<Box<dyn Transport>> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "serial support not compiled in (enable the `serial` feature)",
        ))
    }

    fn describe(&self) -> String {
        format!("{}@{}", self.port, self.baud_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn decode_drops_invalid_bytes_and_trims() {
        let raw = b"+CMT: \"+1555\"\xff\xfe,\"\"\r\n";
        assert_eq!(decode_line(raw), "+CMT: \"+1555\",\"\"");
    }

    #[test]
    fn decode_keeps_multibyte_text() {
        assert_eq!(decode_line("héllo wörld\r\n".as_bytes()), "héllo wörld");
    }

    #[test]
    fn assembler_splits_across_pushes() {
        let mut asm = LineAssembler::new();
        asm.push(b"+CMTI: \"SM\",");
        assert!(asm.next_line().is_none());
        asm.push(b"3\r\nOK\r\n");
        assert_eq!(asm.next_line().as_deref(), Some("+CMTI: \"SM\",3"));
        assert_eq!(asm.next_line().as_deref(), Some("OK"));
        assert!(asm.next_line().is_none());
        assert!(asm.take_partial().is_none());
    }

    #[test]
    fn blank_line_is_distinct_from_timeout() {
        let mut src = Cursor::new(b"\r\nOK\r\n".to_vec());
        let mut asm = LineAssembler::new();
        let first = read_line_with(&mut src, &mut asm, Duration::from_millis(50), |_, _| Ok(()))
            .unwrap();
        assert_eq!(first.as_deref(), Some(""));
        let second = read_line_with(&mut src, &mut asm, Duration::from_millis(50), |_, _| Ok(()))
            .unwrap();
        assert_eq!(second.as_deref(), Some("OK"));
        let third = read_line_with(&mut src, &mut asm, Duration::from_millis(50), |_, _| Ok(()))
            .unwrap();
        assert!(third.is_none());
    }

    #[test]
    fn partial_line_returned_at_end_of_data() {
        let mut src = Cursor::new(b"> ".to_vec());
        let mut asm = LineAssembler::new();
        let line = read_line_with(&mut src, &mut asm, Duration::from_millis(50), |_, _| Ok(()))
            .unwrap();
        assert_eq!(line.as_deref(), Some(">"));
    }

    #[test]
    fn serial_connector_describes_target() {
        let c = SerialConnector::new("/dev/ttyUSB2", 115200);
        assert_eq!(c.describe(), "/dev/ttyUSB2@115200");
    }
}
