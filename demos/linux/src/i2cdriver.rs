//! Bus transport for the Excamera I2CDriver, an FT230X based USB to I2C bridge.
//!
//! The bridge speaks a small byte protocol over a 1 Mbaud serial link:
//!
//! | command          | meaning                          | reply                 |
//! |------------------|----------------------------------|-----------------------|
//! | `s`, addr<<1\|rw | (repeated) start                 | 1 byte, bit 0 = ACK   |
//! | `0xC0 + n - 1`   | write the following n bytes      | 1 byte, bit 0 = ACK   |
//! | `0x80 + n - 1`   | read n bytes                     | n bytes               |
//! | `p`              | stop                             | none                  |
//! | `e`, byte        | echo                             | the byte              |
//! | `?`              | status                           | 80 ASCII bytes        |
//!
//! n is limited to 64 per command, longer transfers are split.

use std::io::{Read, Write};
use std::time::Duration;

use embedded_hal::i2c::{self, ErrorKind, NoAcknowledgeSource, Operation, SevenBitAddress};
use log::{debug, trace};
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use thiserror::Error;

/// Serial speed of the bridge
pub const BAUD_RATE: u32 = 1_000_000;

const MAX_CHUNK: usize = 64;
const STATUS_LEN: usize = 80;
const ECHO_PROBES: [u8; 4] = [b'A', b'\r', b'\n', 0xFF];

const CMD_START: u8 = b's';
const CMD_STOP: u8 = b'p';
const CMD_ECHO: u8 = b'e';
const CMD_STATUS: u8 = b'?';
const CMD_NOP: u8 = b'@';
const CMD_WRITE: u8 = 0xC0;
const CMD_READ: u8 = 0x80;

/// Errors raised by the bridge
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The serial port could not be opened or configured
    #[error("serial port: {0}")]
    Serial(#[from] serialport::Error),
    /// Reading from or writing to the port failed, including timeouts
    #[error("bridge I/O: {0}")]
    Io(#[from] std::io::Error),
    /// The addressed device did not acknowledge
    #[error("no acknowledge from device {address:#04x} ({stage})")]
    Nack {
        /// 7-bit device address
        address: u8,
        /// Whether the address or a data byte was refused
        stage: NoAcknowledgeSource,
    },
    /// The bridge did not answer the echo handshake; probably not an I2CDriver
    #[error("bridge echoed {received:#04x} instead of {sent:#04x}")]
    EchoMismatch {
        /// Probe byte sent
        sent: u8,
        /// Byte received
        received: u8,
    },
}

impl i2c::Error for BridgeError {
    fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::Nack { stage, .. } => ErrorKind::NoAcknowledge(*stage),
            _ => ErrorKind::Other,
        }
    }
}

/// An I2CDriver bridge speaking over `P`.
///
/// The port is closed when the driver is dropped.
#[derive(Debug)]
pub struct I2cDriver<P = Box<dyn SerialPort>> {
    port: P,
}

impl I2cDriver {
    /// Open the bridge at `path` (e.g. `/dev/ttyUSB0`) and check that it answers
    pub fn open(path: &str, timeout: Duration) -> Result<Self, BridgeError> {
        let mut port = serialport::new(path, BAUD_RATE)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(timeout)
            .open()?;
        port.clear(ClearBuffer::All)?;
        debug!("opened {path} at {BAUD_RATE} baud");
        Self::connect(port)
    }
}

impl<P: Read + Write> I2cDriver<P> {
    /// Take over an already opened port and synchronise with the bridge
    pub fn connect(port: P) -> Result<Self, BridgeError> {
        let mut bridge = Self { port };
        bridge.sync()?;
        Ok(bridge)
    }

    /// Query the bridge status line (model, serial, uptime, voltage, ...)
    pub fn status(&mut self) -> Result<String, BridgeError> {
        self.port.write_all(&[CMD_STATUS])?;
        let mut buf = [0u8; STATUS_LEN];
        self.port.read_exact(&mut buf)?;
        let line = String::from_utf8_lossy(&buf);
        Ok(line
            .trim_matches(|c: char| c == '\0' || c.is_whitespace())
            .to_string())
    }

    /// Give the port back
    pub fn into_inner(self) -> P {
        self.port
    }

    fn sync(&mut self) -> Result<(), BridgeError> {
        // A full chunk of no-ops terminates any command left half-sent
        self.port.write_all(&[CMD_NOP; MAX_CHUNK])?;
        for sent in ECHO_PROBES {
            self.port.write_all(&[CMD_ECHO, sent])?;
            let received = self.read_byte()?;
            if received != sent {
                return Err(BridgeError::EchoMismatch { sent, received });
            }
        }
        Ok(())
    }

    fn read_byte(&mut self) -> Result<u8, BridgeError> {
        let mut byte = [0u8; 1];
        self.port.read_exact(&mut byte)?;
        Ok(byte[0])
    }

    fn ack(&mut self, address: u8, stage: NoAcknowledgeSource) -> Result<(), BridgeError> {
        if self.read_byte()? & 1 == 0 {
            return Err(BridgeError::Nack { address, stage });
        }
        Ok(())
    }

    fn start(&mut self, address: u8, read: bool) -> Result<(), BridgeError> {
        trace!("start {address:#04x} {}", if read { "read" } else { "write" });
        self.port
            .write_all(&[CMD_START, (address << 1) | u8::from(read)])?;
        self.ack(address, NoAcknowledgeSource::Address)
    }

    fn stop(&mut self) -> Result<(), BridgeError> {
        trace!("stop");
        self.port.write_all(&[CMD_STOP])?;
        Ok(())
    }

    fn write_bytes(&mut self, address: u8, bytes: &[u8]) -> Result<(), BridgeError> {
        for chunk in bytes.chunks(MAX_CHUNK) {
            trace!("write {chunk:02x?}");
            self.port.write_all(&[CMD_WRITE + (chunk.len() - 1) as u8])?;
            self.port.write_all(chunk)?;
            self.ack(address, NoAcknowledgeSource::Data)?;
        }
        Ok(())
    }

    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<(), BridgeError> {
        for chunk in buffer.chunks_mut(MAX_CHUNK) {
            self.port.write_all(&[CMD_READ + (chunk.len() - 1) as u8])?;
            self.port.read_exact(chunk)?;
            trace!("read {chunk:02x?}");
        }
        Ok(())
    }

    fn run_operations(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), BridgeError> {
        // Adjacent operations of the same direction share one start condition
        let mut reading = None;
        for operation in operations.iter_mut() {
            let is_read = matches!(operation, Operation::Read(_));
            if reading != Some(is_read) {
                self.start(address, is_read)?;
                reading = Some(is_read);
            }
            match operation {
                Operation::Write(bytes) => self.write_bytes(address, bytes)?,
                Operation::Read(buffer) => self.read_bytes(buffer)?,
            }
        }
        Ok(())
    }
}

impl<P: Read + Write> i2c::ErrorType for I2cDriver<P> {
    type Error = BridgeError;
}

impl<P: Read + Write> i2c::I2c<SevenBitAddress> for I2cDriver<P> {
    fn transaction(
        &mut self,
        address: SevenBitAddress,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        let result = self.run_operations(address, operations);
        // The bus is released even after a NACK
        let stop = self.stop();
        result.and(stop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::i2c::{Error as _, I2c};
    use std::collections::VecDeque;
    use std::io;

    /// Serial port double: replies come from `rx`, everything written lands in `tx`
    #[derive(Default)]
    struct ScriptedPort {
        rx: VecDeque<u8>,
        tx: Vec<u8>,
    }

    impl ScriptedPort {
        fn with_replies(replies: &[u8]) -> Self {
            Self {
                rx: replies.iter().copied().collect(),
                tx: Vec::new(),
            }
        }
    }

    impl Read for ScriptedPort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.rx.is_empty() {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "no reply scripted"));
            }
            let n = buf.len().min(self.rx.len());
            for (slot, byte) in buf.iter_mut().zip(self.rx.drain(..n)) {
                *slot = byte;
            }
            Ok(n)
        }
    }

    impl Write for ScriptedPort {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.tx.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn connected(replies: &[u8]) -> I2cDriver<ScriptedPort> {
        let mut port = ScriptedPort::with_replies(&ECHO_PROBES);
        port.rx.extend(replies);
        let mut bridge = I2cDriver::connect(port).unwrap();
        bridge.port.tx.clear();
        bridge
    }

    #[test]
    fn test_connect_handshake() {
        let bridge = I2cDriver::connect(ScriptedPort::with_replies(&ECHO_PROBES)).unwrap();
        let port = bridge.into_inner();

        let mut expected = vec![b'@'; 64];
        expected.extend_from_slice(b"eAe\re\ne\xff");
        assert_eq!(port.tx, expected);
        assert!(port.rx.is_empty());
    }

    #[test]
    fn test_connect_echo_mismatch() {
        let result = I2cDriver::connect(ScriptedPort::with_replies(b"A\rX"));
        assert!(matches!(
            result,
            Err(BridgeError::EchoMismatch {
                sent: b'\n',
                received: b'X'
            })
        ));
    }

    #[test]
    fn test_connect_silent_port() {
        let result = I2cDriver::connect(ScriptedPort::default());
        assert!(matches!(result, Err(BridgeError::Io(_))));
    }

    #[test]
    fn test_register_read() {
        // start ack, write ack, restart ack, data
        let mut bridge = connected(&[0x01, 0x01, 0x01, 0xB2]);

        let mut buffer = [0u8; 1];
        bridge.write_read(0x53, &[0x06], &mut buffer).unwrap();

        assert_eq!(buffer, [0xB2]);
        assert_eq!(
            bridge.into_inner().tx,
            vec![b's', 0xA6, 0xC0, 0x06, b's', 0xA7, 0x80, b'p']
        );
    }

    #[test]
    fn test_register_write() {
        let mut bridge = connected(&[0x01, 0x01]);

        bridge.write(0x53, &[0x19, 0x30]).unwrap();

        assert_eq!(
            bridge.into_inner().tx,
            vec![b's', 0xA6, 0xC1, 0x19, 0x30, b'p']
        );
    }

    #[test]
    fn test_address_nack_still_stops() {
        let mut bridge = connected(&[0x00]);

        let err = bridge.write(0x1C, &[0x00, 0x02]).unwrap_err();

        assert_eq!(
            err.kind(),
            ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address)
        );
        assert!(matches!(err, BridgeError::Nack { address: 0x1C, .. }));
        assert_eq!(bridge.into_inner().tx, vec![b's', 0x38, b'p']);
    }

    #[test]
    fn test_data_nack() {
        let mut bridge = connected(&[0x01, 0x02]);

        let err = bridge.write(0x53, &[0x00, 0x0A]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data));
    }

    #[test]
    fn test_long_write_is_chunked() {
        let mut bridge = connected(&[0x01, 0x01, 0x01]);
        let payload: Vec<u8> = (0..70).collect();

        bridge.write(0x53, &payload).unwrap();

        let tx = bridge.into_inner().tx;
        assert_eq!(&tx[..3], &[b's', 0xA6, 0xFF]);
        assert_eq!(&tx[3..67], &payload[..64]);
        assert_eq!(tx[67], 0xC5);
        assert_eq!(&tx[68..74], &payload[64..]);
        assert_eq!(tx[74], b'p');
    }

    #[test]
    fn test_status_line() {
        let mut reply = b"[i2cdriver1 DO01JUOV 000000061 4.971 000 23.8 I 1 1 100 24 ffff ]".to_vec();
        reply.resize(STATUS_LEN, b' ');
        let mut bridge = connected(&reply);

        let status = bridge.status().unwrap();
        assert!(status.starts_with("[i2cdriver1"));
        assert!(status.ends_with(']'));
    }
}
