//! Physical links: serial lines and Ethernet sockets.
//!
//! Both are plain [std::io] streams underneath. [`StdIo`] lets a [`LineConnection`] talk to
//! them through [embedded_io], so the protocol code never knows which one it is using.

use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use fugit::MillisDurationU32;
use log::info;

use crate::config::InstrumentConfig;
use crate::connection::{Connection, LineConnection};
use crate::error::{Error, Result};

/// Wraps a [std::io] stream so it implements [embedded_io::Read] & [embedded_io::Write].
pub struct StdIo<T>(pub T);

#[derive(Debug)]
pub struct IoError(std::io::Error);

impl core::fmt::Display for IoError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for IoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

impl embedded_io::Error for IoError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self.0.kind() {
            std::io::ErrorKind::NotFound => embedded_io::ErrorKind::NotFound,
            std::io::ErrorKind::PermissionDenied => embedded_io::ErrorKind::PermissionDenied,
            std::io::ErrorKind::ConnectionRefused => embedded_io::ErrorKind::ConnectionRefused,
            std::io::ErrorKind::ConnectionReset => embedded_io::ErrorKind::ConnectionReset,
            std::io::ErrorKind::ConnectionAborted => embedded_io::ErrorKind::ConnectionAborted,
            std::io::ErrorKind::NotConnected => embedded_io::ErrorKind::NotConnected,
            std::io::ErrorKind::AddrInUse => embedded_io::ErrorKind::AddrInUse,
            std::io::ErrorKind::AddrNotAvailable => embedded_io::ErrorKind::AddrNotAvailable,
            std::io::ErrorKind::BrokenPipe => embedded_io::ErrorKind::BrokenPipe,
            std::io::ErrorKind::AlreadyExists => embedded_io::ErrorKind::AlreadyExists,
            std::io::ErrorKind::InvalidInput => embedded_io::ErrorKind::InvalidInput,
            std::io::ErrorKind::InvalidData => embedded_io::ErrorKind::InvalidData,
            // Sockets with a read timeout report WouldBlock on unix.
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
                embedded_io::ErrorKind::TimedOut
            }
            std::io::ErrorKind::Interrupted => embedded_io::ErrorKind::Interrupted,
            std::io::ErrorKind::Unsupported => embedded_io::ErrorKind::Unsupported,
            std::io::ErrorKind::OutOfMemory => embedded_io::ErrorKind::OutOfMemory,
            _ => embedded_io::ErrorKind::Other,
        }
    }
}

impl<T> embedded_io::ErrorType for StdIo<T> {
    type Error = IoError;
}

impl<T: std::io::Read> embedded_io::Read for StdIo<T> {
    fn read(&mut self, buf: &mut [u8]) -> core::result::Result<usize, Self::Error> {
        self.0.read(buf).map_err(IoError)
    }
}

impl<T: std::io::Write> embedded_io::Write for StdIo<T> {
    fn write(&mut self, buf: &[u8]) -> core::result::Result<usize, Self::Error> {
        self.0.write(buf).map_err(IoError)
    }

    fn flush(&mut self) -> core::result::Result<(), Self::Error> {
        self.0.flush().map_err(IoError)
    }
}

/// Longest single blocking read. [LineConnection] enforces the overall deadline across reads.
const READ_SLICE: Duration = Duration::from_millis(50);

fn std_duration(timeout: MillisDurationU32) -> Duration {
    Duration::from_millis(u64::from(timeout.to_millis()))
}

/// Timeout for one read of the underlying stream, never zero.
fn read_slice(timeout: MillisDurationU32) -> Duration {
    std_duration(timeout)
        .min(READ_SLICE)
        .max(Duration::from_millis(1))
}

/// Open the serial line described by `config`.
#[cfg(feature = "serial")]
pub fn open_serial(config: &InstrumentConfig) -> Result<Box<dyn Connection + Send>> {
    use serialport::{DataBits, FlowControl, Parity, StopBits};

    let timeout = config.timeout();
    let port = serialport::new(&config.port, config.baud_rate)
        .data_bits(DataBits::Eight)
        .stop_bits(StopBits::One)
        .flow_control(if config.flow_control {
            FlowControl::Hardware
        } else {
            FlowControl::None
        })
        .parity(if config.parity { Parity::Even } else { Parity::None })
        .timeout(read_slice(timeout))
        .open()
        .map_err(|e| {
            Error::Connection(format!(
                "{}: failed to open serial port '{}' at {} baud: {e}",
                config.id, config.port, config.baud_rate
            ))
        })?;
    info!("Opened serial port '{}' at {} baud", config.port, config.baud_rate);

    let connection: LineConnection<StdIo<Box<dyn serialport::SerialPort>>> =
        LineConnection::new(StdIo(port), config.terminator(), config.suffix(), timeout)
            .with_echo_removal(config.remove_echo);
    Ok(Box::new(connection))
}

#[cfg(not(feature = "serial"))]
pub fn open_serial(config: &InstrumentConfig) -> Result<Box<dyn Connection + Send>> {
    Err(Error::Configuration(format!(
        "{}: serial support not enabled, rebuild with --features serial",
        config.id
    )))
}

/// Open the TCP socket described by `config`.
pub fn open_ethernet(config: &InstrumentConfig) -> Result<Box<dyn Connection + Send>> {
    let timeout = config.timeout();
    let connection_error = |detail: String| {
        Error::Connection(format!(
            "{}: failed to connect to {}:{}: {detail}",
            config.id, config.host, config.ethernet_port
        ))
    };

    let addresses = (config.host.as_str(), config.ethernet_port)
        .to_socket_addrs()
        .map_err(|e| connection_error(e.to_string()))?;

    let mut last_error = String::from("no address resolved");
    let mut stream = None;
    for address in addresses {
        match TcpStream::connect_timeout(&address, std_duration(timeout)) {
            Ok(connected) => {
                stream = Some(connected);
                break;
            }
            Err(e) => last_error = e.to_string(),
        }
    }
    let stream = stream.ok_or_else(|| connection_error(last_error))?;

    stream
        .set_read_timeout(Some(read_slice(timeout)))
        .and_then(|()| stream.set_write_timeout(Some(std_duration(timeout))))
        .and_then(|()| stream.set_nodelay(true))
        .map_err(|e| connection_error(e.to_string()))?;
    info!("Connected to {}:{}", config.host, config.ethernet_port);

    let connection: LineConnection<StdIo<TcpStream>> =
        LineConnection::new(StdIo(stream), config.terminator(), config.suffix(), timeout);
    Ok(Box::new(connection))
}
