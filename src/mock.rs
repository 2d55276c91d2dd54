//! We use this mocking module in unit tests to emulate instrument links.
//!
//! [`MockSerial`] emulates a serial port at byte level for [`LineConnection`](crate::connection::LineConnection).
//! [`FakeConnection`] emulates a whole instrument behind the [`Connection`] contract and records
//! every exchange, in order, into a [`FakeLog`] the test keeps a handle to.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use crate::connection::Connection;
use crate::error::{Error, Result};

/// Our mock type used to emulate a serial port.
pub struct MockSerial {
    /// Buffer to store data written to the mock serial port
    write_buffer: heapless::Vec<u8, 256>,
    /// Buffer containing pre-configured response data to be read
    read_buffer: heapless::Vec<u8, 256>,
    /// Current position in the read buffer
    read_position: usize,
    /// Flag to simulate write errors
    should_error_on_write: bool,
    /// Flag to simulate read errors
    should_error_on_read: bool,
    /// Report end of stream instead of a timeout once the read data is drained
    end_of_stream: bool,
}

#[derive(Debug)]
pub enum MockSerialError {
    /// Simulated timeout, also returned once the read data is drained
    Timeout,
    /// Simulated buffer overflow
    BufferOverflow,
    /// Generic simulated error for testing
    SimulatedError,
}

impl core::fmt::Display for MockSerialError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl std::error::Error for MockSerialError {}

impl embedded_io::Error for MockSerialError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self {
            MockSerialError::Timeout => embedded_io::ErrorKind::TimedOut,
            MockSerialError::BufferOverflow => embedded_io::ErrorKind::OutOfMemory,
            MockSerialError::SimulatedError => embedded_io::ErrorKind::Other,
        }
    }
}

impl embedded_io::ErrorType for MockSerial {
    type Error = MockSerialError;
}

impl embedded_io::Write for MockSerial {
    fn write(&mut self, buf: &[u8]) -> core::result::Result<usize, Self::Error> {
        if self.should_error_on_write {
            return Err(MockSerialError::SimulatedError);
        }
        self.write_buffer
            .extend_from_slice(buf)
            .map_err(|_| MockSerialError::BufferOverflow)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> core::result::Result<(), Self::Error> {
        if self.should_error_on_write {
            return Err(MockSerialError::SimulatedError);
        }
        Ok(())
    }
}

impl embedded_io::Read for MockSerial {
    fn read(&mut self, buf: &mut [u8]) -> core::result::Result<usize, Self::Error> {
        if self.should_error_on_read {
            return Err(MockSerialError::SimulatedError);
        }

        if self.read_position >= self.read_buffer.len() {
            return if self.end_of_stream {
                Ok(0)
            } else {
                Err(MockSerialError::Timeout)
            };
        }

        let available = &self.read_buffer[self.read_position..];
        let bytes_to_read = core::cmp::min(buf.len(), available.len());
        buf[..bytes_to_read].copy_from_slice(&available[..bytes_to_read]);
        self.read_position += bytes_to_read;
        Ok(bytes_to_read)
    }
}

impl MockSerial {
    /// Create a new MockSerial instance with empty buffers
    pub fn new() -> Self {
        Self {
            write_buffer: heapless::Vec::new(),
            read_buffer: heapless::Vec::new(),
            read_position: 0,
            should_error_on_write: false,
            should_error_on_read: false,
            end_of_stream: false,
        }
    }

    /// Set the data that will be returned when read() is called
    pub fn set_read_data(&mut self, data: &[u8]) -> core::result::Result<(), MockSerialError> {
        self.read_buffer.clear();
        self.read_position = 0;
        self.read_buffer
            .extend_from_slice(data)
            .map_err(|_| MockSerialError::BufferOverflow)
    }

    /// Get a reference to the data that was written to this mock serial port
    pub fn written_data(&self) -> &[u8] {
        &self.write_buffer
    }

    /// Configure whether write operations should fail with an error
    pub fn set_write_error(&mut self, should_error: bool) {
        self.should_error_on_write = should_error;
    }

    /// Configure whether read operations should fail with an error
    pub fn set_read_error(&mut self, should_error: bool) {
        self.should_error_on_read = should_error;
    }

    /// Configure whether a drained read buffer looks like a hung up peer
    pub fn set_end_of_stream(&mut self, end_of_stream: bool) {
        self.end_of_stream = end_of_stream;
    }
}

/// One transaction as seen by a [`FakeConnection`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exchange {
    Write(String),
    Query(String),
}

/// Shared, ordered record of everything sent over a [`FakeConnection`].
#[derive(Debug, Clone, Default)]
pub struct FakeLog(Arc<Mutex<Vec<Exchange>>>);

impl FakeLog {
    pub fn exchanges(&self) -> Vec<Exchange> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Just the text of every exchange, writes and queries alike.
    pub fn sent(&self) -> Vec<String> {
        self.exchanges()
            .into_iter()
            .map(|exchange| match exchange {
                Exchange::Write(text) | Exchange::Query(text) => text,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    fn push(&self, exchange: Exchange) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(exchange);
    }
}

/// A pretend instrument.
///
/// Queries are answered from scripted responses first. Otherwise a `"<header> <value>"` write
/// is remembered and answers a later `"<header>?"` query, headers compared case-insensitively,
/// the way a settings register of a real instrument would.
pub struct FakeConnection {
    log: FakeLog,
    /// Query text => queued answers. The last answer repeats.
    scripted: HashMap<String, VecDeque<String>>,
    settings: HashMap<String, String>,
    open: bool,
}

impl FakeConnection {
    pub fn new() -> Self {
        Self {
            log: FakeLog::default(),
            scripted: HashMap::new(),
            settings: HashMap::new(),
            open: true,
        }
    }

    /// A link that never came up.
    pub fn closed() -> Self {
        Self {
            open: false,
            ..Self::new()
        }
    }

    pub fn log(&self) -> FakeLog {
        self.log.clone()
    }

    /// Queue an answer for `query`. Terminators are appended like a real instrument would.
    pub fn respond(mut self, query: &str, response: &str) -> Self {
        self.scripted
            .entry(query.to_string())
            .or_default()
            .push_back(format!("{response}\r\n"));
        self
    }

    pub fn boxed(self) -> Box<dyn Connection + Send> {
        Box::new(self)
    }
}

impl Connection for FakeConnection {
    fn write(&mut self, command: &str) -> Result<()> {
        if !self.open {
            return Err(Error::Closed);
        }
        self.log.push(Exchange::Write(command.to_string()));
        if let Some((header, value)) = command.split_once(' ') {
            self.settings
                .insert(header.to_ascii_uppercase(), value.to_string());
        }
        Ok(())
    }

    fn read(&mut self, query: &str) -> Result<String> {
        if !self.open {
            return Err(Error::Closed);
        }
        self.log.push(Exchange::Query(query.to_string()));

        if let Some(queue) = self.scripted.get_mut(query) {
            let answer = if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            };
            if let Some(answer) = answer {
                return Ok(answer);
            }
        }

        query
            .strip_suffix('?')
            .and_then(|header| self.settings.get(&header.to_ascii_uppercase()))
            .map(|value| format!("{value}\r\n"))
            .ok_or(Error::Timeout)
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn close(&mut self) {
        self.open = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_io::{Error as _, Read, Write};

    #[test]
    fn test_write_data() {
        let mut mock = MockSerial::new();
        let test_data = b"Hello, World!";

        let result = mock.write(test_data);
        assert_eq!(result.unwrap(), test_data.len());
        assert_eq!(mock.written_data(), test_data);
    }

    #[test]
    fn test_read_partial_data() {
        let mut mock = MockSerial::new();
        mock.set_read_data(b"Long response data").unwrap();

        let mut buffer = [0u8; 5];
        assert_eq!(mock.read(&mut buffer).unwrap(), 5);
        assert_eq!(&buffer, b"Long ");
    }

    #[test]
    fn test_read_timeout_after_data_exhausted() {
        let mut mock = MockSerial::new();
        mock.set_read_data(b"Hi").unwrap();

        let mut buffer = [0u8; 10];
        assert!(mock.read(&mut buffer).is_ok());
        let err = mock.read(&mut buffer).unwrap_err();
        assert!(matches!(err.kind(), embedded_io::ErrorKind::TimedOut));
    }

    #[test]
    fn test_error_simulation() {
        let mut mock = MockSerial::new();
        mock.set_read_data(b"test data").unwrap();
        mock.set_read_error(true);
        mock.set_write_error(true);

        let mut buffer = [0u8; 10];
        assert!(matches!(
            mock.read(&mut buffer),
            Err(MockSerialError::SimulatedError)
        ));
        assert!(matches!(mock.write(b"x"), Err(MockSerialError::SimulatedError)));
        assert!(mock.written_data().is_empty());
    }

    #[test]
    fn fake_connection_remembers_settings() {
        let mut fake = FakeConnection::new();
        fake.write(":source:voltage 5e+00").unwrap();
        assert_eq!(fake.read(":SOURCE:VOLTAGE?").unwrap(), "5e+00\r\n");
        assert!(matches!(fake.read(":meas:volt?"), Err(Error::Timeout)));
    }

    #[test]
    fn fake_connection_scripted_answers() {
        let mut fake = FakeConnection::new()
            .respond("OUTP?", "0")
            .respond("OUTP?", "1");
        let log = fake.log();

        assert_eq!(fake.read("OUTP?").unwrap(), "0\r\n");
        assert_eq!(fake.read("OUTP?").unwrap(), "1\r\n");
        // Last answer sticks.
        assert_eq!(fake.read("OUTP?").unwrap(), "1\r\n");
        assert_eq!(log.exchanges().len(), 3);
    }

    #[test]
    fn closed_fake_connection() {
        let mut fake = FakeConnection::closed();
        assert!(!fake.is_open());
        assert!(matches!(fake.write("*RST"), Err(Error::Closed)));
    }
}
