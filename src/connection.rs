//! The transport contract consumed by instruments, and a line based implementation of it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use embedded_io::Error as _;
use fugit::MillisDurationU32;
use log::debug;

use crate::error::{Error, Result};
use crate::protocol::clean_response;

/// One physical link to an instrument.
///
/// All calls are blocking and bounded by the link's timeout. Failures are not retried here.
/// A write that succeeded followed by a read that timed out leaves the instrument in whatever
/// state the command put it in; the caller only sees the timeout.
pub trait Connection {
    /// Send a command. No response is expected.
    fn write(&mut self, command: &str) -> Result<()>;

    /// Send a query and return the raw response line, terminators included.
    fn read(&mut self, query: &str) -> Result<String>;

    fn is_open(&self) -> bool;

    /// Drop the link. Every later operation fails with [`Error::Closed`].
    fn close(&mut self) {}
}

/// The link an instrument shares with its channels. The mutex is the unit of exclusivity:
/// a select-then-transact sequence holds it from the selection to the last response.
pub(crate) type SharedConnection = Arc<Mutex<Box<dyn Connection + Send>>>;

pub(crate) fn share(connection: Box<dyn Connection + Send>) -> SharedConnection {
    Arc::new(Mutex::new(connection))
}

/// Lock a shared link. A panic while holding the lock leaves no broken state behind, so a
/// poisoned lock is taken over as is.
pub(crate) fn lock(
    link: &Mutex<Box<dyn Connection + Send>>,
) -> MutexGuard<'_, Box<dyn Connection + Send>> {
    link.lock().unwrap_or_else(PoisonError::into_inner)
}

/// You can create a LineConnection using any interface which implements [embedded_io::Read] & [embedded_io::Write].
///
/// Outgoing text is framed as `command + terminator`. A response line is complete once it ends
/// with the suffix, or with the terminator when no suffix is configured. `L` bounds the length
/// of one response line.
pub struct LineConnection<S: embedded_io::Read + embedded_io::Write, const L: usize = 256> {
    /// `None` once closed.
    interface: Option<S>,
    terminator: String,
    suffix: String,
    timeout: MillisDurationU32,
    /// Some serial instruments echo every command back before answering.
    remove_echo: bool,
}

impl<S: embedded_io::Read + embedded_io::Write, const L: usize> LineConnection<S, L> {
    /// `terminator` and `suffix` are literal bytes, see [crate::protocol::translate_line_ending].
    pub fn new(
        interface: S,
        terminator: impl Into<String>,
        suffix: impl Into<String>,
        timeout: MillisDurationU32,
    ) -> Self {
        Self {
            interface: Some(interface),
            terminator: terminator.into(),
            suffix: suffix.into(),
            timeout,
            remove_echo: false,
        }
    }

    /// Discard the echoed copy of each command the instrument sends back.
    pub fn with_echo_removal(mut self, remove_echo: bool) -> Self {
        self.remove_echo = remove_echo;
        self
    }

    pub fn timeout(&self) -> MillisDurationU32 {
        self.timeout
    }

    fn send(&mut self, command: &str) -> Result<()> {
        let interface = self.interface.as_mut().ok_or(Error::Closed)?;
        let framed = format!("{command}{}", self.terminator);

        interface
            .write_all(framed.as_bytes())
            .map_err(|e| Error::Transport(e.kind()))?;
        interface.flush().map_err(|e| Error::Transport(e.kind()))?;
        debug!("-> {command}");

        if self.remove_echo {
            let echo = self.receive_line()?;
            debug!("Dropped echo {:?}", clean_response(&echo));
        }
        Ok(())
    }

    fn receive_line(&mut self) -> Result<String> {
        let Self {
            interface,
            terminator,
            suffix,
            timeout,
            ..
        } = self;
        let port = interface.as_mut().ok_or(Error::Closed)?;
        let delimiter = if suffix.is_empty() { terminator } else { suffix };
        let deadline = Instant::now() + Duration::from_millis(u64::from(timeout.to_millis()));

        let mut line: heapless::Vec<u8, L> = heapless::Vec::new();
        // One byte at a time, the next line (answer after an echo) must stay in the port.
        let mut byte = [0u8; 1];
        loop {
            if Instant::now() >= deadline {
                // No delimiter, no answer. A truncated reading must not pass for a value.
                if !line.is_empty() {
                    debug!("Dropped partial answer {:?}", String::from_utf8_lossy(&line));
                }
                return Err(Error::Timeout);
            }
            match port.read(&mut byte) {
                Ok(0) => {
                    // End of stream, the peer hung up.
                    *interface = None;
                    return Err(Error::Closed);
                }
                Ok(_) => {
                    line.push(byte[0]).map_err(|_| Error::BufferError)?;
                    if !delimiter.is_empty() && line.ends_with(delimiter.as_bytes()) {
                        break;
                    }
                }
                Err(e) => match e.kind() {
                    // The interface's own timeout is a slice of ours, keep going until the deadline.
                    embedded_io::ErrorKind::Interrupted | embedded_io::ErrorKind::TimedOut => {
                        continue;
                    }
                    kind => return Err(Error::Transport(kind)),
                },
            }
        }

        let response = String::from_utf8_lossy(&line).into_owned();
        debug!("<- {:?}", clean_response(&response));
        Ok(response)
    }
}

impl<S: embedded_io::Read + embedded_io::Write, const L: usize> Connection for LineConnection<S, L> {
    fn write(&mut self, command: &str) -> Result<()> {
        self.send(command)
    }

    fn read(&mut self, query: &str) -> Result<String> {
        self.send(query)?;
        self.receive_line()
    }

    fn is_open(&self) -> bool {
        self.interface.is_some()
    }

    fn close(&mut self) {
        self.interface = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockSerial;

    fn connection(read_data: &[u8]) -> LineConnection<MockSerial> {
        let mut mock_serial = MockSerial::new();
        mock_serial.set_read_data(read_data).unwrap();
        LineConnection::new(mock_serial, "\n", "", MillisDurationU32::millis(200))
    }

    fn written(connection: &LineConnection<MockSerial>) -> &[u8] {
        connection.interface.as_ref().unwrap().written_data()
    }

    #[test]
    fn write_appends_terminator() {
        let mut conn = LineConnection::<MockSerial>::new(
            MockSerial::new(),
            "\r\n",
            "",
            MillisDurationU32::millis(200),
        );
        conn.write(":OUTP:STAT 1").unwrap();
        assert_eq!(
            conn.interface.as_ref().unwrap().written_data(),
            b":OUTP:STAT 1\r\n"
        );
    }

    #[test]
    fn read_returns_raw_line() {
        let mut conn = connection(b"-1.234500e+02\n");
        let response = conn.read(":meas:volt?").unwrap();
        assert_eq!(response, "-1.234500e+02\n");
        assert_eq!(written(&conn), b":meas:volt?\n");
    }

    #[test]
    fn suffix_is_not_sent() {
        let mut mock_serial = MockSerial::new();
        mock_serial.set_read_data(b"1\r\n").unwrap();
        let mut conn: LineConnection<MockSerial> =
            LineConnection::new(mock_serial, "\r", "\r\n", MillisDurationU32::millis(200));

        conn.write(":OUTP:STAT 1").unwrap();
        assert_eq!(conn.read("OUTP?").unwrap(), "1\r\n");
        assert_eq!(written(&conn), b":OUTP:STAT 1\rOUTP?\r");
    }

    #[test]
    fn suffix_delimits_responses() {
        let mut mock_serial = MockSerial::new();
        mock_serial.set_read_data(b"1\rstill going\r\n").unwrap();
        let mut conn: LineConnection<MockSerial> =
            LineConnection::new(mock_serial, "\r", "\r\n", MillisDurationU32::millis(200));

        assert_eq!(conn.read("OUTP?").unwrap(), "1\rstill going\r\n");
    }

    #[test]
    fn echo_is_removed() {
        let mut conn = connection(b":ROUT:TERM FRON\n:ROUT:TERM?\nFRON\n").with_echo_removal(true);
        conn.write(":ROUT:TERM FRON").unwrap();
        assert_eq!(conn.read(":ROUT:TERM?").unwrap(), "FRON\n");
    }

    #[test]
    fn timeout_without_data() {
        let mut conn = connection(b"");
        assert!(matches!(conn.read("*IDN?"), Err(Error::Timeout)));
        // The failed read does not close the link.
        assert!(conn.is_open());
    }

    #[test]
    fn truncated_answer_times_out() {
        let mut mock_serial = MockSerial::new();
        // Full answer would be "-1.2345e+02\r\n".
        mock_serial.set_read_data(b"-1.23").unwrap();
        let mut conn: LineConnection<MockSerial> =
            LineConnection::new(mock_serial, "\r\n", "", MillisDurationU32::millis(200));

        let started = Instant::now();
        assert!(matches!(conn.read(":meas:volt?"), Err(Error::Timeout)));
        assert!(started.elapsed() >= Duration::from_millis(200));
        assert!(conn.is_open());
    }

    #[test]
    fn link_usable_after_timeout() {
        let mut conn = connection(b"42");
        assert!(matches!(conn.read("OUTP?"), Err(Error::Timeout)));

        // The rest arrives for the next read.
        conn.interface.as_mut().unwrap().set_read_data(b"1\n").unwrap();
        assert_eq!(conn.read("OUTP?").unwrap(), "1\n");
    }

    #[test]
    fn long_line_overflows_buffer() {
        let mut mock_serial = MockSerial::new();
        mock_serial.set_read_data(b"0123456789ABCDEF\n").unwrap();
        let mut conn: LineConnection<MockSerial, 8> =
            LineConnection::new(mock_serial, "\n", "", MillisDurationU32::millis(200));
        assert!(matches!(conn.read("*IDN?"), Err(Error::BufferError)));
    }

    #[test]
    fn transport_errors_are_reported() {
        let mut mock_serial = MockSerial::new();
        mock_serial.set_write_error(true);
        let mut conn: LineConnection<MockSerial> =
            LineConnection::new(mock_serial, "\n", "", MillisDurationU32::millis(200));
        assert!(matches!(
            conn.write("*RST"),
            Err(Error::Transport(embedded_io::ErrorKind::Other))
        ));
    }

    #[test]
    fn closed_connection_fails() {
        let mut conn = connection(b"1\n");
        conn.close();
        assert!(!conn.is_open());
        assert!(matches!(conn.write("*RST"), Err(Error::Closed)));
        assert!(matches!(conn.read("OUTP?"), Err(Error::Closed)));
    }

    #[test]
    fn end_of_stream_closes_link() {
        let mut mock_serial = MockSerial::new();
        mock_serial.set_end_of_stream(true);
        let mut conn: LineConnection<MockSerial> =
            LineConnection::new(mock_serial, "\n", "", MillisDurationU32::millis(200));
        assert!(matches!(conn.read("*IDN?"), Err(Error::Closed)));
        assert!(!conn.is_open());
    }
}
