//! Our error types for SCPI power supplies.

use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

/// Errors raised while configuring or talking to a power supply.
///
/// Every variant is reported to the immediate caller. Nothing in this crate retries.
#[derive(Error, Debug)]
pub enum Error {
    /// The instrument description can not be turned into an instrument.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// The link could not be opened, or is not open after construction.
    #[error("Connection error: {0}")]
    Connection(String),
    /// Byte level failure of the underlying interface.
    #[error("Transport error: {0:?}")]
    Transport(embedded_io::ErrorKind),
    #[error("Communication timeout")]
    Timeout,
    #[error("Connection closed")]
    Closed,
    /// The response did not fit into the connection's line buffer.
    #[error("Response exceeds line buffer")]
    BufferError,
    /// The operation exists in the common interface but this family can't do it.
    #[error("{operation}: command not implemented for {model}")]
    Unsupported {
        operation: String,
        model: String,
    },
    #[error("{0}")]
    InvalidParameter(String),
    #[error("Could not parse a value from response {0:?}")]
    Parse(String),
    #[error("Unexpected response {response:?} to {query}")]
    UnexpectedResponse { query: String, response: String },
}

impl Error {
    pub(crate) fn unsupported(operation: impl Into<String>, model: impl Into<String>) -> Self {
        Error::Unsupported {
            operation: operation.into(),
            model: model.into(),
        }
    }

    /// True when the failure is a capability gap of the instrument family rather than a fault.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Error::Unsupported { .. })
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Configuration(err.to_string())
    }
}
