//! Declarative description of one instrument, loaded from TOML.
//!
//! ```toml
//! id = "HV"
//! model = "Keithley"
//! connection = "Serial"
//! timeout = 1000
//! series = "2410"
//! port = "/dev/ttyUSB0"
//! baud_rate = 9600
//! terminator = "CRLF"
//! suffix = "LF"
//!
//! [[channels]]
//! id = "Front"
//! in_use = "Yes"
//! channel = "FRONT"
//! ```

use fugit::MillisDurationU32;
use serde::Deserialize;
use strum_macros::{Display, EnumString};

use crate::error::{Error, Result};
use crate::protocol::translate_line_ending;

/// Physical link kinds an instrument can be reached over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum ConnectionKind {
    Serial,
    Ethernet,
}

/// One output channel entry of an instrument.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChannelConfig {
    /// Key the channel is looked up by.
    pub id: String,
    /// Only an affirmative "yes" enables the channel.
    pub in_use: String,
    /// Selection name the instrument knows the channel by, e.g. `FRONT`.
    pub channel: String,
}

impl ChannelConfig {
    pub fn is_enabled(&self) -> bool {
        self.in_use.trim().eq_ignore_ascii_case("yes")
    }
}

/// Everything needed to bring up one instrument.
///
/// `connection` is kept as written so an unknown kind can be reported against the instrument
/// when it is configured.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct InstrumentConfig {
    /// Display name.
    pub id: String,
    /// Instrument family, see [crate::power_supply::PowerSupplyModel].
    pub model: String,
    pub connection: String,
    /// Milliseconds.
    pub timeout: u32,
    pub series: String,

    // Serial.
    pub port: String,
    pub baud_rate: u32,
    pub flow_control: bool,
    pub parity: bool,
    pub remove_echo: bool,
    /// Symbolic line ending appended to commands, e.g. `"CRLF"`.
    pub terminator: String,
    /// Symbolic line ending closing responses. Empty means same as the terminator.
    pub suffix: String,

    // Ethernet.
    pub host: String,
    pub ethernet_port: u16,

    pub channels: Vec<ChannelConfig>,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            model: "Keithley".to_string(),
            connection: ConnectionKind::Serial.to_string(),
            timeout: 1000,
            series: String::new(),
            port: String::new(),
            baud_rate: 9600,
            flow_control: false,
            parity: false,
            remove_echo: false,
            terminator: "LF".to_string(),
            suffix: String::new(),
            host: String::new(),
            ethernet_port: 5025,
            channels: Vec::new(),
        }
    }
}

impl InstrumentConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Resolve the connection kind. Unknown kinds are fatal.
    pub fn connection_kind(&self) -> Result<ConnectionKind> {
        self.connection.parse().map_err(|_| {
            Error::Configuration(format!(
                "{}: no connection {:?} available, aborting",
                self.id, self.connection
            ))
        })
    }

    pub fn timeout(&self) -> MillisDurationU32 {
        MillisDurationU32::millis(self.timeout)
    }

    /// Command terminator as literal bytes.
    pub fn terminator(&self) -> String {
        translate_line_ending(&self.terminator)
    }

    /// Response suffix as literal bytes.
    pub fn suffix(&self) -> String {
        translate_line_ending(&self.suffix)
    }

    /// Channel entries that are switched on, in configuration order.
    pub fn enabled_channels(&self) -> impl Iterator<Item = &ChannelConfig> {
        self.channels.iter().filter(|channel| channel.is_enabled())
    }
}
