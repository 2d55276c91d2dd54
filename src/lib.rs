//! This crate provides an interface for configuring and controlling multi-channel SCPI laboratory power supplies.
//!
//! Instruments are described in TOML (see [config]) and reached over a serial line or an Ethernet
//! socket. Each instrument exposes its enabled output channels behind
//! [`PowerSupplyChannel`](power_supply::PowerSupplyChannel); all channels of one instrument share
//! its single link, and every channel operation selects its channel and completes its exchange
//! before another channel may use the link.
//!
//! Supported instrument families:
//! * Keithley 2400 series source meters (2400, 2410, 2420, ...), front and rear terminals
//!
//! Serial links are configured like so:
//! * Baud rate: from the configuration, 9600 by default
//! * Data bits: 8
//! * Stop bits: 1
//! * Parity: None, or Even when `parity = true`
//! * Flow control: None, or Hardware when `flow_control = true`
//!
//! Serial support lives behind the default `serial` feature.
//!
//! ```no_run
//! use scpi_psu::{InstrumentConfig, open_power_supply};
//!
//! let config = InstrumentConfig::from_toml_str(&std::fs::read_to_string("hv.toml")?)?;
//! let psu = open_power_supply(config)?;
//! psu.print_info()?;
//! if let Some(front) = psu.get_channel("Front") {
//!     front.set_voltage(5.0)?;
//!     front.turn_on()?;
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod keithley;
pub mod power_supply;
pub mod protocol;
pub mod transport;

#[cfg(test)]
mod mock;

pub use config::{ChannelConfig, ConnectionKind, InstrumentConfig};
pub use connection::{Connection, LineConnection};
pub use error::{Error, Result};
pub use power_supply::{
    ParameterValue, PowerSupply, PowerSupplyChannel, PowerSupplyModel, open_power_supply,
};
