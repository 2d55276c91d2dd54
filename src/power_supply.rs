//! The control surface every power supply family provides.
//!
//! Families differ in command text, supported parameters and quirks. Each one implements
//! [`PowerSupply`] and [`PowerSupplyChannel`]; operations a family can't do fail with
//! [`Error::Unsupported`](crate::error::Error::Unsupported) so callers can branch on capability.

use strum_macros::{Display, EnumString};

use crate::config::InstrumentConfig;
use crate::error::{Error, Result};
use crate::keithley::Keithley;

/// Value for the generic named parameter setter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParameterValue {
    Float(f32),
    Int(i32),
    Bool(bool),
}

impl From<f32> for ParameterValue {
    fn from(value: f32) -> Self {
        ParameterValue::Float(value)
    }
}

impl From<i32> for ParameterValue {
    fn from(value: i32) -> Self {
        ParameterValue::Int(value)
    }
}

impl From<bool> for ParameterValue {
    fn from(value: bool) -> Self {
        ParameterValue::Bool(value)
    }
}

/// One physical instrument and the channels configured on it.
pub trait PowerSupply: Send + Sync {
    /// Display name from the configuration.
    fn id(&self) -> &str;

    fn series(&self) -> &str;

    /// The description the instrument was built from.
    fn configuration(&self) -> &InstrumentConfig;

    fn is_open(&self) -> bool;

    /// Instrument wide reset to its power-on defaults.
    fn reset(&self) -> Result<()>;

    /// Identity string with line terminators removed.
    fn get_info(&self) -> Result<String>;

    /// Print the identity string to stdout.
    fn print_info(&self) -> Result<()> {
        println!("\t\t**\t{}\t**", self.get_info()?);
        Ok(())
    }

    fn get_channel(&self, id: &str) -> Option<&dyn PowerSupplyChannel>;

    /// Channel identifiers in configuration order.
    fn channel_ids(&self) -> Vec<&str>;
}

/// One addressable output of an instrument.
///
/// Every operation selects the channel on the shared link and completes its transaction
/// before any other channel of the same instrument gets the link.
pub trait PowerSupplyChannel: Send + Sync {
    fn id(&self) -> &str;

    /// Select this channel, then send `command`.
    fn write(&self, command: &str) -> Result<()>;
    /// Select this channel, then send `command` and return the raw answer.
    fn read(&self, command: &str) -> Result<String>;

    fn turn_on(&self) -> Result<()>;
    fn turn_off(&self) -> Result<()>;
    fn is_on(&self) -> Result<bool>;

    fn set_voltage(&self, voltage: f32) -> Result<()>;
    fn set_current(&self, current: f32) -> Result<()>;
    /// Voltage limit while sourcing current.
    fn set_voltage_compliance(&self, voltage: f32) -> Result<()>;
    /// Current limit while sourcing voltage.
    fn set_current_compliance(&self, current: f32) -> Result<()>;
    fn set_over_voltage_protection(&self, voltage: f32) -> Result<()>;
    fn set_over_current_protection(&self, current: f32) -> Result<()>;

    /// Measured output voltage.
    fn get_output_voltage(&self) -> Result<f32>;
    /// Programmed output voltage.
    fn get_set_voltage(&self) -> Result<f32>;
    /// Measured output current.
    fn get_current(&self) -> Result<f32>;
    fn get_voltage_compliance(&self) -> Result<f32>;
    fn get_current_compliance(&self) -> Result<f32>;
    fn get_over_voltage_protection(&self) -> Result<f32>;
    fn get_over_current_protection(&self) -> Result<f32>;

    fn set_voltage_mode(&self) -> Result<()>;
    fn set_current_mode(&self) -> Result<()>;

    fn get_parameter_float(&self, name: &str) -> Result<f32>;
    fn get_parameter_int(&self, name: &str) -> Result<i32>;
    fn get_parameter_bool(&self, name: &str) -> Result<bool>;

    /// Set a family specific parameter by name.
    fn set_parameter(&self, name: &str, value: ParameterValue) -> Result<()>;
}

/// Instrument families this crate can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum PowerSupplyModel {
    /// Keithley 2400 series source meters.
    Keithley,
}

/// Build and configure the instrument described by `config`.
pub fn open_power_supply(config: InstrumentConfig) -> Result<Box<dyn PowerSupply>> {
    let model: PowerSupplyModel = config.model.parse().map_err(|_| {
        Error::Configuration(format!(
            "{}: unknown power supply model {:?}",
            config.id, config.model
        ))
    })?;

    match model {
        PowerSupplyModel::Keithley => Ok(Box::new(Keithley::new(config)?)),
    }
}
