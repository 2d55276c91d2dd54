use std::sync::{Arc, Mutex, PoisonError, Weak};

use log::{debug, info};

use super::commands::{
    BoolParameter, CurrentRange, FloatParameter, ScpiCommand, SenseFunction, VoltageRange,
};
use crate::config::ChannelConfig;
use crate::connection::{Connection, SharedConnection, lock};
use crate::error::{Error, Result};
use crate::power_supply::{ParameterValue, PowerSupplyChannel};
use crate::protocol::{clean_response, command_with_value, parse_bool, parse_float};

/// Output terminal of a 2400 series source meter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    Front,
    Rear,
}

impl Terminal {
    /// `FRON`/`FRONT` (any case) is the front panel, anything else the rear.
    pub fn from_name(name: &str) -> Self {
        let name = name.trim().to_ascii_uppercase();
        if name == "FRON" || name == "FRONT" {
            Terminal::Front
        } else {
            Terminal::Rear
        }
    }
}

/// The instrument answers `:ROUT:TERM?` with `FRON_` for `FRONT`, so the fifth character
/// can't be trusted.
fn normalized_terminal(name: &str) -> String {
    let mut chars: Vec<char> = name.trim().chars().collect();
    if chars.len() > 4 {
        chars.remove(4);
    }
    chars.iter().map(char::to_ascii_uppercase).collect()
}

/// One output terminal of a Keithley source meter.
///
/// The channel does not own the link: it holds a weak handle to the instrument's connection
/// and fails with [`Error::Closed`] once the instrument is gone.
pub struct KeithleyChannel {
    id: String,
    /// Selection name, e.g. `FRONT`.
    name: String,
    terminal: Terminal,
    /// Sent ahead of every command of this channel.
    select_command: String,
    /// `Keithley <series>`, used in capability errors.
    model: String,
    link: Weak<Mutex<Box<dyn Connection + Send>>>,
    last_set_voltage: Mutex<Option<f32>>,
}

impl KeithleyChannel {
    pub(crate) fn new(config: &ChannelConfig, series: &str, link: &SharedConnection) -> Self {
        let name = config.channel.trim().to_string();
        let model = if series.is_empty() {
            "Keithley".to_string()
        } else {
            format!("Keithley {series}")
        };
        Self {
            id: config.id.clone(),
            terminal: Terminal::from_name(&name),
            select_command: ScpiCommand::SelectTerminal.with_arg(&name),
            name,
            model,
            link: Arc::downgrade(link),
            last_set_voltage: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn terminal(&self) -> Terminal {
        self.terminal
    }

    /// The last voltage set through this channel, if any.
    pub fn last_set_voltage(&self) -> Option<f32> {
        *self
            .last_set_voltage
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `transaction` with exclusive use of the link.
    fn with_link<T>(&self, transaction: impl FnOnce(&mut dyn Connection) -> Result<T>) -> Result<T> {
        let link = self.link.upgrade().ok_or(Error::Closed)?;
        let mut connection = lock(&link);
        transaction(&mut **connection)
    }

    fn select(&self, connection: &mut dyn Connection) -> Result<()> {
        connection.write(&self.select_command)
    }

    fn query_float(&self, command: ScpiCommand) -> Result<f32> {
        parse_float(&self.read(command.as_str())?)
    }

    /// Only the selected terminal can be on. Must not select, that would change the answer.
    fn is_active(&self, connection: &mut dyn Connection) -> Result<bool> {
        let selected = connection.read(ScpiCommand::SelectedTerminal.as_str())?;
        if normalized_terminal(&clean_response(&selected)) != normalized_terminal(&self.name) {
            debug!("{}: terminal {:?} is selected", self.id, clean_response(&selected));
            return Ok(false);
        }
        parse_bool(&connection.read(ScpiCommand::OutputStateQuery.as_str())?)
    }

    fn unsupported(&self, operation: impl Into<String>) -> Error {
        Error::unsupported(operation, self.model.as_str())
    }

    /// Pick a voltage source range, one of 0.2, 2, 20 or 1000 V.
    pub fn set_voltage_range(&self, volts: f32) -> Result<()> {
        let range = VoltageRange::try_from(volts)?;
        info!("{}: voltage source range {range}", self.id);
        self.write(&ScpiCommand::SourceVoltageRange.with_value(range.volts()))
    }

    /// Pick a current source range, one of 1 µA, 10 µA, 100 µA, 1 mA, 2 mA, 100 mA or 1 A.
    pub fn set_current_range(&self, amps: f32) -> Result<()> {
        let range = CurrentRange::try_from(amps)?;
        info!("{}: current source range {range}", self.id);
        self.write(&ScpiCommand::SourceCurrentRange.with_value(range.amps()))
    }

    /// Switch measurement autoranging of whatever function is being sensed.
    pub fn set_autorange(&self, on: bool) -> Result<()> {
        self.with_link(|connection| {
            self.select(connection)?;
            let query = ScpiCommand::SenseFunction.as_str();
            let response = clean_response(&connection.read(query)?);
            let function = SenseFunction::from_response(&response).ok_or_else(|| {
                Error::UnexpectedResponse {
                    query: query.to_string(),
                    response: response.clone(),
                }
            })?;
            info!("{}: autorange {on} for {function:?}", self.id);

            self.select(connection)?;
            connection.write(
                &function
                    .autorange_command()
                    .with_arg(if on { "on" } else { "off" }),
            )
        })
    }

    pub fn set_display(&self, on: bool) -> Result<()> {
        self.write(&ScpiCommand::Display.with_arg(if on { "ON" } else { "OFF" }))
    }

    /// Return the instrument to front panel control. `false` leaves it as is.
    pub fn set_local(&self, on: bool) -> Result<()> {
        if !on {
            return Ok(());
        }
        self.write(ScpiCommand::Local.as_str())
    }

    fn set_float_parameter(&self, name: &str, value: f32) -> Result<()> {
        if let Some(command) = name.strip_prefix("command_arg ") {
            let command = non_empty_command(name, command)?;
            return self.write(&command_with_value(command, value));
        }
        if let Some(command) = name.strip_prefix("command ") {
            let command = non_empty_command(name, command)?;
            return self.write(command);
        }

        match name.parse::<FloatParameter>() {
            Ok(FloatParameter::VoltageSourceRange) => self.set_voltage_range(value),
            Ok(FloatParameter::CurrentSourceRange) => self.set_current_range(value),
            Err(_) => Err(Error::InvalidParameter(format!(
                "{}: unknown parameter {name:?}",
                self.id
            ))),
        }
    }

    fn set_bool_parameter(&self, name: &str, value: bool) -> Result<()> {
        match name.parse::<BoolParameter>() {
            Ok(BoolParameter::Autorange) => self.set_autorange(value),
            Ok(BoolParameter::Display) => self.set_display(value),
            Ok(BoolParameter::Local) => self.set_local(value),
            Err(_) => Err(Error::InvalidParameter(format!(
                "{}: unknown parameter {name:?}",
                self.id
            ))),
        }
    }
}

fn non_empty_command<'a>(name: &str, command: &'a str) -> Result<&'a str> {
    let command = command.trim();
    if command.is_empty() {
        return Err(Error::InvalidParameter(format!(
            "parameter {name:?} names no command"
        )));
    }
    Ok(command)
}

impl PowerSupplyChannel for KeithleyChannel {
    fn id(&self) -> &str {
        &self.id
    }

    fn write(&self, command: &str) -> Result<()> {
        self.with_link(|connection| {
            self.select(connection)?;
            connection.write(command)
        })
    }

    fn read(&self, command: &str) -> Result<String> {
        self.with_link(|connection| {
            self.select(connection)?;
            connection.read(command)
        })
    }

    fn turn_on(&self) -> Result<()> {
        info!("Turn on channel {}", self.name);
        self.write(&ScpiCommand::OutputState.with_arg("1"))
    }

    fn turn_off(&self) -> Result<()> {
        info!("Turn off channel {}", self.name);
        self.write(&ScpiCommand::OutputState.with_arg("0"))
    }

    fn is_on(&self) -> Result<bool> {
        self.with_link(|connection| self.is_active(connection))
    }

    fn set_voltage(&self, voltage: f32) -> Result<()> {
        debug!("{}: set voltage {voltage}", self.id);
        self.with_link(|connection| {
            self.select(connection)?;
            connection.write(&ScpiCommand::SourceVoltage.with_value(voltage))?;
            // Still holding the link: the cache follows the order commands went out.
            *self
                .last_set_voltage
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(voltage);
            Ok(())
        })
    }

    fn set_current(&self, current: f32) -> Result<()> {
        debug!("{}: set current {current}", self.id);
        self.write(&ScpiCommand::SourceCurrent.with_value(current))
    }

    fn set_voltage_compliance(&self, voltage: f32) -> Result<()> {
        self.write(&ScpiCommand::VoltageCompliance.with_value(voltage))
    }

    fn set_current_compliance(&self, current: f32) -> Result<()> {
        self.write(&ScpiCommand::CurrentCompliance.with_value(current))
    }

    /// The closest the 2400 series has is the voltage source range. The value is sent as is.
    fn set_over_voltage_protection(&self, voltage: f32) -> Result<()> {
        self.write(&ScpiCommand::SourceVoltageRange.with_value(voltage))
    }

    fn set_over_current_protection(&self, _current: f32) -> Result<()> {
        Err(self.unsupported("set_over_current_protection"))
    }

    /// 0 while the channel is not selected or its output is off.
    fn get_output_voltage(&self) -> Result<f32> {
        self.with_link(|connection| {
            if !self.is_active(connection)? {
                return Ok(0.0);
            }
            // The voltage reading is stale unless a current reading comes first.
            connection.write(ScpiCommand::CurrentElement.as_str())?;
            connection.read(ScpiCommand::MeasureCurrent.as_str())?;
            connection.write(ScpiCommand::VoltageElement.as_str())?;
            parse_float(&connection.read(ScpiCommand::MeasureVoltage.as_str())?)
        })
    }

    fn get_set_voltage(&self) -> Result<f32> {
        self.query_float(ScpiCommand::SourceVoltageQuery)
    }

    /// 0 while the channel is not selected or its output is off.
    fn get_current(&self) -> Result<f32> {
        self.with_link(|connection| {
            if !self.is_active(connection)? {
                return Ok(0.0);
            }
            connection.write(ScpiCommand::CurrentElement.as_str())?;
            parse_float(&connection.read(ScpiCommand::MeasureCurrent.as_str())?)
        })
    }

    fn get_voltage_compliance(&self) -> Result<f32> {
        self.query_float(ScpiCommand::VoltageComplianceQuery)
    }

    fn get_current_compliance(&self) -> Result<f32> {
        self.query_float(ScpiCommand::CurrentComplianceQuery)
    }

    fn get_over_voltage_protection(&self) -> Result<f32> {
        Err(self.unsupported("get_over_voltage_protection"))
    }

    fn get_over_current_protection(&self) -> Result<f32> {
        Err(self.unsupported("get_over_current_protection"))
    }

    fn set_voltage_mode(&self) -> Result<()> {
        self.write(&ScpiCommand::SourceFunction.with_arg("VOLT"))
    }

    fn set_current_mode(&self) -> Result<()> {
        self.write(&ScpiCommand::SourceFunction.with_arg("CURR"))
    }

    fn get_parameter_float(&self, name: &str) -> Result<f32> {
        Err(self.unsupported(format!("get_parameter_float({name})")))
    }

    fn get_parameter_int(&self, name: &str) -> Result<i32> {
        Err(self.unsupported(format!("get_parameter_int({name})")))
    }

    fn get_parameter_bool(&self, name: &str) -> Result<bool> {
        Err(self.unsupported(format!("get_parameter_bool({name})")))
    }

    /// Float: `Vsrc_range`, `Isrc_range`, `command_arg <cmd>` and `command <text>`.
    /// Bool: `autorange`, `display` and `local`.
    fn set_parameter(&self, name: &str, value: ParameterValue) -> Result<()> {
        match value {
            ParameterValue::Float(value) => self.set_float_parameter(name, value),
            ParameterValue::Bool(value) => self.set_bool_parameter(name, value),
            ParameterValue::Int(_) => Err(self.unsupported(format!("set_parameter({name}, int)"))),
        }
    }
}
