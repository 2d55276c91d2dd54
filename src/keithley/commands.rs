//! Command table and value sets of the Keithley 2400 series.

use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::error::Error;
use crate::protocol::command_with_value;

/// Every command and query this family sends.
///
/// __W__ commands take an argument appended after a space, __Q__ queries end in `?`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, EnumIter, IntoStaticStr)]
pub enum ScpiCommand {
    /// __Q__ - Identification string.
    #[strum(serialize = "*IDN?")]
    Identify,
    /// __W__ - Output off, minimum source, maximum protection, default display and metering.
    #[strum(serialize = "*RST")]
    Reset,
    /// __W__ - Select the output terminal, `FRONT` or `REAR`.
    ///
    /// The instrument only remembers the last selected terminal.
    #[strum(serialize = ":ROUT:TERM")]
    SelectTerminal,
    /// __Q__ - Currently selected terminal. Answers `FRON_` for the front.
    #[strum(serialize = ":ROUT:TERM?")]
    SelectedTerminal,
    /// __W__ - Output enable, `1` or `0`.
    #[strum(serialize = ":OUTP:STAT")]
    OutputState,
    /// __Q__ - Output enable of the selected terminal.
    #[strum(serialize = "OUTP?")]
    OutputStateQuery,
    /// __W__ - Source voltage level in volts.
    #[strum(serialize = ":source:voltage")]
    SourceVoltage,
    #[strum(serialize = ":source:voltage?")]
    SourceVoltageQuery,
    /// __W__ - Source current level in amperes.
    #[strum(serialize = ":source:current")]
    SourceCurrent,
    /// __W__ - Voltage compliance, effective while sourcing current.
    #[strum(serialize = "sense:voltage:protection")]
    VoltageCompliance,
    #[strum(serialize = "sense:voltage:protection?")]
    VoltageComplianceQuery,
    /// __W__ - Current compliance, effective while sourcing voltage.
    #[strum(serialize = "sense:current:protection")]
    CurrentCompliance,
    #[strum(serialize = "sense:current:protection?")]
    CurrentComplianceQuery,
    /// __W__ - Voltage source range, one of [`VoltageRange`].
    #[strum(serialize = ":source:voltage:range")]
    SourceVoltageRange,
    /// __W__ - Current source range, one of [`CurrentRange`].
    #[strum(serialize = ":source:current:range")]
    SourceCurrentRange,
    /// __Q__ - Active measurement function, `"CURR:DC"` or `"VOLT:DC"` in quotes.
    #[strum(serialize = ":sense:function?")]
    SenseFunction,
    /// __W__ - `on` / `off`.
    #[strum(serialize = ":sense:current:range:auto")]
    CurrentAutorange,
    /// __W__ - `on` / `off`.
    #[strum(serialize = ":sense:voltage:range:auto")]
    VoltageAutorange,
    /// __W__ - `ON` / `OFF`.
    #[strum(serialize = ":DISPlay:ENABle")]
    Display,
    /// __W__ - Hand control back to the front panel.
    #[strum(serialize = ":SYSTem:LOCal")]
    Local,
    /// __W__ - Source function, `VOLT` or `CURR`.
    #[strum(serialize = ":SOUR:FUNC")]
    SourceFunction,
    /// __W__ - Restrict readings to the current element.
    #[strum(serialize = "form:elem curr")]
    CurrentElement,
    /// __W__ - Restrict readings to the voltage element.
    #[strum(serialize = ":form:elem volt")]
    VoltageElement,
    #[strum(serialize = ":meas:curr?")]
    MeasureCurrent,
    #[strum(serialize = ":meas:volt?")]
    MeasureVoltage,
}

impl ScpiCommand {
    pub fn as_str(self) -> &'static str {
        self.into()
    }

    /// `"<command> <value>"`, value in scientific notation.
    pub fn with_value(self, value: f32) -> String {
        command_with_value(self.as_str(), value)
    }

    pub fn with_arg(self, argument: &str) -> String {
        format!("{} {argument}", self.as_str())
    }
}

/// Float parameters understood by [`set_parameter`](crate::power_supply::PowerSupplyChannel::set_parameter).
///
/// Besides these, `"command_arg <cmd>"` sends `<cmd> <value>` and `"command <text>"` sends `<text>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
pub enum FloatParameter {
    #[strum(serialize = "Vsrc_range")]
    VoltageSourceRange,
    #[strum(serialize = "Isrc_range")]
    CurrentSourceRange,
}

/// Boolean parameters understood by [`set_parameter`](crate::power_supply::PowerSupplyChannel::set_parameter).
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
pub enum BoolParameter {
    #[strum(serialize = "autorange")]
    Autorange,
    #[strum(serialize = "display")]
    Display,
    #[strum(serialize = "local")]
    Local,
}

/// Measurement function reported by [`ScpiCommand::SenseFunction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenseFunction {
    Current,
    Voltage,
}

impl SenseFunction {
    /// Interpret a cleaned `:sense:function?` answer.
    pub fn from_response(response: &str) -> Option<Self> {
        let function = response.trim().trim_matches('"');
        if function.eq_ignore_ascii_case("CURR:DC") {
            Some(SenseFunction::Current)
        } else if function.eq_ignore_ascii_case("VOLT:DC") {
            Some(SenseFunction::Voltage)
        } else {
            None
        }
    }

    pub fn autorange_command(self) -> ScpiCommand {
        match self {
            SenseFunction::Current => ScpiCommand::CurrentAutorange,
            SenseFunction::Voltage => ScpiCommand::VoltageAutorange,
        }
    }
}

/// Voltage source ranges the hardware supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, Display)]
pub enum VoltageRange {
    #[strum(to_string = "0.2V")]
    V0_2,
    #[strum(to_string = "2V")]
    V2,
    #[strum(to_string = "20V")]
    V20,
    #[strum(to_string = "1000V")]
    V1000,
}

impl VoltageRange {
    pub const fn volts(self) -> f32 {
        match self {
            VoltageRange::V0_2 => 0.2,
            VoltageRange::V2 => 2.0,
            VoltageRange::V20 => 20.0,
            VoltageRange::V1000 => 1000.0,
        }
    }
}

impl TryFrom<f32> for VoltageRange {
    type Error = Error;

    /// Exact match at `f32` precision.
    fn try_from(volts: f32) -> Result<Self, Self::Error> {
        Self::iter()
            .find(|range| range.volts() == volts)
            .ok_or_else(|| {
                Error::InvalidParameter(format!(
                    "invalid value {volts} for voltage source range, valid values are {}",
                    valid_values::<Self>()
                ))
            })
    }
}

/// Current source ranges the hardware supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, Display)]
pub enum CurrentRange {
    #[strum(to_string = "1uA")]
    A1u,
    #[strum(to_string = "10uA")]
    A10u,
    #[strum(to_string = "100uA")]
    A100u,
    #[strum(to_string = "1mA")]
    A1m,
    #[strum(to_string = "2mA")]
    A2m,
    #[strum(to_string = "100mA")]
    A100m,
    #[strum(to_string = "1A")]
    A1,
}

impl CurrentRange {
    pub const fn amps(self) -> f32 {
        match self {
            CurrentRange::A1u => 1e-6,
            CurrentRange::A10u => 1e-5,
            CurrentRange::A100u => 1e-4,
            CurrentRange::A1m => 1e-3,
            CurrentRange::A2m => 2e-3,
            CurrentRange::A100m => 0.1,
            CurrentRange::A1 => 1.0,
        }
    }
}

impl TryFrom<f32> for CurrentRange {
    type Error = Error;

    /// Exact match at `f32` precision.
    fn try_from(amps: f32) -> Result<Self, Self::Error> {
        Self::iter()
            .find(|range| range.amps() == amps)
            .ok_or_else(|| {
                Error::InvalidParameter(format!(
                    "invalid value {amps} for current source range, valid values are {}",
                    valid_values::<Self>()
                ))
            })
    }
}

fn valid_values<T: IntoEnumIterator + core::fmt::Display>() -> String {
    T::iter()
        .map(|value| value.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
