//! Keithley 2400 series source meters.
//!
//! One instrument, up to two output terminals (`FRONT` and `REAR`), one link. The instrument
//! only remembers which terminal is selected, so every channel operation selects its terminal
//! and finishes its exchange while holding the link.

mod channel;
mod commands;

pub use channel::{KeithleyChannel, Terminal};
pub use commands::{CurrentRange, ScpiCommand, VoltageRange};

use log::{info, warn};

use crate::config::{ConnectionKind, InstrumentConfig};
use crate::connection::{Connection, SharedConnection, lock, share};
use crate::error::{Error, Result};
use crate::power_supply::{PowerSupply, PowerSupplyChannel};
use crate::protocol::clean_response;
use crate::transport::{open_ethernet, open_serial};

/// A configured Keithley source meter.
///
/// Owns the link. Dropping the instrument closes it.
pub struct Keithley {
    configuration: InstrumentConfig,
    link: SharedConnection,
    /// Enabled channels in configuration order.
    channels: Vec<KeithleyChannel>,
}

impl Keithley {
    /// Open the link `config` describes and configure the instrument over it.
    pub fn new(config: InstrumentConfig) -> Result<Self> {
        let kind = config.connection_kind()?;
        info!("Configuring {} with {kind} connection", config.id);
        let connection = match kind {
            ConnectionKind::Serial => open_serial(&config)?,
            ConnectionKind::Ethernet => open_ethernet(&config)?,
        };
        Self::with_connection(config, connection)
    }

    /// Configure the instrument over an already opened link.
    pub fn with_connection(
        config: InstrumentConfig,
        connection: Box<dyn Connection + Send>,
    ) -> Result<Self> {
        if !connection.is_open() {
            return Err(Error::Connection(format!(
                "{}: {} connection is not open, channels will not be configured",
                config.id, config.connection
            )));
        }

        let mut keithley = Self {
            link: share(connection),
            channels: Vec::new(),
            configuration: config,
        };
        let identity = keithley.get_info()?;
        info!("{}: {identity}", keithley.configuration.id);
        keithley.configure_channels()?;
        Ok(keithley)
    }

    fn configure_channels(&mut self) -> Result<()> {
        for entry in &self.configuration.channels {
            if !entry.is_enabled() {
                warn!(
                    "{}: channel {} not in use ({:?}), skipping",
                    self.configuration.id, entry.id, entry.in_use
                );
                continue;
            }
            if self.channels.iter().any(|channel| channel.id() == entry.id) {
                return Err(Error::Configuration(format!(
                    "{}: channel {} configured twice",
                    self.configuration.id, entry.id
                )));
            }
            let channel = KeithleyChannel::new(entry, &self.configuration.series, &self.link);
            info!(
                "{}: channel {} selected as {} ({:?} terminal)",
                self.configuration.id,
                entry.id,
                channel.name(),
                channel.terminal()
            );
            self.channels.push(channel);
        }
        Ok(())
    }

    /// Look up a channel with its Keithley specific operations.
    pub fn channel(&self, id: &str) -> Option<&KeithleyChannel> {
        self.channels.iter().find(|channel| channel.id() == id)
    }

    pub fn channels(&self) -> impl Iterator<Item = &KeithleyChannel> {
        self.channels.iter()
    }
}

impl PowerSupply for Keithley {
    fn id(&self) -> &str {
        &self.configuration.id
    }

    fn series(&self) -> &str {
        &self.configuration.series
    }

    fn configuration(&self) -> &InstrumentConfig {
        &self.configuration
    }

    fn is_open(&self) -> bool {
        lock(&self.link).is_open()
    }

    fn reset(&self) -> Result<()> {
        info!("{}: reset", self.configuration.id);
        lock(&self.link).write(ScpiCommand::Reset.as_str())
    }

    fn get_info(&self) -> Result<String> {
        let identity = lock(&self.link).read(ScpiCommand::Identify.as_str())?;
        Ok(clean_response(&identity))
    }

    fn get_channel(&self, id: &str) -> Option<&dyn PowerSupplyChannel> {
        self.channel(id)
            .map(|channel| channel as &dyn PowerSupplyChannel)
    }

    fn channel_ids(&self) -> Vec<&str> {
        self.channels.iter().map(|channel| channel.id()).collect()
    }
}
