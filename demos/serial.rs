use std::env;

use inquire::Select;
use scpi_psu::{InstrumentConfig, open_power_supply};

// Configuration constants - adjust these for your setup
const BAUD_RATE: u32 = 9600;
// Source meters can take a while to answer a measurement, a reasonably large time out is required.
const SERIAL_TIMEOUT_MS: u32 = 2000;
const CHANNEL_ID: &str = "Front";
const OUTPUT_VOLTAGE_V: f32 = 5.5;
const CURRENT_COMPLIANCE_A: f32 = 0.01;
const STABILIZATION_DELAY_MS: u64 = 1000;

/// Configuration for a single front terminal channel on `port_name`.
fn default_config(port_name: String) -> InstrumentConfig {
    let toml = format!(
        r#"
        id = "Demo"
        model = "Keithley"
        connection = "Serial"
        timeout = {SERIAL_TIMEOUT_MS}
        series = "2410"
        port = "{port_name}"
        baud_rate = {BAUD_RATE}
        terminator = "CR"

        [[channels]]
        id = "{CHANNEL_ID}"
        in_use = "Yes"
        channel = "FRONT"
        "#
    );
    InstrumentConfig::from_toml_str(&toml).expect("Invalid built-in configuration")
}

fn main() {
    env_logger::init();

    // A TOML file given on the command line wins, otherwise pick a serial port interactively
    let config = match env::args().nth(1) {
        Some(path) if path.ends_with(".toml") => {
            let text = std::fs::read_to_string(&path).expect("Failed to read configuration");
            InstrumentConfig::from_toml_str(&text).expect("Invalid configuration")
        }
        Some(port_name) => default_config(port_name),
        None => {
            let ports = serialport::available_ports().expect("Failed to enumerate serial ports");

            if ports.is_empty() {
                eprintln!("No serial ports found!");
                std::process::exit(1);
            }

            let port_names: Vec<String> = ports.iter().map(|p| p.port_name.clone()).collect();

            let port_name = Select::new("Select a serial port:", port_names)
                .prompt()
                .expect("Failed to select port");
            default_config(port_name)
        }
    };

    println!("Using {} ({} connection)", config.id, config.connection);

    let psu = open_power_supply(config).expect("Failed to configure power supply");
    psu.print_info().unwrap();
    println!("Channels: {:?}", psu.channel_ids());

    let Some(channel) = psu.get_channel(CHANNEL_ID) else {
        eprintln!("Channel {CHANNEL_ID} is not configured");
        std::process::exit(1);
    };

    channel.set_voltage_mode().unwrap();
    channel.set_voltage(OUTPUT_VOLTAGE_V).unwrap();
    println!("Set output voltage to {}V", OUTPUT_VOLTAGE_V);

    channel.set_current_compliance(CURRENT_COMPLIANCE_A).unwrap();
    println!("Set current compliance to {}A", CURRENT_COMPLIANCE_A);

    channel.turn_on().unwrap();
    println!("Output enabled");

    // Wait for output to stabilize
    std::thread::sleep(std::time::Duration::from_millis(STABILIZATION_DELAY_MS));

    println!("Output is on: {}", channel.is_on().unwrap());
    println!("Measured output voltage: {:.3}V", channel.get_output_voltage().unwrap());
    println!("Measured current: {:.6}A", channel.get_current().unwrap());
    println!("Programmed voltage: {:.3}V", channel.get_set_voltage().unwrap());

    match channel.get_over_voltage_protection() {
        Ok(limit) => println!("Over voltage protection: {limit}V"),
        Err(e) if e.is_unsupported() => println!("{e}"),
        Err(e) => panic!("{e}"),
    }

    channel.turn_off().unwrap();
    println!("Output disabled");

    psu.reset().unwrap();
    println!("Instrument reset");
}
