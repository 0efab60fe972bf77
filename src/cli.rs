use anyhow::{Context, anyhow};
use clap::{Args, Parser, Subcommand};
use std::time::Duration;

use arduino_serial::config::{
    BaudRate, Config, DEFAULT_MISSED_UPDATES_ALLOWED, DEFAULT_PORT_NAME,
    DEFAULT_UPDATE_FREQUENCY, DataBits, Parity, StopBits,
};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "arduino-serial",
    about = "Keep named integer commands in sync with an Arduino"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Cmd {
    /// List serial ports
    Ports,
    /// Open the link, stream commands and print what the board sends back
    Run(RunOpts),
}

#[derive(Args, Debug, Clone)]
pub struct SerialOpts {
    /// Serial device path
    #[arg(long, default_value = DEFAULT_PORT_NAME)]
    pub dev: String,
    /// Baud rate
    #[arg(long, default_value_t = 9600)]
    pub baud: u32,
    /// Data bits (5-8)
    #[arg(long, default_value_t = 8)]
    pub data_bits: u8,
    /// none, even or odd
    #[arg(long, default_value = "none")]
    pub parity: String,
    /// one or two
    #[arg(long, default_value = "one")]
    pub stop_bits: String,
}

#[derive(Args, Debug, Clone)]
pub struct RunOpts {
    #[command(flatten)]
    pub ser: SerialOpts,
    /// Updates per second (5-20)
    #[arg(long, default_value_t = DEFAULT_UPDATE_FREQUENCY)]
    pub frequency: u32,
    /// Consecutive failed updates before commands fall back to initial values (3-100)
    #[arg(long, default_value_t = DEFAULT_MISSED_UPDATES_ALLOWED)]
    pub missed: u32,
    /// Milliseconds to wait after opening while the board resets
    #[arg(long, default_value_t = 2000)]
    pub reset_ms: u64,
    /// Command to register, NAME=INITIAL (repeatable)
    #[arg(long = "command", value_parser = parse_assignment)]
    pub commands: Vec<(String, i32)>,
}

impl RunOpts {
    pub fn to_config(&self) -> anyhow::Result<Config> {
        let cfg = Config::builder()
            .port_name(&self.ser.dev)
            .baud_rate(BaudRate::try_from(self.ser.baud)?)
            .data_bits(DataBits::try_from(self.ser.data_bits)?)
            .parity(self.ser.parity.parse::<Parity>()?)
            .stop_bits(self.ser.stop_bits.parse::<StopBits>()?)
            .update_frequency(self.frequency)
            .missed_updates_allowed(self.missed)
            .reset_delay(Duration::from_millis(self.reset_ms))
            .build()
            .context("building connection config")?;
        Ok(cfg)
    }
}

/// `NAME=VALUE`, as given on the command line or typed on stdin.
pub fn parse_assignment(s: &str) -> anyhow::Result<(String, i32)> {
    let (name, value) = s
        .trim()
        .split_once('=')
        .ok_or_else(|| anyhow!("expected NAME=VALUE, got {s:?}"))?;
    let value: i32 = value
        .trim()
        .parse()
        .map_err(|_| anyhow!("value for {} must be an integer", name.trim()))?;
    Ok((name.trim().to_string(), value))
}
