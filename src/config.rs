use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};

pub const DEFAULT_PORT_NAME: &str = "COM3";
pub const DEFAULT_UPDATE_FREQUENCY: u32 = 16;
pub const MIN_UPDATE_FREQUENCY: u32 = 5;
pub const MAX_UPDATE_FREQUENCY: u32 = 20;
pub const DEFAULT_MISSED_UPDATES_ALLOWED: u32 = 4;
pub const MIN_MISSED_UPDATES_ALLOWED: u32 = 3;
pub const MAX_MISSED_UPDATES_ALLOWED: u32 = 100;
/// The Arduino reboots when the line opens; commands sent before it is back are lost.
pub const DEFAULT_RESET_DELAY: Duration = Duration::from_secs(2);

/// Baud rates supported by both the Arduino UNO and the host serial stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaudRate {
    B300,
    B600,
    B1200,
    B4800,
    B9600,
    B14400,
    B19200,
    B38400,
    B57600,
    B115200,
}

impl BaudRate {
    pub const ALL: [BaudRate; 10] = [
        BaudRate::B300,
        BaudRate::B600,
        BaudRate::B1200,
        BaudRate::B4800,
        BaudRate::B9600,
        BaudRate::B14400,
        BaudRate::B19200,
        BaudRate::B38400,
        BaudRate::B57600,
        BaudRate::B115200,
    ];

    pub fn value(self) -> u32 {
        match self {
            BaudRate::B300 => 300,
            BaudRate::B600 => 600,
            BaudRate::B1200 => 1200,
            BaudRate::B4800 => 4800,
            BaudRate::B9600 => 9600,
            BaudRate::B14400 => 14400,
            BaudRate::B19200 => 19200,
            BaudRate::B38400 => 38400,
            BaudRate::B57600 => 57600,
            BaudRate::B115200 => 115200,
        }
    }
}

impl TryFrom<u32> for BaudRate {
    type Error = Error;
    fn try_from(v: u32) -> Result<Self> {
        BaudRate::ALL
            .into_iter()
            .find(|b| b.value() == v)
            .ok_or_else(|| Error::Configuration(format!("unsupported baud rate {v}")))
    }
}

impl fmt::Display for BaudRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataBits {
    Five,
    Six,
    Seven,
    Eight,
}

impl DataBits {
    pub fn value(self) -> u8 {
        match self {
            DataBits::Five => 5,
            DataBits::Six => 6,
            DataBits::Seven => 7,
            DataBits::Eight => 8,
        }
    }
}

impl TryFrom<u8> for DataBits {
    type Error = Error;
    fn try_from(v: u8) -> Result<Self> {
        match v {
            5 => Ok(DataBits::Five),
            6 => Ok(DataBits::Six),
            7 => Ok(DataBits::Seven),
            8 => Ok(DataBits::Eight),
            _ => Err(Error::Configuration(format!("unsupported data bits {v}"))),
        }
    }
}

impl From<DataBits> for serialport::DataBits {
    fn from(d: DataBits) -> Self {
        match d {
            DataBits::Five => serialport::DataBits::Five,
            DataBits::Six => serialport::DataBits::Six,
            DataBits::Seven => serialport::DataBits::Seven,
            DataBits::Eight => serialport::DataBits::Eight,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    None,
    Even,
    Odd,
}

impl FromStr for Parity {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "n" => Ok(Parity::None),
            "even" | "e" => Ok(Parity::Even),
            "odd" | "o" => Ok(Parity::Odd),
            _ => Err(Error::Configuration(format!("unsupported parity {s:?}"))),
        }
    }
}

impl fmt::Display for Parity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Parity::None => "none",
            Parity::Even => "even",
            Parity::Odd => "odd",
        })
    }
}

impl From<Parity> for serialport::Parity {
    fn from(p: Parity) -> Self {
        match p {
            Parity::None => serialport::Parity::None,
            Parity::Even => serialport::Parity::Even,
            Parity::Odd => serialport::Parity::Odd,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopBits {
    One,
    Two,
}

impl FromStr for StopBits {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "one" | "1" => Ok(StopBits::One),
            "two" | "2" => Ok(StopBits::Two),
            _ => Err(Error::Configuration(format!("unsupported stop bits {s:?}"))),
        }
    }
}

impl fmt::Display for StopBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StopBits::One => "one",
            StopBits::Two => "two",
        })
    }
}

impl From<StopBits> for serialport::StopBits {
    fn from(s: StopBits) -> Self {
        match s {
            StopBits::One => serialport::StopBits::One,
            StopBits::Two => serialport::StopBits::Two,
        }
    }
}

/// Line parameters handed to a [`Transport`](crate::port::Transport) on open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineSettings {
    pub port_name: String,
    pub baud_rate: BaudRate,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
}

impl LineSettings {
    /// Bits on the wire per payload byte, start bit included.
    pub fn bits_per_byte(&self) -> u32 {
        let parity = if self.parity == Parity::None { 0 } else { 1 };
        let stop = match self.stop_bits {
            StopBits::One => 1,
            StopBits::Two => 2,
        };
        1 + self.data_bits.value() as u32 + parity + stop
    }
}

impl Default for LineSettings {
    fn default() -> Self {
        Self {
            port_name: DEFAULT_PORT_NAME.to_string(),
            baud_rate: BaudRate::B9600,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
        }
    }
}

/// Immutable settings for one connection. Build with [`Config::builder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    line: LineSettings,
    update_frequency: u32,
    missed_updates_allowed: u32,
    reset_delay: Duration,
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    pub fn line(&self) -> &LineSettings {
        &self.line
    }

    pub fn port_name(&self) -> &str {
        &self.line.port_name
    }

    /// Updates per second.
    pub fn update_frequency(&self) -> u32 {
        self.update_frequency
    }

    pub fn missed_updates_allowed(&self) -> u32 {
        self.missed_updates_allowed
    }

    pub fn reset_delay(&self) -> Duration {
        self.reset_delay
    }

    pub fn update_period(&self) -> Duration {
        Duration::from_secs(1) / self.update_frequency
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            line: LineSettings::default(),
            update_frequency: DEFAULT_UPDATE_FREQUENCY,
            missed_updates_allowed: DEFAULT_MISSED_UPDATES_ALLOWED,
            reset_delay: DEFAULT_RESET_DELAY,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn port_name(mut self, name: impl Into<String>) -> Self {
        self.config.line.port_name = name.into();
        self
    }

    pub fn baud_rate(mut self, baud: BaudRate) -> Self {
        self.config.line.baud_rate = baud;
        self
    }

    pub fn data_bits(mut self, bits: DataBits) -> Self {
        self.config.line.data_bits = bits;
        self
    }

    pub fn parity(mut self, parity: Parity) -> Self {
        self.config.line.parity = parity;
        self
    }

    pub fn stop_bits(mut self, stop: StopBits) -> Self {
        self.config.line.stop_bits = stop;
        self
    }

    pub fn update_frequency(mut self, per_second: u32) -> Self {
        self.config.update_frequency = per_second;
        self
    }

    pub fn missed_updates_allowed(mut self, n: u32) -> Self {
        self.config.missed_updates_allowed = n;
        self
    }

    pub fn reset_delay(mut self, delay: Duration) -> Self {
        self.config.reset_delay = delay;
        self
    }

    pub fn build(self) -> Result<Config> {
        let c = self.config;
        if !(MIN_UPDATE_FREQUENCY..=MAX_UPDATE_FREQUENCY).contains(&c.update_frequency) {
            return Err(Error::Configuration(format!(
                "update frequency {} outside [{MIN_UPDATE_FREQUENCY}, {MAX_UPDATE_FREQUENCY}]",
                c.update_frequency
            )));
        }
        if !(MIN_MISSED_UPDATES_ALLOWED..=MAX_MISSED_UPDATES_ALLOWED)
            .contains(&c.missed_updates_allowed)
        {
            return Err(Error::Configuration(format!(
                "missed updates allowed {} outside [{MIN_MISSED_UPDATES_ALLOWED}, {MAX_MISSED_UPDATES_ALLOWED}]",
                c.missed_updates_allowed
            )));
        }
        Ok(c)
    }
}
