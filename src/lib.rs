//! Host-side driver that keeps a set of named integer commands synchronized
//! with an Arduino over a serial line.
//!
//! ```no_run
//! use arduino_serial::{Config, Connection};
//!
//! fn main() -> arduino_serial::Result<()> {
//!     let config = Config::builder().port_name("/dev/ttyACM0").build()?;
//!     let conn = Connection::with_serial(config);
//!     conn.register_command("BLINK", 500)?;
//!     conn.register_listener(|msg: &str| println!("arduino: {msg}"));
//!     conn.open()?;
//!     conn.update_command("BLINK", 100)?;
//!     conn.close();
//!     Ok(())
//! }
//! ```

pub mod command;
pub mod config;
pub mod connection;
pub mod error;
pub mod frame;
pub mod listener;
pub mod port;
pub mod scheduler;

pub use command::CommandTable;
pub use config::{BaudRate, Config, ConfigBuilder, DataBits, LineSettings, Parity, StopBits};
pub use connection::Connection;
pub use error::{Error, Result};
pub use frame::FrameDecoder;
pub use listener::{Listener, ListenerRegistry};
pub use port::{Duplex, SerialTransport, Transport};
pub use scheduler::{SchedulerState, SchedulerStatus, UpdateScheduler};
