use std::io::{Read, Write};
use std::time::Duration;

use serialport::FlowControl;
use tracing::debug;

use crate::config::LineSettings;
use crate::error::{Error, Result};

/// Read timeout on the port. Bounds how long the inbound loop takes to notice `close()`.
pub const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// The two halves of an open line. Each is driven by its own thread.
pub struct Duplex {
    pub reader: Box<dyn Read + Send>,
    pub writer: Box<dyn Write + Send>,
}

/// Byte-stream device the connection talks through.
pub trait Transport: Send + Sync {
    /// Names of ports that could be opened right now.
    fn ports(&self) -> Result<Vec<String>>;

    fn open(&self, line: &LineSettings) -> Result<Duplex>;
}

/// [`Transport`] backed by the host's serial ports.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialTransport;

impl Transport for SerialTransport {
    fn ports(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = serialport::available_ports()
            .map_err(|e| Error::connection("*", e))?
            .into_iter()
            .map(|p| p.port_name)
            .collect();
        names.sort();
        Ok(names)
    }

    fn open(&self, line: &LineSettings) -> Result<Duplex> {
        let port = serialport::new(&line.port_name, line.baud_rate.value())
            .timeout(READ_TIMEOUT)
            .data_bits(line.data_bits.into())
            .parity(line.parity.into())
            .stop_bits(line.stop_bits.into())
            .flow_control(FlowControl::None)
            .open()
            .map_err(|e| Error::connection(&line.port_name, e))?;

        let reader = port
            .try_clone()
            .map_err(|e| Error::connection(&line.port_name, e))?;
        debug!(
            port = %line.port_name,
            baud = %line.baud_rate,
            data_bits = line.data_bits.value(),
            parity = %line.parity,
            stop_bits = %line.stop_bits,
            "serial port opened"
        );

        Ok(Duplex {
            reader: Box::new(reader),
            writer: Box::new(port),
        })
    }
}
