//! Byte streams over serial ports

use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::time::Duration;

use super::serial::open_port;
use super::ProtocolError;
use crate::config::SerialSettings;

/// Byte stream to the field device
pub trait SerialStream: Read + Write + Send {
    /// Set timeout for read operations
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()>;

    /// Independent handle to the same port, used to split reader and writer
    fn try_clone_stream(&self) -> io::Result<Box<dyn SerialStream>>;
}

/// Opens streams for a connection
pub trait PortOpener: Send + Sync {
    /// Open and configure a stream for `settings`
    fn open(
        &self,
        settings: &SerialSettings,
        timeout: Duration,
    ) -> Result<Box<dyn SerialStream>, ProtocolError>;
}

/// Serial port wrapper implementing SerialStream
pub struct SerialPortStream {
    port: Box<dyn SerialPort>,
}

impl SerialPortStream {
    /// Wrap an opened port
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        Self { port }
    }
}

impl Read for SerialPortStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}

impl Write for SerialPortStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

impl SerialStream for SerialPortStream {
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.port.set_timeout(timeout).map_err(io::Error::other)
    }

    fn try_clone_stream(&self) -> io::Result<Box<dyn SerialStream>> {
        let port_clone = self.port.try_clone().map_err(io::Error::other)?;
        Ok(Box::new(SerialPortStream::new(port_clone)))
    }
}

/// Opens real serial ports through the `serialport` crate
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPortOpener;

impl PortOpener for SystemPortOpener {
    fn open(
        &self,
        settings: &SerialSettings,
        timeout: Duration,
    ) -> Result<Box<dyn SerialStream>, ProtocolError> {
        let port = open_port(settings, timeout)?;
        Ok(Box::new(SerialPortStream::new(port)))
    }
}
