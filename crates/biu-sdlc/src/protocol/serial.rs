//! Serial port handling
//!
//! Opens and configures the physical port from [`SerialSettings`].

use serialport::{FlowControl, SerialPort};
use std::time::Duration;

use super::ProtocolError;
use crate::config::{DataBits, Parity, SerialSettings, StopBits};

impl From<DataBits> for serialport::DataBits {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Five => serialport::DataBits::Five,
            DataBits::Six => serialport::DataBits::Six,
            DataBits::Seven => serialport::DataBits::Seven,
            DataBits::Eight => serialport::DataBits::Eight,
        }
    }
}

impl From<Parity> for serialport::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => serialport::Parity::None,
            Parity::Odd => serialport::Parity::Odd,
            Parity::Even => serialport::Parity::Even,
        }
    }
}

impl From<StopBits> for serialport::StopBits {
    fn from(bits: StopBits) -> Self {
        match bits {
            StopBits::One => serialport::StopBits::One,
            StopBits::Two => serialport::StopBits::Two,
        }
    }
}

/// Open a serial port with the given framing parameters
pub fn open_port(
    settings: &SerialSettings,
    timeout: Duration,
) -> Result<Box<dyn SerialPort>, ProtocolError> {
    if settings.port_name.is_empty() {
        return Err(ProtocolError::SerialError("no port name configured".into()));
    }

    let mut port = serialport::new(&settings.port_name, settings.baud_rate)
        .timeout(timeout)
        .open()?;
    configure_port(port.as_mut(), settings)?;
    Ok(port)
}

/// Apply data bits, parity and stop bits; flow control is always off
pub fn configure_port(
    port: &mut dyn SerialPort,
    settings: &SerialSettings,
) -> Result<(), ProtocolError> {
    port.set_data_bits(settings.data_bits.into())?;
    port.set_parity(settings.parity.into())?;
    port.set_stop_bits(settings.stop_bits.into())?;
    port.set_flow_control(FlowControl::None)?;
    Ok(())
}
