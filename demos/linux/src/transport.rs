//! Resolve the endpoint given on the command line to an I2C bus.
//!
//! `/dev/i2c-*` paths go through the kernel I2C driver, anything else is treated
//! as the serial port of an I2CDriver bridge.

use std::time::Duration;

use anyhow::Context;
use embedded_hal::i2c::{self, ErrorKind, I2c, Operation, SevenBitAddress};
use linux_embedded_hal::{I2CError, I2cdev};
use log::{debug, info};
use thiserror::Error;

use crate::i2cdriver::{BridgeError, I2cDriver};

const LINUX_I2C_PREFIX: &str = "/dev/i2c-";

/// Error from whichever bus is in use
#[derive(Debug, Error)]
pub enum TransportError {
    /// I2CDriver bridge
    #[error(transparent)]
    Bridge(#[from] BridgeError),
    /// Kernel I2C device
    #[error("linux i2c: {0:?}")]
    Linux(I2CError),
}

impl i2c::Error for TransportError {
    fn kind(&self) -> ErrorKind {
        match self {
            TransportError::Bridge(e) => i2c::Error::kind(e),
            TransportError::Linux(e) => i2c::Error::kind(e),
        }
    }
}

/// An open I2C bus
pub enum Bus {
    /// USB bridge on a serial port
    Bridge(I2cDriver),
    /// Kernel I2C character device
    Linux(I2cdev),
}

/// True if `path` names a kernel I2C bus rather than a bridge
pub fn is_linux_bus(path: &str) -> bool {
    path.starts_with(LINUX_I2C_PREFIX)
}

/// Connect to the bus behind `path`. Dropping the returned bus disconnects.
pub fn open(path: &str, timeout: Duration) -> anyhow::Result<Bus> {
    if is_linux_bus(path) {
        let dev = I2cdev::new(path).with_context(|| format!("cannot open {path}"))?;
        info!("using kernel I2C bus {path}");
        return Ok(Bus::Linux(dev));
    }

    let mut bridge = I2cDriver::open(path, timeout)
        .with_context(|| format!("no I2CDriver bridge answering on {path}"))?;
    match bridge.status() {
        Ok(status) => info!("bridge {path}: {status}"),
        Err(e) => debug!("bridge {path} did not report status: {e}"),
    }
    Ok(Bus::Bridge(bridge))
}

impl i2c::ErrorType for Bus {
    type Error = TransportError;
}

impl I2c<SevenBitAddress> for Bus {
    fn transaction(
        &mut self,
        address: SevenBitAddress,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        match self {
            Bus::Bridge(bridge) => bridge
                .transaction(address, operations)
                .map_err(TransportError::Bridge),
            Bus::Linux(dev) => dev
                .transaction(address, operations)
                .map_err(TransportError::Linux),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_kind() {
        assert!(is_linux_bus("/dev/i2c-1"));
        assert!(is_linux_bus("/dev/i2c-10"));
        assert!(!is_linux_bus("/dev/ttyUSB0"));
        assert!(!is_linux_bus("/dev/serial/by-id/usb-FTDI_FT230X_Basic_UART_DO01JUOV-if00-port0"));
    }

    #[test]
    fn test_nack_kind_is_forwarded() {
        let err = TransportError::Bridge(BridgeError::Nack {
            address: 0x53,
            stage: i2c::NoAcknowledgeSource::Address,
        });
        assert_eq!(
            i2c::Error::kind(&err),
            ErrorKind::NoAcknowledge(i2c::NoAcknowledgeSource::Address)
        );
    }

    #[test]
    fn test_missing_bridge_fails_to_open() {
        let result = open("/dev/does-not-exist-ltr390", Duration::from_millis(10));
        assert!(result.is_err());
    }
}
