mod hal;
mod mpsse;

pub use hal::HalSession;
pub use mpsse::MpsseSession;

use std::fmt::Display;
use std::time::Duration;

use thiserror::Error;

use crate::transport::TransportError;

/// How long to wait for the bridge to clock response bytes back before a
/// missing answer is taken for a NAK.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("i2c address 0x{0:02X} out of range")]
    AddressOutOfRange(u8),
    #[error("mpsse command processor out of sync")]
    OutOfSync,
    #[error("i2c bus error: {0}")]
    Bus(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// A 7-bit slave address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct I2cAddress(u8);

impl I2cAddress {
    pub fn new(raw: u8) -> Result<Self, SessionError> {
        if raw > 0x7F {
            Err(SessionError::AddressOutOfRange(raw))
        } else {
            Ok(I2cAddress(raw))
        }
    }

    pub fn raw(self) -> u8 {
        self.0
    }
}

impl Display for I2cAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:02X}", self.0)
    }
}

/// Single-byte master operations over one addressed bus.
///
/// Every operation leaves the bus idle; per address the session walks
/// Idle → Started → AddressSent and back, either directly on a NAK or
/// through the one-byte data clocking on an ACK. Nothing persists across
/// addresses or polls.
pub trait I2cSession: Send {
    /// One-time bus bring-up. Failure is fatal to the device instance.
    fn init(&mut self) -> Result<(), SessionError>;

    /// Address the slave for writing and sample its ACK. `false` means the
    /// address did not answer.
    fn probe_address(&mut self, address: I2cAddress) -> Result<bool, SessionError>;

    /// Read one byte from the slave, answering with a NAK. `None` means the
    /// address did not answer or the response never arrived.
    fn read_byte(&mut self, address: I2cAddress) -> Result<Option<u8>, SessionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_range_checked() {
        assert!(I2cAddress::new(0x00).is_ok());
        assert!(I2cAddress::new(0x7F).is_ok());
        assert!(matches!(
            I2cAddress::new(0x80),
            Err(SessionError::AddressOutOfRange(0x80))
        ));
    }

    #[test]
    fn address_displays_hex() {
        let address = I2cAddress::new(0x0B).unwrap();
        assert_eq!(address.to_string(), "0x0B");
    }
}
