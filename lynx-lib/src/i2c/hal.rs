use embedded_hal::i2c::{Error as _, ErrorKind, I2c};

use super::{I2cAddress, I2cSession, SessionError};

/// Library-backed session for platforms that already expose an I2C bus
/// through `embedded-hal`. Swappable with [`super::MpsseSession`] at
/// configuration time; the bus arrives preconfigured, so `init` is a no-op.
pub struct HalSession<B> {
    bus: B,
}

impl<B> HalSession<B> {
    pub fn new(bus: B) -> Self {
        Self { bus }
    }
}

impl<B: I2c + Send> I2cSession for HalSession<B> {
    fn init(&mut self) -> Result<(), SessionError> {
        Ok(())
    }

    fn probe_address(&mut self, address: I2cAddress) -> Result<bool, SessionError> {
        match self.bus.write(address.raw(), &[]) {
            Ok(()) => Ok(true),
            Err(e) if matches!(e.kind(), ErrorKind::NoAcknowledge(_)) => Ok(false),
            Err(e) => Err(SessionError::Bus(format!("{:?}", e))),
        }
    }

    fn read_byte(&mut self, address: I2cAddress) -> Result<Option<u8>, SessionError> {
        let mut data = [0u8; 1];
        match self.bus.read(address.raw(), &mut data) {
            Ok(()) => Ok(Some(data[0])),
            Err(e) if matches!(e.kind(), ErrorKind::NoAcknowledge(_)) => Ok(None),
            Err(e) => Err(SessionError::Bus(format!("{:?}", e))),
        }
    }
}
