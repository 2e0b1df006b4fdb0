use log::debug;

use super::{I2cAddress, I2cSession, SessionError, RESPONSE_TIMEOUT};
use crate::mpsse::{self, Direction};
use crate::transport::UsbTransport;

const ACK_BIT: u8 = 0x01;

/// Reference session: synthesizes every bus primitive as MPSSE command
/// streams over raw bulk transfers.
pub struct MpsseSession<T: UsbTransport> {
    transport: T,
    frequency: u32,
}

impl<T: UsbTransport> MpsseSession<T> {
    pub fn new(transport: T, frequency: u32) -> Self {
        Self {
            transport,
            frequency,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn send(&mut self, cmd: &[u8]) -> Result<(), SessionError> {
        debug!("send {:02X?}", cmd);
        self.transport.write(cmd)?;
        Ok(())
    }

    fn recv(&mut self, expected_len: usize) -> Result<Vec<u8>, SessionError> {
        let response = self.transport.read(expected_len, RESPONSE_TIMEOUT)?;
        debug!("recv {:02X?}", response);
        Ok(response)
    }

    fn send_address(&mut self, address: I2cAddress, direction: Direction) -> Result<bool, SessionError> {
        let mut cmd = mpsse::start();
        cmd.extend(mpsse::addr_with_ack(address.raw(), direction));
        self.send(&cmd)?;

        let ack = self.recv(1)?;
        Ok(matches!(ack.first(), Some(bit) if bit & ACK_BIT == 0))
    }
}

impl<T: UsbTransport> I2cSession for MpsseSession<T> {
    fn init(&mut self) -> Result<(), SessionError> {
        self.send(&mpsse::sync_probe())?;
        let echo = self.recv(2)?;
        if echo != mpsse::sync_reply() {
            return Err(SessionError::OutOfSync);
        }

        let divisor = mpsse::divisor_for_frequency(self.frequency);
        self.send(&mpsse::configure(divisor))?;
        self.send(&mpsse::idle())?;
        debug!("bus configured: {} Hz, divisor {}", self.frequency, divisor);
        Ok(())
    }

    fn probe_address(&mut self, address: I2cAddress) -> Result<bool, SessionError> {
        debug!("probe {}", address);
        let acked = self.send_address(address, Direction::Write)?;
        // Stop on the NAK path too, so the bus is released before the next
        // address gets its start condition.
        self.send(&mpsse::stop())?;
        Ok(acked)
    }

    fn read_byte(&mut self, address: I2cAddress) -> Result<Option<u8>, SessionError> {
        debug!("read {}", address);
        if !self.send_address(address, Direction::Read)? {
            self.send(&mpsse::stop())?;
            return Ok(None);
        }

        self.send(&mpsse::byte_in_with_nak())?;
        let data = self.recv(1)?;
        self.send(&mpsse::stop())?;
        Ok(data.first().copied())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::time::Duration;

    use super::*;
    use crate::transport::TransportError;

    #[derive(Default)]
    struct ScriptedTransport {
        written: Vec<u8>,
        responses: VecDeque<Vec<u8>>,
        fail_next: bool,
    }

    impl ScriptedTransport {
        fn respond(mut self, response: &[u8]) -> Self {
            self.responses.push_back(response.to_vec());
            self
        }
    }

    impl UsbTransport for ScriptedTransport {
        fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
            if self.fail_next {
                return Err(TransportError::Usb(rusb::Error::NoDevice));
            }
            self.written.extend_from_slice(bytes);
            Ok(())
        }

        fn read(
            &mut self,
            expected_len: usize,
            _timeout: Duration,
        ) -> Result<Vec<u8>, TransportError> {
            let mut response = self.responses.pop_front().unwrap_or_default();
            response.truncate(expected_len);
            Ok(response)
        }
    }

    fn probe_stream(direction: Direction) -> Vec<u8> {
        let mut expected = mpsse::start();
        expected.extend(mpsse::addr_with_ack(0x08, direction));
        expected.extend(mpsse::stop());
        expected
    }

    #[test]
    fn init_configures_and_idles_the_bus() {
        let transport = ScriptedTransport::default().respond(&[0xFA, 0xAA]);
        let mut session = MpsseSession::new(transport, 100_000);
        session.init().unwrap();

        let mut expected = mpsse::sync_probe();
        expected.extend(mpsse::configure(199));
        expected.extend(mpsse::idle());
        assert_eq!(session.transport().written, expected);
    }

    #[test]
    fn init_detects_desynchronized_engine() {
        let transport = ScriptedTransport::default().respond(&[0xFA, 0xAB]);
        let mut session = MpsseSession::new(transport, 100_000);
        assert!(matches!(session.init(), Err(SessionError::OutOfSync)));
    }

    #[test]
    fn probe_acked_address() {
        let transport = ScriptedTransport::default().respond(&[0x00]);
        let mut session = MpsseSession::new(transport, 100_000);
        let address = I2cAddress::new(0x08).unwrap();

        assert!(session.probe_address(address).unwrap());
        assert_eq!(session.transport().written, probe_stream(Direction::Write));
    }

    #[test]
    fn probe_nak_still_sends_stop() {
        let transport = ScriptedTransport::default().respond(&[0x01]);
        let mut session = MpsseSession::new(transport, 100_000);
        let address = I2cAddress::new(0x08).unwrap();

        assert!(!session.probe_address(address).unwrap());
        assert_eq!(session.transport().written, probe_stream(Direction::Write));
    }

    #[test]
    fn probe_without_response_is_nak() {
        let transport = ScriptedTransport::default();
        let mut session = MpsseSession::new(transport, 100_000);
        let address = I2cAddress::new(0x0B).unwrap();

        assert!(!session.probe_address(address).unwrap());
    }

    #[test]
    fn read_byte_acked() {
        let transport = ScriptedTransport::default().respond(&[0x00]).respond(&[0x42]);
        let mut session = MpsseSession::new(transport, 100_000);
        let address = I2cAddress::new(0x08).unwrap();

        assert_eq!(session.read_byte(address).unwrap(), Some(0x42));

        let mut expected = mpsse::start();
        expected.extend(mpsse::addr_with_ack(0x08, Direction::Read));
        expected.extend(mpsse::byte_in_with_nak());
        expected.extend(mpsse::stop());
        assert_eq!(session.transport().written, expected);
    }

    #[test]
    fn read_byte_nak_skips_data_clocking() {
        let transport = ScriptedTransport::default().respond(&[0x01]);
        let mut session = MpsseSession::new(transport, 100_000);
        let address = I2cAddress::new(0x08).unwrap();

        assert_eq!(session.read_byte(address).unwrap(), None);
        assert_eq!(session.transport().written, probe_stream(Direction::Read));
    }

    #[test]
    fn read_byte_short_response_is_none() {
        let transport = ScriptedTransport::default().respond(&[0x00]);
        let mut session = MpsseSession::new(transport, 100_000);
        let address = I2cAddress::new(0x08).unwrap();

        assert_eq!(session.read_byte(address).unwrap(), None);
    }

    #[test]
    fn transport_failure_propagates() {
        let mut transport = ScriptedTransport::default();
        transport.fail_next = true;
        let mut session = MpsseSession::new(transport, 100_000);
        let address = I2cAddress::new(0x08).unwrap();

        assert!(matches!(
            session.probe_address(address),
            Err(SessionError::Transport(_))
        ));
    }
}
