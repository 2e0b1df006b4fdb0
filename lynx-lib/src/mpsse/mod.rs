//! MPSSE command streams for bit-banged I2C on an FTDI bridge.
//!
//! The bridge has no I2C engine of its own; every bus primitive is a short
//! program for the MPSSE command processor, clocking the three ADBUS lines
//! (bit 0 = SCL, bit 1 = SDA out, bit 2 = SDA in) in open-drain emulation.
//! Builders here only produce bytes, they never touch the device.

use std::fmt::Display;

const WRITE_BYTES_NVE_MSB: u8 = 0x11;
const WRITE_BITS_NVE_MSB: u8 = 0x13;
const READ_BYTES_PVE_MSB: u8 = 0x20;
const READ_BITS_PVE_MSB: u8 = 0x22;
const SET_BITS_LOW: u8 = 0x80;
const SET_BITS_HIGH: u8 = 0x82;
const LOOPBACK_OFF: u8 = 0x85;
const SET_TCK_DIVISOR: u8 = 0x86;
const SEND_IMMEDIATE: u8 = 0x87;
const DISABLE_CLK_DIV5: u8 = 0x8A;
const ENABLE_CLK_3PHASE: u8 = 0x8C;
const DISABLE_ADAPTIVE_CLK: u8 = 0x97;
const SET_DRIVE_ZERO: u8 = 0x9E;
const BAD_COMMAND: u8 = 0xAA;
const BAD_COMMAND_ECHO: u8 = 0xFA;

const SCL_BIT: u8 = 0x01;
const SDA_O_BIT: u8 = 0x02;
const SDA_I_BIT: u8 = 0x04;

// SCL and SDA-out are driven, SDA-in stays an input.
const LINE_DIR: u8 = SCL_BIT | SDA_O_BIT;
// All three lines participate in open-drain emulation.
const DRIVE_ZERO_MASK: u8 = SCL_BIT | SDA_O_BIT | SDA_I_BIT;

// Each line transition of a start/stop condition is held for this many
// identical commands to satisfy setup/hold times at any supported divisor.
const HOLD_REPEAT: usize = 4;

/// MPSSE base clock with the divide-by-5 prescaler disabled.
pub const CLOCK_HZ: u32 = 60_000_000;

/// Standard-mode bus frequency used when nothing else is configured.
pub const DEFAULT_FREQUENCY_HZ: u32 = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Write,
    Read,
}

impl Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Write => "W".fmt(f),
            Direction::Read => "R".fmt(f),
        }
    }
}

/// Pack a 7-bit address and transfer direction into the wire byte.
pub fn address_byte(address: u8, direction: Direction) -> u8 {
    let dir_bit = match direction {
        Direction::Write => 0,
        Direction::Read => 1,
    };
    (address & 0x7F) << 1 | dir_bit
}

/// Inverse of [`address_byte`].
pub fn parse_address_byte(byte: u8) -> (u8, Direction) {
    let direction = if byte & 0x01 != 0 {
        Direction::Read
    } else {
        Direction::Write
    };
    (byte >> 1, direction)
}

/// Divisor for a target SCL frequency: with 3-phase clocking the engine
/// spends three half-periods per bit, so SCL = 60 MHz / (3 * (1 + divisor)).
pub fn divisor_for_frequency(frequency: u32) -> u16 {
    let divisor = CLOCK_HZ / (3 * frequency.max(1));
    divisor.saturating_sub(1).min(u16::MAX as u32) as u16
}

fn set_lines(buffer: &mut Vec<u8>, value: u8) {
    buffer.extend_from_slice(&[SET_BITS_LOW, value, LINE_DIR]);
}

fn hold_lines(buffer: &mut Vec<u8>, value: u8) {
    for _ in 0..HOLD_REPEAT {
        set_lines(buffer, value);
    }
}

/// One-time bus setup: direct 60 MHz clock, no adaptive clocking, 3-phase
/// clocking for I2C timing, open-drain emulation on the bus lines, loopback
/// off, then the clock divisor (low byte first).
pub fn configure(divisor: u16) -> Vec<u8> {
    let mut cmd = vec![
        DISABLE_CLK_DIV5,
        DISABLE_ADAPTIVE_CLK,
        ENABLE_CLK_3PHASE,
        SET_DRIVE_ZERO,
        DRIVE_ZERO_MASK,
        0x00,
        LOOPBACK_OFF,
        SET_TCK_DIVISOR,
    ];
    cmd.extend_from_slice(&divisor.to_le_bytes());
    cmd
}

/// Release both banks to the bus-idle state: SCL and SDA-out float high,
/// the high bank stays all-input.
pub fn idle() -> Vec<u8> {
    let mut cmd = Vec::with_capacity(6);
    set_lines(&mut cmd, SCL_BIT | SDA_O_BIT);
    cmd.extend_from_slice(&[SET_BITS_HIGH, 0x00, 0x00]);
    cmd
}

/// Start condition: SDA falls while SCL is still high, then SCL follows.
pub fn start() -> Vec<u8> {
    let mut cmd = Vec::with_capacity(2 * HOLD_REPEAT * 3);
    hold_lines(&mut cmd, SCL_BIT);
    hold_lines(&mut cmd, 0x00);
    cmd
}

/// Stop condition: SCL rises with SDA still low, then SDA releases.
pub fn stop() -> Vec<u8> {
    let mut cmd = Vec::with_capacity(3 * HOLD_REPEAT * 3);
    hold_lines(&mut cmd, 0x00);
    hold_lines(&mut cmd, SCL_BIT);
    hold_lines(&mut cmd, SCL_BIT | SDA_O_BIT);
    cmd
}

/// Clock the address byte out MSB-first on the falling edge, release SDA
/// with SCL held low, sample the slave's ACK bit on the rising edge and
/// flush the response immediately.
pub fn addr_with_ack(address: u8, direction: Direction) -> Vec<u8> {
    let mut cmd = vec![
        WRITE_BYTES_NVE_MSB,
        0x00,
        0x00,
        address_byte(address, direction),
    ];
    set_lines(&mut cmd, SDA_O_BIT);
    cmd.extend_from_slice(&[READ_BITS_PVE_MSB, 0x00, SEND_IMMEDIATE]);
    cmd
}

/// Clock one data byte in MSB-first on the rising edge, answer with a NAK
/// bit (this driver never chains reads), release SDA and flush.
pub fn byte_in_with_nak() -> Vec<u8> {
    let mut cmd = vec![
        READ_BYTES_PVE_MSB,
        0x00,
        0x00,
        WRITE_BITS_NVE_MSB,
        0x00,
        0xFF,
    ];
    set_lines(&mut cmd, SDA_O_BIT);
    cmd.push(SEND_IMMEDIATE);
    cmd
}

/// Deliberately invalid opcode; a synchronized engine echoes it back
/// prefixed with 0xFA.
pub fn sync_probe() -> Vec<u8> {
    vec![BAD_COMMAND]
}

/// Expected engine reply to [`sync_probe`].
pub fn sync_reply() -> [u8; 2] {
    [BAD_COMMAND_ECHO, BAD_COMMAND]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_configure() {
        let reference: [u8; 10] = [0x8A, 0x97, 0x8C, 0x9E, 0x07, 0x00, 0x85, 0x86, 0xC7, 0x00];
        assert_eq!(configure(199), reference);
    }

    #[test]
    fn encode_idle() {
        let reference: [u8; 6] = [0x80, 0x03, 0x03, 0x82, 0x00, 0x00];
        assert_eq!(idle(), reference);
    }

    #[test]
    fn encode_start() {
        let mut reference = Vec::new();
        reference.extend_from_slice(&[0x80, 0x01, 0x03].repeat(4));
        reference.extend_from_slice(&[0x80, 0x00, 0x03].repeat(4));
        assert_eq!(start(), reference);
    }

    #[test]
    fn encode_stop() {
        let mut reference = Vec::new();
        reference.extend_from_slice(&[0x80, 0x00, 0x03].repeat(4));
        reference.extend_from_slice(&[0x80, 0x01, 0x03].repeat(4));
        reference.extend_from_slice(&[0x80, 0x03, 0x03].repeat(4));
        assert_eq!(stop(), reference);
    }

    #[test]
    fn encode_addr_read() {
        let reference: [u8; 10] = [0x11, 0x00, 0x00, 0x11, 0x80, 0x02, 0x03, 0x22, 0x00, 0x87];
        assert_eq!(addr_with_ack(0x08, Direction::Read), reference);
    }

    #[test]
    fn encode_addr_write() {
        let reference: [u8; 10] = [0x11, 0x00, 0x00, 0x10, 0x80, 0x02, 0x03, 0x22, 0x00, 0x87];
        assert_eq!(addr_with_ack(0x08, Direction::Write), reference);
    }

    #[test]
    fn encode_byte_in() {
        let reference: [u8; 10] = [0x20, 0x00, 0x00, 0x13, 0x00, 0xFF, 0x80, 0x02, 0x03, 0x87];
        assert_eq!(byte_in_with_nak(), reference);
    }

    #[test]
    fn address_byte_roundtrip() {
        for address in 0..=0x7F {
            for direction in [Direction::Write, Direction::Read] {
                assert_eq!(
                    parse_address_byte(address_byte(address, direction)),
                    (address, direction)
                );
            }
        }
    }

    #[test]
    fn divisor_standard_and_fast() {
        assert_eq!(divisor_for_frequency(100_000), 199);
        assert_eq!(divisor_for_frequency(400_000), 49);
    }

    #[test]
    fn sync_reply_echoes_probe() {
        assert_eq!(sync_reply(), [0xFA, sync_probe()[0]]);
    }
}
