use std::fmt::Display;
use std::time::{Duration, Instant};

use log::debug;
use rusb::{Context, DeviceHandle, UsbContext};
use serde::Serialize;
use thiserror::Error;

#[derive(PartialEq)]
struct UsbId(u16, u16);

static COMPATIBLE_IDS: &[UsbId] = &[
    UsbId(0x0403, 0xD4F8), // Victron Energy Lynx bridge (FT232H based)
];

// FTDI vendor requests, index addresses interface A.
const SIO_RESET: u8 = 0x00;
const SIO_SET_LATENCY_TIMER: u8 = 0x09;
const SIO_SET_BITMODE: u8 = 0x0B;
const SIO_RESET_SIO: u16 = 0;
const SIO_RESET_PURGE_RX: u16 = 1;
const SIO_RESET_PURGE_TX: u16 = 2;
const BITMODE_RESET: u16 = 0x0000;
const BITMODE_MPSSE: u16 = 0x0200;
const INTERFACE_A: u16 = 1;

const EP_OUT: u8 = 0x02;
const EP_IN: u8 = 0x81;

// Every bulk IN transfer starts with two modem-status bytes.
const STATUS_HEADER_LEN: usize = 2;

const LATENCY_MS: u16 = 16;
const CONTROL_TIMEOUT: Duration = Duration::from_millis(500);
const WRITE_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("no compatible usb bridge found")]
    NoBridge,
    #[error("usb bridge {serial:?} not found")]
    BridgeNotFound { serial: String },
    #[error("usb transfer failed: {0}")]
    Usb(#[from] rusb::Error),
}

/// Byte-stream access to the bridge's command processor.
///
/// `read` accumulates payload until `expected_len` bytes arrived or the
/// deadline passed; a short result is a normal outcome (an absent slave
/// never answers), never an error.
pub trait UsbTransport: Send {
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError>;
    fn read(&mut self, expected_len: usize, timeout: Duration) -> Result<Vec<u8>, TransportError>;
}

#[derive(Debug, Clone, Serialize)]
pub struct BridgeInfo {
    pub serial: String,
    pub vendor_id: u16,
    pub product_id: u16,
}

impl Display for BridgeInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {:04x}:{:04x}",
            self.serial, self.vendor_id, self.product_id
        )
    }
}

fn payload_of(transfer: &[u8]) -> &[u8] {
    if transfer.len() <= STATUS_HEADER_LEN {
        &[]
    } else {
        &transfer[STATUS_HEADER_LEN..]
    }
}

/// List attached bridges matching the compatible-ID table. Devices that
/// cannot be opened (e.g. permissions) are skipped.
pub fn list_bridges() -> Result<Vec<BridgeInfo>, TransportError> {
    let context = Context::new()?;
    let mut bridges = Vec::new();

    for device in context.devices()?.iter() {
        let descriptor = match device.device_descriptor() {
            Ok(d) => d,
            Err(_) => continue,
        };
        if !COMPATIBLE_IDS.contains(&UsbId(descriptor.vendor_id(), descriptor.product_id())) {
            continue;
        }
        let serial = device
            .open()
            .and_then(|handle| handle.read_serial_number_string_ascii(&descriptor));
        match serial {
            Ok(serial) => bridges.push(BridgeInfo {
                serial,
                vendor_id: descriptor.vendor_id(),
                product_id: descriptor.product_id(),
            }),
            Err(e) => debug!("skipping unreadable bridge: {}", e),
        }
    }

    Ok(bridges)
}

/// One exclusively-owned MPSSE bridge, held for the process lifetime.
pub struct FtdiTransport {
    handle: DeviceHandle<Context>,
    serial: String,
}

impl FtdiTransport {
    /// Open a bridge by serial number, or the first compatible one for
    /// `"auto"`, and switch it into MPSSE mode.
    pub fn open(serial: &str) -> Result<Self, TransportError> {
        let context = Context::new()?;

        for device in context.devices()?.iter() {
            let descriptor = match device.device_descriptor() {
                Ok(d) => d,
                Err(_) => continue,
            };
            if !COMPATIBLE_IDS.contains(&UsbId(descriptor.vendor_id(), descriptor.product_id())) {
                continue;
            }
            let opened = device
                .open()
                .and_then(|handle| {
                    let device_serial = handle.read_serial_number_string_ascii(&descriptor)?;
                    Ok((handle, device_serial))
                });
            let (handle, device_serial) = match opened {
                Ok(pair) => pair,
                Err(e) => {
                    debug!("skipping unreadable bridge: {}", e);
                    continue;
                }
            };
            if serial != "auto" && serial != device_serial {
                continue;
            }

            let mut transport = FtdiTransport {
                handle,
                serial: device_serial,
            };
            transport.enter_mpsse()?;
            debug!("bridge open: {}", transport.serial);
            return Ok(transport);
        }

        if serial == "auto" {
            Err(TransportError::NoBridge)
        } else {
            Err(TransportError::BridgeNotFound {
                serial: serial.to_string(),
            })
        }
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    fn enter_mpsse(&mut self) -> Result<(), TransportError> {
        // Detaching may be unsupported on some platforms; claiming decides.
        let _ = self.handle.set_auto_detach_kernel_driver(true);
        self.handle.claim_interface(0)?;

        self.vendor_request(SIO_RESET, SIO_RESET_SIO)?;
        self.vendor_request(SIO_RESET, SIO_RESET_PURGE_RX)?;
        self.vendor_request(SIO_RESET, SIO_RESET_PURGE_TX)?;
        self.vendor_request(SIO_SET_LATENCY_TIMER, LATENCY_MS)?;
        self.vendor_request(SIO_SET_BITMODE, BITMODE_RESET)?;
        self.vendor_request(SIO_SET_BITMODE, BITMODE_MPSSE)?;
        Ok(())
    }

    fn vendor_request(&mut self, request: u8, value: u16) -> Result<(), TransportError> {
        let request_type = rusb::request_type(
            rusb::Direction::Out,
            rusb::RequestType::Vendor,
            rusb::Recipient::Device,
        );
        self.handle
            .write_control(request_type, request, value, INTERFACE_A, &[], CONTROL_TIMEOUT)?;
        Ok(())
    }
}

impl Drop for FtdiTransport {
    fn drop(&mut self) {
        let _ = self.vendor_request(SIO_SET_BITMODE, BITMODE_RESET);
        let _ = self.handle.release_interface(0);
    }
}

impl UsbTransport for FtdiTransport {
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let mut written = 0;
        while written < bytes.len() {
            written += self
                .handle
                .write_bulk(EP_OUT, &bytes[written..], WRITE_TIMEOUT)?;
        }
        Ok(())
    }

    fn read(&mut self, expected_len: usize, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let deadline = Instant::now() + timeout;
        let mut payload = Vec::with_capacity(expected_len);
        let mut transfer = [0u8; 64];

        while payload.len() < expected_len {
            let remaining = match deadline.checked_duration_since(Instant::now()) {
                Some(d) if !d.is_zero() => d,
                _ => break,
            };
            match self.handle.read_bulk(EP_IN, &mut transfer, remaining) {
                Ok(n) => payload.extend_from_slice(payload_of(&transfer[..n])),
                Err(rusb::Error::Timeout) => break,
                Err(e) => return Err(e.into()),
            }
        }

        payload.truncate(expected_len);
        Ok(payload)
    }
}
