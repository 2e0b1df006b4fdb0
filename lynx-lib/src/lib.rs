//! Monitoring for Lynx battery-fuse distributor boards reached over a
//! USB-attached FTDI bridge in MPSSE mode.
//!
//! Layers, bottom up: [`mpsse`] builds the raw command streams, [`transport`]
//! moves them over USB bulk endpoints, [`i2c`] composes them into probe/read
//! sessions, [`status`] decodes one raw status byte per distributor into
//! health records, and [`poller`] drives the cycle.

pub mod config;
pub mod i2c;
pub mod mpsse;
pub mod poller;
pub mod status;
pub mod transport;
