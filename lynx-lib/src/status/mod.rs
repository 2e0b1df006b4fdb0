//! Health decoding for one distributor's raw status byte.
//!
//! The published numeric encodings (`ToPrimitive`) are the external
//! contract; decoding itself is a pure function of the poll outcome and the
//! installed-policy configuration, recomputed fresh every cycle.

use std::fmt::Display;

use num_derive::{FromPrimitive, ToPrimitive};
use serde::{Deserialize, Serialize};

pub const FUSES_PER_DISTRIBUTOR: usize = 4;

const NO_BUS_POWER_BIT: u8 = 0b0000_0010;
const FUSE_BLOWN_BASE: u8 = 0b0001_0000;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive, Serialize, Deserialize,
)]
pub enum DistributorStatus {
    NotAvailable = 0,
    Connected = 1,
    NoBusPower = 2,
    CommunicationsLost = 3,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive, Serialize, Deserialize,
)]
pub enum FuseStatus {
    NotAvailable = 0,
    NotUsed = 1,
    Ok = 2,
    Blown = 3,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive, Serialize, Deserialize,
)]
pub enum AlarmState {
    Ok = 0,
    Alarm = 2,
}

impl Display for DistributorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DistributorStatus::NotAvailable => "not available".fmt(f),
            DistributorStatus::Connected => "connected".fmt(f),
            DistributorStatus::NoBusPower => "no bus power".fmt(f),
            DistributorStatus::CommunicationsLost => "communications lost".fmt(f),
        }
    }
}

impl Display for FuseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FuseStatus::NotAvailable => "not available".fmt(f),
            FuseStatus::NotUsed => "not used".fmt(f),
            FuseStatus::Ok => "ok".fmt(f),
            FuseStatus::Blown => "blown".fmt(f),
        }
    }
}

impl Display for AlarmState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlarmState::Ok => "ok".fmt(f),
            AlarmState::Alarm => "ALARM".fmt(f),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FuseConfig {
    #[serde(default = "default_installed")]
    pub installed: bool,
    #[serde(default)]
    pub name: Option<String>,
}

impl Default for FuseConfig {
    fn default() -> Self {
        FuseConfig {
            installed: true,
            name: None,
        }
    }
}

fn default_installed() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DistributorConfig {
    #[serde(default)]
    pub installed: bool,
    #[serde(default)]
    pub fuses: [FuseConfig; FUSES_PER_DISTRIBUTOR],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FuseReport {
    pub status: FuseStatus,
    pub alarm: AlarmState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DistributorReport {
    pub status: DistributorStatus,
    pub connection_lost_alarm: AlarmState,
    pub fuses: [FuseReport; FUSES_PER_DISTRIBUTOR],
}

fn fuse_report(status: FuseStatus, alarm: AlarmState, config: &FuseConfig) -> FuseReport {
    FuseReport {
        status,
        alarm,
        name: config.name.clone(),
    }
}

/// Derive one distributor's health from a single poll outcome.
///
/// `reachable` is the ACK result of the address probe; `raw` the status byte
/// if one arrived. Bit 1 of the byte flags a dead bus-power rail, bits 4–7
/// flag blown fuses 0–3.
pub fn decode(reachable: bool, raw: Option<u8>, config: &DistributorConfig) -> DistributorReport {
    let raw = if reachable { raw } else { None };

    let Some(state) = raw else {
        // No bus contact: a distributor configured as installed has dropped
        // off; one configured as absent is simply not there.
        let (status, alarm) = if config.installed {
            (DistributorStatus::CommunicationsLost, AlarmState::Alarm)
        } else {
            (DistributorStatus::NotAvailable, AlarmState::Ok)
        };
        return DistributorReport {
            status,
            connection_lost_alarm: alarm,
            fuses: std::array::from_fn(|fuse| {
                fuse_report(FuseStatus::NotAvailable, AlarmState::Ok, &config.fuses[fuse])
            }),
        };
    };

    let no_bus_power = state & NO_BUS_POWER_BIT != 0;

    let fuses = std::array::from_fn(|fuse| {
        let fuse_config = &config.fuses[fuse];
        if !fuse_config.installed {
            fuse_report(FuseStatus::NotUsed, AlarmState::Ok, fuse_config)
        } else if no_bus_power {
            // Fuse state cannot be assessed without the power rail.
            fuse_report(FuseStatus::NotAvailable, AlarmState::Ok, fuse_config)
        } else if state & (FUSE_BLOWN_BASE << fuse) != 0 {
            fuse_report(FuseStatus::Blown, AlarmState::Alarm, fuse_config)
        } else {
            fuse_report(FuseStatus::Ok, AlarmState::Ok, fuse_config)
        }
    });

    DistributorReport {
        status: if no_bus_power {
            DistributorStatus::NoBusPower
        } else {
            DistributorStatus::Connected
        },
        connection_lost_alarm: AlarmState::Ok,
        fuses,
    }
}
