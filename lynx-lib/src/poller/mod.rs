use std::fmt::Display;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, error};
use serde::Serialize;
use thiserror::Error;

use crate::config::DeviceConfig;
use crate::i2c::{I2cAddress, I2cSession, SessionError};
use crate::status::{decode, DistributorReport};

pub const DISTRIBUTOR_COUNT: usize = 4;

const BASE_ADDRESS: u8 = 0x08;

// Consecutive failed cycles before the device itself is flagged.
pub const DEVICE_FAULT_THRESHOLD: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DistributorId {
    A,
    B,
    C,
    D,
}

impl DistributorId {
    pub const ALL: [DistributorId; DISTRIBUTOR_COUNT] = [
        DistributorId::A,
        DistributorId::B,
        DistributorId::C,
        DistributorId::D,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn address(self) -> I2cAddress {
        I2cAddress::new(BASE_ADDRESS + self as u8).expect("distributor addresses are fixed")
    }
}

impl Display for DistributorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DistributorId::A => "A".fmt(f),
            DistributorId::B => "B".fmt(f),
            DistributorId::C => "C".fmt(f),
            DistributorId::D => "D".fmt(f),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DistributorEntry {
    pub id: DistributorId,
    #[serde(flatten)]
    pub report: DistributorReport,
}

/// One complete poll cycle: a fresh record per distributor, A through D.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub distributors: Vec<DistributorEntry>,
}

#[derive(Error, Debug)]
pub enum PollError {
    #[error("bus communication failed")]
    CommunicationFailed(#[source] SessionError),
}

/// Poll all four distributors in order. A session failure anywhere aborts
/// the whole cycle; no partial records are emitted, the next cycle starts
/// fresh.
pub fn poll_cycle(
    session: &mut dyn I2cSession,
    config: &DeviceConfig,
) -> Result<CycleReport, PollError> {
    let mut distributors = Vec::with_capacity(DISTRIBUTOR_COUNT);

    for id in DistributorId::ALL {
        let distributor_config = &config.distributors[id.index()];

        let reachable = session
            .probe_address(id.address())
            .map_err(PollError::CommunicationFailed)?;
        let raw = if reachable {
            session
                .read_byte(id.address())
                .map_err(PollError::CommunicationFailed)?
        } else {
            None
        };

        debug!("distributor {}: reachable={} raw={:02X?}", id, reachable, raw);
        distributors.push(DistributorEntry {
            id,
            report: decode(reachable, raw, distributor_config),
        });
    }

    Ok(CycleReport { distributors })
}

/// Where completed cycles go, typically the publish layer.
pub trait StatusSink {
    fn cycle_complete(&mut self, report: &CycleReport);

    /// Called once per failed cycle with the running count of consecutive
    /// failures; previously published values stay stale until the next
    /// successful cycle.
    fn cycle_failed(&mut self, error: &PollError, consecutive_failures: u32);
}

#[derive(Debug, Clone, Copy)]
pub struct PollSchedule {
    /// Cadence between cycle starts.
    pub interval: Duration,
    /// Minimum pause after a cycle ends before the next may start,
    /// regardless of cadence.
    pub min_cycle_delay: Duration,
}

impl Default for PollSchedule {
    fn default() -> Self {
        PollSchedule {
            interval: Duration::from_secs(1),
            min_cycle_delay: Duration::ZERO,
        }
    }
}

/// First tick at or after `now` on the cadence grid anchored at `previous`.
/// A cycle that overruns its slot skips the missed ticks instead of
/// running cycles back-to-back to catch up.
fn next_tick(previous: Instant, now: Instant, interval: Duration) -> Instant {
    let mut next = previous + interval;
    while next <= now {
        next += interval;
    }
    next
}

/// Drive the session at a fixed cadence until the process ends. At most one
/// cycle is in flight; overruns skip ticks. Transport failures do not stop
/// the loop, but after [`DEVICE_FAULT_THRESHOLD`] consecutive ones the
/// device is reported faulted (recovery is the operator's call).
pub fn run(
    session: &mut dyn I2cSession,
    config: &DeviceConfig,
    sink: &mut dyn StatusSink,
    schedule: &PollSchedule,
) {
    let mut consecutive_failures = 0u32;
    let mut tick = Instant::now();

    loop {
        let started = Instant::now();
        match poll_cycle(session, config) {
            Ok(report) => {
                consecutive_failures = 0;
                sink.cycle_complete(&report);
            }
            Err(e) => {
                consecutive_failures += 1;
                if consecutive_failures == DEVICE_FAULT_THRESHOLD {
                    error!(
                        "{} consecutive failed cycles, device considered faulted",
                        consecutive_failures
                    );
                }
                sink.cycle_failed(&e, consecutive_failures);
            }
        }

        tick = next_tick(tick, Instant::now(), schedule.interval);
        let resume = tick.max(started + schedule.min_cycle_delay);
        if let Some(pause) = resume.checked_duration_since(Instant::now()) {
            thread::sleep(pause);
        }
    }
}
