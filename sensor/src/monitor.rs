//! Background temperature sampling.
//!
//! Probe reads take close to a second, so they run on their own thread and
//! publish into a [`LatestReading`] cell. The control loop only ever loads
//! the most recent value and never waits for a fresh one.

use std::{
    io,
    sync::{
        atomic::{AtomicU32, AtomicU8, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use spa_common::{SensorReading, TemperatureUnit};
use tracing::{error, info, warn};

use crate::probe::TemperatureProbe;

const HEALTH_PENDING: u8 = 0;
const HEALTH_OK: u8 = 1;
const HEALTH_FAILED: u8 = 2;
const HEALTH_INVALID_UNIT: u8 = 3;

/// Single-writer, single-reader published temperature.
#[derive(Debug)]
pub struct LatestReading {
    bits: AtomicU32,
    health: AtomicU8,
}

impl Default for LatestReading {
    fn default() -> Self {
        Self {
            bits: AtomicU32::new(f32::NAN.to_bits()),
            health: AtomicU8::new(HEALTH_PENDING),
        }
    }
}

impl LatestReading {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, temp: f32) {
        self.bits.store(temp.to_bits(), Ordering::Relaxed);
        self.health.store(HEALTH_OK, Ordering::Release);
    }

    /// Keeps the last good value for display but stops it being trusted.
    pub fn mark_failed(&self) {
        self.health.store(HEALTH_FAILED, Ordering::Release);
    }

    pub fn mark_invalid_unit(&self) {
        self.health.store(HEALTH_INVALID_UNIT, Ordering::Release);
    }

    pub fn load(&self) -> SensorReading {
        let health = self.health.load(Ordering::Acquire);
        let value = f32::from_bits(self.bits.load(Ordering::Relaxed));
        let last = (!value.is_nan()).then_some(value);

        match health {
            HEALTH_OK => SensorReading::Valid(value),
            HEALTH_FAILED => SensorReading::Failed { last },
            HEALTH_INVALID_UNIT => SensorReading::InvalidUnit,
            _ => SensorReading::Pending,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorStep {
    Continue,
    Stop,
}

pub struct TemperatureMonitor<P> {
    probe: P,
    raw_unit: char,
    latest: Arc<LatestReading>,
    poll_interval: Duration,
}

impl<P: TemperatureProbe + 'static> TemperatureMonitor<P> {
    pub fn new(probe: P, raw_unit: char, latest: Arc<LatestReading>, poll_interval: Duration) -> Self {
        Self {
            probe,
            raw_unit,
            latest,
            poll_interval,
        }
    }

    /// Reads the probe once and publishes the result rounded to 0.1 degree.
    pub fn sample_once(&mut self) -> MonitorStep {
        let unit = match TemperatureUnit::try_from(self.raw_unit) {
            Ok(unit) => unit,
            Err(err) => {
                error!("temperature monitor stopping: {err}");
                self.latest.mark_invalid_unit();
                return MonitorStep::Stop;
            }
        };

        match self.probe.read(unit) {
            Ok(temp) => self.latest.publish((temp * 10.0).round() / 10.0),
            Err(err) => {
                warn!("temperature probe read failed: {err}");
                self.latest.mark_failed();
            }
        }
        MonitorStep::Continue
    }

    /// Runs the sampling loop on a dedicated thread for the life of the
    /// process.
    pub fn spawn(mut self) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("temp-monitor".to_string())
            .spawn(move || {
                info!("temperature monitor started");
                while self.sample_once() == MonitorStep::Continue {
                    thread::sleep(self.poll_interval);
                }
            })
    }
}
