//! Sensor interface and the aggregating [`SensorHub`].
//!
//! Individual sensor physics live behind the [`Sensor`] trait; the control
//! loop only starts, stops and samples them.  Sampling is always
//! non-blocking from the loop (`get(false)`): a sensor that is still
//! settling reports [`SensorError::NotReady`] and is skipped for that
//! publish.

use core::fmt::{self, Write};

use log::{debug, warn};
use serde::Serialize;

use crate::error::SensorError;
use crate::time::{IsoTime, epoch_to_iso};

/// Maximum number of sensors on one board.
pub const MAX_SENSORS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    Temperature,
    Humidity,
    Light,
    Noise,
    Pressure,
    Pm25,
    Battery,
}

impl SensorKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::Humidity => "humidity",
            Self::Light => "light",
            Self::Noise => "noise",
            Self::Pressure => "pressure",
            Self::Pm25 => "pm25",
            Self::Battery => "battery",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            Self::Temperature => "C",
            Self::Humidity => "%",
            Self::Light => "lux",
            Self::Noise => "dBA",
            Self::Pressure => "kPa",
            Self::Pm25 => "ug/m3",
            Self::Battery => "%",
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Reading {
    pub kind: SensorKind,
    pub value: f32,
}

/// Driver-side contract for one sensor.
pub trait Sensor {
    fn kind(&self) -> SensorKind;
    fn start(&mut self) -> bool;
    fn stop(&mut self) -> bool;
    /// `wait = true` may spin for a bounded settling time; the loop never
    /// passes it.
    fn get(&mut self, wait: bool) -> Result<Reading, SensorError>;
}

/// One timestamped sample of every ready sensor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadingRecord {
    pub time: IsoTime,
    pub readings: heapless::Vec<Reading, MAX_SENSORS>,
}

impl ReadingRecord {
    /// Header matching [`csv_row`](Self::csv_row) for the given sensors.
    pub fn csv_header(kinds: &[SensorKind]) -> heapless::String<128> {
        let mut out = heapless::String::new();
        let _ = out.push_str("time");
        for k in kinds {
            let _ = write!(out, ",{}", k.name());
        }
        out
    }

    /// One CSV line; columns follow `kinds`, missing readings are empty.
    pub fn csv_row(&self, kinds: &[SensorKind]) -> heapless::String<256> {
        let mut out = heapless::String::new();
        let _ = out.push_str(&self.time);
        for k in kinds {
            let _ = out.push(',');
            if let Some(r) = self.readings.iter().find(|r| r.kind == *k) {
                let _ = write!(out, "{:.2}", r.value);
            }
        }
        out
    }
}

struct Slot {
    sensor: Box<dyn Sensor>,
    active: bool,
}

/// Owns every sensor driver on the board.
pub struct SensorHub {
    slots: heapless::Vec<Slot, MAX_SENSORS>,
}

impl SensorHub {
    pub fn new() -> Self {
        Self {
            slots: heapless::Vec::new(),
        }
    }

    /// Register a sensor.  Returns `false` when the hub is full.
    pub fn add(&mut self, sensor: Box<dyn Sensor>) -> bool {
        self.slots
            .push(Slot {
                sensor,
                active: false,
            })
            .is_ok()
    }

    /// Kinds of every registered sensor, in registration order.
    pub fn kinds(&self) -> heapless::Vec<SensorKind, MAX_SENSORS> {
        self.slots.iter().map(|s| s.sensor.kind()).collect()
    }

    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|s| s.active).count()
    }

    pub fn start_all(&mut self) {
        for slot in self.slots.iter_mut().filter(|s| !s.active) {
            slot.active = slot.sensor.start();
            if !slot.active {
                warn!("Sensors: {} failed to start", slot.sensor.kind());
            }
        }
    }

    pub fn stop_all(&mut self) {
        for slot in self.slots.iter_mut().filter(|s| s.active) {
            if !slot.sensor.stop() {
                warn!("Sensors: {} failed to stop", slot.sensor.kind());
            }
            slot.active = false;
        }
    }

    /// Sample every active sensor without waiting.
    pub fn sample(&mut self, epoch: u32) -> ReadingRecord {
        let mut readings = heapless::Vec::new();
        for slot in self.slots.iter_mut().filter(|s| s.active) {
            match slot.sensor.get(false) {
                Ok(r) => {
                    let _ = readings.push(r);
                }
                Err(SensorError::NotReady) => {
                    debug!("Sensors: {} not ready", slot.sensor.kind());
                }
                Err(e) => warn!("Sensors: {}: {}", slot.sensor.kind(), e),
            }
        }
        ReadingRecord {
            time: epoch_to_iso(epoch),
            readings,
        }
    }
}

impl Default for SensorHub {
    fn default() -> Self {
        Self::new()
    }
}
