//! Simulated sensors.
//!
//! Each [`SimSensor`] produces a slow deterministic wave around a base
//! value.  After `start` it reports [`SensorError::NotReady`] for a
//! configurable number of polls, the way a particle counter needs its fan
//! spun up before the first sample.

use log::debug;

use crate::error::SensorError;
use crate::sensors::{Reading, Sensor, SensorKind};

pub struct SimSensor {
    kind: SensorKind,
    base: f32,
    amplitude: f32,
    /// Polls per full wave.
    period: u32,
    warmup: u32,
    warmup_left: u32,
    running: bool,
    step: u32,
}

impl SimSensor {
    pub fn new(kind: SensorKind, base: f32, amplitude: f32) -> Self {
        Self {
            kind,
            base,
            amplitude,
            period: 48,
            warmup: 0,
            warmup_left: 0,
            running: false,
            step: 0,
        }
    }

    /// Polls answered with `NotReady` after each start.
    pub fn with_warmup(mut self, polls: u32) -> Self {
        self.warmup = polls;
        self
    }

    /// The board's default sensor set.
    pub fn standard_set() -> [SimSensor; 5] {
        [
            SimSensor::new(SensorKind::Temperature, 21.0, 3.0),
            SimSensor::new(SensorKind::Humidity, 45.0, 10.0),
            SimSensor::new(SensorKind::Light, 300.0, 250.0),
            SimSensor::new(SensorKind::Noise, 40.0, 8.0),
            SimSensor::new(SensorKind::Pm25, 8.0, 4.0).with_warmup(2),
        ]
    }
}

impl Sensor for SimSensor {
    fn kind(&self) -> SensorKind {
        self.kind
    }

    fn start(&mut self) -> bool {
        self.running = true;
        self.warmup_left = self.warmup;
        debug!("SimSensor: {} started", self.kind);
        true
    }

    fn stop(&mut self) -> bool {
        self.running = false;
        true
    }

    fn get(&mut self, wait: bool) -> Result<Reading, SensorError> {
        if !self.running {
            return Err(SensorError::Failed);
        }
        if self.warmup_left > 0 {
            if !wait {
                self.warmup_left -= 1;
                return Err(SensorError::NotReady);
            }
            self.warmup_left = 0;
        }
        let phase = (self.step % self.period) as f32 / self.period as f32;
        self.step = self.step.wrapping_add(1);
        Ok(Reading {
            kind: self.kind,
            value: self.base + self.amplitude * (phase * core::f32::consts::TAU).sin(),
        })
    }
}
