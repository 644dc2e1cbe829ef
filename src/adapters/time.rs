//! Clocks for the simulator.
//!
//! - [`SimRtc`] stands in for the battery-backed RTC: epoch seconds plus
//!   one alarm.  It starts unset (epoch 0) like a board with a flat coin
//!   cell, so nothing that needs wall-clock time works until the
//!   companion supplies it.
//! - [`LoopClock`] is the millisecond counter the main loop runs on.  It
//!   is virtual: the simulator advances it explicitly, which keeps runs
//!   deterministic and lets a day of sleep pass instantly.

use log::debug;

use crate::app::ports::RtcPort;

#[derive(Debug, Default)]
pub struct SimRtc {
    epoch: u32,
    /// Milliseconds accumulated toward the next whole second.
    sub_ms: u32,
    alarm_in: Option<u32>,
}

impl SimRtc {
    pub fn new() -> Self {
        Self::default()
    }

    /// An RTC that already holds `epoch`.
    pub fn at(epoch: u32) -> Self {
        Self {
            epoch,
            ..Self::default()
        }
    }

    /// Let `ms` of wall time pass.
    pub fn advance_ms(&mut self, ms: u32) {
        let total = self.sub_ms as u64 + ms as u64;
        self.epoch = self.epoch.wrapping_add((total / 1000) as u32);
        self.sub_ms = (total % 1000) as u32;
    }

    /// Seconds until the armed alarm, if any.
    pub fn alarm(&self) -> Option<u32> {
        self.alarm_in
    }

    /// Jump to the alarm and clear it.  Returns the seconds skipped.
    pub fn fire_alarm(&mut self) -> Option<u32> {
        let secs = self.alarm_in.take()?;
        self.epoch = self.epoch.wrapping_add(secs);
        self.sub_ms = 0;
        Some(secs)
    }
}

impl RtcPort for SimRtc {
    fn epoch(&self) -> u32 {
        self.epoch
    }

    fn set_epoch(&mut self, epoch: u32) {
        debug!("SimRtc: set {} -> {}", self.epoch, epoch);
        self.epoch = epoch;
        self.sub_ms = 0;
    }

    fn arm_alarm(&mut self, secs: u32) {
        self.alarm_in = Some(secs);
    }
}

/// Virtual loop time in milliseconds.  Wraps like the hardware counter.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoopClock {
    now_ms: u32,
}

impl LoopClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start at `ms`; tests use values near `u32::MAX` to exercise wrap.
    pub fn starting_at(ms: u32) -> Self {
        Self { now_ms: ms }
    }

    pub fn now_ms(&self) -> u32 {
        self.now_ms
    }

    pub fn advance(&mut self, ms: u32) -> u32 {
        self.now_ms = self.now_ms.wrapping_add(ms);
        self.now_ms
    }
}
