//! Sleep/wake scheduling.
//!
//! The device sleeps only when nothing that must not be dropped is in
//! flight.  While asleep the CPU is halted; the RTC alarm (daily wake time)
//! or a button edge resumes it.
//!
//! ```text
//!   policy ──ArmSleep──▶ SleepScheduler::arm()
//!                              │ each loop iteration
//!                              ▼
//!               due(now)? ── guards ok? ── wake target? ──▶ enter_sleep()
//!                                                             │
//!                        power_down → arm_alarm → standby ◀───┘
//!                                                  │ interrupt
//!                                                  ▼
//!                                       resume(source), awake window
//! ```

use core::fmt;

use log::{info, warn};
use serde::{Deserialize, Serialize};

pub const SECS_PER_DAY: u32 = 86_400;

// ───────────────────────────────────────────────────────────────
// Wake time
// ───────────────────────────────────────────────────────────────

/// Daily wake time in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WakeTime {
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl WakeTime {
    pub const fn new(hour: u8, minute: u8, second: u8) -> Self {
        Self {
            hour,
            minute,
            second,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.hour < 24 && self.minute < 60 && self.second < 60
    }

    /// Seconds past UTC midnight.
    pub fn secs_of_day(&self) -> u32 {
        self.hour as u32 * 3600 + self.minute as u32 * 60 + self.second as u32
    }
}

impl fmt::Display for WakeTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}:{:02} UTC", self.hour, self.minute, self.second)
    }
}

/// Seconds from `now_epoch` until the next occurrence of `wake`.
///
/// Today if the wake time is still ahead, otherwise tomorrow; a wake time
/// equal to now counts as tomorrow.
pub fn compute_sleep_duration(wake: WakeTime, now_epoch: u32) -> u32 {
    let now = now_epoch % SECS_PER_DAY;
    let target = wake.secs_of_day();
    if target > now {
        target - now
    } else {
        SECS_PER_DAY - now + target
    }
}

// ───────────────────────────────────────────────────────────────
// Guards and hooks
// ───────────────────────────────────────────────────────────────

/// State the scheduler must see before it may power anything down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SleepGuards {
    pub publish_pending: bool,
    pub config_sync_pending: bool,
    pub on_setup: bool,
    /// RTC epoch seconds; `None` until the clock has been synced.
    pub now_epoch: Option<u32>,
}

/// Why a sleep request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepRefusal {
    PublishPending,
    ConfigSyncPending,
    OnSetup,
    /// RTC not synced, so no alarm can be armed.
    NoWakeTarget,
}

impl fmt::Display for SleepRefusal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PublishPending => write!(f, "publish pending"),
            Self::ConfigSyncPending => write!(f, "config sync pending"),
            Self::OnSetup => write!(f, "setup active"),
            Self::NoWakeTarget => write!(f, "no valid wake target"),
        }
    }
}

/// What resumed the CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeSource {
    Alarm,
    Button,
    /// Any other interrupt (card detect, companion).
    Other,
}

/// Side effects of a sleep cycle, supplied by the device.
pub trait SleepHooks {
    /// Power down the companion link and every active sensor.
    fn power_down(&mut self);
    /// Arm the RTC alarm `secs` from now.
    fn arm_alarm(&mut self, secs: u32);
    /// Halt until an interrupt fires.
    fn standby(&mut self) -> WakeSource;
}

// ───────────────────────────────────────────────────────────────
// Scheduler
// ───────────────────────────────────────────────────────────────

pub struct SleepScheduler {
    wake_time: WakeTime,
    armed: bool,
    /// Earliest loop time at which sleep may start again.
    awake_until_ms: Option<u32>,
    sleeps: u32,
    last_refusal: Option<SleepRefusal>,
}

impl SleepScheduler {
    pub fn new(wake_time: WakeTime) -> Self {
        Self {
            wake_time,
            armed: false,
            awake_until_ms: None,
            sleeps: 0,
            last_refusal: None,
        }
    }

    pub fn set_wake_time(&mut self, wake_time: WakeTime) {
        self.wake_time = wake_time;
    }

    pub fn wake_time(&self) -> WakeTime {
        self.wake_time
    }

    /// Request sleep as soon as guards allow.
    pub fn arm(&mut self) {
        if !self.armed {
            info!("Sleep: armed (wake at {})", self.wake_time);
        }
        self.armed = true;
    }

    pub fn disarm(&mut self) {
        self.armed = false;
        self.last_refusal = None;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Completed sleep cycles since boot.
    pub fn sleep_count(&self) -> u32 {
        self.sleeps
    }

    /// Armed, and past any post-wake awake window.
    pub fn due(&self, now_ms: u32) -> bool {
        if !self.armed {
            return false;
        }
        match self.awake_until_ms {
            // Signed distance so the window survives counter wrap.
            Some(until) => (now_ms.wrapping_sub(until) as i32) >= 0,
            None => true,
        }
    }

    /// Check every precondition, then (and only then) power down, arm the
    /// alarm, and halt.  Returns the wake source after resume.
    pub fn enter_sleep(
        &mut self,
        guards: SleepGuards,
        hooks: &mut impl SleepHooks,
    ) -> Result<WakeSource, SleepRefusal> {
        if guards.publish_pending {
            return Err(SleepRefusal::PublishPending);
        }
        if guards.config_sync_pending {
            return Err(SleepRefusal::ConfigSyncPending);
        }
        if guards.on_setup {
            return Err(SleepRefusal::OnSetup);
        }
        let Some(now_epoch) = guards.now_epoch else {
            return Err(SleepRefusal::NoWakeTarget);
        };

        let secs = compute_sleep_duration(self.wake_time, now_epoch);
        info!("Sleep: going down for {}s (wake at {})", secs, self.wake_time);

        hooks.power_down();
        hooks.arm_alarm(secs);
        let source = hooks.standby();

        self.sleeps = self.sleeps.wrapping_add(1);
        self.last_refusal = None;
        info!("Sleep: resumed by {:?}", source);
        Ok(source)
    }

    /// Bookkeeping after a resume: a button wake opens an awake window so
    /// the user can interact before the device goes down again.
    pub fn on_resume(&mut self, source: WakeSource, now_ms: u32, window_ms: u32) {
        self.awake_until_ms = match source {
            WakeSource::Button => Some(now_ms.wrapping_add(window_ms)),
            WakeSource::Alarm | WakeSource::Other => None,
        };
    }

    /// Log a refused attempt; repeats of the same reason stay quiet.
    /// Returns `true` when the reason is new.
    pub fn note_refusal(&mut self, reason: SleepRefusal) -> bool {
        if self.last_refusal == Some(reason) {
            return false;
        }
        warn!("Sleep: deferred ({})", reason);
        self.last_refusal = Some(reason);
        true
    }
}
