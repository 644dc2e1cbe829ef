//! Simulated board: every driven port in one value.
//!
//! [`SimBoard`] satisfies [`Board`](crate::app::ports::Board) by
//! delegating to the individual simulator adapters.  Standby jumps the RTC
//! to the armed alarm (or by a fixed step for a scripted button wake) and
//! returns immediately, so a night of sleep costs one call.

use std::collections::VecDeque;

use log::info;

use crate::app::ports::{ConfigPort, FileId, IdentityPort, PowerPort, RtcPort, StoragePort};
use crate::config::DeviceConfig;
use crate::error::{ConfigError, StorageError};
use crate::power::WakeSource;

use super::config_store::FlashConfigStore;
use super::device_id::SimIdentity;
use super::storage::MemStorage;
use super::time::SimRtc;

/// Seconds that pass before a scripted non-alarm wake.
pub const EARLY_WAKE_SECS: u32 = 600;

pub struct SimBoard {
    pub rtc: SimRtc,
    pub storage: MemStorage,
    pub config: FlashConfigStore,
    pub identity: SimIdentity,
    /// Wake sources for upcoming standbys; empty means the alarm fires.
    pub wakes: VecDeque<WakeSource>,
    standbys: u32,
}

impl SimBoard {
    pub fn new() -> Self {
        Self {
            rtc: SimRtc::new(),
            storage: MemStorage::new(),
            config: FlashConfigStore::new(),
            identity: SimIdentity::new(),
            wakes: VecDeque::new(),
            standbys: 0,
        }
    }

    /// Completed standby calls.
    pub fn standbys(&self) -> u32 {
        self.standbys
    }
}

impl Default for SimBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl RtcPort for SimBoard {
    fn epoch(&self) -> u32 {
        self.rtc.epoch()
    }

    fn set_epoch(&mut self, epoch: u32) {
        self.rtc.set_epoch(epoch);
    }

    fn arm_alarm(&mut self, secs: u32) {
        self.rtc.arm_alarm(secs);
    }
}

impl PowerPort for SimBoard {
    fn standby(&mut self) -> WakeSource {
        self.standbys = self.standbys.wrapping_add(1);
        let source = self.wakes.pop_front().unwrap_or(WakeSource::Alarm);
        match source {
            WakeSource::Alarm => {
                let secs = self.rtc.fire_alarm().unwrap_or(0);
                info!("SimBoard: standby {}s, alarm", secs);
            }
            WakeSource::Button | WakeSource::Other => {
                self.rtc.advance_ms(EARLY_WAKE_SECS * 1000);
                info!("SimBoard: standby interrupted by {:?}", source);
            }
        }
        source
    }
}

impl StoragePort for SimBoard {
    fn init(&mut self) -> Result<(), StorageError> {
        self.storage.init()
    }

    fn card_present(&self) -> bool {
        self.storage.card_present()
    }

    fn open(&mut self, file: FileId) -> Result<(), StorageError> {
        self.storage.open(file)
    }

    fn exists(&self, file: FileId) -> bool {
        self.storage.exists(file)
    }

    fn append(&mut self, file: FileId, data: &[u8]) -> Result<(), StorageError> {
        self.storage.append(file, data)
    }

    fn write(&mut self, file: FileId, data: &[u8]) -> Result<(), StorageError> {
        self.storage.write(file, data)
    }

    fn read(&self, file: FileId, buf: &mut [u8]) -> Result<usize, StorageError> {
        self.storage.read(file, buf)
    }
}

impl ConfigPort for SimBoard {
    fn load(&mut self) -> Result<DeviceConfig, ConfigError> {
        self.config.load()
    }

    fn save(&mut self, config: &DeviceConfig) -> Result<(), ConfigError> {
        self.config.save(config)
    }
}

impl IdentityPort for SimBoard {
    fn unique_id(&mut self) -> Option<[u32; 4]> {
        self.identity.unique_id()
    }
}
