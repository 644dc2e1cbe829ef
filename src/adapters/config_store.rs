//! Configuration store.
//!
//! Implements [`ConfigPort`] over a simulated flash page.  The
//! configuration is serialised with `postcard` into a single blob behind
//! a small header (magic + length); a page that does not start with the
//! magic reads as "never saved" and yields defaults, a page whose body
//! fails to decode is [`ConfigError::Corrupted`].
//!
//! Validation runs before every save; invalid values are rejected, never
//! clamped.

use log::{info, warn};

use crate::app::ports::ConfigPort;
use crate::config::DeviceConfig;
use crate::error::ConfigError;

/// Size of the flash page reserved for configuration.
pub const PAGE_SIZE: usize = 1024;

const MAGIC: [u8; 4] = *b"SKC1";
const HEADER: usize = MAGIC.len() + 2;

pub struct FlashConfigStore {
    page: Vec<u8>,
    writes: u32,
}

impl FlashConfigStore {
    /// An erased page.
    pub fn new() -> Self {
        Self {
            page: vec![0xFF; PAGE_SIZE],
            writes: 0,
        }
    }

    /// Number of page writes since construction.
    pub fn writes(&self) -> u32 {
        self.writes
    }

    /// Flip a byte of the stored body, as a worn flash cell would.
    pub fn corrupt(&mut self) {
        if let Some(b) = self.page.get_mut(HEADER) {
            *b ^= 0xA5;
        }
    }

    /// Wipe the page back to the erased state.
    pub fn erase(&mut self) {
        self.page.fill(0xFF);
    }

    fn body(&self) -> Option<&[u8]> {
        if self.page[..MAGIC.len()] != MAGIC {
            return None;
        }
        let len = u16::from_le_bytes([self.page[MAGIC.len()], self.page[MAGIC.len() + 1]]) as usize;
        self.page.get(HEADER..HEADER + len)
    }
}

impl Default for FlashConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigPort for FlashConfigStore {
    fn load(&mut self) -> Result<DeviceConfig, ConfigError> {
        let Some(body) = self.body() else {
            info!("ConfigStore: no stored config, using defaults");
            return Ok(DeviceConfig::default());
        };
        let config: DeviceConfig = postcard::from_bytes(body).map_err(|_| {
            warn!("ConfigStore: stored config does not decode");
            ConfigError::Corrupted
        })?;
        info!("ConfigStore: loaded config ({} bytes)", body.len());
        Ok(config)
    }

    fn save(&mut self, config: &DeviceConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let bytes = postcard::to_allocvec(config).map_err(|_| ConfigError::Corrupted)?;
        if HEADER + bytes.len() > PAGE_SIZE {
            return Err(ConfigError::ValidationFailed("config does not fit its flash page"));
        }
        self.page.fill(0xFF);
        self.page[..MAGIC.len()].copy_from_slice(&MAGIC);
        self.page[MAGIC.len()..HEADER].copy_from_slice(&(bytes.len() as u16).to_le_bytes());
        self.page[HEADER..HEADER + bytes.len()].copy_from_slice(&bytes);
        self.writes = self.writes.wrapping_add(1);
        info!("ConfigStore: saved config ({} bytes)", bytes.len());
        Ok(())
    }
}
