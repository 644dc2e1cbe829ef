//! In-memory card storage.
//!
//! Implements [`StoragePort`] for the simulator and host tests.  The card
//! can be inserted and ejected at runtime; every operation on an absent
//! card fails with [`StorageError::NotAvailable`], the way a FAT driver
//! fails on a missing volume.
//!
//! The debug log is capped: when an append would push it past
//! [`DEBUG_LOG_CAP`] the oldest half is discarded first.

use std::collections::HashMap;

use log::{debug, info};

use crate::app::ports::{FileId, StoragePort};
use crate::error::StorageError;

/// Largest debug log kept on the card, in bytes.
pub const DEBUG_LOG_CAP: usize = 16 * 1024;

/// Largest size of any other file, in bytes.
pub const FILE_CAP: usize = 256 * 1024;

pub struct MemStorage {
    inserted: bool,
    mounted: bool,
    files: HashMap<FileId, Vec<u8>>,
    /// Number of times the debug log was rolled.
    rolls: u32,
}

impl MemStorage {
    /// Storage with a card inserted.
    pub fn new() -> Self {
        Self {
            inserted: true,
            mounted: false,
            files: HashMap::new(),
            rolls: 0,
        }
    }

    /// Storage with the slot empty.
    pub fn without_card() -> Self {
        Self {
            inserted: false,
            ..Self::new()
        }
    }

    /// Insert a blank card.  Needs an `init` before use.
    pub fn insert(&mut self) {
        self.inserted = true;
        self.mounted = false;
        self.files.clear();
    }

    pub fn eject(&mut self) {
        self.inserted = false;
        self.mounted = false;
    }

    /// Raw contents of `file`, for inspection.
    pub fn contents(&self, file: FileId) -> Option<&[u8]> {
        self.files.get(&file).map(Vec::as_slice)
    }

    pub fn rolls(&self) -> u32 {
        self.rolls
    }

    fn ready(&self) -> Result<(), StorageError> {
        if self.inserted && self.mounted {
            Ok(())
        } else {
            Err(StorageError::NotAvailable)
        }
    }

    /// Keep the debug log under its cap by dropping the oldest half,
    /// cut at a line boundary.
    fn roll_debug(log: &mut Vec<u8>) {
        let half = log.len() / 2;
        let cut = log[half..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(log.len(), |p| half + p + 1);
        log.drain(..cut);
    }
}

impl Default for MemStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl StoragePort for MemStorage {
    fn init(&mut self) -> Result<(), StorageError> {
        if !self.inserted {
            self.mounted = false;
            return Err(StorageError::NotAvailable);
        }
        self.mounted = true;
        info!("MemStorage: card mounted ({} files)", self.files.len());
        Ok(())
    }

    fn card_present(&self) -> bool {
        self.inserted && self.mounted
    }

    fn open(&mut self, file: FileId) -> Result<(), StorageError> {
        self.ready()?;
        self.files.entry(file).or_default();
        Ok(())
    }

    fn exists(&self, file: FileId) -> bool {
        self.card_present() && self.files.contains_key(&file)
    }

    fn append(&mut self, file: FileId, data: &[u8]) -> Result<(), StorageError> {
        self.ready()?;
        if file != FileId::Debug && data.len() > FILE_CAP {
            return Err(StorageError::Full);
        }
        let buf = self.files.entry(file).or_default();
        if file == FileId::Debug {
            if data.len() > DEBUG_LOG_CAP {
                return Err(StorageError::Full);
            }
            if buf.len() + data.len() > DEBUG_LOG_CAP {
                Self::roll_debug(buf);
                self.rolls = self.rolls.wrapping_add(1);
                debug!("MemStorage: debug log rolled");
            }
        } else if buf.len() + data.len() > FILE_CAP {
            return Err(StorageError::Full);
        }
        buf.extend_from_slice(data);
        Ok(())
    }

    fn write(&mut self, file: FileId, data: &[u8]) -> Result<(), StorageError> {
        self.ready()?;
        if data.len() > FILE_CAP {
            return Err(StorageError::Full);
        }
        self.files.insert(file, data.to_vec());
        Ok(())
    }

    fn read(&self, file: FileId, buf: &mut [u8]) -> Result<usize, StorageError> {
        self.ready()?;
        let data = self.files.get(&file).ok_or(StorageError::NotFound)?;
        let n = data.len().min(buf.len());
        buf[..n].copy_from_slice(&data[..n]);
        Ok(n)
    }
}
