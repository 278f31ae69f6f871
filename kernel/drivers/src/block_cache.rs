//! Write-through block cache.
//!
//! A fixed table of [`CACHE_ENTRIES`] 512-byte blocks in front of the first
//! device of the disk driver's device table. Reads are served from the table
//! when possible. Writes go to the device immediately and then refresh or
//! install the cached copy, so entries written through this path are always
//! clean.
//!
//! Eviction takes the first invalid slot if there is one, otherwise the entry
//! with the oldest access stamp. Stamps come from a per-cache counter that
//! advances on every access.
//!
//! The dirty-bit machinery (write-back on eviction, [`BlockCache::flush`]) is
//! kept intact for a future write-back mode. Nothing in write-through mode
//! sets the bit.

use core::fmt;

use ojjy_core::time::{ClockSource, Timeout, spin_until};
use ojjy_core::{kdebug, kerr, ktrace, kwarn};
use ojjy_driver_api::{BLOCK_SIZE, DeviceTable, IoError, SectorDevice};

/// Number of cached blocks.
pub const CACHE_ENTRIES: usize = 64;

/// Index of the backing device in the device table.
pub const CACHE_DEVICE_INDEX: usize = 0;

/// Default bound on waiting for the device to become ready.
pub const DEFAULT_DEVICE_TIMEOUT: Timeout = Timeout::from_millis(100);

#[derive(Clone, Copy)]
struct CacheEntry {
    block: u64,
    last_access: u64,
    valid: bool,
    dirty: bool,
    data: [u8; BLOCK_SIZE],
}

impl CacheEntry {
    const EMPTY: Self = Self {
        block: 0,
        last_access: 0,
        valid: false,
        dirty: false,
        data: [0; BLOCK_SIZE],
    };
}

/// Snapshot of cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Reads served from the table.
    pub hits: u64,
    /// Reads that went to the device.
    pub misses: u64,
    /// Blocks written through to the device.
    pub writes: u64,
    /// Dirty blocks written back.
    pub flushes: u64,
    /// Entries holding a block.
    pub valid_entries: usize,
    /// Entries holding unsaved data.
    pub dirty_entries: usize,
}

impl CacheStats {
    /// Percentage of reads served from the table.
    pub fn hit_rate(&self) -> u64 {
        let total = self.hits + self.misses;
        if total == 0 { 0 } else { self.hits * 100 / total }
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} entries, {} valid, {} dirty",
            CACHE_ENTRIES, self.valid_entries, self.dirty_entries
        )?;
        writeln!(
            f,
            "hits {}, misses {} ({}% hit rate)",
            self.hits,
            self.misses,
            self.hit_rate()
        )?;
        write!(f, "writes {}, write-backs {}", self.writes, self.flushes)
    }
}

/// The block cache.
pub struct BlockCache<'a> {
    entries: [CacheEntry; CACHE_ENTRIES],
    clock_hand: u64,
    hits: u64,
    misses: u64,
    writes: u64,
    flushes: u64,
    devices: &'a dyn DeviceTable,
    clock: &'a dyn ClockSource,
    timeout: Timeout,
}

impl<'a> BlockCache<'a> {
    /// An empty cache over device 0 of `devices`. `clock` bounds the wait
    /// for the device to become ready.
    pub fn new(devices: &'a dyn DeviceTable, clock: &'a dyn ClockSource) -> Self {
        kdebug!("CACHE: initialized ({} x {} bytes)", CACHE_ENTRIES, BLOCK_SIZE);
        Self {
            entries: [CacheEntry::EMPTY; CACHE_ENTRIES],
            clock_hand: 0,
            hits: 0,
            misses: 0,
            writes: 0,
            flushes: 0,
            devices,
            clock,
            timeout: DEFAULT_DEVICE_TIMEOUT,
        }
    }

    /// Replaces the device-ready timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Timeout) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the contents of `block`, loading it on a miss.
    ///
    /// # Errors
    ///
    /// [`IoError::NotReady`] without a device, [`IoError::Timeout`] if it
    /// stays busy, or the device's own error. A failed load leaves the
    /// chosen slot empty.
    pub fn read(&mut self, block: u64) -> Result<&[u8; BLOCK_SIZE], IoError> {
        if let Some(slot) = self.lookup(block) {
            self.hits += 1;
            let stamp = self.stamp();
            let entry = &mut self.entries[slot];
            entry.last_access = stamp;
            return Ok(&entry.data);
        }

        self.misses += 1;
        let device = self.device()?;
        let slot = self.take_victim(device)?;
        let stamp = self.stamp();
        let entry = &mut self.entries[slot];
        entry.valid = false;
        if let Err(e) = device.read_sectors(block, &mut entry.data) {
            kerr!("CACHE: read of block {} failed: {}", block, e);
            return Err(e);
        }
        entry.block = block;
        entry.valid = true;
        entry.dirty = false;
        entry.last_access = stamp;
        ktrace!("CACHE: block {} loaded into slot {}", block, slot);
        Ok(&entry.data)
    }

    /// Writes `data` to `block` on the device, then caches it clean.
    ///
    /// # Errors
    ///
    /// As for [`read`](Self::read). If the device write fails the cache is
    /// left untouched. Once the device write succeeds the call succeeds: if
    /// no slot can be freed because a dirty victim fails to write back, the
    /// block is simply not cached and the victim keeps its data.
    pub fn write(&mut self, block: u64, data: &[u8; BLOCK_SIZE]) -> Result<(), IoError> {
        let device = self.device()?;
        if let Err(e) = device.write_sectors(block, data) {
            kerr!("CACHE: write of block {} failed: {}", block, e);
            return Err(e);
        }
        self.writes += 1;

        let slot = match self.lookup(block) {
            Some(slot) => slot,
            None => match self.take_victim(device) {
                Ok(slot) => slot,
                Err(_) => {
                    kwarn!("CACHE: block {} written through but not cached", block);
                    return Ok(());
                }
            },
        };
        let stamp = self.stamp();
        let entry = &mut self.entries[slot];
        entry.block = block;
        entry.data = *data;
        entry.valid = true;
        entry.dirty = false;
        entry.last_access = stamp;
        Ok(())
    }

    /// Drops `block` from the table without writing it back. Returns whether
    /// it was cached.
    pub fn invalidate(&mut self, block: u64) -> bool {
        match self.lookup(block) {
            Some(slot) => {
                let entry = &mut self.entries[slot];
                entry.valid = false;
                entry.dirty = false;
                true
            }
            None => false,
        }
    }

    /// Writes every dirty entry back. Returns how many were written.
    ///
    /// # Errors
    ///
    /// The first device error. Entries not yet written stay dirty.
    pub fn flush(&mut self) -> Result<usize, IoError> {
        if self.entries.iter().all(|e| !(e.valid && e.dirty)) {
            return Ok(0);
        }
        let device = self.device()?;
        let mut written = 0;
        for slot in 0..CACHE_ENTRIES {
            if self.entries[slot].valid && self.entries[slot].dirty {
                self.write_back(device, slot)?;
                written += 1;
            }
        }
        Ok(written)
    }

    /// Whether `block` currently has a valid entry.
    pub fn is_cached(&self, block: u64) -> bool {
        self.lookup(block).is_some()
    }

    /// Current counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            writes: self.writes,
            flushes: self.flushes,
            valid_entries: self.entries.iter().filter(|e| e.valid).count(),
            dirty_entries: self.entries.iter().filter(|e| e.valid && e.dirty).count(),
        }
    }

    fn lookup(&self, block: u64) -> Option<usize> {
        self.entries.iter().position(|e| e.valid && e.block == block)
    }

    fn stamp(&mut self) -> u64 {
        self.clock_hand += 1;
        self.clock_hand
    }

    /// First invalid slot, else the least recently accessed one.
    fn victim(&self) -> usize {
        if let Some(free) = self.entries.iter().position(|e| !e.valid) {
            return free;
        }
        let mut oldest = 0;
        for (slot, entry) in self.entries.iter().enumerate().skip(1) {
            if entry.last_access < self.entries[oldest].last_access {
                oldest = slot;
            }
        }
        oldest
    }

    /// Picks a victim and writes it back first if it is dirty.
    fn take_victim(&mut self, device: &dyn SectorDevice) -> Result<usize, IoError> {
        let slot = self.victim();
        if self.entries[slot].valid && self.entries[slot].dirty {
            self.write_back(device, slot)?;
        }
        Ok(slot)
    }

    fn write_back(&mut self, device: &dyn SectorDevice, slot: usize) -> Result<(), IoError> {
        let entry = &mut self.entries[slot];
        device.write_sectors(entry.block, &entry.data).inspect_err(|e| {
            kerr!("CACHE: write-back of block {} failed: {}", entry.block, e);
        })?;
        entry.dirty = false;
        self.flushes += 1;
        Ok(())
    }

    fn device(&self) -> Result<&'a dyn SectorDevice, IoError> {
        let devices: &'a dyn DeviceTable = self.devices;
        let device = devices.device(CACHE_DEVICE_INDEX).ok_or(IoError::NotReady)?;
        spin_until(self.clock, self.timeout, || device.is_ready()).map_err(|_| {
            kerr!("CACHE: device not ready after {} ns", self.timeout.as_nanos());
            IoError::Timeout
        })?;
        Ok(device)
    }

    #[cfg(test)]
    fn stage_dirty(&mut self, block: u64, data: &[u8; BLOCK_SIZE]) {
        let slot = self.lookup(block).unwrap_or_else(|| self.victim());
        let stamp = self.stamp();
        self.entries[slot] = CacheEntry {
            block,
            last_access: stamp,
            valid: true,
            dirty: true,
            data: *data,
        };
    }
}
