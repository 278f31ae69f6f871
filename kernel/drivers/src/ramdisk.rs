//! Memory-backed sector device.
//!
//! [`RamDisk`] serves sectors out of a caller-provided buffer. It stands in
//! for the disk when there is no hardware (early boot, host tests), and it is
//! also a complete block driver: it can be registered with the driver
//! framework and exposes byte-level `read`/`write` capabilities.

use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use ojjy_core::sync::SpinLock;
use ojjy_driver_api::block::check_request;
use ojjy_driver_api::{BLOCK_SIZE, DriverError, DriverOps, IoError, SectorDevice};

/// A sector device over borrowed memory.
pub struct RamDisk<'a> {
    storage: SpinLock<&'a mut [u8]>,
    sector_count: u64,
    ready: AtomicBool,
    faulty: AtomicBool,
    sector_reads: AtomicU64,
    sector_writes: AtomicU64,
}

impl<'a> RamDisk<'a> {
    /// Wraps `storage`. A trailing partial sector is not addressable.
    pub fn new(storage: &'a mut [u8]) -> Self {
        let sector_count = (storage.len() / BLOCK_SIZE) as u64;
        Self {
            storage: SpinLock::new(storage),
            sector_count,
            ready: AtomicBool::new(true),
            faulty: AtomicBool::new(false),
            sector_reads: AtomicU64::new(0),
            sector_writes: AtomicU64::new(0),
        }
    }

    /// Marks the device busy or idle, as seen by [`SectorDevice::is_ready`].
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Relaxed);
    }

    /// Makes every following transfer fail with [`IoError::DeviceError`].
    pub fn set_faulty(&self, faulty: bool) {
        self.faulty.store(faulty, Ordering::Relaxed);
    }

    /// Sectors read so far.
    pub fn sector_reads(&self) -> u64 {
        self.sector_reads.load(Ordering::Relaxed)
    }

    /// Sectors written so far.
    pub fn sector_writes(&self) -> u64 {
        self.sector_writes.load(Ordering::Relaxed)
    }

    /// Copies sector `lba` into `out`, bypassing the transfer counters.
    ///
    /// # Errors
    ///
    /// [`IoError::OutOfRange`] past the end of the disk.
    pub fn peek(&self, lba: u64, out: &mut [u8; BLOCK_SIZE]) -> Result<(), IoError> {
        check_request(self.sector_count, lba, BLOCK_SIZE)?;
        let start = usize::try_from(lba).map_err(|_| IoError::OutOfRange)? * BLOCK_SIZE;
        out.copy_from_slice(&self.storage.lock()[start..start + BLOCK_SIZE]);
        Ok(())
    }

    fn span(&self, lba: u64, len: usize) -> Result<(usize, u64), IoError> {
        if self.faulty.load(Ordering::Relaxed) {
            return Err(IoError::DeviceError);
        }
        let count = check_request(self.sector_count, lba, len)?;
        let start = usize::try_from(lba).map_err(|_| IoError::OutOfRange)? * BLOCK_SIZE;
        Ok((start, count))
    }

    fn byte_range(&self, offset: u64, len: usize) -> Result<core::ops::Range<usize>, DriverError> {
        let start = usize::try_from(offset).map_err(|_| DriverError::IoError)?;
        let capacity = self.storage.lock().len();
        if start > capacity {
            return Err(DriverError::IoError);
        }
        Ok(start..start + len.min(capacity - start))
    }
}

impl SectorDevice for RamDisk<'_> {
    fn sector_count(&self) -> u64 {
        self.sector_count
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }

    fn read_sectors(&self, lba: u64, buf: &mut [u8]) -> Result<(), IoError> {
        let (start, count) = self.span(lba, buf.len())?;
        buf.copy_from_slice(&self.storage.lock()[start..start + buf.len()]);
        self.sector_reads.fetch_add(count, Ordering::Relaxed);
        Ok(())
    }

    fn write_sectors(&self, lba: u64, buf: &[u8]) -> Result<(), IoError> {
        let (start, count) = self.span(lba, buf.len())?;
        self.storage.lock()[start..start + buf.len()].copy_from_slice(buf);
        self.sector_writes.fetch_add(count, Ordering::Relaxed);
        Ok(())
    }
}

impl DriverOps for RamDisk<'_> {
    fn probe(&self) -> Result<bool, DriverError> {
        Ok(self.sector_count > 0)
    }

    fn read(&self, buf: &mut [u8], offset: u64) -> Result<usize, DriverError> {
        if self.faulty.load(Ordering::Relaxed) {
            return Err(DriverError::IoError);
        }
        let range = self.byte_range(offset, buf.len())?;
        let n = range.len();
        buf[..n].copy_from_slice(&self.storage.lock()[range]);
        Ok(n)
    }

    fn write(&self, buf: &[u8], offset: u64) -> Result<usize, DriverError> {
        if self.faulty.load(Ordering::Relaxed) {
            return Err(DriverError::IoError);
        }
        let range = self.byte_range(offset, buf.len())?;
        let n = range.len();
        self.storage.lock()[range].copy_from_slice(&buf[..n]);
        Ok(n)
    }
}
