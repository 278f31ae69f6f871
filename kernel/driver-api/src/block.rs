//! Sector device contract.
//!
//! The register-level disk protocol lives in the disk driver; the rest of the
//! kernel sees a disk only as a sector-addressable, synchronous read/write
//! surface. Waits inside an implementation are bounded busy-waits.

use core::fmt;

/// Size of one sector and of one cached block, in bytes.
pub const BLOCK_SIZE: usize = 512;

/// Errors from sector-level I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoError {
    /// The sector is past the end of the device.
    OutOfRange,
    /// The device reported a hardware error.
    DeviceError,
    /// The buffer is not a whole number of sectors.
    InvalidBuffer,
    /// The device stayed busy past the timeout.
    Timeout,
    /// No device is present, or it is not accepting commands.
    NotReady,
}

impl fmt::Display for IoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::OutOfRange => "sector out of range",
            Self::DeviceError => "device error",
            Self::InvalidBuffer => "invalid buffer size",
            Self::Timeout => "operation timed out",
            Self::NotReady => "device not ready",
        })
    }
}

/// A synchronous, sector-addressable storage device.
pub trait SectorDevice: Send + Sync {
    /// Number of addressable sectors.
    fn sector_count(&self) -> u64;

    /// Whether the device can accept a command right now.
    fn is_ready(&self) -> bool {
        true
    }

    /// Reads `buf.len() / BLOCK_SIZE` sectors starting at `lba`.
    ///
    /// `buf` must be a non-empty multiple of [`BLOCK_SIZE`].
    fn read_sectors(&self, lba: u64, buf: &mut [u8]) -> Result<(), IoError>;

    /// Writes `buf.len() / BLOCK_SIZE` sectors starting at `lba`.
    ///
    /// `buf` must be a non-empty multiple of [`BLOCK_SIZE`].
    fn write_sectors(&self, lba: u64, buf: &[u8]) -> Result<(), IoError>;
}

/// Checks that `[lba, lba + len/BLOCK_SIZE)` is a valid request against a
/// device of `sector_count` sectors. Returns the sector count of the request.
///
/// Shared by [`SectorDevice`] implementations.
pub fn check_request(sector_count: u64, lba: u64, len: usize) -> Result<u64, IoError> {
    if len == 0 || len % BLOCK_SIZE != 0 {
        return Err(IoError::InvalidBuffer);
    }
    let count = (len / BLOCK_SIZE) as u64;
    match lba.checked_add(count) {
        Some(end) if end <= sector_count => Ok(count),
        _ => Err(IoError::OutOfRange),
    }
}

/// The disk driver's device table, indexed from zero.
pub trait DeviceTable: Sync {
    /// The device at `index`, if one is attached.
    fn device(&self, index: usize) -> Option<&dyn SectorDevice>;

    /// Number of attached devices.
    fn device_count(&self) -> usize;
}

impl<const N: usize> DeviceTable for [&dyn SectorDevice; N] {
    fn device(&self, index: usize) -> Option<&dyn SectorDevice> {
        self.get(index).copied()
    }

    fn device_count(&self) -> usize {
        N
    }
}
