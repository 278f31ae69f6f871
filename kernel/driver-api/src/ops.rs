//! Optional driver capabilities.

use crate::error::DriverError;

bitflags::bitflags! {
    /// Readiness reported by [`DriverOps::poll`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PollFlags: u32 {
        /// Data is available to read.
        const READABLE = 1 << 0;
        /// The device can accept a write.
        const WRITABLE = 1 << 1;
        /// The device reported an error condition.
        const ERROR = 1 << 2;
        /// The device went away.
        const HANGUP = 1 << 3;
    }
}

/// The capability table of a driver.
///
/// Every method is optional. A driver implements only what its hardware
/// supports and inherits a default that returns
/// [`DriverError::Unsupported`] for the rest. The registry gives the absent
/// lifecycle hooks their documented meaning:
///
/// - no `probe`: the hardware is assumed present;
/// - no `init` or `shutdown`: the step trivially succeeds;
/// - no `suspend`/`resume`/`read`/`write`/`ioctl`/`poll`: the call fails with
///   `Unsupported`.
///
/// Methods take `&self`; drivers keep mutable device state behind their own
/// interior mutability. `handle_irq` runs in interrupt context and must not
/// touch filesystem or VFS state.
pub trait DriverOps: Sync {
    /// Checks whether the hardware is present. `Ok(false)` means absent,
    /// which is not an error.
    fn probe(&self) -> Result<bool, DriverError> {
        Err(DriverError::Unsupported)
    }

    /// Brings the device up.
    fn init(&self) -> Result<(), DriverError> {
        Err(DriverError::Unsupported)
    }

    /// Quiesces the device.
    fn shutdown(&self) -> Result<(), DriverError> {
        Err(DriverError::Unsupported)
    }

    /// Enters a low-power state.
    fn suspend(&self) -> Result<(), DriverError> {
        Err(DriverError::Unsupported)
    }

    /// Leaves the low-power state.
    fn resume(&self) -> Result<(), DriverError> {
        Err(DriverError::Unsupported)
    }

    /// Services an interrupt on `irq`. Returns `Ok(true)` if this device
    /// raised it.
    fn handle_irq(&self, irq: u8) -> Result<bool, DriverError> {
        let _ = irq;
        Err(DriverError::Unsupported)
    }

    /// Reads device data at `offset` into `buf`, returning the byte count.
    fn read(&self, buf: &mut [u8], offset: u64) -> Result<usize, DriverError> {
        let _ = (buf, offset);
        Err(DriverError::Unsupported)
    }

    /// Writes `buf` to the device at `offset`, returning the byte count.
    fn write(&self, buf: &[u8], offset: u64) -> Result<usize, DriverError> {
        let _ = (buf, offset);
        Err(DriverError::Unsupported)
    }

    /// Device-specific control request.
    fn ioctl(&self, cmd: u32, arg: usize) -> Result<usize, DriverError> {
        let _ = (cmd, arg);
        Err(DriverError::Unsupported)
    }

    /// Reports current readiness.
    fn poll(&self) -> Result<PollFlags, DriverError> {
        Err(DriverError::Unsupported)
    }
}
