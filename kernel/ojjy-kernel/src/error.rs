//! Composition-root error type.

use core::fmt;

use ojjy_driver_api::DriverError;
use ojjy_fs::FsError;
use ojjy_fs::ojfs::OjfsError;

/// Failures of the kernel service layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// The service has not been created yet.
    NotInitialized,
    /// The service already exists.
    AlreadyInitialized,
    /// A driver framework call failed.
    Driver(DriverError),
    /// The system image was rejected.
    Image(OjfsError),
    /// A filesystem call failed.
    Fs(FsError),
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotInitialized => f.write_str("service not initialized"),
            Self::AlreadyInitialized => f.write_str("service already initialized"),
            Self::Driver(e) => write!(f, "driver: {e}"),
            Self::Image(e) => write!(f, "system image: {e}"),
            Self::Fs(e) => write!(f, "filesystem: {e}"),
        }
    }
}

impl From<DriverError> for KernelError {
    fn from(e: DriverError) -> Self {
        Self::Driver(e)
    }
}

impl From<OjfsError> for KernelError {
    fn from(e: OjfsError) -> Self {
        Self::Image(e)
    }
}

impl From<FsError> for KernelError {
    fn from(e: FsError) -> Self {
        Self::Fs(e)
    }
}
