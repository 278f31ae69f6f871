//! Driver framework error type.

use core::fmt;

/// Failures reported by the driver registry, the IRQ table, and by drivers
/// themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverError {
    /// The driver framework has not been initialized.
    NotInitialized,
    /// A driver name was empty.
    InvalidName,
    /// All registry slots are taken.
    RegistryFull,
    /// A driver with this name is already registered.
    AlreadyRegistered,
    /// No registered driver matches.
    NotFound,
    /// The driver is flagged critical and cannot be unloaded.
    Critical,
    /// The driver has been disabled after repeated errors.
    Disabled,
    /// The IRQ line already has the maximum number of handlers.
    HandlerListFull,
    /// Probe found no hardware.
    DeviceNotFound,
    /// Driver initialization failed.
    InitFailed,
    /// A hardware operation timed out.
    Timeout,
    /// The driver does not implement this capability.
    Unsupported,
    /// A hardware I/O operation failed.
    IoError,
    /// The driver is not in a state that allows the operation.
    InvalidState,
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NotInitialized => "driver framework not initialized",
            Self::InvalidName => "invalid driver name",
            Self::RegistryFull => "driver registry full",
            Self::AlreadyRegistered => "driver already registered",
            Self::NotFound => "driver not found",
            Self::Critical => "driver is critical",
            Self::Disabled => "driver disabled",
            Self::HandlerListFull => "IRQ handler list full",
            Self::DeviceNotFound => "device not found",
            Self::InitFailed => "driver initialization failed",
            Self::Timeout => "hardware operation timed out",
            Self::Unsupported => "operation not supported",
            Self::IoError => "I/O error",
            Self::InvalidState => "invalid driver state",
        })
    }
}
