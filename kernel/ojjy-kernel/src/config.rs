//! Kernel configuration bridge.
//!
//! Compile-time values the composition root needs in one place. Capacity
//! limits stay beside the structures they bound.

use ojjy_core::log::LogLevel;
use ojjy_core::time::Timeout;

/// Most verbose level any sink receives. Messages above it are dropped
/// before formatting.
pub const MAX_LOG_LEVEL: LogLevel = if cfg!(debug_assertions) {
    LogLevel::Debug
} else {
    LogLevel::Info
};

/// Mount point of the read-only system image.
pub const SYSTEM_MOUNT: &str = "/";

/// Mount point of the read-write user filesystem.
pub const USER_MOUNT: &str = "/Users";

/// Longest the block cache waits for a busy device, in nanoseconds.
pub const DEVICE_TIMEOUT_NANOS: u64 = 100_000_000;

/// [`DEVICE_TIMEOUT_NANOS`] as a busy-wait bound.
pub const DEVICE_TIMEOUT: Timeout = Timeout::from_nanos(DEVICE_TIMEOUT_NANOS);
