//! Driver-facing contracts: descriptor metadata, the optional-capability
//! [`DriverOps`] trait, the sector device interface consumed by the block
//! cache, and the error types they report.

#![cfg_attr(not(test), no_std)]

pub mod block;
pub mod driver;
pub mod error;
pub mod ops;

pub use block::{BLOCK_SIZE, DeviceTable, IoError, SectorDevice, check_request};
pub use driver::{DriverDescriptor, DriverFlags, DriverInfo, DriverState, DriverType, DriverVersion};
pub use error::DriverError;
pub use ojjy_core::time::ClockSource;
pub use ops::{DriverOps, PollFlags};
