//! Driver framework services: the driver registry and its lifecycle state
//! machine, per-line IRQ dispatch, the write-through block cache, and an
//! in-memory sector device.

#![cfg_attr(not(test), no_std)]

pub mod block_cache;
pub mod irq;
pub mod ramdisk;
pub mod registry;

#[cfg(test)]
mod test_support;

pub use block_cache::{BlockCache, CACHE_ENTRIES, CacheStats};
pub use irq::{IRQ_LINES, IrqTable, MAX_IRQ_HANDLERS};
pub use ramdisk::RamDisk;
pub use registry::{DriverEntry, DriverId, DriverRegistry, DriverStats, ERROR_THRESHOLD, MAX_DRIVERS, ProbeSummary};
