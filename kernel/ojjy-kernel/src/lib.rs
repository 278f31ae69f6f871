//! Composition root of the ojjy I/O core.
//!
//! Creates the driver registry, block cache and VFS as one [`Kernel`] service
//! object, installs the kernel logger, and runs the boot sequence that mounts
//! the system image and the user filesystem.

#![cfg_attr(not(test), no_std)]

pub mod boot;
pub mod config;
pub mod error;
pub mod kernel;
pub mod log;

pub use boot::{BootConfig, BootReport, boot};
pub use error::KernelError;
pub use kernel::Kernel;
pub use ojjy_core::log::LogLevel;
pub use ojjy_core::{kdebug, kerr, kfatal, kinfo, klog, kprint, kprintln, ktrace, kwarn};
