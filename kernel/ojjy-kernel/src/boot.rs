//! Boot-time wiring of the I/O core.
//!
//! Order: driver framework, driver registration, probe, block cache, VFS,
//! filesystem mounts. A driver that cannot be registered is logged and
//! skipped; any other failure stops the sequence.

use ojjy_core::{kerr, kinfo};
use ojjy_driver_api::{DeviceTable, DriverDescriptor};
use ojjy_drivers::ProbeSummary;
use ojjy_fs::ojfs::Ojfs;
use ojjy_fs::ramfs::RamFs;

use crate::config::{SYSTEM_MOUNT, USER_MOUNT};
use crate::error::KernelError;
use crate::kernel::Kernel;

/// Everything [`boot`] wires together.
pub struct BootConfig<'a, 'i, 'p> {
    /// Drivers to register, in registration order.
    pub drivers: &'a [DriverDescriptor<'a>],
    /// Sector devices for the block cache. Device 0 is the cached disk.
    pub devices: &'a dyn DeviceTable,
    /// Backend for the system image.
    pub ojfs: &'a Ojfs<'i>,
    /// The packed system image.
    pub system_image: &'i [u8],
    /// Backend mounted at [`USER_MOUNT`].
    pub ramfs: &'a RamFs<'p>,
}

/// What [`boot`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BootReport {
    /// Drivers accepted by the registry.
    pub registered: usize,
    /// Drivers the registry refused.
    pub rejected: usize,
    /// Outcome of probing the registered drivers.
    pub probe: ProbeSummary,
}

/// Brings up every service of `kernel` and mounts the boot filesystems.
///
/// # Errors
///
/// [`KernelError::AlreadyInitialized`] if a service already exists, or the
/// error of the first failing mount step.
pub fn boot<'a, 'i, 'p>(
    kernel: &Kernel<'a>,
    config: &BootConfig<'a, 'i, 'p>,
) -> Result<BootReport, KernelError>
where
    'i: 'a,
    'p: 'a,
{
    let mut report = BootReport::default();

    kernel.init_drivers()?;
    for desc in config.drivers {
        match kernel.register_driver(*desc) {
            Ok(_) => report.registered += 1,
            Err(e) => {
                kerr!("DRIVER: cannot register {}: {}", desc.info.name, e);
                report.rejected += 1;
            }
        }
    }
    kinfo!("DRIVER: {} registered, {} rejected", report.registered, report.rejected);

    report.probe = kernel.with_drivers(|registry| registry.probe_all())?;

    kernel.init_block_cache(config.devices)?;
    kernel.init_vfs()?;

    if let Err(e) = kernel.mount_boot_filesystems(config.ojfs, config.system_image, config.ramfs) {
        kerr!("VFS: boot mounts failed: {}", e);
        return Err(e);
    }
    kinfo!("VFS: system at {}, user data at {}", SYSTEM_MOUNT, USER_MOUNT);

    Ok(report)
}
