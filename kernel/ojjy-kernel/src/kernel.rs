//! Kernel service object.
//!
//! [`Kernel`] owns the three long-lived I/O services: the driver registry,
//! the block cache and the VFS. Each sits behind its own spin lock as an
//! `Option`, so a call made before the service exists fails with
//! [`KernelError::NotInitialized`] instead of touching uninitialized state.
//!
//! The `with_*` accessors hold the service lock for the duration of the
//! closure. Calling back into the same accessor from inside the closure
//! deadlocks.

use ojjy_core::sync::SpinLock;
use ojjy_core::time::ClockSource;
use ojjy_core::{kdebug, kinfo, ktrace};
use ojjy_driver_api::{DeviceTable, DriverDescriptor, DriverError};
use ojjy_drivers::{BlockCache, DriverId, DriverRegistry};
use ojjy_fs::FileSystem;
use ojjy_fs::ojfs::Ojfs;
use ojjy_fs::ramfs::RamFs;
use ojjy_fs::vfs::Vfs;

use crate::config::{DEVICE_TIMEOUT, SYSTEM_MOUNT, USER_MOUNT};
use crate::error::KernelError;

/// The kernel's I/O services.
pub struct Kernel<'a> {
    clock: &'a dyn ClockSource,
    drivers: SpinLock<Option<DriverRegistry<'a>>>,
    block_cache: SpinLock<Option<BlockCache<'a>>>,
    vfs: SpinLock<Option<Vfs<'a>>>,
}

impl<'a> Kernel<'a> {
    /// A kernel with no services. `clock` timestamps driver errors and
    /// bounds device waits.
    pub const fn new(clock: &'a dyn ClockSource) -> Self {
        Self {
            clock,
            drivers: SpinLock::new(None),
            block_cache: SpinLock::new(None),
            vfs: SpinLock::new(None),
        }
    }

    /// Creates the driver registry.
    ///
    /// # Errors
    ///
    /// [`KernelError::AlreadyInitialized`].
    pub fn init_drivers(&self) -> Result<(), KernelError> {
        let mut slot = self.drivers.lock();
        if slot.is_some() {
            return Err(KernelError::AlreadyInitialized);
        }
        *slot = Some(DriverRegistry::new(self.clock));
        kinfo!("DRIVER: framework initialized");
        Ok(())
    }

    /// Creates the block cache over device 0 of `devices`.
    ///
    /// # Errors
    ///
    /// [`KernelError::AlreadyInitialized`].
    pub fn init_block_cache(&self, devices: &'a dyn DeviceTable) -> Result<(), KernelError> {
        let mut slot = self.block_cache.lock();
        if slot.is_some() {
            return Err(KernelError::AlreadyInitialized);
        }
        *slot = Some(BlockCache::new(devices, self.clock).with_timeout(DEVICE_TIMEOUT));
        kinfo!("CACHE: ready, {} device(s) attached", devices.device_count());
        Ok(())
    }

    /// Creates the VFS with an empty mount table.
    ///
    /// # Errors
    ///
    /// [`KernelError::AlreadyInitialized`].
    pub fn init_vfs(&self) -> Result<(), KernelError> {
        let mut slot = self.vfs.lock();
        if slot.is_some() {
            return Err(KernelError::AlreadyInitialized);
        }
        *slot = Some(Vfs::new());
        kinfo!("VFS: initialized");
        Ok(())
    }

    /// Registers a driver with the global registry.
    ///
    /// # Errors
    ///
    /// [`DriverError::NotInitialized`] before [`init_drivers`](Self::init_drivers),
    /// otherwise whatever [`DriverRegistry::register`] reports.
    pub fn register_driver(&self, desc: DriverDescriptor<'a>) -> Result<DriverId, DriverError> {
        self.drivers
            .lock()
            .as_mut()
            .ok_or(DriverError::NotInitialized)?
            .register(desc)
    }

    /// Runs `f` on the driver registry.
    ///
    /// # Errors
    ///
    /// [`KernelError::NotInitialized`].
    pub fn with_drivers<R>(
        &self,
        f: impl FnOnce(&mut DriverRegistry<'a>) -> R,
    ) -> Result<R, KernelError> {
        let mut slot = self.drivers.lock();
        let registry = slot.as_mut().ok_or(KernelError::NotInitialized)?;
        Ok(f(registry))
    }

    /// Runs `f` on the block cache.
    ///
    /// # Errors
    ///
    /// [`KernelError::NotInitialized`].
    pub fn with_block_cache<R>(
        &self,
        f: impl FnOnce(&mut BlockCache<'a>) -> R,
    ) -> Result<R, KernelError> {
        let mut slot = self.block_cache.lock();
        let cache = slot.as_mut().ok_or(KernelError::NotInitialized)?;
        Ok(f(cache))
    }

    /// Runs `f` on the VFS.
    ///
    /// # Errors
    ///
    /// [`KernelError::NotInitialized`].
    pub fn with_vfs<R>(&self, f: impl FnOnce(&mut Vfs<'a>) -> R) -> Result<R, KernelError> {
        let mut slot = self.vfs.lock();
        let vfs = slot.as_mut().ok_or(KernelError::NotInitialized)?;
        Ok(f(vfs))
    }

    /// Interrupt entry point. Returns whether a driver claimed `line`.
    ///
    /// Never spins: if the registry lock is held by the interrupted code, or
    /// the registry does not exist yet, the interrupt is reported unhandled.
    /// Lines logged while the interrupted code holds the logger are dropped.
    pub fn dispatch_irq(&self, line: u8) -> bool {
        let Some(mut slot) = self.drivers.try_lock() else {
            ktrace!("IRQ: line {} arrived while the registry was busy", line);
            return false;
        };
        match slot.as_mut() {
            Some(registry) => registry.dispatch_irq(line),
            None => false,
        }
    }

    /// Initializes `image` as an OJFS instance and mounts it read-only at
    /// [`SYSTEM_MOUNT`], then mounts `ramfs` read-write at [`USER_MOUNT`].
    ///
    /// The OJFS instance slot is stored as the system mount's context.
    ///
    /// # Errors
    ///
    /// [`KernelError::Image`] if the image is rejected, [`KernelError::Fs`]
    /// if a mount fails, [`KernelError::NotInitialized`] without a VFS.
    pub fn mount_boot_filesystems<'i, 'p>(
        &self,
        ojfs: &'a Ojfs<'i>,
        image: &'i [u8],
        ramfs: &'a RamFs<'p>,
    ) -> Result<(), KernelError>
    where
        'i: 'a,
        'p: 'a,
    {
        let mut slot = self.vfs.lock();
        let vfs = slot.as_mut().ok_or(KernelError::NotInitialized)?;
        let instance = ojfs.init(image)?;
        let system: &'a dyn FileSystem = ojfs;
        let user: &'a dyn FileSystem = ramfs;
        vfs.mount(SYSTEM_MOUNT, system, instance, true)?;
        vfs.mount(USER_MOUNT, user, 0, false)?;
        kdebug!("VFS: boot layout has {} mounts", vfs.mount_count());
        Ok(())
    }
}
