mod common;

use common::{TestDevice, system_image};
use ojjy_core::time::ManualClock;
use ojjy_driver_api::{DriverDescriptor, DriverError, DriverType, SectorDevice};
use ojjy_fs::FsError;
use ojjy_fs::ojfs::Ojfs;
use ojjy_fs::ramfs::RamFs;
use ojjy_kernel::config::{SYSTEM_MOUNT, USER_MOUNT};
use ojjy_kernel::{Kernel, KernelError};

#[test]
fn services_are_unavailable_before_init() {
    let clock = ManualClock::new();
    let device = TestDevice::new(true, false);
    let image = system_image();
    let ojfs = Ojfs::new();
    let mut pool = vec![0u8; 8 * 1024];
    let ramfs = RamFs::new(&mut pool);
    let kernel = Kernel::new(&clock);

    assert_eq!(
        kernel.register_driver(DriverDescriptor::new("kbd", DriverType::Input, &device)),
        Err(DriverError::NotInitialized)
    );
    assert_eq!(kernel.with_drivers(|_| ()), Err(KernelError::NotInitialized));
    assert_eq!(kernel.with_block_cache(|_| ()), Err(KernelError::NotInitialized));
    assert_eq!(kernel.with_vfs(|_| ()), Err(KernelError::NotInitialized));
    assert!(!kernel.dispatch_irq(1));

    // Without a VFS the image is never handed to the backend.
    assert_eq!(
        kernel.mount_boot_filesystems(&ojfs, &image, &ramfs),
        Err(KernelError::NotInitialized)
    );
    assert_eq!(ojfs.instance_count(), 0);
}

#[test]
fn services_initialize_once() {
    let clock = ManualClock::new();
    let devices: [&dyn SectorDevice; 0] = [];
    let kernel = Kernel::new(&clock);

    kernel.init_drivers().unwrap();
    kernel.init_block_cache(&devices).unwrap();
    kernel.init_vfs().unwrap();
    assert_eq!(kernel.init_drivers(), Err(KernelError::AlreadyInitialized));
    assert_eq!(kernel.init_block_cache(&devices), Err(KernelError::AlreadyInitialized));
    assert_eq!(kernel.init_vfs(), Err(KernelError::AlreadyInitialized));
}

#[test]
fn registration_goes_through_the_kernel_registry() {
    let clock = ManualClock::new();
    let kbd = TestDevice::new(true, true);
    let kernel = Kernel::new(&clock);
    kernel.init_drivers().unwrap();

    let id = kernel
        .register_driver(DriverDescriptor::new("kbd", DriverType::Input, &kbd))
        .unwrap();
    assert_eq!(
        kernel.register_driver(DriverDescriptor::new("kbd", DriverType::Input, &kbd)),
        Err(DriverError::AlreadyRegistered)
    );
    kernel
        .with_drivers(|registry| {
            registry.start(id).unwrap();
            registry.register_irq(id, 1).unwrap();
        })
        .unwrap();
    assert!(kernel.dispatch_irq(1));
    assert_eq!(kbd.irqs(), 1);
}

#[test]
fn interrupt_during_registry_access_is_not_handled() {
    let clock = ManualClock::new();
    let kbd = TestDevice::new(true, true);
    let kernel = Kernel::new(&clock);
    kernel.init_drivers().unwrap();
    let id = kernel
        .register_driver(DriverDescriptor::new("kbd", DriverType::Input, &kbd))
        .unwrap();
    kernel
        .with_drivers(|registry| {
            registry.start(id).unwrap();
            registry.register_irq(id, 1).unwrap();
        })
        .unwrap();

    let nested = kernel.with_drivers(|_| kernel.dispatch_irq(1)).unwrap();
    assert!(!nested);
    assert_eq!(kbd.irqs(), 0);
    assert!(kernel.dispatch_irq(1));
}

#[test]
fn block_cache_without_a_disk_reports_not_ready() {
    let clock = ManualClock::new();
    let devices: [&dyn SectorDevice; 0] = [];
    let kernel = Kernel::new(&clock);
    kernel.init_block_cache(&devices).unwrap();

    let result = kernel.with_block_cache(|cache| cache.read(0).map(|_| ())).unwrap();
    assert_eq!(result, Err(ojjy_driver_api::IoError::NotReady));
}

#[test]
fn boot_mount_points_are_taken() {
    let clock = ManualClock::new();
    let image = system_image();
    let ojfs = Ojfs::new();
    let mut pool = vec![0u8; 8 * 1024];
    let ramfs = RamFs::new(&mut pool);
    let kernel = Kernel::new(&clock);
    kernel.init_vfs().unwrap();

    kernel.mount_boot_filesystems(&ojfs, &image, &ramfs).unwrap();
    kernel
        .with_vfs(|vfs| {
            assert_eq!(vfs.mount(USER_MOUNT, &ramfs, 0, false), Err(FsError::AlreadyMounted));
            assert_eq!(vfs.unmount(SYSTEM_MOUNT), Ok(()));
            assert_eq!(vfs.mount_count(), 1);
        })
        .unwrap();
}
