mod common;

use common::{CALC_BINARY, TestDevice, VERSION_TEXT, system_image};
use ojjy_core::time::ManualClock;
use ojjy_driver_api::{BLOCK_SIZE, DriverDescriptor, DriverState, DriverType, SectorDevice};
use ojjy_drivers::RamDisk;
use ojjy_fs::ojfs::{ImageNode, Ojfs, OjfsError, pack, packed_size};
use ojjy_fs::ramfs::RamFs;
use ojjy_fs::{FsError, OpenFlags, VfsFileType};
use ojjy_kernel::{BootConfig, Kernel, KernelError, boot};

#[test]
fn boot_brings_up_every_service() {
    let clock = ManualClock::new();
    let mut storage = vec![0u8; 16 * BLOCK_SIZE];
    let disk = RamDisk::new(&mut storage);
    let devices: [&dyn SectorDevice; 1] = [&disk];
    let timer = TestDevice::new(true, true);
    let mouse = TestDevice::new(false, false);
    let drivers = [
        DriverDescriptor::new("ramdisk", DriverType::Block, &disk),
        DriverDescriptor::new("timer", DriverType::Timer, &timer),
        DriverDescriptor::new("mouse", DriverType::Input, &mouse),
        DriverDescriptor::new("timer", DriverType::Timer, &mouse),
    ];
    let image = system_image();
    let ojfs = Ojfs::new();
    let mut pool = vec![0u8; 64 * 1024];
    let ramfs = RamFs::new(&mut pool);
    let kernel = Kernel::new(&clock);

    let config = BootConfig {
        drivers: &drivers,
        devices: &devices,
        ojfs: &ojfs,
        system_image: &image,
        ramfs: &ramfs,
    };
    let report = boot(&kernel, &config).unwrap();
    assert_eq!((report.registered, report.rejected), (3, 1));
    assert_eq!(
        (report.probe.started, report.probe.declined, report.probe.failed),
        (2, 1, 0)
    );

    let timer_id = kernel
        .with_drivers(|registry| {
            let names: Vec<_> = registry.iter().map(|e| e.name()).collect();
            assert_eq!(names, ["ramdisk", "timer", "mouse"]);
            let mouse_id = registry.find_by_name("mouse").unwrap();
            assert_eq!(registry.state(mouse_id), DriverState::Registered);
            let timer_id = registry.find_ready_by_type(DriverType::Timer).unwrap();
            registry.register_irq(timer_id, 0).unwrap();
            timer_id
        })
        .unwrap();
    assert!(kernel.dispatch_irq(0));
    assert!(!kernel.dispatch_irq(1));
    assert_eq!(timer.irqs(), 1);
    let claimed = kernel
        .with_drivers(|registry| registry.get(timer_id).unwrap().stats().irq_count)
        .unwrap();
    assert_eq!(claimed, 1);

    kernel
        .with_block_cache(|cache| {
            let block = [0x5A; BLOCK_SIZE];
            cache.write(3, &block).unwrap();
            assert!(cache.is_cached(3));
            assert_eq!(cache.read(3).unwrap(), &block);
            assert_eq!(cache.stats().hits, 1);
        })
        .unwrap();
    assert_eq!(disk.sector_writes(), 1);
}

#[test]
fn boot_layout_serves_system_and_user_files() {
    let clock = ManualClock::new();
    let devices: [&dyn SectorDevice; 0] = [];
    let image = system_image();
    let ojfs = Ojfs::new();
    let mut pool = vec![0u8; 64 * 1024];
    let ramfs = RamFs::new(&mut pool);
    let kernel = Kernel::new(&clock);
    let config = BootConfig {
        drivers: &[],
        devices: &devices,
        ojfs: &ojfs,
        system_image: &image,
        ramfs: &ramfs,
    };
    boot(&kernel, &config).unwrap();

    kernel
        .with_vfs(|vfs| {
            let layout: Vec<_> = vfs.mounts().map(|m| (m.path, m.fs_name, m.readonly)).collect();
            assert_eq!(layout, [("/", "ojfs", true), ("/Users", "ramfs", false)]);
            assert_eq!(vfs.mount_context("/"), Some(0));

            let mut buf = [0u8; 64];
            let n = vfs.read_file("/System/version", &mut buf).unwrap();
            assert_eq!(&buf[..n], VERSION_TEXT);
            let main = vfs.stat("/Applications/Calc.app/main").unwrap();
            assert_eq!(main.size, CALC_BINARY.len() as u64);
            assert_eq!(
                vfs.stat("/Applications/Calc.app").unwrap().file_type,
                VfsFileType::Bundle
            );

            assert_eq!(vfs.mkdir("/System/cache"), Err(FsError::ReadOnly));
            assert_eq!(
                vfs.open("/System/version", OpenFlags::WRITE).err(),
                Some(FsError::ReadOnly)
            );

            assert_eq!(vfs.isdir("/Users"), Ok(true));
            vfs.mkdir("/Users/alice").unwrap();
            let file = vfs
                .open("/Users/alice/notes.txt", OpenFlags::WRITE | OpenFlags::CREATE)
                .unwrap();
            assert_eq!(vfs.write(file, b"hello"), Ok(5));
            vfs.close(file).unwrap();
            let n = vfs.read_file("/Users/alice/notes.txt", &mut buf).unwrap();
            assert_eq!(&buf[..n], b"hello");

            assert_eq!(
                vfs.rename("/Users/alice/notes.txt", "/System/notes.txt"),
                Err(FsError::CrossMount)
            );
            assert_eq!(vfs.exists("/System/notes.txt"), Ok(false));
            assert_eq!(vfs.open_files(), 0);
        })
        .unwrap();
}

#[test]
fn later_system_image_replaces_the_served_one() {
    let clock = ManualClock::new();
    let devices: [&dyn SectorDevice; 0] = [];
    let image = system_image();
    let nodes = [ImageNode::dir("", None), ImageNode::file("motd", 0, b"patched")];
    let mut update = vec![0u8; packed_size(&nodes)];
    pack(&nodes, &mut update).unwrap();
    let ojfs = Ojfs::new();
    let mut pool = vec![0u8; 16 * 1024];
    let ramfs = RamFs::new(&mut pool);
    let kernel = Kernel::new(&clock);
    let config = BootConfig {
        drivers: &[],
        devices: &devices,
        ojfs: &ojfs,
        system_image: &image,
        ramfs: &ramfs,
    };
    boot(&kernel, &config).unwrap();

    assert_eq!(ojfs.init(&update), Ok(1));
    kernel
        .with_vfs(|vfs| {
            // The mount still records the first instance, but path lookups
            // follow the most recently initialized image.
            assert_eq!(vfs.mount_context("/"), Some(0));
            assert_eq!(vfs.exists("/System/version"), Ok(false));
            let mut buf = [0u8; 16];
            let n = vfs.read_file("/motd", &mut buf).unwrap();
            assert_eq!(&buf[..n], b"patched");
        })
        .unwrap();
}

#[test]
fn rejected_system_image_stops_boot() {
    let clock = ManualClock::new();
    let devices: [&dyn SectorDevice; 0] = [];
    let mut image = system_image();
    image[0] ^= 0xFF;
    let ojfs = Ojfs::new();
    let mut pool = vec![0u8; 16 * 1024];
    let ramfs = RamFs::new(&mut pool);
    let kernel = Kernel::new(&clock);
    let config = BootConfig {
        drivers: &[],
        devices: &devices,
        ojfs: &ojfs,
        system_image: &image,
        ramfs: &ramfs,
    };

    assert_eq!(
        boot(&kernel, &config),
        Err(KernelError::Image(OjfsError::BadMagic))
    );
    assert_eq!(ojfs.instance_count(), 0);
    // Services created before the failure stay up.
    assert_eq!(kernel.with_vfs(|vfs| vfs.mount_count()), Ok(0));
    assert_eq!(kernel.with_drivers(|registry| registry.count()), Ok(0));
}

#[test]
fn boot_runs_once() {
    let clock = ManualClock::new();
    let devices: [&dyn SectorDevice; 0] = [];
    let image = system_image();
    let ojfs = Ojfs::new();
    let mut pool = vec![0u8; 16 * 1024];
    let ramfs = RamFs::new(&mut pool);
    let kernel = Kernel::new(&clock);
    let config = BootConfig {
        drivers: &[],
        devices: &devices,
        ojfs: &ojfs,
        system_image: &image,
        ramfs: &ramfs,
    };

    boot(&kernel, &config).unwrap();
    assert_eq!(boot(&kernel, &config), Err(KernelError::AlreadyInitialized));
    assert_eq!(ojfs.instance_count(), 1);
}
