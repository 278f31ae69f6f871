//! Scriptable drivers shared by the unit tests.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use ojjy_driver_api::{DriverError, DriverOps, PollFlags};

/// A driver whose behavior is set per test and which counts every call.
pub struct ScriptedDriver {
    pub present: AtomicBool,
    pub init_ok: AtomicBool,
    pub claims_irq: AtomicBool,
    pub probes: AtomicU32,
    pub inits: AtomicU32,
    pub shutdowns: AtomicU32,
    pub irqs: AtomicU32,
}

impl ScriptedDriver {
    pub const fn new() -> Self {
        Self {
            present: AtomicBool::new(true),
            init_ok: AtomicBool::new(true),
            claims_irq: AtomicBool::new(false),
            probes: AtomicU32::new(0),
            inits: AtomicU32::new(0),
            shutdowns: AtomicU32::new(0),
            irqs: AtomicU32::new(0),
        }
    }

    pub fn absent() -> Self {
        let d = Self::new();
        d.present.store(false, Ordering::Relaxed);
        d
    }

    pub fn failing_init() -> Self {
        let d = Self::new();
        d.init_ok.store(false, Ordering::Relaxed);
        d
    }

    pub fn claiming() -> Self {
        let d = Self::new();
        d.claims_irq.store(true, Ordering::Relaxed);
        d
    }

    pub fn count(counter: &AtomicU32) -> u32 {
        counter.load(Ordering::Relaxed)
    }
}

impl DriverOps for ScriptedDriver {
    fn probe(&self) -> Result<bool, DriverError> {
        self.probes.fetch_add(1, Ordering::Relaxed);
        Ok(self.present.load(Ordering::Relaxed))
    }

    fn init(&self) -> Result<(), DriverError> {
        self.inits.fetch_add(1, Ordering::Relaxed);
        if self.init_ok.load(Ordering::Relaxed) {
            Ok(())
        } else {
            Err(DriverError::InitFailed)
        }
    }

    fn shutdown(&self) -> Result<(), DriverError> {
        self.shutdowns.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn handle_irq(&self, _irq: u8) -> Result<bool, DriverError> {
        self.irqs.fetch_add(1, Ordering::Relaxed);
        Ok(self.claims_irq.load(Ordering::Relaxed))
    }

    fn read(&self, buf: &mut [u8], _offset: u64) -> Result<usize, DriverError> {
        buf.fill(0xAB);
        Ok(buf.len())
    }

    fn poll(&self) -> Result<PollFlags, DriverError> {
        Ok(PollFlags::READABLE)
    }
}

/// A driver that implements nothing at all.
pub struct BareDriver;

impl DriverOps for BareDriver {}
