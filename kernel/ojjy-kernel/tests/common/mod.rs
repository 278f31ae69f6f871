//! Fixtures shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use ojjy_driver_api::{DriverError, DriverOps};
use ojjy_fs::ojfs::{ImageNode, pack, packed_size};

pub const VERSION_TEXT: &[u8] = b"ojjy 0.1\n";
pub const CALC_BINARY: &[u8] = &[0x7F, b'E', b'L', b'F', 2, 1, 1, 0];

/// A small system image:
///
/// ```text
/// /System/version
/// /Applications/Calc.app/main
/// ```
pub fn system_image() -> Vec<u8> {
    let nodes = [
        ImageNode::dir("", None),
        ImageNode::dir("System", Some(0)),
        ImageNode::file("version", 1, VERSION_TEXT),
        ImageNode::dir("Applications", Some(0)),
        ImageNode::dir("Calc.app", Some(3)),
        ImageNode::file("main", 4, CALC_BINARY),
    ];
    let mut image = vec![0; packed_size(&nodes)];
    pack(&nodes, &mut image).unwrap();
    image
}

/// A driver with switchable hardware presence and interrupt claiming.
pub struct TestDevice {
    pub present: AtomicBool,
    pub claims_irq: AtomicBool,
    pub irqs: AtomicU32,
}

impl TestDevice {
    pub const fn new(present: bool, claims_irq: bool) -> Self {
        Self {
            present: AtomicBool::new(present),
            claims_irq: AtomicBool::new(claims_irq),
            irqs: AtomicU32::new(0),
        }
    }

    pub fn irqs(&self) -> u32 {
        self.irqs.load(Ordering::Relaxed)
    }
}

impl DriverOps for TestDevice {
    fn probe(&self) -> Result<bool, DriverError> {
        Ok(self.present.load(Ordering::Relaxed))
    }

    fn handle_irq(&self, _irq: u8) -> Result<bool, DriverError> {
        self.irqs.fetch_add(1, Ordering::Relaxed);
        Ok(self.claims_irq.load(Ordering::Relaxed))
    }
}
