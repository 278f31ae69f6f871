//! Per-line interrupt handler lists.
//!
//! Each of the 256 lines holds up to [`MAX_IRQ_HANDLERS`] driver handles in
//! registration order. The lists only reference drivers; the registry owns
//! them. Dispatch is first-match-wins: the first `Ready` driver whose
//! `handle_irq` claims the interrupt ends the walk.

use ojjy_core::{kdebug, ktrace};
use ojjy_driver_api::{DriverError, DriverState};
use planck_noalloc::vec::ArrayVec;

use crate::registry::{DriverId, DriverRegistry};

/// Number of interrupt lines.
pub const IRQ_LINES: usize = 256;

/// Maximum handlers sharing one line.
pub const MAX_IRQ_HANDLERS: usize = 16;

/// Handler lists for every interrupt line.
pub struct IrqTable {
    lines: [ArrayVec<DriverId, MAX_IRQ_HANDLERS>; IRQ_LINES],
}

impl IrqTable {
    /// An empty table.
    pub const fn new() -> Self {
        Self {
            lines: [const { ArrayVec::new() }; IRQ_LINES],
        }
    }

    /// Handlers on `line`, in dispatch order.
    pub fn handlers(&self, line: u8) -> &[DriverId] {
        self.lines[usize::from(line)].as_slice()
    }

    /// Appends `id` to `line`. Returns `false` if it was already there.
    fn insert(&mut self, line: u8, id: DriverId) -> Result<bool, DriverError> {
        let list = &mut self.lines[usize::from(line)];
        if list.contains(&id) {
            return Ok(false);
        }
        list.try_push(id).map_err(|_| DriverError::HandlerListFull)?;
        Ok(true)
    }

    /// Removes `id` from `line`, keeping the order of the rest.
    fn remove(&mut self, line: u8, id: DriverId) -> bool {
        let list = &mut self.lines[usize::from(line)];
        match list.iter().position(|&h| h == id) {
            Some(pos) => {
                list.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Removes `id` from every line. Returns how many lines it was on.
    pub(crate) fn remove_all(&mut self, id: DriverId) -> usize {
        let mut removed = 0;
        for line in 0..=u8::MAX {
            if self.remove(line, id) {
                removed += 1;
            }
        }
        removed
    }
}

impl Default for IrqTable {
    fn default() -> Self {
        Self::new()
    }
}

impl DriverRegistry<'_> {
    /// Adds a driver to `line`'s handler list and makes `line` its primary
    /// IRQ if it has none. Registering twice on the same line is a no-op.
    ///
    /// # Errors
    ///
    /// [`DriverError::NotFound`], or [`DriverError::HandlerListFull`] when
    /// the line already has [`MAX_IRQ_HANDLERS`] handlers.
    pub fn register_irq(&mut self, id: DriverId, line: u8) -> Result<(), DriverError> {
        let index = self.index_of(id).ok_or(DriverError::NotFound)?;
        if self.irq.insert(line, id)? {
            let entry = self.entry_at_mut(index);
            entry.note_irq_registered(line);
            kdebug!("IRQ: {} registered on line {}", entry.name(), line);
        }
        Ok(())
    }

    /// Removes a driver from `line`, clearing its primary IRQ if it was
    /// that line.
    ///
    /// # Errors
    ///
    /// [`DriverError::NotFound`] if the driver is unknown or not on `line`.
    pub fn unregister_irq(&mut self, id: DriverId, line: u8) -> Result<(), DriverError> {
        let index = self.index_of(id).ok_or(DriverError::NotFound)?;
        if !self.irq.remove(line, id) {
            return Err(DriverError::NotFound);
        }
        self.entry_at_mut(index).note_irq_unregistered(line);
        Ok(())
    }

    /// Handlers on `line`, in dispatch order.
    pub fn irq_handlers(&self, line: u8) -> &[DriverId] {
        self.irq.handlers(line)
    }

    /// Offers the interrupt to each `Ready` handler on `line` in order and
    /// stops at the first that claims it. Returns whether any did.
    ///
    /// A handler that fails is charged an error through
    /// [`report_error`](Self::report_error) and the walk continues.
    pub fn dispatch_irq(&mut self, line: u8) -> bool {
        let mut slot = 0;
        while let Some(&id) = self.irq.handlers(line).get(slot) {
            slot += 1;
            let Some(index) = self.index_of(id) else {
                continue;
            };
            let entry = self.entry_at(index);
            if entry.state() != DriverState::Ready {
                continue;
            }
            match entry.ops().handle_irq(line) {
                Ok(true) => {
                    self.entry_at_mut(index).note_irq_claimed();
                    return true;
                }
                Ok(false) | Err(DriverError::Unsupported) => {}
                Err(e) => {
                    ktrace!("IRQ: {} failed on line {}: {}", entry.name(), line, e);
                    // The handle was just resolved, so this cannot miss.
                    let _ = self.report_error(id, "IRQ handler failed");
                }
            }
        }
        kdebug!("IRQ: unhandled interrupt on line {}", line);
        false
    }
}

#[cfg(test)]
mod tests {
    use ojjy_core::time::ManualClock;
    use ojjy_driver_api::{DriverDescriptor, DriverOps, DriverType};

    use super::*;
    use crate::test_support::{BareDriver, ScriptedDriver};

    fn started<'a>(reg: &mut DriverRegistry<'a>, name: &'static str, ops: &'a dyn DriverOps) -> DriverId {
        let id = reg
            .register(DriverDescriptor::new(name, DriverType::Input, ops))
            .unwrap();
        reg.start(id).unwrap();
        id
    }

    #[test]
    fn duplicate_registration_is_noop() {
        let clock = ManualClock::new();
        let mut reg = DriverRegistry::new(&clock);
        let id = started(&mut reg, "kbd", &BareDriver);
        reg.register_irq(id, 1).unwrap();
        reg.register_irq(id, 1).unwrap();
        assert_eq!(reg.irq_handlers(1), [id]);
        assert_eq!(reg.get(id).unwrap().irq_lines(), 1);
    }

    #[test]
    fn primary_irq_is_first_line() {
        let clock = ManualClock::new();
        let mut reg = DriverRegistry::new(&clock);
        let id = started(&mut reg, "nic", &BareDriver);
        reg.register_irq(id, 10).unwrap();
        reg.register_irq(id, 11).unwrap();
        assert_eq!(reg.get(id).unwrap().primary_irq(), Some(10));
        reg.unregister_irq(id, 10).unwrap();
        assert_eq!(reg.get(id).unwrap().primary_irq(), None);
        assert_eq!(reg.get(id).unwrap().irq_lines(), 1);
        assert_eq!(reg.unregister_irq(id, 10), Err(DriverError::NotFound));
    }

    #[test]
    fn line_capacity_is_bounded() {
        const NAMES: [&str; MAX_IRQ_HANDLERS + 1] = [
            "h00", "h01", "h02", "h03", "h04", "h05", "h06", "h07", "h08", "h09", "h10", "h11",
            "h12", "h13", "h14", "h15", "h16",
        ];
        let clock = ManualClock::new();
        let mut reg = DriverRegistry::new(&clock);
        for name in &NAMES[..MAX_IRQ_HANDLERS] {
            let id = started(&mut reg, name, &BareDriver);
            reg.register_irq(id, 5).unwrap();
        }
        let extra = started(&mut reg, NAMES[MAX_IRQ_HANDLERS], &BareDriver);
        assert_eq!(reg.register_irq(extra, 5), Err(DriverError::HandlerListFull));
        assert_eq!(reg.get(extra).unwrap().primary_irq(), None);
        assert_eq!(reg.irq_handlers(5).len(), MAX_IRQ_HANDLERS);
    }

    #[test]
    fn first_claiming_handler_wins() {
        let clock = ManualClock::new();
        let passive = ScriptedDriver::new();
        let first = ScriptedDriver::claiming();
        let second = ScriptedDriver::claiming();
        let mut reg = DriverRegistry::new(&clock);
        let p = started(&mut reg, "passive", &passive);
        let a = started(&mut reg, "first", &first);
        let b = started(&mut reg, "second", &second);
        for id in [p, a, b] {
            reg.register_irq(id, 9).unwrap();
        }

        assert!(reg.dispatch_irq(9));
        assert_eq!(ScriptedDriver::count(&passive.irqs), 1);
        assert_eq!(ScriptedDriver::count(&first.irqs), 1);
        assert_eq!(ScriptedDriver::count(&second.irqs), 0);
        assert_eq!(reg.get(a).unwrap().stats().irq_count, 1);
        assert_eq!(reg.get(p).unwrap().stats().irq_count, 0);
    }

    #[test]
    fn handlers_not_ready_are_skipped() {
        let clock = ManualClock::new();
        let idle = ScriptedDriver::claiming();
        let live = ScriptedDriver::claiming();
        let mut reg = DriverRegistry::new(&clock);
        let idle_id = reg
            .register(DriverDescriptor::new("idle", DriverType::Input, &idle))
            .unwrap();
        let live_id = started(&mut reg, "live", &live);
        reg.register_irq(idle_id, 12).unwrap();
        reg.register_irq(live_id, 12).unwrap();

        assert!(reg.dispatch_irq(12));
        assert_eq!(ScriptedDriver::count(&idle.irqs), 0);
        assert_eq!(reg.get(live_id).unwrap().stats().irq_count, 1);
    }

    #[test]
    fn unclaimed_interrupt_is_reported() {
        let clock = ManualClock::new();
        let mut reg = DriverRegistry::new(&clock);
        assert!(!reg.dispatch_irq(3));
        let id = started(&mut reg, "bare", &BareDriver);
        reg.register_irq(id, 3).unwrap();
        assert!(!reg.dispatch_irq(3));
        assert_eq!(reg.get(id).unwrap().stats().error_count, 0);
    }

    #[test]
    fn remove_all_preserves_other_handlers() {
        let mut table = IrqTable::new();
        let (a, b, c) = (DriverId(1), DriverId(2), DriverId(3));
        for id in [a, b, c] {
            table.insert(4, id).unwrap();
        }
        table.insert(7, b).unwrap();
        assert_eq!(table.remove_all(b), 2);
        assert_eq!(table.handlers(4), [a, c]);
        assert!(table.handlers(7).is_empty());
    }
}
