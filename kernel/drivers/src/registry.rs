//! Driver registry and lifecycle state machine.
//!
//! The registry owns every driver descriptor from registration until
//! unregistration, keeps them in registration order, and drives each one
//! through probe, init and shutdown. It also contains faults: every error a
//! driver reports is counted, and a non-critical driver that reaches
//! [`ERROR_THRESHOLD`] is stopped and moved to
//! [`DriverState::Disabled`] for good.

use core::fmt;

use ojjy_core::time::ClockSource;
use ojjy_core::{kdebug, kerr, kinfo, kwarn};
use ojjy_driver_api::{
    DriverDescriptor, DriverError, DriverFlags, DriverInfo, DriverOps, DriverState, DriverType,
    PollFlags,
};
use planck_noalloc::vec::ArrayVec;

use crate::irq::IrqTable;

/// Maximum number of registered drivers.
pub const MAX_DRIVERS: usize = 32;

/// Error count at which a non-critical driver is disabled.
pub const ERROR_THRESHOLD: u32 = 10;

/// Handle to a registered driver. Never reused within one registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DriverId(pub(crate) u32);

impl DriverId {
    /// The raw identifier.
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for DriverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Runtime statistics for one driver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverStats {
    /// Interrupts this driver claimed.
    pub irq_count: u64,
    /// Bytes returned by `read`.
    pub read_bytes: u64,
    /// Bytes accepted by `write`.
    pub write_bytes: u64,
    /// Errors reported since registration or the last `clear_errors`.
    pub error_count: u32,
    /// Tick of the most recent error, 0 if none.
    pub last_error_tick: u64,
}

/// A registered driver and its bookkeeping.
pub struct DriverEntry<'a> {
    id: DriverId,
    desc: DriverDescriptor<'a>,
    state: DriverState,
    primary_irq: Option<u8>,
    irq_lines: u32,
    stats: DriverStats,
}

impl<'a> DriverEntry<'a> {
    /// Registry handle.
    pub fn id(&self) -> DriverId {
        self.id
    }

    /// Unique name.
    pub fn name(&self) -> &'static str {
        self.desc.info.name
    }

    /// Static metadata.
    pub fn info(&self) -> &DriverInfo {
        &self.desc.info
    }

    /// Registration flags.
    pub fn flags(&self) -> DriverFlags {
        self.desc.flags
    }

    /// Current lifecycle state.
    pub fn state(&self) -> DriverState {
        self.state
    }

    /// First IRQ line this driver registered on.
    pub fn primary_irq(&self) -> Option<u8> {
        self.primary_irq
    }

    /// Number of IRQ lines this driver is registered on.
    pub fn irq_lines(&self) -> u32 {
        self.irq_lines
    }

    /// Runtime statistics.
    pub fn stats(&self) -> &DriverStats {
        &self.stats
    }

    /// Whether the driver is flagged critical.
    pub fn is_critical(&self) -> bool {
        self.desc.is_critical()
    }

    pub(crate) fn ops(&self) -> &'a dyn DriverOps {
        self.desc.ops
    }

    pub(crate) fn note_irq_registered(&mut self, line: u8) {
        self.irq_lines += 1;
        if self.primary_irq.is_none() {
            self.primary_irq = Some(line);
        }
    }

    pub(crate) fn note_irq_unregistered(&mut self, line: u8) {
        self.irq_lines = self.irq_lines.saturating_sub(1);
        if self.primary_irq == Some(line) {
            self.primary_irq = None;
        }
    }

    pub(crate) fn note_irq_claimed(&mut self) {
        self.stats.irq_count += 1;
    }

    /// Writes a multi-line statistics report.
    pub fn write_stats(&self, out: &mut impl fmt::Write) -> fmt::Result {
        writeln!(
            out,
            "{} ({}, {}) v{}",
            self.name(),
            self.desc.info.driver_type,
            self.state,
            self.desc.info.version
        )?;
        if !self.desc.info.description.is_empty() {
            writeln!(out, "  {}", self.desc.info.description)?;
        }
        match self.primary_irq {
            Some(irq) => writeln!(out, "  irq:           {irq} ({} lines)", self.irq_lines)?,
            None => writeln!(out, "  irq:           none")?,
        }
        writeln!(out, "  irqs handled:  {}", self.stats.irq_count)?;
        writeln!(out, "  bytes read:    {}", self.stats.read_bytes)?;
        writeln!(out, "  bytes written: {}", self.stats.write_bytes)?;
        if self.stats.error_count == 0 {
            writeln!(out, "  errors:        0")
        } else {
            writeln!(
                out,
                "  errors:        {} (last at tick {})",
                self.stats.error_count, self.stats.last_error_tick
            )
        }
    }
}

/// Outcome of [`DriverRegistry::probe_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProbeSummary {
    /// Drivers that reached `Ready`.
    pub started: usize,
    /// Drivers whose probe found no hardware.
    pub declined: usize,
    /// Drivers whose init failed.
    pub failed: usize,
}

/// Bounded, registration-ordered driver list plus the IRQ table.
pub struct DriverRegistry<'a> {
    drivers: ArrayVec<DriverEntry<'a>, MAX_DRIVERS>,
    pub(crate) irq: IrqTable,
    next_id: u32,
    clock: &'a dyn ClockSource,
}

impl<'a> DriverRegistry<'a> {
    /// Creates an empty registry. `clock` timestamps error reports.
    pub fn new(clock: &'a dyn ClockSource) -> Self {
        Self {
            drivers: ArrayVec::new(),
            irq: IrqTable::new(),
            next_id: 1,
            clock,
        }
    }

    /// Adds a driver in state [`DriverState::Registered`] with zeroed
    /// statistics and no IRQ.
    ///
    /// # Errors
    ///
    /// [`DriverError::InvalidName`] for an empty name,
    /// [`DriverError::RegistryFull`] once [`MAX_DRIVERS`] are registered and
    /// [`DriverError::AlreadyRegistered`] for a duplicate name.
    pub fn register(&mut self, desc: DriverDescriptor<'a>) -> Result<DriverId, DriverError> {
        let name = desc.info.name;
        if name.is_empty() {
            return Err(DriverError::InvalidName);
        }
        if self.drivers.is_full() {
            kerr!("DRIVER: registry full, cannot register {}", name);
            return Err(DriverError::RegistryFull);
        }
        if self.find_by_name(name).is_some() {
            kwarn!("DRIVER: {} already registered", name);
            return Err(DriverError::AlreadyRegistered);
        }

        let id = DriverId(self.next_id);
        self.drivers
            .try_push(DriverEntry {
                id,
                desc,
                state: DriverState::Registered,
                primary_irq: None,
                irq_lines: 0,
                stats: DriverStats::default(),
            })
            .map_err(|_| DriverError::RegistryFull)?;
        self.next_id += 1;
        kinfo!(
            "DRIVER: registered {} ({}, v{})",
            name,
            desc.info.driver_type,
            desc.info.version
        );
        Ok(id)
    }

    /// Stops the driver, drops all of its IRQ registrations and removes it.
    ///
    /// # Errors
    ///
    /// [`DriverError::NotFound`], or [`DriverError::Critical`] for a critical
    /// driver, which can never be unloaded.
    pub fn unregister(&mut self, id: DriverId) -> Result<(), DriverError> {
        let index = self.index_of(id).ok_or(DriverError::NotFound)?;
        let entry = &self.drivers[index];
        if entry.is_critical() {
            kwarn!("DRIVER: refusing to unregister critical driver {}", entry.name());
            return Err(DriverError::Critical);
        }
        if matches!(entry.state, DriverState::Ready | DriverState::Error) {
            self.stop(id)?;
        }
        let released = self.irq.remove_all(id);
        let entry = self.drivers.remove(index);
        kinfo!(
            "DRIVER: unregistered {} ({} IRQ registrations released)",
            entry.name(),
            released
        );
        Ok(())
    }

    /// Probes and initializes one driver.
    ///
    /// A driver that is already `Ready` succeeds immediately. A driver in
    /// `Error` is retried. A probe that finds no hardware returns the driver
    /// to `Registered`. A failed init leaves it in `Error` and counts as a
    /// reported error.
    ///
    /// # Errors
    ///
    /// [`DriverError::Disabled`] for a disabled driver,
    /// [`DriverError::InvalidState`] while suspended,
    /// [`DriverError::DeviceNotFound`] when probe declines, or the init error.
    pub fn start(&mut self, id: DriverId) -> Result<(), DriverError> {
        let entry = self.entry_mut(id)?;
        match entry.state {
            DriverState::Ready => return Ok(()),
            DriverState::Disabled => return Err(DriverError::Disabled),
            DriverState::Registered | DriverState::Error => {}
            _ => return Err(DriverError::InvalidState),
        }
        let ops = entry.ops();
        let name = entry.name();

        entry.state = DriverState::Probing;
        match ops.probe() {
            Ok(true) | Err(DriverError::Unsupported) => {}
            Ok(false) => {
                entry.state = DriverState::Registered;
                kdebug!("DRIVER: {}: no device found", name);
                return Err(DriverError::DeviceNotFound);
            }
            Err(e) => {
                entry.state = DriverState::Registered;
                kwarn!("DRIVER: {}: probe failed: {}", name, e);
                return Err(e);
            }
        }

        entry.state = DriverState::Initializing;
        match ops.init() {
            Ok(()) | Err(DriverError::Unsupported) => {
                entry.state = DriverState::Ready;
                kinfo!("DRIVER: {} ready", name);
                Ok(())
            }
            Err(e) => {
                entry.state = DriverState::Error;
                kerr!("DRIVER: {}: init failed: {}", name, e);
                self.report_error(id, "init failed")?;
                Err(e)
            }
        }
    }

    /// Starts every `Registered` driver, in registration order.
    pub fn probe_all(&mut self) -> ProbeSummary {
        let mut summary = ProbeSummary::default();
        for index in 0..self.drivers.len() {
            let entry = &self.drivers[index];
            if entry.state != DriverState::Registered {
                continue;
            }
            let id = entry.id;
            match self.start(id) {
                Ok(()) => summary.started += 1,
                Err(DriverError::DeviceNotFound) => summary.declined += 1,
                Err(_) => summary.failed += 1,
            }
        }
        kinfo!(
            "DRIVER: probe complete: {} ready, {} absent, {} failed",
            summary.started,
            summary.declined,
            summary.failed
        );
        summary
    }

    /// Shuts a `Ready` or `Error` driver down and returns it to `Registered`.
    ///
    /// # Errors
    ///
    /// [`DriverError::InvalidState`] from any other state.
    pub fn stop(&mut self, id: DriverId) -> Result<(), DriverError> {
        let entry = self.entry_mut(id)?;
        if !matches!(entry.state, DriverState::Ready | DriverState::Error) {
            return Err(DriverError::InvalidState);
        }
        shutdown(entry);
        entry.state = DriverState::Registered;
        kdebug!("DRIVER: {} stopped", entry.name());
        Ok(())
    }

    /// Moves a `Ready` driver to `Suspended` through its `suspend` capability.
    ///
    /// # Errors
    ///
    /// [`DriverError::InvalidState`] unless `Ready`; the capability's error
    /// (including `Unsupported`) otherwise.
    pub fn suspend(&mut self, id: DriverId) -> Result<(), DriverError> {
        let entry = self.entry_mut(id)?;
        if entry.state != DriverState::Ready {
            return Err(DriverError::InvalidState);
        }
        entry.ops().suspend()?;
        entry.state = DriverState::Suspended;
        Ok(())
    }

    /// Moves a `Suspended` driver back to `Ready` through its `resume`
    /// capability.
    ///
    /// # Errors
    ///
    /// [`DriverError::InvalidState`] unless `Suspended`; the capability's
    /// error otherwise.
    pub fn resume(&mut self, id: DriverId) -> Result<(), DriverError> {
        let entry = self.entry_mut(id)?;
        if entry.state != DriverState::Suspended {
            return Err(DriverError::InvalidState);
        }
        entry.ops().resume()?;
        entry.state = DriverState::Ready;
        Ok(())
    }

    /// Records a driver fault and returns the resulting state.
    ///
    /// A non-critical driver whose error count reaches [`ERROR_THRESHOLD`] is
    /// shut down and disabled. Critical drivers keep counting but stay up.
    ///
    /// # Errors
    ///
    /// [`DriverError::NotFound`].
    pub fn report_error(&mut self, id: DriverId, message: &str) -> Result<DriverState, DriverError> {
        let tick = self.clock.ticks();
        let entry = self.entry_mut(id)?;
        entry.stats.error_count = entry.stats.error_count.saturating_add(1);
        entry.stats.last_error_tick = tick;
        kwarn!(
            "DRIVER: {}: {} (error {}/{})",
            entry.name(),
            message,
            entry.stats.error_count,
            ERROR_THRESHOLD
        );

        if !entry.is_critical()
            && entry.stats.error_count >= ERROR_THRESHOLD
            && entry.state != DriverState::Disabled
        {
            if matches!(
                entry.state,
                DriverState::Ready | DriverState::Error | DriverState::Suspended
            ) {
                shutdown(entry);
            }
            entry.state = DriverState::Disabled;
            kerr!("DRIVER: {} disabled after {} errors", entry.name(), entry.stats.error_count);
        }
        Ok(entry.state)
    }

    /// Resets the error counter. A disabled driver stays disabled.
    ///
    /// # Errors
    ///
    /// [`DriverError::NotFound`].
    pub fn clear_errors(&mut self, id: DriverId) -> Result<(), DriverError> {
        let entry = self.entry_mut(id)?;
        entry.stats.error_count = 0;
        entry.stats.last_error_tick = 0;
        Ok(())
    }

    /// `Ready` and below the error threshold. Unknown drivers are unhealthy.
    pub fn is_healthy(&self, id: DriverId) -> bool {
        self.get(id).is_some_and(|e| {
            e.state == DriverState::Ready && e.stats.error_count < ERROR_THRESHOLD
        })
    }

    /// Reads from a `Ready` driver and accounts the bytes.
    ///
    /// # Errors
    ///
    /// [`DriverError::InvalidState`] unless `Ready` ([`DriverError::Disabled`]
    /// when disabled), or the capability's error. Failures other than
    /// `Unsupported` are also reported through [`report_error`](Self::report_error).
    pub fn read(&mut self, id: DriverId, buf: &mut [u8], offset: u64) -> Result<usize, DriverError> {
        let ops = self.ready_ops(id)?;
        let n = self.account(id, "read failed", ops.read(buf, offset))?;
        self.entry_mut(id)?.stats.read_bytes += n as u64;
        Ok(n)
    }

    /// Writes to a `Ready` driver and accounts the bytes.
    ///
    /// # Errors
    ///
    /// As for [`read`](Self::read).
    pub fn write(&mut self, id: DriverId, buf: &[u8], offset: u64) -> Result<usize, DriverError> {
        let ops = self.ready_ops(id)?;
        let n = self.account(id, "write failed", ops.write(buf, offset))?;
        self.entry_mut(id)?.stats.write_bytes += n as u64;
        Ok(n)
    }

    /// Sends a control request to a `Ready` driver.
    ///
    /// # Errors
    ///
    /// As for [`read`](Self::read).
    pub fn ioctl(&mut self, id: DriverId, cmd: u32, arg: usize) -> Result<usize, DriverError> {
        let ops = self.ready_ops(id)?;
        self.account(id, "ioctl failed", ops.ioctl(cmd, arg))
    }

    /// Queries readiness of a `Ready` driver.
    ///
    /// # Errors
    ///
    /// As for [`read`](Self::read).
    pub fn poll(&mut self, id: DriverId) -> Result<PollFlags, DriverError> {
        let ops = self.ready_ops(id)?;
        self.account(id, "poll failed", ops.poll())
    }

    fn ready_ops(&self, id: DriverId) -> Result<&'a dyn DriverOps, DriverError> {
        let entry = self.get(id).ok_or(DriverError::NotFound)?;
        match entry.state {
            DriverState::Ready => Ok(entry.ops()),
            DriverState::Disabled => Err(DriverError::Disabled),
            _ => Err(DriverError::InvalidState),
        }
    }

    fn account<T>(
        &mut self,
        id: DriverId,
        what: &str,
        result: Result<T, DriverError>,
    ) -> Result<T, DriverError> {
        match result {
            Err(e) if e != DriverError::Unsupported => {
                self.report_error(id, what)?;
                Err(e)
            }
            other => other,
        }
    }

    /// Looks up a driver by handle.
    pub fn get(&self, id: DriverId) -> Option<&DriverEntry<'a>> {
        self.drivers.iter().find(|e| e.id == id)
    }

    /// Looks up a driver by name.
    pub fn find_by_name(&self, name: &str) -> Option<DriverId> {
        self.drivers.iter().find(|e| e.name() == name).map(|e| e.id)
    }

    /// First registered driver of `driver_type`, in any state.
    pub fn find_by_type(&self, driver_type: DriverType) -> Option<DriverId> {
        self.drivers
            .iter()
            .find(|e| e.desc.info.driver_type == driver_type)
            .map(|e| e.id)
    }

    /// First `Ready` driver of `driver_type`.
    pub fn find_ready_by_type(&self, driver_type: DriverType) -> Option<DriverId> {
        self.drivers
            .iter()
            .find(|e| e.desc.info.driver_type == driver_type && e.state == DriverState::Ready)
            .map(|e| e.id)
    }

    /// State of a driver. Unknown handles read as `Unloaded`.
    pub fn state(&self, id: DriverId) -> DriverState {
        self.get(id).map_or(DriverState::Unloaded, DriverEntry::state)
    }

    /// Registered drivers in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &DriverEntry<'a>> {
        self.drivers.iter()
    }

    /// Number of registered drivers.
    pub fn count(&self) -> usize {
        self.drivers.len()
    }

    /// Writes a one-line-per-driver table.
    pub fn write_summary(&self, out: &mut impl fmt::Write) -> fmt::Result {
        writeln!(out, "{} drivers registered", self.drivers.len())?;
        writeln!(
            out,
            "  {:<16} {:<8} {:<10} {:>4} {:>6}  VERSION",
            "NAME", "TYPE", "STATE", "IRQ", "ERRORS"
        )?;
        for e in self.drivers.iter() {
            writeln!(
                out,
                "  {:<16} {:<8} {:<10} {:>4} {:>6}  {}",
                e.name(),
                e.desc.info.driver_type.name(),
                e.state.name(),
                IrqCell(e.primary_irq),
                e.stats.error_count,
                e.desc.info.version
            )?;
        }
        Ok(())
    }

    /// Writes the statistics report of one driver.
    pub fn write_stats(&self, id: DriverId, out: &mut impl fmt::Write) -> fmt::Result {
        match self.get(id) {
            Some(entry) => entry.write_stats(out),
            None => writeln!(out, "driver {id} not registered"),
        }
    }

    pub(crate) fn index_of(&self, id: DriverId) -> Option<usize> {
        self.drivers.iter().position(|e| e.id == id)
    }

    pub(crate) fn entry_at_mut(&mut self, index: usize) -> &mut DriverEntry<'a> {
        &mut self.drivers[index]
    }

    pub(crate) fn entry_at(&self, index: usize) -> &DriverEntry<'a> {
        &self.drivers[index]
    }

    fn entry_mut(&mut self, id: DriverId) -> Result<&mut DriverEntry<'a>, DriverError> {
        self.drivers
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(DriverError::NotFound)
    }
}

fn shutdown(entry: &DriverEntry<'_>) {
    match entry.ops().shutdown() {
        Ok(()) | Err(DriverError::Unsupported) => {}
        Err(e) => kwarn!("DRIVER: {}: shutdown failed: {}", entry.name(), e),
    }
}

/// Right-aligned IRQ column, `-` when the driver has none.
struct IrqCell(Option<u8>);

impl fmt::Display for IrqCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(line) => fmt::Display::fmt(&line, f),
            None => f.pad("-"),
        }
    }
}
