//! Driver identity and lifecycle metadata.

use core::fmt;

use crate::ops::DriverOps;

/// The category of hardware a driver manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverType {
    /// Not classified.
    Unknown,
    /// Keyboard, mouse and other input devices.
    Input,
    /// Timers and clock sources.
    Timer,
    /// Sector-addressable storage.
    Block,
    /// Byte-stream devices.
    Char,
    /// Display output.
    Display,
    /// Network interfaces.
    Network,
    /// Bus controllers.
    Bus,
}

impl DriverType {
    /// Display name used in registry listings.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::Input => "Input",
            Self::Timer => "Timer",
            Self::Block => "Block",
            Self::Char => "Char",
            Self::Display => "Display",
            Self::Network => "Network",
            Self::Bus => "Bus",
        }
    }
}

impl fmt::Display for DriverType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Lifecycle state of a registered driver, tracked by the registry.
///
/// ```text
/// UNLOADED -> REGISTERED -> PROBING -> INITIALIZING -> READY
///                 ^            |                         |
///                 +------------+ (probe declined)        |
///                 +--------------- stop -----------------+ (also from ERROR)
/// REGISTERED | READY | ERROR -> DISABLED (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    /// Not in the registry.
    Unloaded,
    /// Registered, hardware not yet claimed.
    Registered,
    /// Probe in progress.
    Probing,
    /// Init in progress.
    Initializing,
    /// Operational.
    Ready,
    /// Suspended by request; resumes to `Ready`.
    Suspended,
    /// Init failed.
    Error,
    /// Quarantined after sustained errors. No way back.
    Disabled,
}

impl DriverState {
    /// Display name used in registry listings.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Unloaded => "UNLOADED",
            Self::Registered => "REGISTERED",
            Self::Probing => "PROBING",
            Self::Initializing => "INIT",
            Self::Ready => "READY",
            Self::Suspended => "SUSPENDED",
            Self::Error => "ERROR",
            Self::Disabled => "DISABLED",
        }
    }
}

impl fmt::Display for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

bitflags::bitflags! {
    /// Registration flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DriverFlags: u32 {
        /// The kernel cannot run without this driver: it is never unloaded
        /// and never auto-disabled.
        const CRITICAL = 1 << 0;
        /// The device may appear or disappear at runtime.
        const HOTPLUG = 1 << 1;
        /// The device performs DMA.
        const DMA = 1 << 2;
        /// The device cannot share its interrupt line.
        const EXCLUSIVE = 1 << 3;
    }
}

/// A `major.minor.patch` version packed as `major << 16 | minor << 8 | patch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DriverVersion(u32);

impl DriverVersion {
    /// Packs a version triple.
    pub const fn new(major: u8, minor: u8, patch: u8) -> Self {
        Self(((major as u32) << 16) | ((minor as u32) << 8) | patch as u32)
    }

    /// Wraps an already packed value.
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// The packed value.
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Major component.
    #[allow(clippy::cast_possible_truncation)]
    pub const fn major(self) -> u8 {
        (self.0 >> 16) as u8
    }

    /// Minor component.
    #[allow(clippy::cast_possible_truncation)]
    pub const fn minor(self) -> u8 {
        (self.0 >> 8) as u8
    }

    /// Patch component.
    #[allow(clippy::cast_possible_truncation)]
    pub const fn patch(self) -> u8 {
        self.0 as u8
    }
}

impl fmt::Display for DriverVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major(), self.minor(), self.patch())
    }
}

/// Static metadata describing a driver.
#[derive(Debug, Clone, Copy)]
pub struct DriverInfo {
    /// Unique registry key, e.g. `"ata0"`.
    pub name: &'static str,
    /// Hardware category.
    pub driver_type: DriverType,
    /// Human-readable description.
    pub description: &'static str,
    /// Driver version.
    pub version: DriverVersion,
}

/// Everything the registry needs to manage one driver.
///
/// The capability implementation is borrowed; the registry owns the
/// descriptor and its runtime bookkeeping.
#[derive(Clone, Copy)]
pub struct DriverDescriptor<'a> {
    /// Identity and metadata.
    pub info: DriverInfo,
    /// Registration flags.
    pub flags: DriverFlags,
    /// Capability implementation.
    pub ops: &'a dyn DriverOps,
}

impl<'a> DriverDescriptor<'a> {
    /// Creates a descriptor with version `1.0.0`, no flags and no description.
    pub const fn new(name: &'static str, driver_type: DriverType, ops: &'a dyn DriverOps) -> Self {
        Self {
            info: DriverInfo {
                name,
                driver_type,
                description: "",
                version: DriverVersion::new(1, 0, 0),
            },
            flags: DriverFlags::empty(),
            ops,
        }
    }

    /// Sets the registration flags.
    #[must_use]
    pub const fn with_flags(mut self, flags: DriverFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Sets the description.
    #[must_use]
    pub const fn with_description(mut self, description: &'static str) -> Self {
        self.info.description = description;
        self
    }

    /// Sets the version.
    #[must_use]
    pub const fn with_version(mut self, version: DriverVersion) -> Self {
        self.info.version = version;
        self
    }

    /// Whether [`DriverFlags::CRITICAL`] is set.
    pub const fn is_critical(&self) -> bool {
        self.flags.contains(DriverFlags::CRITICAL)
    }
}

impl fmt::Debug for DriverDescriptor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverDescriptor")
            .field("info", &self.info)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}
