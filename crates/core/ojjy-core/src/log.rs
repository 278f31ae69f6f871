//! Kernel logging front end.
//!
//! Subsystems log through [`kprint!`]/[`kprintln!`] (raw) and [`klog!`] with
//! its per-level shorthands (`kerr!`, `kwarn!`, `kinfo!`, ...). The macros
//! forward to two hooks that the kernel installs once its console exists.
//! Until then every message is dropped.

use core::fmt;
use core::sync::atomic::{AtomicPtr, Ordering};

/// Message severity. Lower values are more severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    /// The system cannot continue.
    Fatal = 0,
    /// An operation failed.
    Error = 1,
    /// Something unexpected that did not fail.
    Warn = 2,
    /// Boot progress and state changes.
    Info = 3,
    /// Diagnostic detail.
    Debug = 4,
    /// Per-operation tracing.
    Trace = 5,
}

impl LogLevel {
    /// Five-column label used as the message prefix.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Fatal => "FATAL",
            Self::Error => "ERROR",
            Self::Warn => "WARN ",
            Self::Info => "INFO ",
            Self::Debug => "DEBUG",
            Self::Trace => "TRACE",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name().trim_end())
    }
}

/// Raw output hook, used by [`kprint!`].
pub type PrintFn = fn(fmt::Arguments<'_>);

/// Leveled output hook, used by [`klog!`].
pub type LogFn = fn(LogLevel, fmt::Arguments<'_>);

fn discard_print(_: fmt::Arguments<'_>) {}

fn discard_log(_: LogLevel, _: fmt::Arguments<'_>) {}

static PRINT_HOOK: AtomicPtr<()> = AtomicPtr::new(discard_print as *mut ());
static LOG_HOOK: AtomicPtr<()> = AtomicPtr::new(discard_log as *mut ());

/// Installs the raw output hook.
///
/// # Safety
///
/// `f` must be callable from any context, interrupt handlers included.
pub unsafe fn set_print_fn(f: PrintFn) {
    PRINT_HOOK.store(f as *mut (), Ordering::Release);
}

/// Installs the leveled output hook.
///
/// # Safety
///
/// `f` must be callable from any context, interrupt handlers included.
pub unsafe fn set_log_fn(f: LogFn) {
    LOG_HOOK.store(f as *mut (), Ordering::Release);
}

#[doc(hidden)]
pub fn _print(args: fmt::Arguments<'_>) {
    let raw = PRINT_HOOK.load(Ordering::Acquire);
    // SAFETY: PRINT_HOOK only ever holds `PrintFn` pointers.
    let f: PrintFn = unsafe { core::mem::transmute::<*mut (), PrintFn>(raw) };
    f(args);
}

#[doc(hidden)]
pub fn _log(level: LogLevel, args: fmt::Arguments<'_>) {
    let raw = LOG_HOOK.load(Ordering::Acquire);
    // SAFETY: LOG_HOOK only ever holds `LogFn` pointers.
    let f: LogFn = unsafe { core::mem::transmute::<*mut (), LogFn>(raw) };
    f(level, args);
}

/// Writes formatted text to the console with no level attached.
#[macro_export]
macro_rules! kprint {
    ($($arg:tt)*) => { $crate::log::_print(format_args!($($arg)*)) };
}

/// Like [`kprint!`], followed by a newline.
#[macro_export]
macro_rules! kprintln {
    () => { $crate::kprint!("\n") };
    ($($arg:tt)*) => { $crate::kprint!("{}\n", format_args!($($arg)*)) };
}

/// Logs a message at an explicit [`LogLevel`](crate::log::LogLevel).
#[macro_export]
macro_rules! klog {
    ($level:expr, $($arg:tt)*) => {
        $crate::log::_log($level, format_args!($($arg)*))
    };
}

/// Logs at [`LogLevel::Fatal`](crate::log::LogLevel::Fatal).
#[macro_export]
macro_rules! kfatal {
    ($($arg:tt)*) => { $crate::klog!($crate::log::LogLevel::Fatal, $($arg)*) };
}

/// Logs at [`LogLevel::Error`](crate::log::LogLevel::Error).
#[macro_export]
macro_rules! kerr {
    ($($arg:tt)*) => { $crate::klog!($crate::log::LogLevel::Error, $($arg)*) };
}

/// Logs at [`LogLevel::Warn`](crate::log::LogLevel::Warn).
#[macro_export]
macro_rules! kwarn {
    ($($arg:tt)*) => { $crate::klog!($crate::log::LogLevel::Warn, $($arg)*) };
}

/// Logs at [`LogLevel::Info`](crate::log::LogLevel::Info).
#[macro_export]
macro_rules! kinfo {
    ($($arg:tt)*) => { $crate::klog!($crate::log::LogLevel::Info, $($arg)*) };
}

/// Logs at [`LogLevel::Debug`](crate::log::LogLevel::Debug).
#[macro_export]
macro_rules! kdebug {
    ($($arg:tt)*) => { $crate::klog!($crate::log::LogLevel::Debug, $($arg)*) };
}

/// Logs at [`LogLevel::Trace`](crate::log::LogLevel::Trace).
#[macro_export]
macro_rules! ktrace {
    ($($arg:tt)*) => { $crate::klog!($crate::log::LogLevel::Trace, $($arg)*) };
}
