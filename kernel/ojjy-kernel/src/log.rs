//! Kernel logger.
//!
//! The `k*!` macros in `ojjy-core` discard everything until [`init_logger`]
//! points them at the global [`Logger`]. From then on every message is fanned
//! out to the registered [`LogSink`]s. Leveled messages are written as
//! `[LEVEL] message` to each sink whose [`max_level`](LogSink::max_level)
//! admits them, after the [`MAX_LOG_LEVEL`](crate::config::MAX_LOG_LEVEL)
//! filter.
//!
//! Writers never wait for the sink list. A message emitted while the list is
//! held, for example by an interrupt handler that fires in the middle of
//! another message, is dropped and counted in [`Logger::dropped`].

use core::fmt::{self, Write as _};
use core::sync::atomic::{AtomicUsize, Ordering};

use ojjy_core::log::{LogLevel, set_log_fn, set_print_fn};
use ojjy_core::sync::SpinLock;
use planck_noalloc::vec::ArrayVec;

use crate::config::MAX_LOG_LEVEL;

/// Maximum number of sinks.
pub const MAX_SINKS: usize = 4;

/// An output device for kernel messages.
///
/// Methods take `&self`; a sink that needs mutable state keeps its own lock.
pub trait LogSink: Send + Sync {
    /// Writes a fragment of a message.
    fn write_str(&self, s: &str);
    /// Most verbose level this sink accepts.
    fn max_level(&self) -> LogLevel;
    /// Name used in diagnostics.
    fn name(&self) -> &str;
}

/// Fan-out logger over a fixed set of sinks.
pub struct Logger<'s> {
    sinks: SpinLock<ArrayVec<&'s dyn LogSink, MAX_SINKS>>,
    dropped: AtomicUsize,
}

impl<'s> Logger<'s> {
    /// A logger with no sinks.
    pub const fn new() -> Self {
        Self {
            sinks: SpinLock::new(ArrayVec::new()),
            dropped: AtomicUsize::new(0),
        }
    }

    /// Registers `sink`. Returns `false` once [`MAX_SINKS`] are registered.
    pub fn add_sink(&self, sink: &'s dyn LogSink) -> bool {
        self.sinks.lock().try_push(sink).is_ok()
    }

    /// Number of registered sinks.
    pub fn sink_count(&self) -> usize {
        self.sinks.lock().len()
    }

    /// Messages discarded because the sink list was busy.
    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    fn busy(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Writes `args` to every sink with no level and no filtering.
    pub fn print(&self, args: fmt::Arguments<'_>) {
        let Some(sinks) = self.sinks.try_lock() else {
            self.busy();
            return;
        };
        for sink in sinks.iter() {
            let _ = SinkWriter(*sink).write_fmt(args);
        }
    }

    /// Writes a level-tagged line to every sink that admits `level`.
    pub fn log(&self, level: LogLevel, args: fmt::Arguments<'_>) {
        if level > MAX_LOG_LEVEL {
            return;
        }
        let Some(sinks) = self.sinks.try_lock() else {
            self.busy();
            return;
        };
        for sink in sinks.iter() {
            if level <= sink.max_level() {
                let _ = writeln!(SinkWriter(*sink), "[{level}] {args}");
            }
        }
    }
}

impl Default for Logger<'_> {
    fn default() -> Self {
        Self::new()
    }
}

struct SinkWriter<'a>(&'a dyn LogSink);

impl fmt::Write for SinkWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0.write_str(s);
        Ok(())
    }
}

/// The global logger.
pub static LOGGER: Logger<'static> = Logger::new();

fn logger_print(args: fmt::Arguments<'_>) {
    LOGGER.print(args);
}

fn logger_log(level: LogLevel, args: fmt::Arguments<'_>) {
    LOGGER.log(level, args);
}

/// Routes the `k*!` macros to [`LOGGER`]. Calling it again is harmless.
pub fn init_logger() {
    // SAFETY: both functions only try the logger's spin lock and never block.
    unsafe {
        set_print_fn(logger_print);
        set_log_fn(logger_log);
    }
}

/// Registers a sink with [`LOGGER`]. Returns `false` when the list is full.
pub fn add_sink(sink: &'static dyn LogSink) -> bool {
    LOGGER.add_sink(sink)
}

#[cfg(test)]
mod tests {
    use std::string::String;
    use std::sync::Mutex;

    use super::*;

    struct Capture {
        level: LogLevel,
        text: Mutex<String>,
    }

    impl Capture {
        fn new(level: LogLevel) -> Self {
            Self {
                level,
                text: Mutex::new(String::new()),
            }
        }

        fn text(&self) -> String {
            self.text.lock().unwrap().clone()
        }
    }

    impl LogSink for Capture {
        fn write_str(&self, s: &str) {
            self.text.lock().unwrap().push_str(s);
        }

        fn max_level(&self) -> LogLevel {
            self.level
        }

        fn name(&self) -> &str {
            "capture"
        }
    }

    #[test]
    fn leveled_lines_are_tagged() {
        let sink = Capture::new(LogLevel::Trace);
        let logger = Logger::new();
        assert!(logger.add_sink(&sink));
        logger.log(LogLevel::Warn, format_args!("disk {} slow", 0));
        logger.log(LogLevel::Info, format_args!("up"));
        assert_eq!(sink.text(), "[WARN] disk 0 slow\n[INFO] up\n");
    }

    #[test]
    fn sinks_filter_by_their_own_level() {
        let quiet = Capture::new(LogLevel::Error);
        let chatty = Capture::new(LogLevel::Info);
        let logger = Logger::new();
        logger.add_sink(&quiet);
        logger.add_sink(&chatty);
        logger.log(LogLevel::Info, format_args!("hello"));
        logger.log(LogLevel::Error, format_args!("bad"));
        assert_eq!(quiet.text(), "[ERROR] bad\n");
        assert_eq!(chatty.text(), "[INFO] hello\n[ERROR] bad\n");
    }

    #[test]
    fn global_ceiling_applies_to_every_sink() {
        let sink = Capture::new(LogLevel::Trace);
        let logger = Logger::new();
        logger.add_sink(&sink);
        logger.log(LogLevel::Trace, format_args!("noise"));
        assert!(sink.text().is_empty());
    }

    #[test]
    fn raw_print_ignores_levels() {
        let sink = Capture::new(LogLevel::Fatal);
        let logger = Logger::new();
        logger.add_sink(&sink);
        logger.print(format_args!("a{}", 'b'));
        assert_eq!(sink.text(), "ab");
    }

    static NESTED: Logger<'static> = Logger::new();

    /// Logs again from inside its own write, like an interrupt handler that
    /// fires mid-message.
    struct Reentrant {
        inner: Capture,
    }

    impl LogSink for Reentrant {
        fn write_str(&self, s: &str) {
            self.inner.write_str(s);
            if s == "\n" {
                NESTED.log(LogLevel::Error, format_args!("from handler"));
                NESTED.print(format_args!("raw from handler"));
            }
        }

        fn max_level(&self) -> LogLevel {
            LogLevel::Trace
        }

        fn name(&self) -> &str {
            "reentrant"
        }
    }

    static REENTRANT: Reentrant = Reentrant {
        inner: Capture {
            level: LogLevel::Trace,
            text: Mutex::new(String::new()),
        },
    };

    #[test]
    fn nested_messages_are_dropped_not_waited_on() {
        assert!(NESTED.add_sink(&REENTRANT));
        NESTED.log(LogLevel::Info, format_args!("outer"));
        assert_eq!(REENTRANT.inner.text(), "[INFO] outer\n");
        assert_eq!(NESTED.dropped(), 2);

        // The list is free again afterwards.
        NESTED.print(format_args!("next"));
        assert_eq!(REENTRANT.inner.text(), "[INFO] outer\nnext");
        assert_eq!(NESTED.dropped(), 2);
    }

    #[test]
    fn sink_list_is_bounded() {
        let sink = Capture::new(LogLevel::Info);
        let logger = Logger::new();
        for _ in 0..MAX_SINKS {
            assert!(logger.add_sink(&sink));
        }
        assert!(!logger.add_sink(&sink));
        assert_eq!(logger.sink_count(), MAX_SINKS);
    }
}
