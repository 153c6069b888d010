/// Process-wide runtime state for the skinning library
///
/// Holds the global logger and the minimum severity filter. Pools and
/// combiners are plain owned values; only logging is global, so that the
/// `skinning_*!` macros work from any component without threading a
/// logger through every constructor.

use std::sync::{OnceLock, RwLock};
use std::time::SystemTime;
use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger};

// ===== INTERNAL STATE =====

/// Global logger (initialized with DefaultLogger)
static LOGGER: OnceLock<RwLock<Box<dyn Logger>>> = OnceLock::new();

/// Entries below this severity are dropped before reaching the logger
static MIN_SEVERITY: RwLock<LogSeverity> = RwLock::new(LogSeverity::Info);

fn logger_lock() -> &'static RwLock<Box<dyn Logger>> {
    LOGGER.get_or_init(|| RwLock::new(Box::new(DefaultLogger)))
}

// ===== PUBLIC API =====

/// Global logging entry points
///
/// # Example
///
/// ```no_run
/// use avatar_gpu_skinning::skinning::{Runtime, log::{Logger, LogEntry, LogSeverity}};
///
/// struct HostConsole;
/// impl Logger for HostConsole {
///     fn log(&self, entry: &LogEntry) {
///         // Forward to the host console...
///     }
/// }
///
/// Runtime::set_logger(HostConsole);
/// Runtime::set_min_severity(LogSeverity::Debug);
/// ```
pub struct Runtime;

impl Runtime {
    /// Replace the current logger
    pub fn set_logger<L: Logger + 'static>(logger: L) {
        if let Ok(mut lock) = logger_lock().write() {
            *lock = Box::new(logger);
        }
    }

    /// Restore `DefaultLogger` and the default INFO filter
    pub fn reset_logger() {
        if let Ok(mut lock) = logger_lock().write() {
            *lock = Box::new(DefaultLogger);
        }
        Self::set_min_severity(LogSeverity::Info);
    }

    /// Set the minimum severity forwarded to the logger
    ///
    /// ERROR entries are always forwarded.
    pub fn set_min_severity(severity: LogSeverity) {
        if let Ok(mut lock) = MIN_SEVERITY.write() {
            *lock = severity;
        }
    }

    /// Current minimum severity
    pub fn min_severity() -> LogSeverity {
        MIN_SEVERITY.read().map(|s| *s).unwrap_or(LogSeverity::Info)
    }

    fn enabled(severity: LogSeverity) -> bool {
        severity == LogSeverity::Error || severity >= Self::min_severity()
    }

    /// Log without source location
    ///
    /// Used by `skinning_trace!` .. `skinning_warn!`.
    pub fn log(severity: LogSeverity, source: &str, message: String) {
        if !Self::enabled(severity) {
            return;
        }
        if let Ok(lock) = logger_lock().read() {
            lock.log(&LogEntry {
                severity,
                timestamp: SystemTime::now(),
                source: source.to_string(),
                message,
                file: None,
                line: None,
            });
        }
    }

    /// Log with file:line information
    ///
    /// Used by `skinning_error!`.
    pub fn log_detailed(
        severity: LogSeverity,
        source: &str,
        message: String,
        file: &'static str,
        line: u32,
    ) {
        if !Self::enabled(severity) {
            return;
        }
        if let Ok(lock) = logger_lock().read() {
            lock.log(&LogEntry {
                severity,
                timestamp: SystemTime::now(),
                source: source.to_string(),
                message,
                file: Some(file),
                line: Some(line),
            });
        }
    }
}

#[cfg(test)]
#[path = "runtime_tests.rs"]
mod tests;
