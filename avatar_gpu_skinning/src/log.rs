//! Logging for the skinning library
//!
//! - Pluggable sink via the `Logger` trait (see `Runtime::set_logger`)
//! - Severity levels with a global minimum filter
//! - Colored console output by default
//! - File and line information on ERROR entries

use colored::*;
use std::time::SystemTime;
use chrono::{DateTime, Local};

/// Logger trait for custom sinks
///
/// # Example
///
/// ```no_run
/// use avatar_gpu_skinning::skinning::log::{Logger, LogEntry};
///
/// struct FrameProfilerLogger;
///
/// impl Logger for FrameProfilerLogger {
///     fn log(&self, entry: &LogEntry) {
///         // Forward to the host application's console...
///     }
/// }
/// ```
pub trait Logger: Send + Sync {
    /// Log an entry
    fn log(&self, entry: &LogEntry);
}

/// One log record
#[derive(Debug, Clone)]
pub struct LogEntry {
    /// Severity level
    pub severity: LogSeverity,

    /// Timestamp when the entry was created
    pub timestamp: SystemTime,

    /// Source component (e.g., "skinning::JointRingPool")
    pub source: String,

    /// Log message
    pub message: String,

    /// Source file (only for ERROR entries)
    pub file: Option<&'static str>,

    /// Source line (only for ERROR entries)
    pub line: Option<u32>,
}

/// Log severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogSeverity {
    /// Per-frame detail (session open/close, uploads)
    Trace,

    /// Growth and bookkeeping events
    Debug,

    /// Creation, destruction, texture rebinds
    Info,

    /// Exhaustion and rejected inputs
    Warn,

    /// Failed uploads and invalid descriptors (with file:line)
    Error,
}

impl LogSeverity {
    /// Fixed-width label used by `DefaultLogger`
    pub fn label(&self) -> &'static str {
        match self {
            LogSeverity::Trace => "TRACE",
            LogSeverity::Debug => "DEBUG",
            LogSeverity::Info => "INFO ",
            LogSeverity::Warn => "WARN ",
            LogSeverity::Error => "ERROR",
        }
    }
}

/// Default logger: colored console output
///
/// Format:
/// - Normal: `[timestamp] [SEVERITY] [source] message`
/// - Error: `[timestamp] [ERROR] [source] message (file:line)`
pub struct DefaultLogger;

impl DefaultLogger {
    /// Format an entry without colors (used by tests and plain sinks)
    pub fn format_plain(entry: &LogEntry) -> String {
        let datetime: DateTime<Local> = entry.timestamp.into();
        let timestamp = datetime.format("%Y-%m-%d %H:%M:%S%.3f");
        match (entry.file, entry.line) {
            (Some(file), Some(line)) => format!(
                "[{}] [{}] [{}] {} ({}:{})",
                timestamp, entry.severity.label(), entry.source, entry.message, file, line
            ),
            _ => format!(
                "[{}] [{}] [{}] {}",
                timestamp, entry.severity.label(), entry.source, entry.message
            ),
        }
    }
}

impl Logger for DefaultLogger {
    fn log(&self, entry: &LogEntry) {
        let datetime: DateTime<Local> = entry.timestamp.into();
        let timestamp = datetime.format("%Y-%m-%d %H:%M:%S%.3f").to_string();

        let label = entry.severity.label();
        let severity_str = match entry.severity {
            LogSeverity::Trace => label.bright_black(),
            LogSeverity::Debug => label.cyan(),
            LogSeverity::Info => label.green(),
            LogSeverity::Warn => label.yellow(),
            LogSeverity::Error => label.red().bold(),
        };

        let source = entry.source.bright_blue();

        if let (Some(file), Some(line)) = (entry.file, entry.line) {
            println!(
                "[{}] [{}] [{}] {} ({}:{})",
                timestamp, severity_str, source, entry.message, file, line
            );
        } else {
            println!("[{}] [{}] [{}] {}", timestamp, severity_str, source, entry.message);
        }
    }
}

// ===== LOGGING MACROS =====

/// Log a TRACE message
#[macro_export]
macro_rules! skinning_trace {
    ($source:expr, $($arg:tt)*) => {
        $crate::skinning::Runtime::log(
            $crate::skinning::log::LogSeverity::Trace,
            $source,
            format!($($arg)*)
        )
    };
}

/// Log a DEBUG message
#[macro_export]
macro_rules! skinning_debug {
    ($source:expr, $($arg:tt)*) => {
        $crate::skinning::Runtime::log(
            $crate::skinning::log::LogSeverity::Debug,
            $source,
            format!($($arg)*)
        )
    };
}

/// Log an INFO message
///
/// # Example
///
/// ```ignore
/// skinning_info!("skinning::JointRingPool", "Created {} frame regions", count);
/// ```
#[macro_export]
macro_rules! skinning_info {
    ($source:expr, $($arg:tt)*) => {
        $crate::skinning::Runtime::log(
            $crate::skinning::log::LogSeverity::Info,
            $source,
            format!($($arg)*)
        )
    };
}

/// Log a WARN message
#[macro_export]
macro_rules! skinning_warn {
    ($source:expr, $($arg:tt)*) => {
        $crate::skinning::Runtime::log(
            $crate::skinning::log::LogSeverity::Warn,
            $source,
            format!($($arg)*)
        )
    };
}

/// Log an ERROR message with file:line information
#[macro_export]
macro_rules! skinning_error {
    ($source:expr, $($arg:tt)*) => {
        $crate::skinning::Runtime::log_detailed(
            $crate::skinning::log::LogSeverity::Error,
            $source,
            format!($($arg)*),
            file!(),
            line!()
        )
    };
}

#[cfg(test)]
#[path = "log_tests.rs"]
mod tests;
