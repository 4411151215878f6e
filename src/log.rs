//! Leveled file logging for cairn.
//!
//! Records go to `~/.cairn/cairn.log` once [`init_with_debug`] has run;
//! before that every macro is a no-op. Levels, most severe first:
//! ERROR for aborted commands, WARN for retried claims and stripped edges,
//! INFO for store mutations, DEBUG for load/save and remap traces, TRACE
//! for per-node traversal.
//!
//! `--debug` or `CAIRN_DEBUG=1` lowers the threshold to DEBUG.

use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        };
        f.write_str(label)
    }
}

/// Destination and threshold, fixed for the life of the process.
#[derive(Debug)]
struct LogSink {
    path: PathBuf,
    threshold: LogLevel,
}

impl LogSink {
    fn accepts(&self, level: LogLevel) -> bool {
        level <= self.threshold
    }

    fn append(&self, level: LogLevel, args: fmt::Arguments<'_>) {
        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(&self.path) {
            let timestamp = chrono::Local::now().format("%H:%M:%S%.3f");
            let _ = writeln!(file, "[{}] [{}] {}", timestamp, level, args);
        }
    }
}

static SINK: OnceLock<LogSink> = OnceLock::new();

fn debug_from_env() -> bool {
    std::env::var("CAIRN_DEBUG")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Open the log under the home directory. Later calls are ignored.
pub fn init_with_debug(debug: bool) {
    let threshold = if debug || debug_from_env() {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    let Some(dir) = dirs::home_dir().map(|h| h.join(".cairn")) else {
        return;
    };
    let _ = std::fs::create_dir_all(&dir);
    let _ = SINK.set(LogSink {
        path: dir.join("cairn.log"),
        threshold,
    });
}

/// Backing function for the `clog*` macros.
#[doc(hidden)]
pub fn write(level: LogLevel, args: fmt::Arguments<'_>) {
    if let Some(sink) = SINK.get().filter(|s| s.accepts(level)) {
        sink.append(level, args);
    }
}

#[macro_export]
macro_rules! clog {
    ($($arg:tt)*) => {
        $crate::log::write($crate::log::LogLevel::Info, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! clog_error {
    ($($arg:tt)*) => {
        $crate::log::write($crate::log::LogLevel::Error, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! clog_warn {
    ($($arg:tt)*) => {
        $crate::log::write($crate::log::LogLevel::Warn, format_args!($($arg)*))
    };
}

/// Only written in debug mode.
#[macro_export]
macro_rules! clog_debug {
    ($($arg:tt)*) => {
        $crate::log::write($crate::log::LogLevel::Debug, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! clog_trace {
    ($($arg:tt)*) => {
        $crate::log::write($crate::log::LogLevel::Trace, format_args!($($arg)*))
    };
}
