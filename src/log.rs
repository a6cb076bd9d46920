//! File logging for the orchestration core.
//!
//! Log levels:
//! - ERROR: A request failed (cycle, strict-mode task failure)
//! - WARN: Recoverable trouble (task timeout, retry, pool rejection)
//! - INFO: Request lifecycle (routed, phases started, done)
//! - DEBUG: Pool admission and release, per-task outcomes
//! - TRACE: Router scores and raw graph edges
//!
//! Every macro takes an optional scope before the message, written
//! `@scope;`. The scope is anything `Display`, usually a short request id or
//! a department, and is rendered as its own bracketed column:
//!
//! ```ignore
//! alog!(@request_id.short(); "Phase {} started", 1);
//! // [12:00:00.000] [INFO] [1a2b3c4d] Phase 1 started
//! ```
//!
//! Nothing is written until [`init_with_debug`] is called, so library users
//! and tests never touch the filesystem. Debug mode can be enabled with the
//! `--debug` flag or `ATELIER_DEBUG=1`.

use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::OnceLock;

use crate::config::Config;

static LOG_PATH: OnceLock<PathBuf> = OnceLock::new();
static MAX_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => LogLevel::Error,
            1 => LogLevel::Warn,
            2 => LogLevel::Info,
            3 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }
}

/// Start logging to `atelier.log` next to the config file, truncating the
/// previous run.
pub fn init_with_debug(debug: bool) {
    let env_debug = std::env::var("ATELIER_DEBUG")
        .map(|v| debug_flag(&v))
        .unwrap_or(false);
    let level = if debug || env_debug {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    MAX_LEVEL.store(level as u8, Ordering::SeqCst);

    if let Ok(dir) = Config::atelier_dir() {
        let _ = std::fs::create_dir_all(&dir);
        let path = dir.join("atelier.log");
        let _ = std::fs::write(&path, "");
        LOG_PATH.set(path).ok();
    }
}

fn debug_flag(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

/// Append one line at `level`. Called through the `alog*` macros.
#[doc(hidden)]
pub fn write(level: LogLevel, scope: Option<&dyn fmt::Display>, args: fmt::Arguments<'_>) {
    if level > LogLevel::from_u8(MAX_LEVEL.load(Ordering::Relaxed)) {
        return;
    }
    let Some(path) = LOG_PATH.get() else {
        return;
    };
    let timestamp = chrono::Local::now().format("%H:%M:%S%.3f");
    let line = format_line(&timestamp, level, scope, args);
    if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
        let _ = file.write_all(line.as_bytes());
    }
}

fn format_line(
    timestamp: &dyn fmt::Display,
    level: LogLevel,
    scope: Option<&dyn fmt::Display>,
    args: fmt::Arguments<'_>,
) -> String {
    match scope {
        Some(scope) => format!("[{}] [{}] [{}] {}\n", timestamp, level.as_str(), scope, args),
        None => format!("[{}] [{}] {}\n", timestamp, level.as_str(), args),
    }
}

#[doc(hidden)]
#[macro_export]
macro_rules! __alog_at {
    ($level:expr, @$scope:expr; $($arg:tt)*) => {
        $crate::log::write(
            $level,
            Some(&$scope as &dyn ::std::fmt::Display),
            ::std::format_args!($($arg)*),
        )
    };
    ($level:expr, $($arg:tt)*) => {
        $crate::log::write($level, None, ::std::format_args!($($arg)*))
    };
}

/// Log at INFO.
#[macro_export]
macro_rules! alog {
    ($($arg:tt)*) => {
        $crate::__alog_at!($crate::log::LogLevel::Info, $($arg)*)
    };
}

#[macro_export]
macro_rules! alog_error {
    ($($arg:tt)*) => {
        $crate::__alog_at!($crate::log::LogLevel::Error, $($arg)*)
    };
}

#[macro_export]
macro_rules! alog_warn {
    ($($arg:tt)*) => {
        $crate::__alog_at!($crate::log::LogLevel::Warn, $($arg)*)
    };
}

/// Log at DEBUG (written only in debug mode).
#[macro_export]
macro_rules! alog_debug {
    ($($arg:tt)*) => {
        $crate::__alog_at!($crate::log::LogLevel::Debug, $($arg)*)
    };
}

#[macro_export]
macro_rules! alog_trace {
    ($($arg:tt)*) => {
        $crate::__alog_at!($crate::log::LogLevel::Trace, $($arg)*)
    };
}
