//! A simple logging utility for emitting queue events based on severity
//! levels.

use std::time;

/// Source of the log message.
const SOURCE: &str = "tcp-msgq";

/// Logs a message at the [Level::Error] level.
#[macro_export]
macro_rules! error {
    ($($arg:tt)+) => {{
        $crate::log::log($crate::log::Level::Error, format!($($arg)+));
    }};
}

/// Logs a message at the [Level::Warn] level.
#[macro_export]
macro_rules! warn {
    ($($arg:tt)+) => {{
        $crate::log::log($crate::log::Level::Warn, format!($($arg)+));
    }};
}

/// Logs a message at the [Level::Info] level.
#[macro_export]
macro_rules! info {
    ($($arg:tt)+) => {{
        $crate::log::log($crate::log::Level::Info, format!($($arg)+));
    }};
}

/// Logs a message at the [Level::Debug] level (debug builds only).
#[macro_export]
macro_rules! debug {
    ($($arg:tt)+) => {{
        #[cfg(debug_assertions)]
        $crate::log::log($crate::log::Level::Debug, format!($($arg)+));
    }};
}

/// Severity levels for log messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    /// Designates invariant violations between the queues and the protocol
    /// engine.
    Error,
    /// Designates hazardous situations.
    Warn,
    /// Designates useful information.
    Info,
    /// Designates lower priority information.
    Debug,
}

impl Level {
    fn label(self) -> &'static str {
        match self {
            Level::Error => "\x1b[1;31mERROR\x1b[0m",
            Level::Warn => "\x1b[1;33mWARN \x1b[0m",
            Level::Info => "\x1b[1;32mINFO \x1b[0m",
            Level::Debug => "\x1b[1;34mDEBUG\x1b[0m",
        }
    }
}

/// Logs a message with the specified severity level.
///
/// - [Level::Info] and [Level::Debug] messages are printed to `stdout`.
/// - [Level::Warn] and [Level::Error] messages are printed to `stderr`.
///
/// The log message will include a timestamp, severity level, and the source of
/// the log (`tcp-msgq`).
pub fn log(level: Level, msg: impl std::fmt::Display) {
    let timestamp = timestamp();
    let label = level.label();

    match level {
        Level::Error | Level::Warn => {
            eprintln!("[\x1b[1;37m{timestamp}\x1b[0m] {label} [\x1b[1;37m{SOURCE}\x1b[0m] {msg}");
        }
        Level::Info | Level::Debug => {
            println!("[\x1b[1;37m{timestamp}\x1b[0m] {label} [\x1b[1;37m{SOURCE}\x1b[0m] {msg}");
        }
    }
}

/// Formats the current local time as `YYYY-MM-DD HH:MM:SS`.
#[cfg(unix)]
fn timestamp() -> String {
    let now = time::SystemTime::now()
        .duration_since(time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as libc::time_t;

    // SAFETY: `tm` is plain old data, zeroed is a valid bit pattern.
    let mut tm: libc::tm = unsafe { std::mem::zeroed() };

    // SAFETY: both pointers are valid for the duration of the call and
    // `localtime_r` does not touch shared static storage.
    let res = unsafe { libc::localtime_r(&now, &mut tm) };

    if res.is_null() {
        "UNKNOWN".to_string()
    } else {
        format!(
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            tm.tm_year + 1900,
            tm.tm_mon + 1,
            tm.tm_mday,
            tm.tm_hour,
            tm.tm_min,
            tm.tm_sec
        )
    }
}

/// Seconds since the epoch on targets without `localtime_r`.
#[cfg(not(unix))]
fn timestamp() -> String {
    time::SystemTime::now()
        .duration_since(time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
        .to_string()
}
