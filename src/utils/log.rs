//! Colored stderr logging with a runtime level threshold.
//!
//! The threshold starts from `SYNCLEDGER_LOG` (`debug`, `info`, `warn`,
//! `error` or `off`; `info` when unset or unrecognized) and can be changed
//! with [`set_level`]. All macros are silent in test builds.

use std::fmt::Display;
use std::io::Write;
use std::sync::Once;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Environment variable holding the initial threshold.
pub const LOG_ENV: &str = "SYNCLEDGER_LOG";

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug = 0,
    Info = 1,
    Warn = 2,
    Error = 3,
}

impl Level {
    /// Parses a threshold name. `Some(None)` means logging is off.
    pub fn parse_threshold(name: &str) -> Option<Option<Level>> {
        match name.trim().to_ascii_lowercase().as_str() {
            "debug" => Some(Some(Level::Debug)),
            "info" => Some(Some(Level::Info)),
            "warn" | "warning" => Some(Some(Level::Warn)),
            "error" => Some(Some(Level::Error)),
            "off" | "none" => Some(None),
            _ => None,
        }
    }
}

impl Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Level::Debug => write!(f, "DEBUG"),
            Level::Info => write!(f, "INFO"),
            Level::Warn => write!(f, "WARN"),
            Level::Error => write!(f, "ERROR"),
        }
    }
}

/// Threshold encoding: a `Level` discriminant, or `OFF`.
const OFF: u8 = u8::MAX;

static THRESHOLD: AtomicU8 = AtomicU8::new(Level::Info as u8);
static INIT_FROM_ENV: Once = Once::new();

pub static SHOW_TIMESTAMP: AtomicBool = AtomicBool::new(true);
pub static SHOW_TYPE: AtomicBool = AtomicBool::new(true);

/// Sets the minimum level that is written. `None` silences everything.
pub fn set_level(level: Option<Level>) {
    INIT_FROM_ENV.call_once(|| {});
    store_threshold(level);
}

fn store_threshold(level: Option<Level>) {
    THRESHOLD.store(level.map_or(OFF, |l| l as u8), Ordering::Relaxed);
}

/// True when messages at `level` pass the current threshold.
pub fn enabled(level: Level) -> bool {
    INIT_FROM_ENV.call_once(|| {
        if let Some(threshold) = std::env::var(LOG_ENV)
            .ok()
            .and_then(|v| Level::parse_threshold(&v))
        {
            store_threshold(threshold);
        }
    });
    let threshold = THRESHOLD.load(Ordering::Relaxed);
    threshold != OFF && level as u8 >= threshold
}

/// Converts days since Unix epoch to (year, month, day).
fn civil_from_days(days: u64) -> (u32, u32, u32) {
    // Howard Hinnant's days_from_civil inverse.
    let z = days as i64 + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097) as u32;
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe as i64 + era * 400 + i64::from(month <= 2);
    (year as u32, month, day)
}

/// Internal logging function. Use the `debug!`, `info!`, `warn!` or `error!`
/// macros instead.
#[doc(hidden)]
pub fn log(level: Level, message: &str) {
    if !enabled(level) {
        return;
    }

    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    let secs = now.as_secs();
    let (year, month, day) = civil_from_days(secs / 86_400);

    let mut stderr = StandardStream::stderr(ColorChoice::Auto);
    let mut spec = ColorSpec::new();
    match level {
        Level::Debug => {
            spec.set_fg(Some(Color::Cyan)).set_dimmed(true);
        }
        Level::Info => {}
        Level::Warn => {
            spec.set_fg(Some(Color::Yellow)).set_bold(true);
        }
        Level::Error => {
            spec.set_fg(Some(Color::Red)).set_bold(true);
        }
    }
    let _ = stderr.set_color(&spec);

    if SHOW_TIMESTAMP.load(Ordering::Relaxed) {
        let _ = write!(
            stderr,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}.{:03} ",
            year,
            month,
            day,
            (secs / 3_600) % 24,
            (secs / 60) % 60,
            secs % 60,
            now.subsec_millis()
        );
    }
    if SHOW_TYPE.load(Ordering::Relaxed) {
        let _ = write!(stderr, "[{:5}] ", level);
    }
    let _ = writeln!(stderr, "{}", message);
    let _ = stderr.reset();
}

#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {{
        if cfg!(not(test)) {
            $crate::utils::log::log($crate::utils::log::Level::Debug, &format!($($arg)*))
        }
    }};
}

#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {{
        if cfg!(not(test)) {
            $crate::utils::log::log($crate::utils::log::Level::Info, &format!($($arg)*))
        }
    }};
}

#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {{
        if cfg!(not(test)) {
            $crate::utils::log::log($crate::utils::log::Level::Warn, &format!($($arg)*))
        }
    }};
}

#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {{
        if cfg!(not(test)) {
            $crate::utils::log::log($crate::utils::log::Level::Error, &format!($($arg)*))
        }
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_ordering() {
        assert!(Level::Debug < Level::Info);
        assert!(Level::Info < Level::Warn);
        assert!(Level::Warn < Level::Error);
    }

    #[test]
    fn parses_thresholds() {
        assert_eq!(Level::parse_threshold("DEBUG"), Some(Some(Level::Debug)));
        assert_eq!(Level::parse_threshold(" warn "), Some(Some(Level::Warn)));
        assert_eq!(Level::parse_threshold("off"), Some(None));
        assert_eq!(Level::parse_threshold("loud"), None);
    }

    #[test]
    fn threshold_filters_levels() {
        set_level(Some(Level::Warn));
        assert!(!enabled(Level::Info));
        assert!(enabled(Level::Error));

        set_level(None);
        assert!(!enabled(Level::Error));

        set_level(Some(Level::Info));
        assert!(enabled(Level::Info));
    }

    #[test]
    fn civil_dates() {
        assert_eq!(civil_from_days(0), (1970, 1, 1));
        assert_eq!(civil_from_days(19_723), (2024, 1, 1));
        assert_eq!(civil_from_days(19_782), (2024, 2, 29));
    }
}
