pub mod clock;

pub use clock::{Clock, FixedClock, SystemClock};

use chrono::format::{Item, StrftimeItems};
use chrono::{NaiveDate, NaiveDateTime};
use std::fmt::{self, Write};
use std::path::PathBuf;
use which::which;

pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";

/// Returns true if `format` is a usable strftime pattern for a local date
/// without offset. Offset and zone specifiers (`%z`, `%Z`, ...) are rejected
/// since there is no offset to print.
pub fn is_valid_date_format(format: &str) -> bool {
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return false;
    }
    let sample = NaiveDate::from_ymd_opt(2000, 1, 1).and_then(|d| d.and_hms_opt(0, 0, 0));
    sample.is_some_and(|at| format_date(&at, format).is_ok())
}

/// Formats `at` with `format`. Fails when the pattern needs data a naive
/// date does not carry.
pub fn format_date(at: &NaiveDateTime, format: &str) -> Result<String, fmt::Error> {
    let mut out = String::new();
    write!(out, "{}", at.format(format))?;
    Ok(out)
}

/// Resolves `{prefix}{name}` to the executable that will be spawned.
///
/// With an empty prefix the name is looked up in `PATH`. If it cannot be found
/// the bare name is returned and the spawn error surfaces in the job result.
pub fn resolve_executable(prefix: &str, name: &str) -> PathBuf {
    if !prefix.is_empty() {
        return PathBuf::from(format!("{}{}", prefix, name));
    }
    match which(name) {
        Ok(path) => path,
        Err(_) => {
            tracing::warn!(executable = name, "Executable not found in PATH");
            PathBuf::from(name)
        }
    }
}
