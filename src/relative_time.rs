use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static RE_RELATIVE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)(-?\d+)\s+([a-z]+)\s+ago").unwrap());

/// Resolve "<n> <unit> ago" against `reference`.
///
/// Units match by stem containment in the order day, hour, minute, second,
/// so "days", "Hours" and "minute" all resolve. Anything else (including
/// "weeks" or "months") is `None` and the caller picks its own fallback.
pub fn resolve_at(text: &str, reference: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let caps = RE_RELATIVE.captures(text)?;
    let amount: i64 = caps[1].parse().ok()?;
    let unit = caps[2].to_lowercase();

    let offset = if unit.contains("day") {
        Duration::try_days(amount)
    } else if unit.contains("hour") {
        Duration::try_hours(amount)
    } else if unit.contains("minute") {
        Duration::try_minutes(amount)
    } else if unit.contains("second") {
        Duration::try_seconds(amount)
    } else {
        None
    };

    reference.checked_sub_signed(offset?)
}
