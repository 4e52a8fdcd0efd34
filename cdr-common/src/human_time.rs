//! Human-readable run duration formatting
//!
//! Run durations are displayed compactly in status pages and run metrics:
//! - Under a minute: `45s`
//! - Under an hour: `3m 4s`
//! - An hour or more: `1h 2m` (seconds dropped)

/// Format a whole number of seconds as a compact duration.
///
/// Zero or negative durations render as `0s`.
///
/// # Examples
///
/// ```
/// use cdr_common::human_time::format_duration;
///
/// assert_eq!(format_duration(0), "0s");
/// assert_eq!(format_duration(45), "45s");
/// assert_eq!(format_duration(184), "3m 4s");
/// assert_eq!(format_duration(3720), "1h 2m");
/// ```
pub fn format_duration(total_seconds: i64) -> String {
    if total_seconds <= 0 {
        return "0s".to_string();
    }

    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    let mut parts = Vec::with_capacity(3);
    if hours > 0 {
        parts.push(format!("{}h", hours));
    }
    if minutes > 0 {
        parts.push(format!("{}m", minutes));
    }
    if hours == 0 && (seconds > 0 || parts.is_empty()) {
        parts.push(format!("{}s", seconds));
    }

    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_and_negative() {
        assert_eq!(format_duration(0), "0s");
        assert_eq!(format_duration(-12), "0s");
    }

    #[test]
    fn test_seconds_only() {
        assert_eq!(format_duration(1), "1s");
        assert_eq!(format_duration(59), "59s");
    }

    #[test]
    fn test_minutes_and_seconds() {
        assert_eq!(format_duration(60), "1m");
        assert_eq!(format_duration(61), "1m 1s");
        assert_eq!(format_duration(3599), "59m 59s");
    }

    #[test]
    fn test_hours_drop_seconds() {
        assert_eq!(format_duration(3600), "1h");
        assert_eq!(format_duration(3661), "1h 1m");
        assert_eq!(format_duration(7325), "2h 2m");
    }
}
