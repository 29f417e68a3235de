//! Silence durations and their human-readable form.

use std::time::Duration;

use chrono::{DateTime, Datelike, Utc};

const SECOND: u64 = 1;
const MINUTE: u64 = 60 * SECOND;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;
const WEEK: u64 = 7 * DAY;
const MONTH: u64 = 30 * DAY;
const YEAR: u64 = 12 * MONTH;
const LONG_TIME: u64 = 37 * YEAR;

enum Label {
    Fixed(&'static str),
    Count(&'static str),
}

/// (upper bound exclusive, label, divisor)
const MAGNITUDES: &[(u64, Label, u64)] = &[
    (SECOND, Label::Fixed("now"), 1),
    (2 * SECOND, Label::Fixed("1 second"), 1),
    (MINUTE, Label::Count("seconds"), SECOND),
    (2 * MINUTE, Label::Fixed("1 minute"), 1),
    (HOUR, Label::Count("minutes"), MINUTE),
    (2 * HOUR, Label::Fixed("1 hour"), 1),
    (DAY, Label::Count("hours"), HOUR),
    (2 * DAY, Label::Fixed("1 day"), 1),
    (WEEK, Label::Count("days"), DAY),
    (2 * WEEK, Label::Fixed("1 week"), 1),
    (MONTH, Label::Count("weeks"), WEEK),
    (2 * MONTH, Label::Fixed("1 month"), 1),
    (YEAR, Label::Count("months"), MONTH),
    (18 * MONTH, Label::Fixed("1 year"), 1),
    (2 * YEAR, Label::Fixed("2 years"), 1),
    (LONG_TIME, Label::Count("years"), YEAR),
];

/// Renders a duration the way people say it: "1 day", "3 days", "1 month".
///
/// Values are rounded down to the largest fitting unit; a month is 30 days
/// and a year 12 months.
#[must_use]
pub fn humanize_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    MAGNITUDES
        .iter()
        .find(|(below, _, _)| secs < *below)
        .map_or_else(
            || "a long while".to_string(),
            |(_, label, divisor)| match label {
                Label::Fixed(text) => (*text).to_string(),
                Label::Count(unit) => format!("{} {unit}", secs / divisor),
            },
        )
}

/// Days from `now` until the next Monday, 1 to 7. On a Monday it is 7.
#[must_use]
pub fn days_until_next_monday(now: DateTime<Utc>) -> u32 {
    let from_monday = now.weekday().num_days_from_monday();
    match (7 - from_monday) % 7 {
        0 => 7,
        days => days,
    }
}

/// Converts whole days into a duration.
#[must_use]
pub const fn days_to_duration(days: u32) -> Duration {
    Duration::from_secs(days as u64 * DAY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use test_case::test_case;

    #[test_case(0, "now")]
    #[test_case(1, "1 second")]
    #[test_case(45, "45 seconds")]
    #[test_case(90, "1 minute")]
    #[test_case(5 * MINUTE, "5 minutes")]
    #[test_case(HOUR + 59 * MINUTE, "1 hour")]
    #[test_case(23 * HOUR, "23 hours")]
    #[test_case(DAY, "1 day")]
    #[test_case(3 * DAY, "3 days")]
    #[test_case(WEEK, "1 week")]
    #[test_case(3 * WEEK, "3 weeks")]
    #[test_case(31 * DAY, "1 month")]
    #[test_case(4 * MONTH, "4 months")]
    #[test_case(YEAR, "1 year")]
    #[test_case(20 * MONTH, "2 years")]
    #[test_case(5 * YEAR, "5 years")]
    #[test_case(40 * YEAR, "a long while")]
    fn humanize(secs: u64, expected: &str) {
        assert_eq!(humanize_duration(Duration::from_secs(secs)), expected);
    }

    // 2024-03-04 was a Monday.
    #[test_case(4, 7 ; "monday")]
    #[test_case(5, 6 ; "tuesday")]
    #[test_case(7, 4 ; "thursday")]
    #[test_case(9, 2 ; "saturday")]
    #[test_case(10, 1 ; "sunday")]
    fn next_monday(day: u32, expected: u32) {
        let now = Utc.with_ymd_and_hms(2024, 3, day, 15, 30, 0).unwrap();
        assert_eq!(days_until_next_monday(now), expected);
    }

    #[test]
    fn days_to_duration_in_hours() {
        assert_eq!(days_to_duration(1), Duration::from_secs(24 * 3600));
        assert_eq!(days_to_duration(31).as_secs() / 3600, 744);
    }
}
