use chrono::TimeDelta;

/// Render a duration as `H:MM:SS`, prefixed with `N day(s), ` past a day.
///
/// Negative durations render as zero.
pub fn format_duration(d: TimeDelta) -> String {
    let total = d.num_seconds().max(0);
    let days = total / 86_400;
    let rest = total % 86_400;
    let hms = format!("{}:{:02}:{:02}", rest / 3600, (rest % 3600) / 60, rest % 60);
    match days {
        0 => hms,
        1 => format!("1 day, {hms}"),
        n => format!("{n} days, {hms}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations() {
        assert_eq!(format_duration(TimeDelta::seconds(5)), "0:00:05");
        assert_eq!(format_duration(TimeDelta::seconds(3725)), "1:02:05");
        assert_eq!(format_duration(TimeDelta::seconds(86_400 + 61)), "1 day, 0:01:01");
        assert_eq!(format_duration(TimeDelta::seconds(3 * 86_400)), "3 days, 0:00:00");
        assert_eq!(format_duration(TimeDelta::seconds(-4)), "0:00:00");
    }
}
