use chrono::{DateTime, Duration, NaiveTime, TimeZone};


/// Returns start of the next day.
pub fn next_day_start<Tz: TimeZone>(date: DateTime<Tz>) -> DateTime<Tz> {
    let next = date.clone() + Duration::days(1);
    next.with_time(NaiveTime::MIN).earliest().unwrap_or(next)
}

/// Formats a duration the way reports print it, e.g. `1h5m3s`, `12m0s`, `40s`.
pub fn format_duration(v: Duration) -> String {
    if v.num_hours() > 0 {
        format!(
            "{}h{}m{}s",
            v.num_hours(),
            v.num_minutes() % 60,
            v.num_seconds() % 60
        )
    } else if v.num_minutes() > 0 {
        format!("{}m{}s", v.num_minutes() % 60, v.num_seconds() % 60)
    } else {
        format!("{}s", v.num_seconds() % 60)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate, TimeZone, Utc};

    use super::{format_duration, next_day_start};

    #[test]
    fn next_day_starts_at_midnight() {
        let date = Utc.from_utc_datetime(
            &NaiveDate::from_ymd_opt(2025, 3, 15)
                .unwrap()
                .and_hms_opt(17, 30, 0)
                .unwrap(),
        );
        let next = next_day_start(date);
        assert_eq!(
            next.naive_utc(),
            NaiveDate::from_ymd_opt(2025, 3, 16)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
        );
    }

    #[test]
    fn durations_are_compact() {
        assert_eq!(format_duration(Duration::seconds(40)), "40s");
        assert_eq!(format_duration(Duration::seconds(12 * 60)), "12m0s");
        assert_eq!(format_duration(Duration::seconds(3600 + 5 * 60 + 3)), "1h5m3s");
    }
}
