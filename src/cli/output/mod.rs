pub mod analysis;

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::daemon::{normalization::registry::normalize_key, storage::entities::ActivitySample};

/// Samples with `start <= timestamp < end`, in log order.
pub fn filter_between(
    samples: Vec<ActivitySample>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Vec<ActivitySample> {
    samples
        .into_iter()
        .filter(|v| v.timestamp >= start && v.timestamp < end)
        .collect()
}

/// Samples whose canonical topic is one of `topics`, ignoring case and spacing. An empty list
/// keeps everything.
pub fn filter_topics(samples: Vec<ActivitySample>, topics: &[String]) -> Vec<ActivitySample> {
    if topics.is_empty() {
        return samples;
    }
    let keys = topics.iter().map(|v| normalize_key(v)).collect::<HashSet<_>>();
    samples
        .into_iter()
        .filter(|v| keys.contains(&normalize_key(&v.canonical_topic)))
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

    use crate::daemon::storage::entities::ActivitySample;

    use super::{filter_between, filter_topics};

    const TEST_START_DATE: NaiveDateTime =
        NaiveDateTime::new(NaiveDate::from_ymd_opt(2025, 3, 15).unwrap(), NaiveTime::MIN);

    fn sample(minute: i64) -> ActivitySample {
        topic_sample(minute, "Email")
    }

    fn topic_sample(minute: i64, topic: &str) -> ActivitySample {
        ActivitySample {
            timestamp: Utc.from_utc_datetime(&TEST_START_DATE) + Duration::minutes(minute),
            app_name: String::new(),
            screenshot_ref: String::new(),
            description: String::new(),
            raw_topic: topic.into(),
            canonical_topic: topic.into(),
            summary: String::new(),
        }
    }

    #[test]
    fn range_is_half_open() {
        let start = Utc.from_utc_datetime(&TEST_START_DATE);
        let filtered = filter_between(
            vec![sample(-1), sample(0), sample(5), sample(10)],
            start,
            start + Duration::minutes(10),
        );
        assert_eq!(filtered, vec![sample(0), sample(5)]);
    }

    #[test]
    fn topics_match_ignoring_case_and_spacing() {
        let samples = vec![
            topic_sample(0, "Email"),
            topic_sample(1, "Online  Shopping"),
            topic_sample(2, "Coding"),
        ];

        let filtered = filter_topics(
            samples.clone(),
            &["email".to_string(), " online shopping ".to_string()],
        );
        assert_eq!(filtered, vec![samples[0].clone(), samples[1].clone()]);

        assert_eq!(filter_topics(samples.clone(), &[]), samples);
        assert!(filter_topics(samples, &["Music".to_string()]).is_empty());
    }
}
