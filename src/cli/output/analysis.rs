use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

use crate::{
    daemon::storage::entities::ActivitySample,
    utils::percentage::{duration_percentage, Percentage},
};

/// Samples further apart than this are assumed to have a break between them.
const MAX_SAMPLE_GAP_MINUTES: i64 = 10;

#[derive(Debug, PartialEq, Eq)]
pub struct TopicUsage {
    pub topic: String,
    pub samples: usize,
    /// Approximate time spent, see [analyze_topics].
    pub duration: Duration,
}

impl TopicUsage {
    fn new(topic: String) -> Self {
        Self {
            topic,
            samples: 0,
            duration: Duration::zero(),
        }
    }
}

/// Returns canonical topics with their statistics + the total tracked duration.
///
/// Each sample adds the time since the previous sample of the same topic, as long as that gap
/// is at most ten minutes. Longer gaps count as zero. Topics below `min_percentage` of the
/// total are left out, the rest is sorted by duration, longest first.
pub fn analyze_topics(
    samples: &[ActivitySample],
    min_percentage: Percentage,
) -> (Vec<TopicUsage>, Duration) {
    let max_gap = Duration::minutes(MAX_SAMPLE_GAP_MINUTES);

    let mut ordered = samples.iter().collect::<Vec<_>>();
    ordered.sort_by_key(|v| v.timestamp);

    let mut map = HashMap::<&str, TopicUsage>::new();
    let mut last_seen = HashMap::<&str, DateTime<Utc>>::new();
    let mut total = Duration::zero();

    for sample in ordered {
        let topic = sample.canonical_topic.as_str();
        let usage = map
            .entry(topic)
            .or_insert_with(|| TopicUsage::new(topic.to_string()));
        usage.samples += 1;

        if let Some(previous) = last_seen.insert(topic, sample.timestamp) {
            let gap = sample.timestamp - previous;
            if gap <= max_gap {
                usage.duration += gap;
                total += gap;
            }
        }
    }

    let mut usages = map
        .into_values()
        .filter(|v| total.is_zero() || duration_percentage(v.duration, total) >= min_percentage)
        .collect::<Vec<_>>();
    usages.sort_by(|a, b| {
        b.duration
            .cmp(&a.duration)
            .then(b.samples.cmp(&a.samples))
            .then_with(|| a.topic.cmp(&b.topic))
    });
    (usages, total)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

    use crate::{daemon::storage::entities::ActivitySample, utils::percentage::Percentage};

    use super::analyze_topics;

    const TEST_START_DATE: NaiveDateTime =
        NaiveDateTime::new(NaiveDate::from_ymd_opt(2025, 3, 15).unwrap(), NaiveTime::MIN);

    fn sample(minute: i64, topic: &str) -> ActivitySample {
        ActivitySample {
            timestamp: Utc.from_utc_datetime(&TEST_START_DATE) + Duration::minutes(minute),
            app_name: String::new(),
            screenshot_ref: format!("screenshot_{minute}.png"),
            description: String::new(),
            raw_topic: topic.into(),
            canonical_topic: topic.into(),
            summary: String::new(),
        }
    }

    #[test]
    fn gaps_within_ten_minutes_count() {
        let samples = vec![
            sample(0, "Email"),
            sample(2, "Coding"),
            sample(4, "Email"),
            sample(6, "Coding"),
            sample(8, "Coding"),
            // Lunch break, the gap is too long to count.
            sample(60, "Email"),
        ];

        let (usages, total) = analyze_topics(&samples, Percentage::ZERO);

        assert_eq!(total, Duration::minutes(10));
        assert_eq!(usages.len(), 2);
        assert_eq!(usages[0].topic, "Coding");
        assert_eq!(usages[0].samples, 3);
        assert_eq!(usages[0].duration, Duration::minutes(6));
        assert_eq!(usages[1].topic, "Email");
        assert_eq!(usages[1].samples, 3);
        assert_eq!(usages[1].duration, Duration::minutes(4));
    }

    #[test]
    fn unordered_input_is_sorted_first() {
        let samples = vec![sample(4, "Email"), sample(0, "Email"), sample(2, "Email")];
        let (usages, total) = analyze_topics(&samples, Percentage::ZERO);
        assert_eq!(total, Duration::minutes(4));
        assert_eq!(usages[0].duration, Duration::minutes(4));
    }

    #[test]
    fn small_topics_are_hidden() {
        let mut samples = (0..20).map(|v| sample(v * 2, "Coding")).collect::<Vec<_>>();
        samples.push(sample(41, "Music"));
        samples.push(sample(42, "Music"));

        let (usages, _) = analyze_topics(&samples, Percentage::new_opt(5.).unwrap());

        assert_eq!(usages.len(), 1);
        assert_eq!(usages[0].topic, "Coding");
    }

    #[test]
    fn single_samples_are_still_listed() {
        let (usages, total) = analyze_topics(&[sample(0, "Email")], Percentage::new_opt(1.).unwrap());
        assert!(total.is_zero());
        assert_eq!(usages.len(), 1);
        assert_eq!(usages[0].samples, 1);
    }
}
