use std::collections::HashMap;

use crate::daemon::storage::entities::ActivitySample;

/// Key used for the cheap exact-match check: trimmed, inner whitespace collapsed, lowercased.
pub fn normalize_key(topic: &str) -> String {
    topic
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[derive(Debug, Clone)]
struct TopicEntry {
    canonical: String,
    occurrences: usize,
}

/// Canonical topics seen in the activity log, with how often each was used. It is never stored
/// on its own: it is rebuilt from the log and extended as rows are appended.
#[derive(Debug, Clone, Default)]
pub struct TopicRegistry {
    entries: Vec<TopicEntry>,
    by_key: HashMap<String, usize>,
}

impl TopicRegistry {
    pub fn from_samples<'a>(samples: impl IntoIterator<Item = &'a ActivitySample>) -> Self {
        let mut registry = Self::default();
        for sample in samples {
            registry.record(&sample.canonical_topic);
        }
        registry
    }

    /// Counts one more use of `canonical`. Spellings that share a key count towards the first one
    /// seen.
    pub fn record(&mut self, canonical: &str) {
        let key = normalize_key(canonical);
        if key.is_empty() {
            return;
        }
        match self.by_key.get(&key) {
            Some(&index) => self.entries[index].occurrences += 1,
            None => {
                self.by_key.insert(key, self.entries.len());
                self.entries.push(TopicEntry {
                    canonical: canonical.trim().to_string(),
                    occurrences: 1,
                });
            }
        }
    }

    /// Existing canonical topic whose key equals the key of `topic`.
    pub fn find_exact(&self, topic: &str) -> Option<&str> {
        self.by_key
            .get(&normalize_key(topic))
            .map(|&index| self.entries[index].canonical.as_str())
    }

    /// At most `limit` topics to offer a classifier, most used first. Equal counts keep the order
    /// in which topics first appeared.
    pub fn candidates(&self, limit: usize) -> Vec<String> {
        let mut entries = self.entries.iter().collect::<Vec<_>>();
        entries.sort_by(|a, b| b.occurrences.cmp(&a.occurrences));
        entries
            .into_iter()
            .take(limit)
            .map(|v| v.canonical.clone())
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn topics(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|v| v.canonical.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
