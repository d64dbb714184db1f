//! Keeps topic labels consistent over time. A raw topic proposed by the analyzer is mapped onto a
//! topic that is already in the log when both describe the same activity, otherwise it becomes a
//! new canonical topic.
//!
//! Two paths decide this:
//!  - An exact match on [registry::normalize_key] against every known topic. It never calls a
//!    model.
//!  - A [TopicClassifier] that picks either one of the offered candidates or the raw topic. Its
//!    answer is only trusted when it is one of those strings verbatim.
//!
//! Whenever the classifier can't produce a trusted answer the raw topic is used as is, so a
//! normalized topic is never empty.

pub mod classifier;
pub mod registry;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::model::ModelError;

use registry::TopicRegistry;

/// Label used when the analyzer proposed nothing usable.
pub const UNKNOWN_TOPIC: &str = "Unknown";

#[derive(Debug, Error)]
pub enum NormalizationError {
    #[error("Classifier model call failed: {0}")]
    Model(#[from] ModelError),
    #[error("Classifier did not answer within {0:?}")]
    Timeout(Duration),
    #[error("Classifier answered {answer:?}, which is neither a known topic nor the proposed one")]
    OutOfVocabulary { answer: String },
}

/// Decides whether `candidate` means the same as one of `pool`. Returns the chosen string.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TopicClassifier: Send + Sync {
    async fn classify(&self, candidate: &str, pool: &[String]) -> Result<String, NormalizationError>;
}

pub struct TopicNormalizer {
    classifier: Box<dyn TopicClassifier>,
    candidate_limit: usize,
    timeout: Duration,
}

impl TopicNormalizer {
    pub fn new(classifier: Box<dyn TopicClassifier>, candidate_limit: usize, timeout: Duration) -> Self {
        Self {
            classifier,
            candidate_limit: candidate_limit.max(1),
            timeout,
        }
    }

    /// Returns the canonical topic for `raw_topic`. Never fails and never returns an empty string.
    #[instrument(skip(self, known), fields(known = known.len()))]
    pub async fn normalize(&self, raw_topic: &str, known: &TopicRegistry) -> String {
        let raw_topic = raw_topic.trim();
        if raw_topic.is_empty() {
            return UNKNOWN_TOPIC.into();
        }

        if let Some(existing) = known.find_exact(raw_topic) {
            debug!("Exact match {raw_topic:?} -> {existing:?}");
            return existing.to_string();
        }

        if known.is_empty() {
            return raw_topic.to_string();
        }

        match self.classify(raw_topic, known).await {
            Ok(canonical) => {
                debug!("Classified {raw_topic:?} -> {canonical:?}");
                canonical
            }
            Err(e) => {
                warn!("Topic normalization failed, keeping {raw_topic:?}: {e}");
                raw_topic.to_string()
            }
        }
    }

    async fn classify(
        &self,
        raw_topic: &str,
        known: &TopicRegistry,
    ) -> Result<String, NormalizationError> {
        let candidates = known.candidates(self.candidate_limit);
        let answer = tokio::time::timeout(
            self.timeout,
            self.classifier.classify(raw_topic, &candidates),
        )
        .await
        .map_err(|_| NormalizationError::Timeout(self.timeout))??;

        let answer = answer.trim();
        if answer == raw_topic {
            return Ok(raw_topic.to_string());
        }
        candidates
            .into_iter()
            .find(|v| v == answer)
            .ok_or_else(|| NormalizationError::OutOfVocabulary {
                answer: answer.to_string(),
            })
    }
}
