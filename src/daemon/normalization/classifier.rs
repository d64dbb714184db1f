use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tracing::instrument;

use crate::model::{LanguageModel, ModelError, ModelRequest, ResponseSchema};

use super::{NormalizationError, TopicClassifier};

const TOPIC_FIELD: &str = "topic";
const MAX_TOKENS: u32 = 60;

const SYSTEM_PROMPT: &str = "You maintain a small vocabulary of activity topics. \
Different wordings of the same activity have to end up as one topic.";

/// [TopicClassifier] that asks a text model to pick the matching topic.
pub struct ModelClassifier {
    model: Arc<dyn LanguageModel>,
    timeout: Duration,
}

impl ModelClassifier {
    pub fn new(model: Arc<dyn LanguageModel>, timeout: Duration) -> Self {
        Self { model, timeout }
    }

    fn request(&self, candidate: &str, pool: &[String]) -> ModelRequest {
        let known = pool
            .iter()
            .map(|v| format!("- {v}"))
            .collect::<Vec<_>>()
            .join("\n");
        let instructions = format!(
            "Known topics:\n{known}\n\n\
             New topic: {candidate}\n\n\
             If the new topic describes the same activity as one of the known topics, answer with \
             that known topic exactly as written. Otherwise answer with the new topic exactly as \
             written. Put the answer in the \"{TOPIC_FIELD}\" field."
        );
        ModelRequest {
            system: Some(SYSTEM_PROMPT.into()),
            instructions,
            image: None,
            schema: ResponseSchema::strings(&[TOPIC_FIELD]),
            max_tokens: MAX_TOKENS,
            timeout: self.timeout,
        }
    }
}

#[async_trait]
impl TopicClassifier for ModelClassifier {
    #[instrument(skip(self, pool), fields(pool = pool.len()))]
    async fn classify(&self, candidate: &str, pool: &[String]) -> Result<String, NormalizationError> {
        let response = self.model.complete(self.request(candidate, pool)).await?;
        response
            .text(TOPIC_FIELD)
            .map(str::to_string)
            .ok_or(NormalizationError::Model(ModelError::EmptyResponse))
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use anyhow::Result;

    use crate::{
        daemon::normalization::{NormalizationError, TopicClassifier},
        model::{MockLanguageModel, ModelError, StructuredResponse},
    };

    use super::ModelClassifier;

    #[tokio::test]
    async fn test_prompt_lists_pool_and_returns_answer() -> Result<()> {
        let mut model = MockLanguageModel::new();
        model
            .expect_complete()
            .withf(|request| {
                request.image.is_none()
                    && request.instructions.contains("- Email\n- Coding")
                    && request.instructions.contains("New topic: Emails")
                    && request.schema.fields() == ["topic"]
            })
            .times(1)
            .returning(|_| Ok([("topic", "Email")].into_iter().collect::<StructuredResponse>()));

        let classifier = ModelClassifier::new(Arc::new(model), Duration::from_secs(5));
        let answer = classifier
            .classify("Emails", &["Email".into(), "Coding".into()])
            .await?;

        assert_eq!(answer, "Email");
        Ok(())
    }

    #[tokio::test]
    async fn test_model_error_is_propagated() {
        let mut model = MockLanguageModel::new();
        model
            .expect_complete()
            .returning(|_| Err(ModelError::Timeout(Duration::from_secs(5))));

        let classifier = ModelClassifier::new(Arc::new(model), Duration::from_secs(5));
        let result = classifier.classify("Emails", &["Email".into()]).await;

        assert!(matches!(result, Err(NormalizationError::Model(ModelError::Timeout(_)))));
    }
}
