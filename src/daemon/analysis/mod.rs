//! Turns a screenshot and a window title into a description of what the user is doing.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::model::{
    ImageInput, LanguageModel, ModelError, ModelRequest, ResponseSchema, StructuredResponse,
};

use super::capture::Screenshot;

const DESCRIPTION_FIELD: &str = "crisp_description";
const TOPIC_FIELD: &str = "main_topic";
const SUMMARY_FIELD: &str = "short_description";

const SYSTEM_PROMPT: &str = "You watch a person's screen and label what they are working on. \
Reuse short, general topic names such as \"Email\", \"Coding\", \"Web Browsing\", \"Video Call\" \
or \"Documentation\" whenever they fit instead of inventing new wording.";

const MAX_TOKENS: u32 = 300;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Model call failed: {0}")]
    Model(#[from] ModelError),
    #[error("Model left {field} empty")]
    EmptyField { field: &'static str },
}

/// Structured description of a single screenshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityAnalysis {
    pub description: String,
    pub topic: String,
    pub summary: String,
}

#[async_trait]
pub trait ActivityAnalyzer: Send + Sync {
    async fn analyze(
        &self,
        screenshot: &Screenshot,
        window_title: &str,
    ) -> Result<ActivityAnalysis, AnalysisError>;
}

/// [ActivityAnalyzer] backed by a vision capable [LanguageModel].
pub struct ModelAnalyzer {
    model: Arc<dyn LanguageModel>,
    timeout: Duration,
}

impl ModelAnalyzer {
    pub fn new(model: Arc<dyn LanguageModel>, timeout: Duration) -> Self {
        Self { model, timeout }
    }

    fn request(&self, screenshot: &Screenshot, window_title: &str) -> ModelRequest {
        let window = if window_title.trim().is_empty() {
            "unknown".to_string()
        } else {
            format!("\"{}\"", window_title.trim())
        };
        let instructions = format!(
            "Based on this screenshot, the focused window is {window}.\n\
             Give me three things:\n\
             1. {DESCRIPTION_FIELD}: a crisp description of what the user is doing\n\
             2. {TOPIC_FIELD}: the main topic, no more than 5 words\n\
             3. {SUMMARY_FIELD}: a short description of one or two sentences"
        );
        ModelRequest {
            system: Some(SYSTEM_PROMPT.into()),
            instructions,
            image: Some(ImageInput {
                media_type: "image/png",
                bytes: screenshot.bytes.clone(),
            }),
            schema: ResponseSchema::strings(&[DESCRIPTION_FIELD, TOPIC_FIELD, SUMMARY_FIELD]),
            max_tokens: MAX_TOKENS,
            timeout: self.timeout,
        }
    }
}

fn required(response: &StructuredResponse, field: &'static str) -> Result<String, AnalysisError> {
    match response.text(field).map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(AnalysisError::EmptyField { field }),
    }
}

#[async_trait]
impl ActivityAnalyzer for ModelAnalyzer {
    #[instrument(skip(self, screenshot), fields(screenshot = %screenshot.reference))]
    async fn analyze(
        &self,
        screenshot: &Screenshot,
        window_title: &str,
    ) -> Result<ActivityAnalysis, AnalysisError> {
        let response = self
            .model
            .complete(self.request(screenshot, window_title))
            .await?;

        let analysis = ActivityAnalysis {
            description: required(&response, DESCRIPTION_FIELD)?,
            topic: required(&response, TOPIC_FIELD)?,
            summary: required(&response, SUMMARY_FIELD)?,
        };
        debug!("Analyzed activity {analysis:?}");
        Ok(analysis)
    }
}
