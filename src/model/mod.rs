//! Contract with the language model shared by the activity analyzer and the topic classifier.
//! A request carries a prompt, an optional image and the set of fields the answer has to
//! contain; [LanguageModel] implementations return those fields or a [ModelError].

pub mod openai;

use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Model call did not finish within {0:?}")]
    Timeout(Duration),
    #[error("Model request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Model backend returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Model returned an empty response")]
    EmptyResponse,
    #[error("Model response is malformed: {reason}")]
    Malformed { reason: String },
}

/// Image attached to a request.
#[derive(Debug, Clone)]
pub struct ImageInput {
    pub media_type: &'static str,
    pub bytes: Vec<u8>,
}

/// Names of the fields the answer has to contain. Every field is a string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseSchema {
    fields: Vec<&'static str>,
}

impl ResponseSchema {
    pub fn strings(fields: &[&'static str]) -> Self {
        Self {
            fields: fields.to_vec(),
        }
    }

    pub fn fields(&self) -> &[&'static str] {
        &self.fields
    }

    /// Instruction appended to prompts so that the model answers in the expected shape.
    pub fn describe(&self) -> String {
        let keys = self
            .fields
            .iter()
            .map(|v| format!("\"{v}\""))
            .collect::<Vec<_>>()
            .join(", ");
        format!("Respond with a single JSON object with the string keys {keys} and nothing else.")
    }

    /// Checks a parsed answer against the schema, keeping only the declared fields.
    pub fn validate(&self, object: &Map<String, Value>) -> Result<StructuredResponse, ModelError> {
        let mut values = HashMap::with_capacity(self.fields.len());
        for field in &self.fields {
            match object.get(*field) {
                Some(Value::String(v)) => {
                    values.insert(field.to_string(), v.clone());
                }
                Some(other) => {
                    return Err(ModelError::Malformed {
                        reason: format!("field {field} is not a string: {other}"),
                    })
                }
                None => {
                    return Err(ModelError::Malformed {
                        reason: format!("field {field} is missing"),
                    })
                }
            }
        }
        Ok(StructuredResponse(values))
    }
}

#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub system: Option<String>,
    pub instructions: String,
    pub image: Option<ImageInput>,
    pub schema: ResponseSchema,
    pub max_tokens: u32,
    pub timeout: Duration,
}

/// Answer of a model already checked against the request's [ResponseSchema].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StructuredResponse(HashMap<String, String>);

impl StructuredResponse {
    pub fn text(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for StructuredResponse {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Sends a request and waits at most `request.timeout` for a structured answer.
    async fn complete(&self, request: ModelRequest) -> Result<StructuredResponse, ModelError>;
}

/// Extracts a JSON object from a model answer. Models like to wrap JSON in markdown fences even
/// when asked not to, so those are removed first.
pub fn parse_json_object(content: &str) -> Result<Map<String, Value>, ModelError> {
    let content = strip_code_fence(content.trim());
    if content.is_empty() {
        return Err(ModelError::EmptyResponse);
    }
    serde_json::from_str::<Map<String, Value>>(content).map_err(|e| ModelError::Malformed {
        reason: format!("{e}: {content}"),
    })
}

fn strip_code_fence(content: &str) -> &str {
    let Some(rest) = content.strip_prefix("```") else {
        return content;
    };
    // Drops the info string, e.g. ```json
    let rest = match rest.find('\n') {
        Some(position) => &rest[position + 1..],
        None => rest.trim_start_matches("json"),
    };
    rest.trim_end().trim_end_matches("```").trim()
}
