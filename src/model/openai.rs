use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::{parse_json_object, LanguageModel, ModelError, ModelRequest, StructuredResponse};

/// Where chat completion requests go and how they are authenticated.
#[derive(Debug, Clone)]
pub enum ProviderEndpoint {
    OpenAi {
        base_url: String,
        api_key: String,
    },
    Azure {
        endpoint: String,
        api_key: String,
        deployment: String,
        api_version: String,
    },
}

impl ProviderEndpoint {
    fn completions_url(&self) -> String {
        match self {
            ProviderEndpoint::OpenAi { base_url, .. } => {
                format!("{}/chat/completions", base_url.trim_end_matches('/'))
            }
            ProviderEndpoint::Azure {
                endpoint,
                deployment,
                api_version,
                ..
            } => format!(
                "{}/openai/deployments/{deployment}/chat/completions?api-version={api_version}",
                endpoint.trim_end_matches('/')
            ),
        }
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self {
            ProviderEndpoint::OpenAi { api_key, .. } => request.bearer_auth(api_key),
            ProviderEndpoint::Azure { api_key, .. } => request.header("api-key", api_key),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: MessageContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Chat-completions client for OpenAI and Azure OpenAI deployments.
pub struct OpenAiCompatibleModel {
    http_client: reqwest::Client,
    endpoint: ProviderEndpoint,
    model: String,
}

impl OpenAiCompatibleModel {
    pub fn new(http_client: reqwest::Client, endpoint: ProviderEndpoint, model: String) -> Self {
        Self {
            http_client,
            endpoint,
            model,
        }
    }

    fn build_body(&self, request: &ModelRequest) -> ChatCompletionRequest {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system {
            messages.push(ChatMessage {
                role: "system",
                content: MessageContent::Text(system.clone()),
            });
        }

        let text = format!("{}\n\n{}", request.instructions, request.schema.describe());
        let content = match &request.image {
            Some(image) => MessageContent::Parts(vec![
                ContentPart::Text { text },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: format!(
                            "data:{};base64,{}",
                            image.media_type,
                            BASE64.encode(&image.bytes)
                        ),
                    },
                },
            ]),
            None => MessageContent::Text(text),
        };
        messages.push(ChatMessage {
            role: "user",
            content,
        });

        ChatCompletionRequest {
            model: self.model.clone(),
            messages,
            max_tokens: request.max_tokens,
            temperature: 0.1,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        }
    }

    async fn send(&self, request: &ModelRequest) -> Result<String, ModelError> {
        let body = self.build_body(request);
        let response = self
            .endpoint
            .authorize(self.http_client.post(self.endpoint.completions_url()))
            .timeout(request.timeout)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Status { status, body });
        }

        let completion: ChatCompletionResponse = response.json().await?;
        extract_content(completion)
    }
}

fn extract_content(completion: ChatCompletionResponse) -> Result<String, ModelError> {
    completion
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message)
        .and_then(|m| m.content)
        .filter(|c| !c.trim().is_empty())
        .ok_or(ModelError::EmptyResponse)
}

#[async_trait]
impl LanguageModel for OpenAiCompatibleModel {
    #[instrument(skip_all, fields(model = %self.model))]
    async fn complete(&self, request: ModelRequest) -> Result<StructuredResponse, ModelError> {
        let content = tokio::time::timeout(request.timeout, self.send(&request))
            .await
            .map_err(|_| ModelError::Timeout(request.timeout))?
            .map_err(|e| match e {
                ModelError::Transport(e) if e.is_timeout() => ModelError::Timeout(request.timeout),
                e => e,
            })?;
        debug!("Model raw response {content}");
        let object = parse_json_object(&content)?;
        request.schema.validate(&object)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::{json, Value};

    use crate::model::{ImageInput, ModelError, ModelRequest, ResponseSchema};

    use super::{extract_content, ChatCompletionResponse, OpenAiCompatibleModel, ProviderEndpoint};

    fn openai() -> ProviderEndpoint {
        ProviderEndpoint::OpenAi {
            base_url: "https://api.openai.com/v1/".into(),
            api_key: "key".into(),
        }
    }

    fn request(image: Option<ImageInput>) -> ModelRequest {
        ModelRequest {
            system: Some("You classify activities.".into()),
            instructions: "Describe the screenshot".into(),
            image,
            schema: ResponseSchema::strings(&["main_topic"]),
            max_tokens: 300,
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn urls_depend_on_provider() {
        assert_eq!(
            openai().completions_url(),
            "https://api.openai.com/v1/chat/completions"
        );
        let azure = ProviderEndpoint::Azure {
            endpoint: "https://example.openai.azure.com".into(),
            api_key: "key".into(),
            deployment: "vision".into(),
            api_version: "2024-02-01".into(),
        };
        assert_eq!(
            azure.completions_url(),
            "https://example.openai.azure.com/openai/deployments/vision/chat/completions?api-version=2024-02-01"
        );
    }

    #[test]
    fn image_is_sent_as_data_url() {
        let model = OpenAiCompatibleModel::new(reqwest::Client::new(), openai(), "gpt-4o-mini".into());
        let body = model.build_body(&request(Some(ImageInput {
            media_type: "image/png",
            bytes: b"png".to_vec(),
        })));
        let body: Value = serde_json::to_value(&body).unwrap();

        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["messages"][0]["role"], "system");
        let parts = &body["messages"][1]["content"];
        assert_eq!(parts[0]["type"], "text");
        assert!(parts[0]["text"]
            .as_str()
            .unwrap()
            .contains("\"main_topic\""));
        assert_eq!(parts[1]["type"], "image_url");
        assert_eq!(parts[1]["image_url"]["url"], "data:image/png;base64,cG5n");
    }

    #[test]
    fn text_only_requests_use_plain_content() {
        let model = OpenAiCompatibleModel::new(reqwest::Client::new(), openai(), "gpt-4o-mini".into());
        let body = serde_json::to_value(model.build_body(&request(None))).unwrap();
        assert!(body["messages"][1]["content"].is_string());
    }

    #[test]
    fn content_is_taken_from_first_choice() {
        let completion: ChatCompletionResponse = serde_json::from_value(json!({
            "choices": [{"message": {"role": "assistant", "content": "{\"topic\": \"Email\"}"}}]
        }))
        .unwrap();
        assert_eq!(extract_content(completion).unwrap(), "{\"topic\": \"Email\"}");

        let empty: ChatCompletionResponse =
            serde_json::from_value(json!({"choices": [{"message": {"content": "  "}}]})).unwrap();
        assert!(matches!(extract_content(empty), Err(ModelError::EmptyResponse)));

        let none: ChatCompletionResponse = serde_json::from_value(json!({"choices": []})).unwrap();
        assert!(matches!(extract_content(none), Err(ModelError::EmptyResponse)));
    }
}
