//! Model backends implementing [`StructuredCompletion`].
//!
//! - **[`DisabledBackend`]**: fails every call; used when no provider is configured.
//! - **[`OpenAIBackend`]**: OpenAI chat completions with a `json_schema` response format.
//! - **[`OllamaBackend`]**: a local Ollama instance's `/api/chat` with a `format` schema.
//!
//! Use [`create_backend`] to pick one from configuration.
//!
//! Calls are not retried. HTTP errors, network errors and timeouts map to
//! [`CompletionError::ModelInvocation`]; content that is not JSON maps to
//! [`CompletionError::SchemaValidation`].

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use crate::completion::{parse_model_json, RenderedPrompt, StructuredCompletion};
use crate::config::ModelConfig;
use crate::error::CompletionError;

// ============ Disabled Backend ============

pub struct DisabledBackend;

#[async_trait]
impl StructuredCompletion for DisabledBackend {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn complete(&self, prompt: &RenderedPrompt) -> Result<Value, CompletionError> {
        Err(CompletionError::invocation(
            &prompt.name,
            "model provider is disabled",
        ))
    }
}

// ============ OpenAI Backend ============

/// Backend for the OpenAI chat completions API.
///
/// Requires the `OPENAI_API_KEY` environment variable. Images are sent
/// inline as `image_url` parts carrying the data URI.
pub struct OpenAIBackend {
    label: String,
    model: String,
    url: String,
    api_key: String,
    temperature: Option<f32>,
    client: reqwest::Client,
}

impl OpenAIBackend {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("model.model required for OpenAI provider"))?;

        let api_key = match std::env::var("OPENAI_API_KEY") {
            Ok(key) => key,
            Err(_) => bail!("OPENAI_API_KEY environment variable not set"),
        };

        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            label: format!("openai:{}", model),
            model,
            url: url.trim_end_matches('/').to_string(),
            api_key,
            temperature: config.temperature,
            client,
        })
    }

    fn request_body(&self, prompt: &RenderedPrompt) -> Value {
        let mut content = vec![json!({ "type": "text", "text": prompt.text })];
        for image in &prompt.media {
            content.push(json!({
                "type": "image_url",
                "image_url": { "url": image.to_data_uri() }
            }));
        }

        let mut body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": content }],
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": prompt.name,
                    "schema": prompt.output_schema,
                    "strict": false
                }
            }
        });
        if let Some(t) = self.temperature {
            body["temperature"] = json!(t);
        }
        body
    }
}

#[async_trait]
impl StructuredCompletion for OpenAIBackend {
    fn name(&self) -> &str {
        &self.label
    }

    async fn complete(&self, prompt: &RenderedPrompt) -> Result<Value, CompletionError> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.url))
            .bearer_auth(&self.api_key)
            .json(&self.request_body(prompt))
            .send()
            .await
            .map_err(|e| CompletionError::invocation(&prompt.name, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(CompletionError::invocation(
                &prompt.name,
                format!("OpenAI API error {}: {}", status, body_text),
            ));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| CompletionError::invocation(&prompt.name, e.to_string()))?;

        let content = parse_openai_content(&json)
            .map_err(|m| CompletionError::schema(&prompt.name, m))?;
        parse_model_json(content).map_err(|m| CompletionError::schema(&prompt.name, m))
    }
}

/// Extract `choices[0].message.content` from a chat completion response.
fn parse_openai_content(json: &Value) -> std::result::Result<&str, String> {
    let message = json
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .ok_or_else(|| "Invalid OpenAI response: missing choices[0].message".to_string())?;

    if let Some(refusal) = message.get("refusal").and_then(Value::as_str) {
        return Err(format!("model refused: {}", refusal));
    }

    message
        .get("content")
        .and_then(Value::as_str)
        .ok_or_else(|| "Invalid OpenAI response: missing message content".to_string())
}

// ============ Ollama Backend ============

/// Backend for a local Ollama instance.
///
/// Calls `POST /api/chat` on the configured URL (default
/// `http://localhost:11434`). Vision prompts need a multimodal model
/// (e.g. `ollama pull llava`).
pub struct OllamaBackend {
    label: String,
    model: String,
    url: String,
    temperature: Option<f32>,
    client: reqwest::Client,
}

impl OllamaBackend {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("model.model required for Ollama provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            label: format!("ollama:{}", model),
            model,
            url: url.trim_end_matches('/').to_string(),
            temperature: config.temperature,
            client,
        })
    }

    fn request_body(&self, prompt: &RenderedPrompt) -> Value {
        let mut message = json!({ "role": "user", "content": prompt.text });
        if !prompt.media.is_empty() {
            message["images"] = json!(prompt
                .media
                .iter()
                .map(|image| image.to_base64())
                .collect::<Vec<String>>());
        }

        let mut body = json!({
            "model": self.model,
            "messages": [message],
            "stream": false,
            "format": prompt.output_schema,
        });
        if let Some(t) = self.temperature {
            body["options"] = json!({ "temperature": t });
        }
        body
    }
}

#[async_trait]
impl StructuredCompletion for OllamaBackend {
    fn name(&self) -> &str {
        &self.label
    }

    async fn complete(&self, prompt: &RenderedPrompt) -> Result<Value, CompletionError> {
        let response = self
            .client
            .post(format!("{}/api/chat", self.url))
            .json(&self.request_body(prompt))
            .send()
            .await
            .map_err(|e| {
                CompletionError::invocation(
                    &prompt.name,
                    format!(
                        "Ollama connection error (is Ollama running at {}?): {}",
                        self.url, e
                    ),
                )
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(CompletionError::invocation(
                &prompt.name,
                format!("Ollama API error {}: {}", status, body_text),
            ));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| CompletionError::invocation(&prompt.name, e.to_string()))?;

        let content = json
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(Value::as_str)
            .ok_or_else(|| {
                CompletionError::schema(&prompt.name, "Invalid Ollama response: missing message")
            })?;
        parse_model_json(content).map_err(|m| CompletionError::schema(&prompt.name, m))
    }
}

/// Create the configured backend.
///
/// | Config Value | Backend |
/// |-------------|---------|
/// | `"disabled"` | [`DisabledBackend`] |
/// | `"openai"` | [`OpenAIBackend`] |
/// | `"ollama"` | [`OllamaBackend`] |
pub fn create_backend(config: &ModelConfig) -> Result<Box<dyn StructuredCompletion>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledBackend)),
        "openai" => Ok(Box::new(OpenAIBackend::new(config)?)),
        "ollama" => Ok(Box::new(OllamaBackend::new(config)?)),
        other => bail!("Unknown model provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::ImageInput;

    fn prompt_with_image() -> RenderedPrompt {
        RenderedPrompt {
            name: "generateTags".to_string(),
            text: "Tag this".to_string(),
            media: vec![ImageInput::new("image/png", vec![1, 2, 3]).unwrap()],
            output_schema: json!({ "type": "object" }),
        }
    }

    fn ollama_config() -> ModelConfig {
        ModelConfig {
            provider: "ollama".to_string(),
            model: Some("llava".to_string()),
            url: Some("http://ollama.local:11434/".to_string()),
            timeout_secs: 5,
            temperature: Some(0.1),
        }
    }

    #[test]
    fn ollama_body_carries_images_and_format() {
        let backend = OllamaBackend::new(&ollama_config()).unwrap();
        let body = backend.request_body(&prompt_with_image());
        assert_eq!(body["model"], "llava");
        assert_eq!(body["stream"], false);
        assert_eq!(body["format"], json!({ "type": "object" }));
        assert_eq!(body["messages"][0]["images"][0], "AQID");
        assert_eq!(body["options"]["temperature"], json!(0.1f32));
        assert_eq!(backend.url, "http://ollama.local:11434");
        assert_eq!(backend.name(), "ollama:llava");
    }

    #[test]
    fn openai_body_carries_image_part_and_json_schema() {
        let backend = OpenAIBackend {
            label: "openai:gpt-4o-mini".to_string(),
            model: "gpt-4o-mini".to_string(),
            url: "https://api.openai.com/v1".to_string(),
            api_key: "sk-test".to_string(),
            temperature: None,
            client: reqwest::Client::new(),
        };
        let body = backend.request_body(&prompt_with_image());

        assert_eq!(body["model"], "gpt-4o-mini");
        let content = &body["messages"][0]["content"];
        assert_eq!(content[0], json!({ "type": "text", "text": "Tag this" }));
        assert_eq!(content[1]["type"], "image_url");
        assert_eq!(content[1]["image_url"]["url"], "data:image/png;base64,AQID");

        let format = &body["response_format"];
        assert_eq!(format["type"], "json_schema");
        assert_eq!(format["json_schema"]["name"], "generateTags");
        assert_eq!(format["json_schema"]["schema"], json!({ "type": "object" }));
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn openai_content_extraction() {
        let ok = json!({ "choices": [{ "message": { "content": "{\"tags\":[]}" } }] });
        assert_eq!(parse_openai_content(&ok).unwrap(), "{\"tags\":[]}");

        let refused = json!({ "choices": [{ "message": { "refusal": "no", "content": null } }] });
        assert!(parse_openai_content(&refused).unwrap_err().contains("refused"));

        assert!(parse_openai_content(&json!({})).is_err());
    }

    #[test]
    fn disabled_provider_is_the_default() {
        let backend = create_backend(&ModelConfig::default()).unwrap();
        assert_eq!(backend.name(), "disabled");
    }

    #[tokio::test]
    async fn disabled_backend_fails_with_invocation_error() {
        let err = DisabledBackend
            .complete(&prompt_with_image())
            .await
            .unwrap_err();
        assert!(matches!(err, CompletionError::ModelInvocation { .. }));
    }
}
