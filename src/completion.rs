//! Structured prompt calls.
//!
//! A [`PromptTemplate`] pairs prompt text with a declared input schema and
//! output schema. [`call_prompt`] checks the input, renders the template,
//! hands the rendered prompt to a [`StructuredCompletion`] backend, checks
//! the returned JSON against the output schema, and deserializes it into
//! the caller's type.
//!
//! # Template syntax
//!
//! | Placeholder | Renders as |
//! |-------------|-----------|
//! | `{{{field}}}` | Text form of `field` (arrays comma-joined) |
//! | `{{media url=field}}` | Nothing in the text; `field` (a data URI) becomes an image attachment |
//!
//! Failures never retry. A bad response is
//! [`CompletionError::SchemaValidation`]; a failed call is
//! [`CompletionError::ModelInvocation`].

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::time::Instant;
use tracing::debug;

use crate::error::CompletionError;
use crate::image::ImageInput;

/// A named prompt with its input and output contracts.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    pub name: &'static str,
    pub template: &'static str,
    pub input_schema: Value,
    pub output_schema: Value,
}

/// A prompt ready to send: text with fields substituted, plus any images.
#[derive(Debug, Clone)]
pub struct RenderedPrompt {
    pub name: String,
    pub text: String,
    pub media: Vec<ImageInput>,
    pub output_schema: Value,
}

/// The one seam between the pipeline and a model vendor.
///
/// Implementations send a rendered prompt to a model constrained to the
/// prompt's output schema and return the parsed JSON response. Schema
/// checking and typing happen in [`call_prompt`].
#[async_trait]
pub trait StructuredCompletion: Send + Sync {
    /// Backend identifier for logs (e.g. `"ollama:llava"`).
    fn name(&self) -> &str;

    async fn complete(&self, prompt: &RenderedPrompt) -> Result<Value, CompletionError>;
}

/// Run one structured prompt end to end.
pub async fn call_prompt<I, O>(
    backend: &dyn StructuredCompletion,
    template: &PromptTemplate,
    input: &I,
) -> Result<O, CompletionError>
where
    I: Serialize + ?Sized,
    O: DeserializeOwned,
{
    let input = serde_json::to_value(input)
        .map_err(|e| CompletionError::schema(template.name, format!("input: {}", e)))?;
    validate_against_schema(&template.input_schema, &input)
        .map_err(|m| CompletionError::schema(template.name, format!("input: {}", m)))?;

    let rendered = template.render(&input)?;

    let start = Instant::now();
    let raw = backend.complete(&rendered).await?;
    debug!(
        prompt = template.name,
        backend = backend.name(),
        latency_ms = start.elapsed().as_millis() as u64,
        "structured completion returned"
    );

    validate_against_schema(&template.output_schema, &raw)
        .map_err(|m| CompletionError::schema(template.name, m))?;

    serde_json::from_value(raw).map_err(|e| CompletionError::schema(template.name, e.to_string()))
}

impl PromptTemplate {
    /// Substitute fields from `input` into the template text.
    pub fn render(&self, input: &Value) -> Result<RenderedPrompt, CompletionError> {
        let mut text = String::with_capacity(self.template.len());
        let mut media = Vec::new();
        let mut rest = self.template;

        while let Some(open) = rest.find("{{") {
            text.push_str(&rest[..open]);
            let after = &rest[open..];

            let closed = if let Some(body) = after.strip_prefix("{{{") {
                body.find("}}}").map(|end| (&body[..end], 3 + end + 3))
            } else {
                let body = &after[2..];
                body.find("}}").map(|end| (&body[..end], 2 + end + 2))
            };
            // Unterminated placeholder: keep the rest verbatim.
            let Some((inner, consumed)) = closed else {
                rest = after;
                break;
            };

            let inner = inner.trim();
            if let Some(directive) = inner.strip_prefix("media") {
                let field = directive
                    .trim()
                    .strip_prefix("url=")
                    .map(str::trim)
                    .unwrap_or_default();
                let uri = input.get(field).and_then(Value::as_str).ok_or_else(|| {
                    CompletionError::schema(
                        self.name,
                        format!("input: media field '{}' is not a string", field),
                    )
                })?;
                let image = ImageInput::from_data_uri(uri)
                    .map_err(|e| CompletionError::schema(self.name, format!("input: {}", e)))?;
                media.push(image);
            } else {
                text.push_str(&prompt_text(input.get(inner).unwrap_or(&Value::Null)));
            }

            rest = &after[consumed..];
        }
        text.push_str(rest);

        Ok(RenderedPrompt {
            name: self.name.to_string(),
            text,
            media,
            output_schema: self.output_schema.clone(),
        })
    }
}

/// Text form of a JSON value inside prompt text.
fn prompt_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(prompt_text)
            .collect::<Vec<String>>()
            .join(", "),
        other => other.to_string(),
    }
}

/// Check a JSON value against a small subset of JSON Schema: object
/// `required` fields, primitive `type`s of declared properties, and the
/// `items.type` of array properties.
pub fn validate_against_schema(schema: &Value, value: &Value) -> Result<(), String> {
    let obj = value
        .as_object()
        .ok_or_else(|| format!("expected an object, got {}", json_type_name(value)))?;

    let required = schema
        .get("required")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    for field in required.iter().filter_map(Value::as_str) {
        if !obj.contains_key(field) {
            return Err(format!("missing required field '{}'", field));
        }
    }

    let properties = schema
        .get("properties")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    for (name, prop_schema) in &properties {
        let Some(value) = obj.get(name) else {
            continue;
        };
        if let Some(expected) = prop_schema.get("type").and_then(Value::as_str) {
            if !type_matches(expected, value) {
                return Err(format!(
                    "field '{}' must be of type '{}', got {}",
                    name,
                    expected,
                    json_type_name(value)
                ));
            }
        }
        if let (Some(items), Some(item_type)) = (
            value.as_array(),
            prop_schema
                .get("items")
                .and_then(|i| i.get("type"))
                .and_then(Value::as_str),
        ) {
            if let Some(bad) = items.iter().find(|v| !type_matches(item_type, v)) {
                return Err(format!(
                    "items of '{}' must be of type '{}', got {}",
                    name,
                    item_type,
                    json_type_name(bad)
                ));
            }
        }
    }

    Ok(())
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        _ => true,
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Parse model text output as JSON, tolerating a surrounding
/// Markdown code fence.
pub fn parse_model_json(text: &str) -> Result<Value, String> {
    let trimmed = text.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();
    serde_json::from_str(body).map_err(|e| format!("response is not valid JSON: {}", e))
}
