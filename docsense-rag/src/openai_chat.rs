//! OpenAI-compatible chat completion model.
//!
//! [`OpenAIModelLoader`] checks that a model is served by the endpoint before
//! handing out an [`OpenAIChatModel`], so a misspelt or missing model fails at
//! load time rather than on the first request.
//!
//! This module is only available when the `openai` feature is enabled.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::{RagError, Result};
use crate::generation::{GenerativeModel, ModelLoader};
use crate::openai::{OPENAI_API_BASE, api_error_detail};
use crate::prompt::Prompt;

/// Loads chat models from an OpenAI-compatible server.
///
/// # Example
///
/// ```rust,ignore
/// use docsense_rag::openai_chat::OpenAIModelLoader;
///
/// let loader = OpenAIModelLoader::compatible("", "http://localhost:11434/v1")
///     .with_max_tokens(256);
/// let model = loader.load_model("llama3.2").await?;
/// ```
#[derive(Clone)]
pub struct OpenAIModelLoader {
    client: reqwest::Client,
    api_key: String,
    api_base: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl OpenAIModelLoader {
    /// Create a loader for the OpenAI API.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::compatible(api_key, OPENAI_API_BASE)
    }

    /// Create a loader for an OpenAI-compatible server.
    pub fn compatible(api_key: impl Into<String>, api_base: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            temperature: None,
            max_tokens: None,
        }
    }

    /// Set the sampling temperature for loaded models.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the completion token limit for loaded models.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        authorize(builder, &self.api_key)
    }
}

fn authorize(builder: reqwest::RequestBuilder, api_key: &str) -> reqwest::RequestBuilder {
    if api_key.is_empty() { builder } else { builder.bearer_auth(api_key) }
}

// ── API request/response types ─────────────────────────────────────

#[derive(Deserialize)]
struct ModelList {
    data: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    id: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl ModelLoader for OpenAIModelLoader {
    async fn load_model(&self, model_id: &str) -> Result<Arc<dyn GenerativeModel>> {
        let load_err = |message: String| RagError::ModelLoad { model: model_id.to_string(), message };

        let response = self
            .request(self.client.get(format!("{}/models", self.api_base)))
            .send()
            .await
            .map_err(|e| {
                error!(model = model_id, error = %e, "model listing failed");
                load_err(format!("request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = api_error_detail(response.text().await.unwrap_or_default());
            return Err(load_err(format!("API returned {status}: {detail}")));
        }

        let models: ModelList = response
            .json()
            .await
            .map_err(|e| load_err(format!("failed to parse model list: {e}")))?;

        if !models.data.iter().any(|m| m.id == model_id) {
            return Err(load_err(format!("model is not served by {}", self.api_base)));
        }

        debug!(model = model_id, api_base = %self.api_base, "chat model available");
        Ok(Arc::new(OpenAIChatModel {
            client: self.client.clone(),
            api_key: self.api_key.clone(),
            api_base: self.api_base.clone(),
            model: model_id.to_string(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }))
    }
}

/// A chat model served over the OpenAI chat completions API.
///
/// The prompt is sent as a single user message.
pub struct OpenAIChatModel {
    client: reqwest::Client,
    api_key: String,
    api_base: String,
    model: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl OpenAIChatModel {
    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl GenerativeModel for OpenAIChatModel {
    async fn generate(&self, prompt: &Prompt) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage { role: "user", content: prompt.as_str() }],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let response = authorize(
            self.client.post(format!("{}/chat/completions", self.api_base)),
            &self.api_key,
        )
        .json(&body)
        .send()
        .await
        .map_err(|e| {
            error!(model = %self.model, error = %e, "chat request failed");
            RagError::Generation(format!("request failed: {e}"))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = api_error_detail(response.text().await.unwrap_or_default());
            error!(model = %self.model, %status, "chat API error");
            return Err(RagError::Generation(format!("API returned {status}: {detail}")));
        }

        let completion: ChatResponse = response
            .json()
            .await
            .map_err(|e| RagError::Generation(format!("failed to parse response: {e}")))?;

        completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.unwrap_or_default())
            .ok_or_else(|| RagError::Generation("API returned no choices".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_request_omits_unset_sampling_options() {
        let body = ChatRequest {
            model: "m",
            messages: vec![ChatMessage { role: "user", content: "hi" }],
            temperature: None,
            max_tokens: Some(64),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["max_tokens"], 64);
        assert!(json.get("temperature").is_none());
        assert_eq!(json["messages"][0]["content"], "hi");
    }

    #[test]
    fn null_content_parses_as_empty_answer() {
        let response: ChatResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"role":"assistant","content":null}}]}"#)
                .unwrap();
        assert_eq!(response.choices[0].message.content, None);
    }

    #[tokio::test]
    async fn unreachable_server_is_a_model_load_error() {
        let loader = OpenAIModelLoader::compatible("", "http://127.0.0.1:9");
        let err = loader.load_model("anything").await.err().unwrap();
        assert!(matches!(err, RagError::ModelLoad { ref model, .. } if model == "anything"));
    }
}
