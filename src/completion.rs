//! Remote text completion against a hosted instruct model.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{CompletionConfig, Config};
use crate::error::RemoteServiceError;

const SERVICE: &str = "huggingface-completion";

/// Sampling limits sent with every completion request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GenerationParams {
    pub max_new_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

impl From<&CompletionConfig> for GenerationParams {
    fn from(cfg: &CompletionConfig) -> Self {
        Self {
            max_new_tokens: cfg.max_new_tokens,
            temperature: cfg.temperature,
            top_p: cfg.top_p,
        }
    }
}

#[async_trait]
pub trait Completer: Send + Sync {
    /// Return the raw generated text for `prompt`.
    async fn complete(&self, prompt: &str) -> Result<String, RemoteServiceError>;
}

/// Completion via the HuggingFace text-generation inference API.
pub struct HuggingFaceCompleter {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    params: GenerationParams,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    inputs: &'a str,
    parameters: GenerationParams,
}

#[derive(Deserialize)]
struct Generation {
    generated_text: String,
}

impl HuggingFaceCompleter {
    pub fn new(
        client: reqwest::Client,
        url: impl Into<String>,
        api_key: Option<String>,
        params: GenerationParams,
    ) -> Self {
        Self {
            client,
            url: url.into(),
            api_key,
            params,
        }
    }

    pub fn from_config(client: reqwest::Client, config: &Config) -> Self {
        Self::new(
            client,
            config.completion.url.clone(),
            config.secrets.huggingface_api_key.clone(),
            GenerationParams::from(&config.completion),
        )
    }
}

#[async_trait]
impl Completer for HuggingFaceCompleter {
    async fn complete(&self, prompt: &str) -> Result<String, RemoteServiceError> {
        let body = CompletionRequest {
            inputs: prompt,
            parameters: self.params,
        };
        let mut req = self.client.post(&self.url).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req
            .send()
            .await
            .map_err(|e| RemoteServiceError::from_reqwest(SERVICE, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteServiceError::Http {
                service: SERVICE,
                status: status.as_u16(),
                body,
            });
        }

        let generations: Vec<Generation> = response
            .json()
            .await
            .map_err(|e| RemoteServiceError::from_reqwest(SERVICE, e))?;

        generations
            .into_iter()
            .next()
            .map(|g| g.generated_text)
            .ok_or_else(|| RemoteServiceError::InvalidPayload {
                service: SERVICE,
                message: "empty generation list".to_string(),
            })
    }
}
