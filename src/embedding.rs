//! Remote text embedding.
//!
//! Defines the [`Embedder`] trait and [`HuggingFaceEmbedder`], which calls
//! the HuggingFace feature-extraction pipeline for
//! `sentence-transformers/all-MiniLM-L6-v2` (384 dimensions).
//!
//! One request per text, no retries: a failure is returned to the caller
//! as a [`RemoteServiceError`] and handled by the retrieval layer.

use async_trait::async_trait;
use serde_json::Value;

use crate::config::Config;
use crate::error::RemoteServiceError;

const SERVICE: &str = "huggingface-embedding";

/// Converts text into an embedding vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RemoteServiceError>;
}

/// Embedding provider backed by the HuggingFace inference API.
pub struct HuggingFaceEmbedder {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl HuggingFaceEmbedder {
    pub fn new(client: reqwest::Client, url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client,
            url: url.into(),
            api_key,
        }
    }

    pub fn from_config(client: reqwest::Client, config: &Config) -> Self {
        Self::new(
            client,
            config.embedding.url.clone(),
            config.secrets.huggingface_api_key.clone(),
        )
    }
}

#[async_trait]
impl Embedder for HuggingFaceEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RemoteServiceError> {
        let mut req = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({ "inputs": text }));
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

        let json: Value = response
            .json()
            .await
            .map_err(|e| RemoteServiceError::from_reqwest(SERVICE, e))?;
        parse_embedding(&json)
    }
}

/// Parse a feature-extraction response.
///
/// Sentence-transformer pipelines return a flat `[f32]` for a single
/// input; some deployments wrap it as `[[f32]]`. Both are accepted.
pub fn parse_embedding(json: &Value) -> Result<Vec<f32>, RemoteServiceError> {
    let invalid = |message: &str| RemoteServiceError::InvalidPayload {
        service: SERVICE,
        message: message.to_string(),
    };

    let outer = json
        .as_array()
        .ok_or_else(|| invalid("expected a JSON array"))?;

    let row = match outer.first() {
        Some(Value::Array(inner)) => inner,
        Some(_) => outer,
        None => return Err(invalid("empty embedding")),
    };

    row.iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| invalid("embedding contains a non-numeric value"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_flat_vector() {
        let v = parse_embedding(&json!([0.5, -1.0, 2.25])).unwrap();
        assert_eq!(v, vec![0.5, -1.0, 2.25]);
    }

    #[test]
    fn test_parse_nested_vector() {
        let v = parse_embedding(&json!([[0.1, 0.2]])).unwrap();
        assert_eq!(v.len(), 2);
    }

    #[test]
    fn test_parse_rejects_error_object() {
        let err = parse_embedding(&json!({"error": "Model is loading"})).unwrap_err();
        assert!(matches!(err, RemoteServiceError::InvalidPayload { .. }));
    }

    #[test]
    fn test_parse_rejects_empty_and_non_numeric() {
        assert!(parse_embedding(&json!([])).is_err());
        assert!(parse_embedding(&json!([1.0, "x"])).is_err());
    }
}
