//! Remote vector index (Pinecone).
//!
//! [`VectorIndex`] exposes the two calls the service needs: a top-K
//! nearest-neighbour query that returns match metadata, and a batch
//! upsert used by ingestion. [`PineconeIndex`] implements both against
//! the index's REST host using the `Api-Key` header.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::RemoteServiceError;

const SERVICE: &str = "pinecone";

/// A stored passage's metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PassageMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// One result of a similarity query.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VectorMatch {
    pub id: String,
    #[serde(default)]
    pub score: f32,
    #[serde(default)]
    pub metadata: Option<PassageMetadata>,
}

/// A vector to insert or overwrite.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: PassageMetadata,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Return up to `top_k` nearest neighbours, metadata included.
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<VectorMatch>, RemoteServiceError>;

    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<(), RemoteServiceError>;
}

pub struct PineconeIndex {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<VectorMatch>,
}

#[derive(Serialize)]
struct UpsertRequest {
    vectors: Vec<VectorRecord>,
}

impl PineconeIndex {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key,
        }
    }

    pub fn from_config(client: reqwest::Client, config: &Config) -> anyhow::Result<Self> {
        Ok(Self::new(
            client,
            config.pinecone.base_url()?,
            config.secrets.pinecone_api_key.clone(),
        ))
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<reqwest::Response, RemoteServiceError> {
        let mut req = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(body);
        if let Some(key) = &self.api_key {
            req = req.header("Api-Key", key);
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
        Ok(response)
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<VectorMatch>, RemoteServiceError> {
        let body = QueryRequest {
            vector,
            top_k,
            include_metadata: true,
        };
        let response = self.post("/query", &body).await?;
        let parsed: QueryResponse = response
            .json()
            .await
            .map_err(|e| RemoteServiceError::from_reqwest(SERVICE, e))?;
        Ok(parsed.matches)
    }

    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<(), RemoteServiceError> {
        if records.is_empty() {
            return Ok(());
        }
        self.post("/vectors/upsert", &UpsertRequest { vectors: records })
            .await?;
        Ok(())
    }
}
