//! TOML configuration with environment-supplied secrets.
//!
//! Non-secret settings live in the config file; API keys and the JWT
//! secret are read from the environment so they never land on disk.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub pinecone: PineconeConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    /// Secrets resolved from the environment after parsing.
    #[serde(skip)]
    pub secrets: Secrets,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7000".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Applies to every outbound call (embed, query, completion).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_top_k() -> usize {
    3
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_url")]
    pub url: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            url: default_embedding_url(),
        }
    }
}

fn default_embedding_url() -> String {
    "https://api-inference.huggingface.co/pipeline/feature-extraction/sentence-transformers/all-MiniLM-L6-v2".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompletionConfig {
    #[serde(default = "default_completion_url")]
    pub url: String,
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            url: default_completion_url(),
            max_new_tokens: default_max_new_tokens(),
            temperature: default_temperature(),
            top_p: default_top_p(),
        }
    }
}

fn default_completion_url() -> String {
    "https://api-inference.huggingface.co/models/mistralai/Mistral-7B-Instruct-v0.1".to_string()
}
fn default_max_new_tokens() -> u32 {
    500
}
fn default_temperature() -> f32 {
    0.1
}
fn default_top_p() -> f32 {
    0.9
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PineconeConfig {
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub index_name: Option<String>,
    /// Full base URL; replaces the `{index}.svc.{environment}` host when set.
    #[serde(default)]
    pub host: Option<String>,
}

impl PineconeConfig {
    /// Base URL of the index, e.g. `https://medical.svc.us-east1-gcp.pinecone.io`.
    pub fn base_url(&self) -> Result<String> {
        if let Some(host) = &self.host {
            return Ok(host.trim_end_matches('/').to_string());
        }
        let index = self
            .index_name
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("pinecone.index_name (or PINECONE_INDEX_NAME) not set"))?;
        let env = self.environment.as_deref().ok_or_else(|| {
            anyhow::anyhow!("pinecone.environment (or PINECONE_ENVIRONMENT) not set")
        })?;
        Ok(format!("https://{}.svc.{}.pinecone.io", index, env))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// Paragraphs at or below this trimmed length are dropped.
    #[serde(default = "default_min_chunk_chars")]
    pub min_chunk_chars: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            min_chunk_chars: default_min_chunk_chars(),
        }
    }
}

fn default_min_chunk_chars() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    #[serde(default = "default_user_token_ttl")]
    pub user_token_ttl_secs: i64,
    #[serde(default = "default_admin_token_ttl")]
    pub admin_token_ttl_secs: i64,
    /// bcrypt work factor for account passwords (4..=31).
    #[serde(default = "default_bcrypt_cost")]
    pub bcrypt_cost: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            user_token_ttl_secs: default_user_token_ttl(),
            admin_token_ttl_secs: default_admin_token_ttl(),
            bcrypt_cost: default_bcrypt_cost(),
        }
    }
}

fn default_user_token_ttl() -> i64 {
    3600
}
fn default_admin_token_ttl() -> i64 {
    5 * 3600
}

fn default_bcrypt_cost() -> u32 {
    10
}

/// Credentials read from the process environment.
#[derive(Clone, Default)]
pub struct Secrets {
    pub pinecone_api_key: Option<String>,
    pub huggingface_api_key: Option<String>,
    pub jwt_secret: Option<String>,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn mask(v: &Option<String>) -> &'static str {
            if v.is_some() {
                "<set>"
            } else {
                "<unset>"
            }
        }
        f.debug_struct("Secrets")
            .field("pinecone_api_key", &mask(&self.pinecone_api_key))
            .field("huggingface_api_key", &mask(&self.huggingface_api_key))
            .field("jwt_secret", &mask(&self.jwt_secret))
            .field("admin_email", &mask(&self.admin_email))
            .field("admin_password", &mask(&self.admin_password))
            .finish()
    }
}

impl Secrets {
    pub fn from_env() -> Self {
        Self {
            pinecone_api_key: env_var("PINECONE_API_KEY"),
            huggingface_api_key: env_var("HUGGINGFACE_API_KEY"),
            jwt_secret: env_var("JWT_SECRET"),
            admin_email: env_var("ADMIN_EMAIL"),
            admin_password: env_var("ADMIN_PASSWORD"),
        }
    }

    pub fn jwt_secret(&self) -> Result<&str> {
        self.jwt_secret
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("JWT_SECRET environment variable not set"))
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// A self-contained configuration for tests and throwaway runs.
    pub fn minimal() -> Self {
        Self {
            db: DbConfig {
                path: PathBuf::from("./data/medicoz.sqlite"),
            },
            server: ServerConfig::default(),
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig::default(),
            completion: CompletionConfig::default(),
            pinecone: PineconeConfig::default(),
            ingest: IngestConfig::default(),
            auth: AuthConfig::default(),
            secrets: Secrets::default(),
        }
    }

    /// Fill in environment overrides for non-secret settings and load secrets.
    fn apply_env(&mut self) {
        if let Some(env) = env_var("PINECONE_ENVIRONMENT") {
            self.pinecone.environment = Some(env);
        }
        if let Some(index) = env_var("PINECONE_INDEX_NAME") {
            self.pinecone.index_name = Some(index);
        }
        if let Some(path) = env_var("MEDICOZ_DB_PATH") {
            self.db.path = PathBuf::from(path);
        }
        self.secrets = Secrets::from_env();
    }

    fn validate(&self) -> Result<()> {
        if self.retrieval.top_k == 0 {
            bail!("retrieval.top_k must be >= 1");
        }
        if self.retrieval.timeout_secs == 0 {
            bail!("retrieval.timeout_secs must be > 0");
        }
        if self.completion.max_new_tokens == 0 {
            bail!("completion.max_new_tokens must be > 0");
        }
        if !(0.0..=2.0).contains(&self.completion.temperature) {
            bail!("completion.temperature must be in [0.0, 2.0]");
        }
        if !(self.completion.top_p > 0.0 && self.completion.top_p <= 1.0) {
            bail!("completion.top_p must be in (0.0, 1.0]");
        }
        if !(4..=31).contains(&self.auth.bcrypt_cost) {
            bail!("auth.bcrypt_cost must be in [4, 31]");
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse config text, then apply environment overrides and validate.
pub fn parse_config(content: &str) -> Result<Config> {
    let mut config: Config =
        toml::from_str(content).with_context(|| "Failed to parse config file")?;
    config.apply_env();
    config.validate()?;
    Ok(config)
}
