use anyhow::Result;
use std::time::Duration;

use crate::config::Config;

/// Build the outbound HTTP client shared by all remote services.
///
/// Every request carries the `retrieval.timeout_secs` deadline; a timeout
/// surfaces as [`RemoteServiceError::Timeout`](crate::error::RemoteServiceError::Timeout).
pub fn build_client(config: &Config) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.retrieval.timeout_secs))
        .user_agent(concat!("medicoz/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}
