//! HTTP client for a running catalog server

use super::server::ErrorResponse;
use crate::catalog::CatalogStats;
use crate::Result;
use institutions::{Institution, NewInstitution};

/// Default server address used by the CLI
pub const DEFAULT_URL: &str = "http://localhost:3000";

/// Client for the catalog HTTP API
#[derive(Debug, Clone)]
pub struct CatalogClient {
    host: String,
    client: reqwest::Client,
}

impl CatalogClient {
    /// Create a client for `host` (e.g. `http://localhost:3000`)
    pub fn new(host: impl Into<String>) -> Self {
        let host = host.into();
        Self {
            host: host.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Fetch every record
    pub async fn list(&self) -> Result<Vec<Institution>> {
        let url = format!("{}/api/instituciones", self.host);
        tracing::debug!(url = %url, "Listing institutions");

        let response = self.client.get(&url).send().await?;
        let response = check_status(response, "list institutions").await?;

        let records: Vec<Institution> = response.json().await?;
        Ok(records)
    }

    /// Create a record and return it with its assigned id
    pub async fn create(&self, draft: &NewInstitution) -> Result<Institution> {
        let url = format!("{}/api/instituciones", self.host);
        tracing::debug!(url = %url, "Creating institution");

        let response = self.client.post(&url).json(draft).send().await?;
        let response = check_status(response, "create institution").await?;

        let record: Institution = response.json().await?;
        Ok(record)
    }

    /// Fetch cache statistics
    pub async fn stats(&self) -> Result<CatalogStats> {
        let url = format!("{}/api/cache/stats", self.host);

        let response = self.client.get(&url).send().await?;
        let response = check_status(response, "get cache stats").await?;

        let stats: CatalogStats = response.json().await?;
        Ok(stats)
    }
}

async fn check_status(response: reqwest::Response, action: &str) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let error: ErrorResponse = response.json().await.unwrap_or(ErrorResponse {
        message: "Unknown error".to_string(),
    });
    Err(anyhow::anyhow!("Failed to {} ({}): {}", action, status, error.message).into())
}
