//! GCP Client
//!
//! Main client for interacting with GCP APIs, combining authentication
//! and HTTP functionality.

use super::api::{ProviderError, ProviderResult};
use super::auth::GcpCredentials;
use super::http::GcpHttpClient;
use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::HashMap;

/// Main GCP client
#[derive(Clone)]
pub struct GcpClient {
    pub credentials: GcpCredentials,
    pub http: GcpHttpClient,
    /// Service name -> API root URL
    roots: HashMap<String, String>,
}

impl GcpClient {
    /// Create a client using Application Default Credentials
    pub async fn new(roots: HashMap<String, String>) -> Result<Self> {
        let credentials = GcpCredentials::new()
            .await
            .context("Failed to initialize GCP credentials")?;

        Self::with_credentials(credentials, roots)
    }

    /// Create a client with explicit credentials
    pub fn with_credentials(credentials: GcpCredentials, roots: HashMap<String, String>) -> Result<Self> {
        let http = GcpHttpClient::new().context("Failed to create HTTP client")?;

        Ok(Self {
            credentials,
            http,
            roots,
        })
    }

    /// Point every service at `root` (emulators, tests)
    pub fn override_roots(&mut self, root: &str) {
        for value in self.roots.values_mut() {
            *value = root.trim_end_matches('/').to_string();
        }
    }

    /// Get the current access token
    pub async fn get_token(&self) -> ProviderResult<String> {
        self.credentials
            .get_token()
            .await
            .map_err(|e| ProviderError::Auth(format!("{:#}", e)))
    }

    /// Make a GET request to a GCP API, retrying once with a fresh token on 401
    pub async fn get(&self, url: &str) -> ProviderResult<Value> {
        let token = self.get_token().await?;
        match self.http.get(url, &token).await {
            Err(ProviderError::Status { status: 401, .. }) => {
                tracing::debug!("Token rejected, refreshing");
                let token = self
                    .credentials
                    .refresh_token()
                    .await
                    .map_err(|e| ProviderError::Auth(format!("{:#}", e)))?;
                self.http.get(url, &token).await
            },
            other => other,
        }
    }

    /// Build a URL under a service's API root
    pub fn service_url(&self, service: &str, path: &str) -> ProviderResult<String> {
        let root = self
            .roots
            .get(service)
            .ok_or_else(|| ProviderError::InvalidRequest(format!("Unknown service: {}", service)))?;
        Ok(format!(
            "{}/{}",
            root.trim_end_matches('/'),
            path.trim_start_matches('/')
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> GcpClient {
        let roots = HashMap::from([(
            "compute".to_string(),
            "https://compute.googleapis.com/".to_string(),
        )]);
        GcpClient::with_credentials(GcpCredentials::from_static_token("t"), roots).unwrap()
    }

    #[test]
    fn test_service_url() {
        let client = client();
        assert_eq!(
            client.service_url("compute", "/compute/v1/projects/p").unwrap(),
            "https://compute.googleapis.com/compute/v1/projects/p"
        );
        assert!(client.service_url("nope", "x").is_err());
    }

    #[test]
    fn test_override_roots() {
        let mut client = client();
        client.override_roots("http://127.0.0.1:8080/");
        assert_eq!(
            client.service_url("compute", "v1").unwrap(),
            "http://127.0.0.1:8080/v1"
        );
    }
}
