//! Provider API surface
//!
//! The discovery engine talks to GCP only through [`ProviderApi`]. The REST
//! implementation lives in [`super::rest`]; tests substitute
//! [`crate::testing::MockProvider`].

use crate::location::Location;
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Errors from the provider client. Passed through to callers unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("API request failed: {status} {message}")]
    Status { status: u16, message: String },

    #[error("request failed: {0}")]
    Transport(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Short message suitable for showing to a user.
    /// Security: avoids echoing raw API error bodies
    pub fn user_message(&self) -> String {
        match self {
            ProviderError::NotFound(_) => "Resource not found.".to_string(),
            ProviderError::Auth(_) => {
                "Authentication failed. Run 'gcloud auth application-default login'.".to_string()
            },
            ProviderError::Status { status, .. } => match status {
                401 => "Authentication failed. Run 'gcloud auth application-default login'."
                    .to_string(),
                403 => "Permission denied. Check your GCP IAM permissions.".to_string(),
                409 => "Resource conflict.".to_string(),
                429 => "Rate limit exceeded. Please try again later.".to_string(),
                400 => "Invalid request. Check your parameters.".to_string(),
                500 | 502 | 503 => {
                    "GCP service temporarily unavailable. Please try again.".to_string()
                },
                _ => format!("Request failed with status {}.", status),
            },
            ProviderError::Transport(_) => {
                "Request failed. Check your network connection and try again.".to_string()
            },
            ProviderError::InvalidRequest(msg) | ProviderError::InvalidResponse(msg) => {
                msg.chars().filter(|c| c.is_ascii_graphic() || *c == ' ').take(80).collect()
            },
        }
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// One call against a resource type's endpoint
#[derive(Debug, Clone, Copy)]
pub struct ApiCall<'a> {
    pub item_type: &'a str,
    /// Service name, resolved to a root URL by the client
    pub service: &'a str,
    /// Endpoint template with `{project}`, `{region}`, `{zone}`, `{0}`.. placeholders
    pub path: &'a str,
    /// Field of the response holding the resource array
    pub items_field: &'a str,
    pub location: &'a Location,
    pub query: &'a [String],
}

/// One page of a list call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub items: Vec<Value>,
    pub next_page_token: Option<String>,
}

/// One page of an aggregated list call: resources keyed by sub-scope
/// (`zones/us-central1-a`, `regions/us-central1`, `global`)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregatedPage {
    pub entries: Vec<(String, Vec<Value>)>,
    pub next_page_token: Option<String>,
}

/// Outbound calls the engine makes
#[async_trait]
pub trait ProviderApi: Send + Sync {
    /// Fetch a single resource
    async fn get(&self, call: &ApiCall<'_>) -> ProviderResult<Value>;

    /// Fetch one page of a list within the call's location
    async fn list(&self, call: &ApiCall<'_>, page_token: Option<&str>) -> ProviderResult<Page>;

    /// Fetch one page of an aggregated list for the call's project, with
    /// partial success requested
    async fn aggregated_list(
        &self,
        call: &ApiCall<'_>,
        page_token: Option<&str>,
    ) -> ProviderResult<AggregatedPage>;
}
