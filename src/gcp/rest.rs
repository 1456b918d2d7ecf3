//! REST implementation of [`ProviderApi`]
//!
//! Renders a resource type's endpoint templates against a location and query,
//! then parses list and aggregated-list responses into pages.

use super::api::{AggregatedPage, ApiCall, Page, ProviderApi, ProviderError, ProviderResult};
use super::client::GcpClient;
use crate::location::Location;
use async_trait::async_trait;
use serde_json::Value;
use url::Url;

/// Provider backed by the GCP REST APIs
#[derive(Clone)]
pub struct RestProvider {
    client: GcpClient,
}

impl RestProvider {
    pub fn new(client: GcpClient) -> Self {
        Self { client }
    }

    fn build_url(
        &self,
        call: &ApiCall<'_>,
        params: &[(&str, &str)],
    ) -> ProviderResult<Url> {
        let path = render_path(call.path, call.location, call.query)?;
        let raw = self.client.service_url(call.service, &path)?;
        let mut url = Url::parse(&raw)
            .map_err(|e| ProviderError::InvalidRequest(format!("Invalid URL {}: {}", raw, e)))?;

        if !params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in params {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl ProviderApi for RestProvider {
    async fn get(&self, call: &ApiCall<'_>) -> ProviderResult<Value> {
        let url = self.build_url(call, &[])?;
        self.client.get(url.as_str()).await
    }

    async fn list(&self, call: &ApiCall<'_>, page_token: Option<&str>) -> ProviderResult<Page> {
        let params: Vec<(&str, &str)> = page_token.map(|t| ("pageToken", t)).into_iter().collect();
        let url = self.build_url(call, &params)?;
        let response = self.client.get(url.as_str()).await?;
        Ok(parse_page(&response, call.items_field))
    }

    async fn aggregated_list(
        &self,
        call: &ApiCall<'_>,
        page_token: Option<&str>,
    ) -> ProviderResult<AggregatedPage> {
        let mut params = vec![("returnPartialSuccess", "true")];
        if let Some(token) = page_token {
            params.push(("pageToken", token));
        }
        let url = self.build_url(call, &params)?;
        let response = self.client.get(url.as_str()).await?;
        Ok(parse_aggregated_page(&response, call.items_field))
    }
}

/// Fill `{project}`, `{region}`, `{zone}` and positional `{N}` placeholders.
/// Substituted values are percent-encoded.
pub fn render_path(template: &str, location: &Location, query: &[String]) -> ProviderResult<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let end = after.find('}').ok_or_else(|| {
            ProviderError::InvalidRequest(format!("Unterminated placeholder in {}", template))
        })?;
        let name = &after[..end];

        let value = match name {
            "project" => Some(location.project_id().to_string()),
            "region" => location.effective_region(),
            "zone" => location.zone().map(str::to_string),
            index => index.parse::<usize>().ok().and_then(|i| query.get(i).cloned()),
        };
        let value = value.ok_or_else(|| {
            ProviderError::InvalidRequest(format!(
                "No value for {{{}}} in {} at {}",
                name, template, location
            ))
        })?;

        out.push_str(&urlencoding::encode(&value));
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    Ok(out)
}

/// Extract the resource array and page token from a list response
pub fn parse_page(response: &Value, items_field: &str) -> Page {
    let items = response
        .get(items_field)
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();

    Page {
        items,
        next_page_token: next_page_token(response),
    }
}

/// Demultiplex an aggregated response.
/// Aggregated responses have format:
/// `{ "items": { "zones/us-central1-a": { "instances": [...] }, ... } }`
pub fn parse_aggregated_page(response: &Value, items_field: &str) -> AggregatedPage {
    if let Some(unreachables) = response.get("unreachables").and_then(|v| v.as_array()) {
        if !unreachables.is_empty() {
            tracing::warn!("Aggregated list skipped {} unreachable scopes", unreachables.len());
        }
    }

    let mut entries = Vec::new();
    if let Some(items) = response.get("items").and_then(|v| v.as_object()) {
        for (key, scoped) in items {
            if let Some(code) = scoped
                .get("warning")
                .and_then(|w| w.get("code"))
                .and_then(|c| c.as_str())
            {
                tracing::trace!("Aggregated entry {} warning: {}", key, code);
            }

            let resources = scoped
                .get(items_field)
                .and_then(|v| v.as_array())
                .cloned()
                .unwrap_or_default();
            if !resources.is_empty() {
                entries.push((key.clone(), resources));
            }
        }
    }

    AggregatedPage {
        entries,
        next_page_token: next_page_token(response),
    }
}

fn next_page_token(response: &Value) -> Option<String> {
    response
        .get("nextPageToken")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
