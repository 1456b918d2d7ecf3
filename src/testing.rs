//! Scripted provider for tests
//!
//! Responses are registered per (type, scope, query) for GET and list calls
//! and per (type, project) for aggregated lists. Unscripted GETs are 404s and
//! unscripted lists are empty. Every call is counted, and the number of calls
//! in flight at once is tracked.

use crate::gcp::{AggregatedPage, ApiCall, Page, ProviderApi, ProviderError, ProviderResult};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

type CallKey = (String, String, String);

const PAGE_TOKEN_PREFIX: &str = "page-";

#[derive(Debug, Default)]
pub struct MockProvider {
    gets: Mutex<HashMap<CallKey, ProviderResult<Value>>>,
    lists: Mutex<HashMap<CallKey, Vec<ProviderResult<Vec<Value>>>>>,
    aggregated: Mutex<HashMap<(String, String), Vec<ProviderResult<Vec<(String, Vec<Value>)>>>>>,
    delay: Option<Duration>,
    get_calls: AtomicUsize,
    list_calls: AtomicUsize,
    aggregated_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_get(self, item_type: &str, scope: &str, query: &str, body: Value) -> Self {
        self.script_get(item_type, scope, query, Ok(body))
    }

    pub fn with_get_error(self, item_type: &str, scope: &str, query: &str, err: ProviderError) -> Self {
        self.script_get(item_type, scope, query, Err(err))
    }

    /// Pages of a list or search; `query` is the `|`-joined query parts
    pub fn with_list_pages(
        self,
        item_type: &str,
        scope: &str,
        query: &str,
        pages: Vec<Vec<Value>>,
    ) -> Self {
        self.script_list(item_type, scope, query, pages.into_iter().map(Ok).collect())
    }

    pub fn with_list_error(self, item_type: &str, scope: &str, query: &str, err: ProviderError) -> Self {
        self.script_list(item_type, scope, query, vec![Err(err)])
    }

    /// Pages that succeed, followed by a page that fails with `err`
    pub fn with_list_pages_then_error(
        self,
        item_type: &str,
        scope: &str,
        query: &str,
        pages: Vec<Vec<Value>>,
        err: ProviderError,
    ) -> Self {
        let mut scripted: Vec<_> = pages.into_iter().map(Ok).collect();
        scripted.push(Err(err));
        self.script_list(item_type, scope, query, scripted)
    }

    /// Pages of a project's aggregated list, each a list of (sub-scope key, bodies)
    pub fn with_aggregated(
        self,
        item_type: &str,
        project: &str,
        pages: Vec<Vec<(&str, Vec<Value>)>>,
    ) -> Self {
        let pages = pages
            .into_iter()
            .map(|page| {
                Ok(page
                    .into_iter()
                    .map(|(key, bodies)| (key.to_string(), bodies))
                    .collect())
            })
            .collect();
        self.script_aggregated(item_type, project, pages)
    }

    pub fn with_aggregated_error(self, item_type: &str, project: &str, err: ProviderError) -> Self {
        self.script_aggregated(item_type, project, vec![Err(err)])
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn aggregated_calls(&self) -> usize {
        self.aggregated_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.get_calls() + self.list_calls() + self.aggregated_calls()
    }

    /// Most calls observed in flight at the same time
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn script_get(self, item_type: &str, scope: &str, query: &str, result: ProviderResult<Value>) -> Self {
        if let Ok(mut gets) = self.gets.lock() {
            gets.insert(call_key(item_type, scope, query), result);
        }
        self
    }

    fn script_list(
        self,
        item_type: &str,
        scope: &str,
        query: &str,
        pages: Vec<ProviderResult<Vec<Value>>>,
    ) -> Self {
        if let Ok(mut lists) = self.lists.lock() {
            lists.insert(call_key(item_type, scope, query), pages);
        }
        self
    }

    fn script_aggregated(
        self,
        item_type: &str,
        project: &str,
        pages: Vec<ProviderResult<Vec<(String, Vec<Value>)>>>,
    ) -> Self {
        if let Ok(mut aggregated) = self.aggregated.lock() {
            aggregated.insert((item_type.to_string(), project.to_string()), pages);
        }
        self
    }

    async fn enter(&self) -> InFlight<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let guard = InFlight(&self.in_flight);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        guard
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn call_key(item_type: &str, scope: &str, query: &str) -> CallKey {
    (item_type.to_string(), scope.to_string(), query.to_string())
}

fn page_index(page_token: Option<&str>) -> usize {
    page_token
        .and_then(|t| t.strip_prefix(PAGE_TOKEN_PREFIX))
        .and_then(|n| n.parse().ok())
        .unwrap_or(0)
}

fn next_token(index: usize, pages: usize) -> Option<String> {
    (index + 1 < pages).then(|| format!("{}{}", PAGE_TOKEN_PREFIX, index + 1))
}

#[async_trait]
impl ProviderApi for MockProvider {
    async fn get(&self, call: &ApiCall<'_>) -> ProviderResult<Value> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        let _guard = self.enter().await;

        let key = call_key(call.item_type, &call.location.scope(), &call.query.join("|"));
        let scripted = self.gets.lock().ok().and_then(|gets| gets.get(&key).cloned());
        scripted.unwrap_or_else(|| Err(ProviderError::NotFound(format!("{:?}", key))))
    }

    async fn list(&self, call: &ApiCall<'_>, page_token: Option<&str>) -> ProviderResult<Page> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let _guard = self.enter().await;

        let key = call_key(call.item_type, &call.location.scope(), &call.query.join("|"));
        let index = page_index(page_token);
        let scripted = self.lists.lock().ok().and_then(|lists| {
            lists
                .get(&key)
                .map(|pages| (pages.get(index).cloned(), pages.len()))
        });

        match scripted {
            Some((Some(page), count)) => Ok(Page {
                items: page?,
                next_page_token: next_token(index, count),
            }),
            _ => Ok(Page::default()),
        }
    }

    async fn aggregated_list(
        &self,
        call: &ApiCall<'_>,
        page_token: Option<&str>,
    ) -> ProviderResult<AggregatedPage> {
        self.aggregated_calls.fetch_add(1, Ordering::SeqCst);
        let _guard = self.enter().await;

        let key = (call.item_type.to_string(), call.location.project_id().to_string());
        let index = page_index(page_token);
        let scripted = self.aggregated.lock().ok().and_then(|aggregated| {
            aggregated
                .get(&key)
                .map(|pages| (pages.get(index).cloned(), pages.len()))
        });

        match scripted {
            Some((Some(page), count)) => Ok(AggregatedPage {
                entries: page?,
                next_page_token: next_token(index, count),
            }),
            _ => Ok(AggregatedPage::default()),
        }
    }
}
