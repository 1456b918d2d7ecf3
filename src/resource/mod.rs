//! Resource abstraction layer
//!
//! This module provides a data-driven approach to discovering GCP resources.
//! Resource definitions are loaded from JSON files at compile time and paired
//! with a mapper per type; a [`ResourceAdapter`] serves Get/List/Search for
//! one type over its configured locations.
//!
//! # Architecture
//!
//! - [`registry`] - Loads resource definitions from embedded JSON
//! - [`mappers`] - Turns API bodies into items with edges and health
//! - `fetcher` - Direct GETs and paged list/search within one location
//! - `aggregated` - Wildcard fan-out of aggregated lists across projects
//!
//! Every entry point is cache-aside: the cache is consulted first and each
//! item is stored before it is handed to the caller.
//!
//! # Example
//!
//! ```ignore
//! let ctx = QueryContext::new();
//! let vm = adapter.get(&ctx, "my-project.us-central1-a", &["vm-1"]).await?;
//! let mut all = adapter.list_stream(&ctx, "*").await?;
//! while let Some(item) = all.next().await { /* ... */ }
//! ```

mod aggregated;
mod fetcher;
pub mod mappers;
pub mod registry;

pub use mappers::{MapFn, UNIQUE_ATTR};
pub use registry::{Registry, ResourceConfig, ResourceDef, ResourceType};

use crate::cache::{Cache, CacheKey, CacheLookup, DEFAULT_CACHE_TTL};
use crate::error::QueryError;
use crate::gcp::{ApiCall, ProviderApi};
use crate::item::{composite_lookup_key, split_composite_key, Item, QueryMethod};
use crate::location::{Location, LocationSet, WILDCARD_SCOPE};
use crate::reference::Linker;
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Default number of per-project aggregated list calls in flight
pub const DEFAULT_FAN_OUT_CONCURRENCY: usize = 10;

/// Default capacity of the result stream channel
pub const DEFAULT_STREAM_BUFFER: usize = 128;

/// Streamed query results; errors are interleaved with items
pub type ItemStream = BoxStream<'static, Result<Item, QueryError>>;

type ResultSender = mpsc::Sender<Result<Item, QueryError>>;

/// Tunables shared by every adapter
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub cache_ttl: Duration,
    pub not_found_ttl: Duration,
    pub fan_out_concurrency: usize,
    pub stream_buffer: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            cache_ttl: DEFAULT_CACHE_TTL,
            not_found_ttl: DEFAULT_CACHE_TTL,
            fan_out_concurrency: DEFAULT_FAN_OUT_CONCURRENCY,
            stream_buffer: DEFAULT_STREAM_BUFFER,
        }
    }
}

/// Per-query options supplied by the caller
#[derive(Debug, Clone, Default)]
pub struct QueryContext {
    pub cancel: CancellationToken,
    /// Skip the cache lookup; results are still stored
    pub ignore_cache: bool,
}

impl QueryContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            ignore_cache: false,
        }
    }

    pub fn ignore_cache(mut self, ignore_cache: bool) -> Self {
        self.ignore_cache = ignore_cache;
        self
    }
}

/// Collected results of a blocking list or search
#[derive(Debug, Default)]
pub struct QueryResults {
    pub items: Vec<Item>,
    pub errors: Vec<QueryError>,
}

impl QueryResults {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.errors.is_empty()
    }

    async fn collect(mut rx: mpsc::Receiver<Result<Item, QueryError>>) -> Self {
        let mut results = Self::default();
        while let Some(event) = rx.recv().await {
            match event {
                Ok(item) => results.items.push(item),
                Err(err) => results.errors.push(err),
            }
        }
        results
    }
}

/// Where a list or search runs
#[derive(Debug, Clone)]
enum Target {
    Wildcard,
    At(Location),
}

/// A cache miss that still has to go to the network
#[derive(Debug, Clone)]
struct PendingQuery {
    target: Target,
    path: String,
    parts: Vec<String>,
    key: CacheKey,
}

enum Started {
    Cached(Vec<Item>),
    Pending(PendingQuery),
}

/// Serves one resource type over its configured locations
#[derive(Clone)]
pub struct ResourceAdapter {
    inner: Arc<AdapterInner>,
}

struct AdapterInner {
    resource: Arc<ResourceType>,
    locations: LocationSet,
    provider: Arc<dyn ProviderApi>,
    cache: Arc<dyn Cache>,
    linker: Arc<Linker>,
    settings: EngineSettings,
}

impl std::fmt::Debug for ResourceAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceAdapter")
            .field("item_type", &self.item_type())
            .field("locations", &self.inner.locations)
            .finish_non_exhaustive()
    }
}

impl ResourceAdapter {
    pub fn new(
        resource: Arc<ResourceType>,
        locations: LocationSet,
        provider: Arc<dyn ProviderApi>,
        cache: Arc<dyn Cache>,
        linker: Arc<Linker>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            inner: Arc::new(AdapterInner {
                resource,
                locations,
                provider,
                cache,
                linker,
                settings,
            }),
        }
    }

    pub fn item_type(&self) -> &str {
        &self.inner.resource.item_type
    }

    /// Identity recorded in cache keys
    pub fn name(&self) -> String {
        format!("{}-adapter", self.item_type())
    }

    pub fn def(&self) -> &ResourceDef {
        &self.inner.resource.def
    }

    pub fn locations(&self) -> &LocationSet {
        &self.inner.locations
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.inner.settings
    }

    pub fn supports_wildcard(&self) -> bool {
        self.def().supports_wildcard()
    }

    /// Scopes this adapter answers for, including the wildcard when supported
    pub fn scopes(&self) -> Vec<String> {
        let mut scopes = self.inner.locations.scopes();
        if self.supports_wildcard() {
            scopes.push(WILDCARD_SCOPE.to_string());
        }
        scopes
    }

    /// Fetch one item by its query parts, which may be passed separately or
    /// pre-joined with `|`
    pub async fn get(
        &self,
        ctx: &QueryContext,
        scope: &str,
        query: &[&str],
    ) -> Result<Item, QueryError> {
        let location = self.resolve_location(scope)?;
        let parts = self.query_parts(QueryMethod::Get, query, &self.def().get_query)?;
        let key = self.cache_key(
            QueryMethod::Get,
            &location.scope(),
            Some(&composite_lookup_key(&parts)),
        );

        match self.inner.cache.lookup(&key, ctx.ignore_cache).await {
            CacheLookup::Items(items) => {
                if let Some(item) = items.into_iter().next() {
                    debug!("Cache hit for {}", key);
                    return Ok(item);
                }
            },
            CacheLookup::NotFound(err) => {
                debug!("Cached NOTFOUND for {}", key);
                return Err(err);
            },
            CacheLookup::Miss => {},
        }

        fetcher::get(self, ctx, &location, &parts, &key).await
    }

    /// List every item in `scope`, or across all configured locations for `*`
    pub async fn list(&self, ctx: &QueryContext, scope: &str) -> Result<QueryResults, QueryError> {
        let started = self.start_list(ctx, scope).await?;
        self.run_blocking(ctx, started).await
    }

    /// Streaming form of [`list`](Self::list)
    pub async fn list_stream(&self, ctx: &QueryContext, scope: &str) -> Result<ItemStream, QueryError> {
        let started = self.start_list(ctx, scope).await?;
        Ok(self.run_streaming(ctx, started))
    }

    /// Find the items matching `query` in `scope`
    pub async fn search(
        &self,
        ctx: &QueryContext,
        scope: &str,
        query: &[&str],
    ) -> Result<QueryResults, QueryError> {
        let started = self.start_search(ctx, scope, query).await?;
        self.run_blocking(ctx, started).await
    }

    /// Streaming form of [`search`](Self::search)
    pub async fn search_stream(
        &self,
        ctx: &QueryContext,
        scope: &str,
        query: &[&str],
    ) -> Result<ItemStream, QueryError> {
        let started = self.start_search(ctx, scope, query).await?;
        Ok(self.run_streaming(ctx, started))
    }

    async fn start_list(&self, ctx: &QueryContext, scope: &str) -> Result<Started, QueryError> {
        let (target, path) = if scope == WILDCARD_SCOPE {
            match &self.def().aggregated_list {
                Some(path) => (Target::Wildcard, path.clone()),
                None => return Err(self.no_scope(scope)),
            }
        } else {
            let location = self.resolve_location(scope)?;
            let path = self.endpoint(QueryMethod::List, self.def().list.as_deref())?;
            (Target::At(location), path)
        };

        let key_scope = match &target {
            Target::Wildcard => WILDCARD_SCOPE.to_string(),
            Target::At(location) => location.scope(),
        };
        let key = self.cache_key(QueryMethod::List, &key_scope, None);
        self.start(ctx, target, path, Vec::new(), key).await
    }

    async fn start_search(
        &self,
        ctx: &QueryContext,
        scope: &str,
        query: &[&str],
    ) -> Result<Started, QueryError> {
        let location = self.resolve_location(scope)?;
        let path = self.endpoint(QueryMethod::Search, self.def().search.as_deref())?;
        let parts = self.query_parts(QueryMethod::Search, query, &self.def().search_query)?;
        let key = self.cache_key(
            QueryMethod::Search,
            &location.scope(),
            Some(&composite_lookup_key(&parts)),
        );
        self.start(ctx, Target::At(location), path, parts, key).await
    }

    async fn start(
        &self,
        ctx: &QueryContext,
        target: Target,
        path: String,
        parts: Vec<String>,
        key: CacheKey,
    ) -> Result<Started, QueryError> {
        match self.inner.cache.lookup(&key, ctx.ignore_cache).await {
            CacheLookup::Items(items) => {
                debug!("Cache hit for {} ({} items)", key, items.len());
                Ok(Started::Cached(items))
            },
            CacheLookup::NotFound(_) => {
                debug!("Cached NOTFOUND for {}", key);
                Ok(Started::Cached(Vec::new()))
            },
            CacheLookup::Miss => Ok(Started::Pending(PendingQuery {
                target,
                path,
                parts,
                key,
            })),
        }
    }

    /// Run the producer on the caller's task and collect what it emits
    async fn run_blocking(&self, ctx: &QueryContext, started: Started) -> Result<QueryResults, QueryError> {
        let pending = match started {
            Started::Cached(items) => {
                return Ok(QueryResults {
                    items,
                    errors: Vec::new(),
                })
            },
            Started::Pending(pending) => pending,
        };

        let (tx, rx) = mpsc::channel(self.inner.settings.stream_buffer.max(1));
        let (_, results) = tokio::join!(
            self.clone().produce(ctx.clone(), pending, tx),
            QueryResults::collect(rx)
        );

        if ctx.cancel.is_cancelled() {
            return Err(QueryError::Cancelled);
        }
        Ok(results)
    }

    /// Run the producer on its own task, feeding a bounded channel
    fn run_streaming(&self, ctx: &QueryContext, started: Started) -> ItemStream {
        match started {
            Started::Cached(items) => stream::iter(items.into_iter().map(Ok)).boxed(),
            Started::Pending(pending) => {
                let (tx, rx) = mpsc::channel(self.inner.settings.stream_buffer.max(1));
                tokio::spawn(self.clone().produce(ctx.clone(), pending, tx));
                ReceiverStream::new(rx).boxed()
            },
        }
    }

    async fn produce(self, ctx: QueryContext, pending: PendingQuery, tx: ResultSender) {
        match &pending.target {
            Target::Wildcard => {
                aggregated::list_all(&self, &ctx, &pending.path, &pending.key, &tx).await
            },
            Target::At(location) => {
                fetcher::list_pages(
                    &self,
                    &ctx,
                    location,
                    &pending.path,
                    &pending.parts,
                    &pending.key,
                    &tx,
                )
                .await
            },
        }
    }

    fn resolve_location(&self, scope: &str) -> Result<Location, QueryError> {
        self.inner
            .locations
            .resolve(scope)
            .cloned()
            .ok_or_else(|| self.no_scope(scope))
    }

    fn no_scope(&self, scope: &str) -> QueryError {
        QueryError::NoScope {
            item_type: self.item_type().to_string(),
            scope: scope.to_string(),
        }
    }

    fn endpoint(&self, method: QueryMethod, path: Option<&str>) -> Result<String, QueryError> {
        path.map(str::to_string).ok_or_else(|| {
            QueryError::Other(format!("{} does not support {}", self.item_type(), method))
        })
    }

    /// Flatten pre-joined parts and check them against the expected names
    fn query_parts(
        &self,
        method: QueryMethod,
        query: &[&str],
        names: &[String],
    ) -> Result<Vec<String>, QueryError> {
        let parts: Vec<String> = query.iter().flat_map(|q| split_composite_key(q)).collect();
        if parts.len() != names.len() || parts.iter().any(|p| p.is_empty()) {
            return Err(QueryError::Other(format!(
                "{} {} expects {} query parts ({}), got {:?}",
                self.item_type(),
                method,
                names.len(),
                names.join("|"),
                query
            )));
        }
        Ok(parts)
    }

    fn cache_key(&self, method: QueryMethod, scope: &str, query: Option<&str>) -> CacheKey {
        CacheKey::new(&self.name(), method, scope, self.item_type(), query)
    }

    fn call<'a>(
        &'a self,
        path: &'a str,
        items_field: &'a str,
        location: &'a Location,
        query: &'a [String],
    ) -> ApiCall<'a> {
        ApiCall {
            item_type: self.item_type(),
            service: &self.def().service,
            path,
            items_field,
            location,
            query,
        }
    }

    fn provider(&self) -> &dyn ProviderApi {
        self.inner.provider.as_ref()
    }

    fn map(&self, body: &serde_json::Value, location: &Location) -> Result<Item, QueryError> {
        let item = (self.inner.resource.mapper)(body, location, &self.inner.linker).map_err(|err| {
            warn!("Failed to map {} in {}: {}", self.item_type(), location, err);
            QueryError::from(err)
        })?;

        // Cache indexing and linking rely on the declared unique attribute
        let declared = &self.def().unique_attribute;
        if &item.unique_attribute != declared || item.unique_attribute_value().is_none() {
            warn!(
                "Mapped {} in {} without a value for {}",
                self.item_type(),
                location,
                declared
            );
            return Err(QueryError::Other(format!(
                "{} item has no value for unique attribute {}",
                self.item_type(),
                declared
            )));
        }
        Ok(item)
    }

    /// Map a body and store the item before it is handed on
    async fn map_and_store(
        &self,
        body: &serde_json::Value,
        location: &Location,
        key: &CacheKey,
    ) -> Result<Item, QueryError> {
        let item = self.map(body, location)?;
        self.inner
            .cache
            .store_item(&item, self.inner.settings.cache_ttl, key)
            .await;
        Ok(item)
    }

    /// Drop a partial result left under `key` by a query that did not finish
    async fn invalidate(&self, key: &CacheKey) {
        debug!("Discarding partial results for {}", key);
        self.inner.cache.invalidate(key).await;
    }

    /// Record a definitive empty result under `key`
    async fn store_not_found(&self, key: &CacheKey) {
        let err = QueryError::NotFound {
            item_type: self.item_type().to_string(),
            scope: key.scope.clone(),
            query: key.query.clone().unwrap_or_default(),
        };
        self.inner
            .cache
            .store_not_found(&err, self.inner.settings.not_found_ttl, key)
            .await;
    }
}

/// Send one result unless the query was cancelled or the consumer went away
async fn emit(ctx: &QueryContext, tx: &ResultSender, event: Result<Item, QueryError>) -> bool {
    tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => false,
        sent = tx.send(event) => sent.is_ok(),
    }
}
