//! Discovery engine: one adapter per registered type

use crate::cache::Cache;
use crate::config::Config;
use crate::error::QueryError;
use crate::gcp::ProviderApi;
use crate::item::{Edge, Item, QueryMethod};
use crate::reference::Linker;
use crate::resource::{ItemStream, QueryContext, QueryResults, Registry, ResourceAdapter};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Adapters for every registered type, sharing one provider and cache
#[derive(Debug, Clone)]
pub struct Discovery {
    adapters: BTreeMap<String, ResourceAdapter>,
}

impl Discovery {
    pub fn new(
        registry: &Registry,
        config: &Config,
        provider: Arc<dyn ProviderApi>,
        cache: Arc<dyn Cache>,
    ) -> Self {
        let linker = Arc::new(Linker::builtin());
        let settings = config.settings();

        let adapters = registry
            .iter()
            .map(|resource| {
                let locations = config.location_set(resource.def.scope);
                if locations.is_empty() {
                    tracing::debug!("No configured locations for {}", resource.item_type);
                }
                let adapter = ResourceAdapter::new(
                    resource.clone(),
                    locations,
                    provider.clone(),
                    cache.clone(),
                    linker.clone(),
                    settings.clone(),
                );
                (resource.item_type.clone(), adapter)
            })
            .collect();

        Self { adapters }
    }

    pub fn adapter(&self, item_type: &str) -> Result<&ResourceAdapter, QueryError> {
        self.adapters
            .get(item_type)
            .ok_or_else(|| QueryError::Other(format!("unknown type {}", item_type)))
    }

    pub fn adapters(&self) -> impl Iterator<Item = &ResourceAdapter> {
        self.adapters.values()
    }

    pub async fn get(
        &self,
        ctx: &QueryContext,
        item_type: &str,
        scope: &str,
        query: &[&str],
    ) -> Result<Item, QueryError> {
        self.adapter(item_type)?.get(ctx, scope, query).await
    }

    pub async fn list(
        &self,
        ctx: &QueryContext,
        item_type: &str,
        scope: &str,
    ) -> Result<QueryResults, QueryError> {
        self.adapter(item_type)?.list(ctx, scope).await
    }

    pub async fn list_stream(
        &self,
        ctx: &QueryContext,
        item_type: &str,
        scope: &str,
    ) -> Result<ItemStream, QueryError> {
        self.adapter(item_type)?.list_stream(ctx, scope).await
    }

    pub async fn search(
        &self,
        ctx: &QueryContext,
        item_type: &str,
        scope: &str,
        query: &[&str],
    ) -> Result<QueryResults, QueryError> {
        self.adapter(item_type)?.search(ctx, scope, query).await
    }

    pub async fn search_stream(
        &self,
        ctx: &QueryContext,
        item_type: &str,
        scope: &str,
        query: &[&str],
    ) -> Result<ItemStream, QueryError> {
        self.adapter(item_type)?.search_stream(ctx, scope, query).await
    }

    /// Run the query an edge describes
    pub async fn follow(&self, ctx: &QueryContext, edge: &Edge) -> Result<QueryResults, QueryError> {
        let adapter = self.adapter(&edge.target_type)?;
        match edge.method {
            QueryMethod::Get => {
                let item = adapter.get(ctx, &edge.target_scope, &[&edge.query]).await?;
                Ok(QueryResults {
                    items: vec![item],
                    errors: Vec::new(),
                })
            },
            QueryMethod::List => adapter.list(ctx, &edge.target_scope).await,
            QueryMethod::Search => adapter.search(ctx, &edge.target_scope, &[&edge.query]).await,
        }
    }
}
