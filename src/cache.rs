//! Query cache
//!
//! Every fetch path goes through a [`Cache`] before touching the network.
//! Entries hold either items or a NOTFOUND marker, each with a TTL.
//! [`MemoryCache`] is the in-process implementation.

use crate::error::QueryError;
use crate::item::{Item, QueryMethod};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Default cache TTL - 1 hour
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// Identifies one query: who asked, how, where, for what
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub identity: String,
    pub method: QueryMethod,
    pub scope: String,
    pub item_type: String,
    pub query: Option<String>,
}

impl CacheKey {
    pub fn new(
        identity: &str,
        method: QueryMethod,
        scope: &str,
        item_type: &str,
        query: Option<&str>,
    ) -> Self {
        Self {
            identity: identity.to_string(),
            method,
            scope: scope.to_string(),
            item_type: item_type.to_string(),
            query: query.map(str::to_string),
        }
    }

    /// The GET key that would fetch `item` directly
    pub fn for_item(identity: &str, item: &Item) -> Option<Self> {
        let value = item.unique_attribute_value()?;
        Some(Self::new(
            identity,
            QueryMethod::Get,
            &item.scope,
            &item.item_type,
            Some(&value),
        ))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.identity, self.method, self.scope, self.item_type
        )?;
        if let Some(query) = &self.query {
            write!(f, "/{}", query)?;
        }
        Ok(())
    }
}

/// Outcome of a cache lookup
#[derive(Debug, Clone)]
pub enum CacheLookup {
    Miss,
    Items(Vec<Item>),
    NotFound(QueryError),
}

/// Cache consulted by the adapters
#[async_trait]
pub trait Cache: Send + Sync {
    /// Look `key` up. With `ignore_cache` set this is always a miss.
    async fn lookup(&self, key: &CacheKey, ignore_cache: bool) -> CacheLookup;

    /// Add `item` to the entry for `key`
    async fn store_item(&self, item: &Item, ttl: Duration, key: &CacheKey);

    /// Record that `key` has no results
    async fn store_not_found(&self, err: &QueryError, ttl: Duration, key: &CacheKey);

    /// Forget whatever is stored under `key`. Entries indexed from it under
    /// other keys are kept.
    async fn invalidate(&self, key: &CacheKey);
}

#[derive(Debug, Clone)]
enum CachedValue {
    Items(Vec<Item>),
    NotFound(QueryError),
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: CachedValue,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// In-memory cache shared by all adapters and fan-out tasks.
///
/// Items stored under a LIST or SEARCH key are also indexed under their own
/// GET key, so a later GET for any of them is a hit.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries, expired ones included
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Drop expired entries; returns how many were removed
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before - entries.len();
        if removed > 0 {
            tracing::debug!("Purged {} expired cache entries", removed);
        }
        removed
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

fn same_item(a: &Item, b: &Item) -> bool {
    a.item_type == b.item_type
        && a.scope == b.scope
        && a.unique_attribute_value() == b.unique_attribute_value()
}

#[async_trait]
impl Cache for MemoryCache {
    async fn lookup(&self, key: &CacheKey, ignore_cache: bool) -> CacheLookup {
        if ignore_cache {
            tracing::trace!("Cache bypassed for {}", key);
            return CacheLookup::Miss;
        }

        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if !entry.is_expired(Instant::now()) => {
                    tracing::trace!("Cache hit for {}", key);
                    return match &entry.value {
                        CachedValue::Items(items) => CacheLookup::Items(items.clone()),
                        CachedValue::NotFound(err) => CacheLookup::NotFound(err.clone()),
                    };
                },
                Some(_) => {},
                None => return CacheLookup::Miss,
            }
        }

        // Expired: drop it unless a writer refreshed it in the meantime
        let mut entries = self.entries.write().await;
        if entries
            .get(key)
            .is_some_and(|entry| entry.is_expired(Instant::now()))
        {
            tracing::trace!("Dropping expired entry {}", key);
            entries.remove(key);
        }
        CacheLookup::Miss
    }

    async fn store_item(&self, item: &Item, ttl: Duration, key: &CacheKey) {
        let now = Instant::now();
        let expires_at = now + ttl;
        let mut entries = self.entries.write().await;

        let appended = match entries.get_mut(key) {
            Some(CacheEntry {
                value: CachedValue::Items(items),
                expires_at: entry_expiry,
            }) if now < *entry_expiry => {
                match items.iter_mut().find(|cached| same_item(cached, item)) {
                    Some(existing) => *existing = item.clone(),
                    None => items.push(item.clone()),
                }
                *entry_expiry = expires_at;
                true
            },
            _ => false,
        };
        if !appended {
            entries.insert(
                key.clone(),
                CacheEntry {
                    value: CachedValue::Items(vec![item.clone()]),
                    expires_at,
                },
            );
        }

        if key.method != QueryMethod::Get {
            if let Some(get_key) = CacheKey::for_item(&key.identity, item) {
                entries.insert(
                    get_key,
                    CacheEntry {
                        value: CachedValue::Items(vec![item.clone()]),
                        expires_at,
                    },
                );
            }
        }
    }

    async fn store_not_found(&self, err: &QueryError, ttl: Duration, key: &CacheKey) {
        tracing::trace!("Caching NOTFOUND for {}", key);
        let mut entries = self.entries.write().await;
        entries.insert(
            key.clone(),
            CacheEntry {
                value: CachedValue::NotFound(err.clone()),
                expires_at: Instant::now() + ttl,
            },
        );
    }

    async fn invalidate(&self, key: &CacheKey) {
        if self.entries.write().await.remove(key).is_some() {
            tracing::debug!("Invalidated {}", key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::Attributes;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn item(name: &str, scope: &str) -> Item {
        let mut attributes = Attributes::new();
        attributes.insert("name".to_string(), json!(name));
        Item {
            item_type: "gcp-compute-disk".to_string(),
            unique_attribute: "name".to_string(),
            attributes,
            scope: scope.to_string(),
            tags: BTreeMap::new(),
            health: None,
            edges: vec![],
        }
    }

    fn not_found() -> QueryError {
        QueryError::NotFound {
            item_type: "gcp-compute-disk".to_string(),
            scope: "p.us-central1-a".to_string(),
            query: "gone".to_string(),
        }
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let cache = MemoryCache::new();
        let key = CacheKey::new("a", QueryMethod::Get, "p.us-central1-a", "gcp-compute-disk", Some("d1"));

        assert!(matches!(cache.lookup(&key, false).await, CacheLookup::Miss));

        let stored = item("d1", "p.us-central1-a");
        cache.store_item(&stored, DEFAULT_CACHE_TTL, &key).await;

        match cache.lookup(&key, false).await {
            CacheLookup::Items(items) => assert_eq!(items, vec![stored]),
            other => panic!("expected items, got {:?}", other),
        }
        assert!(matches!(cache.lookup(&key, true).await, CacheLookup::Miss));
    }

    #[tokio::test]
    async fn test_list_entry_accumulates_and_indexes_get() {
        let cache = MemoryCache::new();
        let list_key = CacheKey::new("a", QueryMethod::List, "p.us-central1-a", "gcp-compute-disk", None);

        cache.store_item(&item("d1", "p.us-central1-a"), DEFAULT_CACHE_TTL, &list_key).await;
        cache.store_item(&item("d2", "p.us-central1-a"), DEFAULT_CACHE_TTL, &list_key).await;
        // storing the same item again replaces it
        cache.store_item(&item("d1", "p.us-central1-a"), DEFAULT_CACHE_TTL, &list_key).await;

        match cache.lookup(&list_key, false).await {
            CacheLookup::Items(items) => assert_eq!(items.len(), 2),
            other => panic!("expected items, got {:?}", other),
        }

        let get_key = CacheKey::new("a", QueryMethod::Get, "p.us-central1-a", "gcp-compute-disk", Some("d2"));
        match cache.lookup(&get_key, false).await {
            CacheLookup::Items(items) => assert_eq!(items[0].unique_attribute_value().as_deref(), Some("d2")),
            other => panic!("expected items, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_not_found_marker() {
        let cache = MemoryCache::new();
        let key = CacheKey::new("a", QueryMethod::Get, "p.us-central1-a", "gcp-compute-disk", Some("gone"));
        cache.store_not_found(&not_found(), DEFAULT_CACHE_TTL, &key).await;

        match cache.lookup(&key, false).await {
            CacheLookup::NotFound(err) => assert!(err.is_not_found()),
            other => panic!("expected not found, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_item_replaces_not_found_marker() {
        let cache = MemoryCache::new();
        let key = CacheKey::new("a", QueryMethod::List, "p", "gcp-compute-disk", None);
        cache.store_not_found(&not_found(), DEFAULT_CACHE_TTL, &key).await;
        cache.store_item(&item("d1", "p"), DEFAULT_CACHE_TTL, &key).await;

        assert!(matches!(cache.lookup(&key, false).await, CacheLookup::Items(_)));
    }

    #[tokio::test]
    async fn test_expired_entry_is_dropped_on_lookup() {
        let cache = MemoryCache::new();
        let key = CacheKey::new("a", QueryMethod::Get, "p", "gcp-compute-disk", Some("d1"));
        cache.store_item(&item("d1", "p"), Duration::ZERO, &key).await;
        assert_eq!(cache.len().await, 1);

        assert!(matches!(cache.lookup(&key, false).await, CacheLookup::Miss));
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let cache = MemoryCache::new();
        let stale = CacheKey::new("a", QueryMethod::Get, "p", "gcp-compute-disk", Some("d1"));
        let fresh = CacheKey::new("a", QueryMethod::Get, "p", "gcp-compute-disk", Some("d2"));
        cache.store_item(&item("d1", "p"), Duration::ZERO, &stale).await;
        cache.store_item(&item("d2", "p"), DEFAULT_CACHE_TTL, &fresh).await;

        assert_eq!(cache.purge_expired().await, 1);
        assert_eq!(cache.len().await, 1);
        assert!(matches!(cache.lookup(&fresh, false).await, CacheLookup::Items(_)));
    }

    #[tokio::test]
    async fn test_invalidate_keeps_get_index() {
        let cache = MemoryCache::new();
        let list_key = CacheKey::new("a", QueryMethod::List, "p", "gcp-compute-disk", None);
        let get_key = CacheKey::new("a", QueryMethod::Get, "p", "gcp-compute-disk", Some("d1"));
        cache.store_item(&item("d1", "p"), DEFAULT_CACHE_TTL, &list_key).await;

        cache.invalidate(&list_key).await;

        assert!(matches!(cache.lookup(&list_key, false).await, CacheLookup::Miss));
        assert!(matches!(cache.lookup(&get_key, false).await, CacheLookup::Items(_)));
    }

    #[test]
    fn test_key_display() {
        let key = CacheKey::new("src", QueryMethod::Search, "p", "gcp-big-query-table", Some("ds"));
        assert_eq!(key.to_string(), "src/SEARCH/p/gcp-big-query-table/ds");
    }
}
