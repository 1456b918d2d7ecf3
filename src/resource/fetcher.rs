//! Resource Fetcher
//!
//! Direct fetches within one location: single GETs and paged list/search
//! calls. Runs on whichever task the adapter hands it.

use super::{emit, QueryContext, ResourceAdapter, ResultSender};
use crate::cache::CacheKey;
use crate::error::QueryError;
use crate::gcp::ProviderError;
use crate::item::{composite_lookup_key, Item};
use crate::location::Location;
use tracing::{debug, warn};

/// Fetch one item, caching the item or a NOTFOUND marker
pub(super) async fn get(
    adapter: &ResourceAdapter,
    ctx: &QueryContext,
    location: &Location,
    parts: &[String],
    key: &CacheKey,
) -> Result<Item, QueryError> {
    let def = adapter.def();
    let call = adapter.call(&def.get, &def.items_field, location, parts);
    debug!("GET {} {:?} in {}", adapter.item_type(), parts, location);

    let response = tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => return Err(QueryError::Cancelled),
        response = adapter.provider().get(&call) => response,
    };

    match response {
        Ok(body) => adapter.map_and_store(&body, location, key).await,
        Err(ProviderError::NotFound(message)) => {
            debug!("{} {:?} not found in {}: {}", adapter.item_type(), parts, location, message);
            let err = QueryError::NotFound {
                item_type: adapter.item_type().to_string(),
                scope: location.scope(),
                query: composite_lookup_key(parts),
            };
            adapter
                .inner
                .cache
                .store_not_found(&err, adapter.settings().not_found_ttl, key)
                .await;
            Err(err)
        },
        Err(err) => Err(err.into()),
    }
}

/// Page through a list or search endpoint, emitting each item as it is mapped.
///
/// A result with no entries, or a 404 on the first page, is cached as
/// NOTFOUND. A provider failure is emitted as an error and ends the query.
/// A query that ends early leaves nothing under its own key.
pub(super) async fn list_pages(
    adapter: &ResourceAdapter,
    ctx: &QueryContext,
    location: &Location,
    path: &str,
    parts: &[String],
    key: &CacheKey,
    tx: &ResultSender,
) {
    match page_through(adapter, ctx, location, path, parts, key, tx).await {
        Some(0) => {
            debug!("No {} in {}", adapter.item_type(), location);
            adapter.store_not_found(key).await;
        },
        Some(_) => {},
        None => adapter.invalidate(key).await,
    }
}

/// Returns how many bodies were seen, or `None` if the query did not finish
async fn page_through(
    adapter: &ResourceAdapter,
    ctx: &QueryContext,
    location: &Location,
    path: &str,
    parts: &[String],
    key: &CacheKey,
    tx: &ResultSender,
) -> Option<usize> {
    let items_field = &adapter.def().items_field;
    let mut page_token: Option<String> = None;
    let mut seen = 0usize;

    loop {
        if tx.is_closed() {
            debug!("Consumer of {} in {} went away", adapter.item_type(), location);
            return None;
        }

        let call = adapter.call(path, items_field, location, parts);
        debug!(
            "Listing {} in {} (page token: {:?})",
            adapter.item_type(),
            location,
            page_token
        );

        let response = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return None,
            response = adapter.provider().list(&call, page_token.as_deref()) => response,
        };

        let page = match response {
            Ok(page) => page,
            Err(ProviderError::NotFound(message)) if page_token.is_none() => {
                debug!("{} parent not found in {}: {}", adapter.item_type(), location, message);
                return Some(0);
            },
            Err(err) => {
                warn!("Listing {} in {} failed: {}", adapter.item_type(), location, err);
                emit(ctx, tx, Err(err.into())).await;
                return None;
            },
        };

        for body in &page.items {
            seen += 1;
            let event = adapter.map_and_store(body, location, key).await;
            if !emit(ctx, tx, event).await {
                return None;
            }
        }

        match page.next_page_token {
            Some(token) => page_token = Some(token),
            None => return Some(seen),
        }
    }
}
