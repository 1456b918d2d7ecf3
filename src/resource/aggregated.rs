//! Wildcard fan-out over aggregated list endpoints
//!
//! One task per configured project, bounded by a semaphore. Each task pages
//! its project's aggregated list and streams items as they are mapped. A
//! failing project is reported on the stream; its siblings carry on, but the
//! combined result is not kept under the wildcard key. When the consumer
//! goes away every task stops.

use super::{emit, QueryContext, ResourceAdapter, ResultSender};
use crate::cache::CacheKey;
use crate::error::QueryError;
use crate::location::Location;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

pub(super) async fn list_all(
    adapter: &ResourceAdapter,
    ctx: &QueryContext,
    path: &str,
    key: &CacheKey,
    tx: &ResultSender,
) {
    let projects = adapter.locations().projects();
    let limit = adapter.settings().fan_out_concurrency.max(1);
    info!(
        "Aggregated list of {} across {} projects ({} in flight)",
        adapter.item_type(),
        projects.len(),
        limit
    );

    // Cancelled by any task whose consumer went away; the caller's token is left alone
    let task_ctx = QueryContext {
        cancel: ctx.cancel.child_token(),
        ignore_cache: ctx.ignore_cache,
    };
    let semaphore = Arc::new(Semaphore::new(limit));
    let mut tasks = JoinSet::new();
    for project in projects {
        let adapter = adapter.clone();
        let ctx = task_ctx.clone();
        let path = path.to_string();
        let key = key.clone();
        let tx = tx.clone();
        let semaphore = semaphore.clone();

        tasks.spawn(async move {
            let outcome = list_project(&adapter, &ctx, &semaphore, &project, &path, &key, &tx).await;
            (project, outcome)
        });
    }

    let mut seen = 0usize;
    let mut complete = true;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((_, Ok(count))) => seen += count,
            Ok((_, Err(QueryError::Cancelled))) => complete = false,
            Ok((project, Err(err))) => {
                complete = false;
                warn!(
                    "Aggregated list of {} failed for project {}: {}",
                    adapter.item_type(),
                    project,
                    err
                );
                emit(ctx, tx, Err(err)).await;
            },
            Err(join_err) => {
                complete = false;
                error!("Aggregated list task for {} panicked: {}", adapter.item_type(), join_err);
                let err = QueryError::Other(format!("aggregated list task failed: {}", join_err));
                emit(ctx, tx, Err(err)).await;
            },
        }
    }

    debug!("Aggregated list of {} emitted {} items", adapter.item_type(), seen);
    if !complete || ctx.cancel.is_cancelled() {
        adapter.invalidate(key).await;
    } else if seen == 0 {
        adapter.store_not_found(key).await;
    }
}

/// Page one project's aggregated list; returns how many entries it retained
async fn list_project(
    adapter: &ResourceAdapter,
    ctx: &QueryContext,
    semaphore: &Semaphore,
    project: &str,
    path: &str,
    key: &CacheKey,
    tx: &ResultSender,
) -> Result<usize, QueryError> {
    let _permit = tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => return Err(QueryError::Cancelled),
        permit = semaphore.acquire() => permit
            .map_err(|_| QueryError::Other("fan-out pool closed".to_string()))?,
    };

    let location = Location::project(project);
    let field = adapter.def().aggregated_field();
    let mut page_token: Option<String> = None;
    let mut seen = 0usize;

    loop {
        if tx.is_closed() {
            ctx.cancel.cancel();
            return Err(QueryError::Cancelled);
        }

        let call = adapter.call(path, field, &location, &[]);
        debug!(
            "Aggregated list of {} for project {} (page token: {:?})",
            adapter.item_type(),
            project,
            page_token
        );

        let page = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return Err(QueryError::Cancelled),
            page = adapter.provider().aggregated_list(&call, page_token.as_deref()) => page?,
        };

        for (scope_key, bodies) in &page.entries {
            let Some(entry_location) = Location::from_aggregated_key(project, scope_key) else {
                warn!("Skipping unparsable aggregated key {} for {}", scope_key, adapter.item_type());
                continue;
            };
            if !adapter.locations().contains(&entry_location) {
                debug!("Skipping {} outside configured locations", entry_location);
                continue;
            }

            for body in bodies {
                seen += 1;
                let event = adapter.map_and_store(body, &entry_location, key).await;
                if !emit(ctx, tx, event).await {
                    ctx.cancel.cancel();
                    return Err(QueryError::Cancelled);
                }
            }
        }

        match page.next_page_token {
            Some(token) => page_token = Some(token),
            None => break,
        }
    }

    Ok(seen)
}
