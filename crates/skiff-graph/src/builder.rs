//! Graph construction and snapshot caching
//!
//! The builder drains the contact source into a fresh [`TrustGraph`] and
//! caches the result behind an `Arc`. Appending new contact messages marks
//! the cache dirty; the next `build` rebuilds. A rebuild that fails keeps
//! serving the last good snapshot so existing sessions are not starved by
//! a transient source error.

use crate::error::GraphError;
use crate::graph::TrustGraph;
use futures::StreamExt;
use skiff_core::ContactSource;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

struct CacheState {
    snapshot: Option<Arc<TrustGraph>>,
    dirty: bool,
}

/// Builds and caches trust-graph snapshots from a contact source.
pub struct GraphBuilder {
    source: Arc<dyn ContactSource>,
    cache: RwLock<CacheState>,
}

impl GraphBuilder {
    pub fn new(source: Arc<dyn ContactSource>) -> Self {
        Self {
            source,
            cache: RwLock::new(CacheState {
                snapshot: None,
                dirty: true,
            }),
        }
    }

    /// Current snapshot, rebuilding if contacts changed since the last
    /// build. Identical inputs produce identical graphs, so every caller
    /// holding the returned `Arc` sees the same verdicts.
    pub async fn build(&self) -> Result<Arc<TrustGraph>, GraphError> {
        {
            let cache = self.cache.read().await;
            if let (Some(graph), false) = (&cache.snapshot, cache.dirty) {
                return Ok(graph.clone());
            }
        }

        let mut cache = self.cache.write().await;
        if let (Some(graph), false) = (&cache.snapshot, cache.dirty) {
            return Ok(graph.clone());
        }

        match self.assemble().await {
            Ok(graph) => {
                debug!(
                    nodes = graph.node_count(),
                    edges = graph.edge_count(),
                    "rebuilt trust graph"
                );
                let graph = Arc::new(graph);
                cache.snapshot = Some(graph.clone());
                cache.dirty = false;
                Ok(graph)
            }
            Err(err) => match &cache.snapshot {
                Some(stale) => {
                    warn!(error = %err, "trust graph rebuild failed, serving last good snapshot");
                    Ok(stale.clone())
                }
                None => Err(err),
            },
        }
    }

    /// Mark the cache stale. Called when new contact messages append.
    pub async fn invalidate(&self) {
        self.cache.write().await.dirty = true;
    }

    async fn assemble(&self) -> Result<TrustGraph, GraphError> {
        let mut graph = TrustGraph::new();
        let mut contacts = self.source.contacts();
        while let Some(event) = contacts.next().await {
            let event = event.map_err(|e| GraphError::build_failed(e.to_string()))?;
            graph.apply(&event);
        }
        Ok(graph)
    }
}
