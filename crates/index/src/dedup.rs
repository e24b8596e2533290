use anyhow::Result;
use dashmap::DashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

use crate::store::GraphStore;

/// Names already present in the graph, shared by every worker.
///
/// Seeded once from the store, then only grown as batches persist. Only the
/// first caller of `mark_emitted` for a name wins, so a name is counted as
/// new at most once per run. The graph itself never depends on it.
#[derive(Debug, Default)]
pub struct DeduplicationIndex {
    names: DashSet<String>,
    seeded: AtomicBool,
}

impl DeduplicationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every entity name from the store. Later calls are no-ops.
    pub async fn seed(&self, store: &dyn GraphStore) -> Result<usize> {
        if self.seeded.load(Ordering::Acquire) {
            return Ok(0);
        }

        let names = store.entity_names().await?;
        let mut loaded = 0;
        for name in names {
            if self.names.insert(name) {
                loaded += 1;
            }
        }
        self.seeded.store(true, Ordering::Release);

        info!(loaded, "Seeded deduplication index");
        Ok(loaded)
    }

    pub fn is_seeded(&self) -> bool {
        self.seeded.load(Ordering::Acquire)
    }

    pub fn is_new(&self, name: &str) -> bool {
        !self.names.contains(name)
    }

    /// Record a name as emitted. Returns `true` only for the first caller.
    pub fn mark_emitted(&self, name: &str) -> bool {
        self.names.insert(name.to_string())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
