use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use index::DeduplicationIndex;

use crate::config::PipelineConfig;
use crate::metrics::RunStats;

/// State scoped to one pipeline run, shared by the scheduler and its workers.
pub struct RunContext {
    pub run_id: Uuid,
    pub config: PipelineConfig,
    pub dedup: DeduplicationIndex,
    pub stats: RunStats,
    pub cancel: CancellationToken,
}

impl RunContext {
    pub fn new(config: PipelineConfig, cancel: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            run_id: Uuid::new_v4(),
            config,
            dedup: DeduplicationIndex::new(),
            stats: RunStats::new(),
            cancel,
        })
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// File names inside the output directory.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn checkpoint(&self) -> PathBuf {
        self.root.join("checkpoint.json")
    }

    pub fn entities_index(&self) -> PathBuf {
        self.root.join("entities_index.json")
    }

    pub fn incremental_script(&self) -> PathBuf {
        self.root.join("graph_incremental.cypher")
    }

    pub fn consolidated_script(&self) -> PathBuf {
        self.root.join("graph_consolidated.cypher")
    }

    pub fn run_summary(&self) -> PathBuf {
        self.root.join("run_summary.json")
    }
}
