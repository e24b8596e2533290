//! Knowledge-graph construction pipeline: chunk files in, validated concept
//! graph out, resumable across runs.

pub mod checkpoint;
pub mod config;
pub mod context;
pub mod entities_index;
pub mod metrics;
pub mod reconcile;
pub mod scheduler;

pub use checkpoint::CheckpointStore;
pub use config::PipelineConfig;
pub use context::{OutputLayout, RunContext};
pub use entities_index::{ChunkExtractionRecord, EntitiesIndex};
pub use metrics::{RunStats, RunSummary};
pub use reconcile::{consolidate, reconcile, ReconcileSummary};
pub use scheduler::BatchScheduler;

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use extract::{CompletionClient, Extractor, OllamaClient, RateLimiter};
use index::{GraphEmitter, GraphStore, IncrementalScript, MemoryGraphStore, Neo4jGraphStore};

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Forget all previous progress before starting.
    pub reset: bool,
    /// Run the consolidation pass after extraction.
    pub reconcile: bool,
}

/// Connect to the configured graph store.
pub async fn connect_store(config: &PipelineConfig) -> Result<Arc<dyn GraphStore>> {
    if config.graph.dry_run {
        info!("Dry run: using in-memory graph store");
        return Ok(Arc::new(MemoryGraphStore::new()));
    }

    let store = Neo4jGraphStore::connect(&config.graph.uri, &config.graph.user, &config.graph.password).await?;
    store.init_schema().await?;
    Ok(Arc::new(store))
}

/// Full run against Ollama and the configured graph store.
pub async fn run(config: PipelineConfig, options: RunOptions, cancel: CancellationToken) -> Result<RunSummary> {
    let client = OllamaClient::new(
        config.llm.base_url.clone(),
        config.llm.model.clone(),
        config.llm.request_timeout(),
        config.llm.temperature,
    )?;
    let store = connect_store(&config).await?;

    run_with(config, options, Arc::new(client), store, cancel).await
}

/// Run with explicit collaborators.
pub async fn run_with(
    config: PipelineConfig,
    options: RunOptions,
    client: Arc<dyn CompletionClient>,
    store: Arc<dyn GraphStore>,
    cancel: CancellationToken,
) -> Result<RunSummary> {
    let config = config.normalized();
    let layout = OutputLayout::new(&options.output_dir);

    tokio::fs::create_dir_all(layout.root())
        .await
        .with_context(|| format!("Failed to create output directory {}", layout.root().display()))?;

    let checkpoint = CheckpointStore::new(layout.checkpoint());
    if options.reset {
        checkpoint.reset().await?;
        checkpoint::remove_if_exists(&layout.entities_index()).await?;
        checkpoint::remove_if_exists(&layout.incremental_script()).await?;
        checkpoint::remove_if_exists(&layout.consolidated_script()).await?;
        info!("Previous progress cleared");
    }

    let chunks = ingest::load_chunks(&options.input_dir).await?;

    let ctx = RunContext::new(config, cancel);
    ctx.dedup
        .seed(store.as_ref())
        .await
        .context("Failed to load existing entity names from the graph store")?;

    let limiter = Arc::new(RateLimiter::new(ctx.config.llm.min_request_interval()));
    let extractor = Extractor::new(client, limiter, ctx.config.retry.policy())
        .with_correction_attempts(ctx.config.llm.correction_attempts);
    let script = Arc::new(IncrementalScript::new(layout.incremental_script()));
    let emitter = GraphEmitter::new(store.clone(), Some(script));
    let entities_index = EntitiesIndex::open(layout.entities_index()).await;

    let scheduler = BatchScheduler::new(
        ctx.clone(),
        Arc::new(extractor),
        Arc::new(emitter),
        checkpoint,
        entities_index,
    );
    let summary = scheduler.run(chunks).await;

    info!(
        run_id = %summary.run_id,
        processed = summary.chunks_processed,
        skipped = summary.chunks_skipped,
        failed = summary.chunks_failed,
        entities = summary.entities_accepted,
        entities_new = summary.entities_new,
        relationships = summary.relationships_accepted,
        rejected_entities = summary.entities_rejected,
        rejected_relationships = summary.relationships_rejected,
        persistence_errors = summary.persistence_errors,
        cancelled = summary.cancelled,
        elapsed_secs = summary.elapsed_secs,
        "Run complete"
    );

    if let Err(e) = write_summary(&layout, &summary).await {
        error!(error = %format!("{:#}", e), "Failed to write run summary");
    }

    if options.reconcile && !summary.cancelled {
        if let Err(e) = reconcile(&layout, Some(store.as_ref())).await {
            error!(error = %format!("{:#}", e), "Reconciliation failed");
        }
    }

    Ok(summary)
}

async fn write_summary(layout: &OutputLayout, summary: &RunSummary) -> Result<()> {
    let json = serde_json::to_vec_pretty(summary)?;
    index::write_atomic(&layout.run_summary(), &json).await
}
