//! Bounded worker pool over extraction batches, with a single coordinator
//! that owns the checkpoint and the entities index.

use chrono::Utc;
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use extract::{ExtractionOutcome, Extractor};
use index::{EmitReport, GraphEmitter};
use ingest::Chunk;
use ontology::{OntologyValidator, ValidationReport};

use crate::checkpoint::CheckpointStore;
use crate::context::RunContext;
use crate::entities_index::{self, ChunkRecord, EntitiesIndex};
use crate::metrics::RunSummary;

type BatchQueue = Arc<Mutex<VecDeque<(usize, Vec<Chunk>)>>>;

/// What a worker hands back to the coordinator for one finished batch.
#[derive(Debug)]
struct BatchReport {
    batch: usize,
    chunk_ids: Vec<String>,
    records: Vec<ChunkRecord>,
    failed: bool,
    entities: usize,
    relationships: usize,
    validation: ValidationReport,
    emit: Result<EmitReport, String>,
}

pub struct BatchScheduler {
    ctx: Arc<RunContext>,
    extractor: Arc<Extractor>,
    emitter: Arc<GraphEmitter>,
    checkpoint: CheckpointStore,
    entities_index: EntitiesIndex,
}

impl BatchScheduler {
    pub fn new(
        ctx: Arc<RunContext>,
        extractor: Arc<Extractor>,
        emitter: Arc<GraphEmitter>,
        checkpoint: CheckpointStore,
        entities_index: EntitiesIndex,
    ) -> Self {
        Self {
            ctx,
            extractor,
            emitter,
            checkpoint,
            entities_index,
        }
    }

    /// Process every chunk not already checkpointed. Returns once all batches
    /// are done or the run is cancelled; the checkpoint is flushed either way.
    pub async fn run(mut self, chunks: Vec<Chunk>) -> RunSummary {
        let scheduler = self.ctx.config.scheduler.clone();
        let mut processed = self.checkpoint.load().await;

        let total = chunks.len();
        let mut pending: Vec<Chunk> = chunks
            .into_iter()
            .filter(|c| !processed.contains(&c.chunk_id))
            .collect();
        let skipped = total - pending.len();
        if let Some(limit) = scheduler.limit {
            pending.truncate(limit);
        }
        self.ctx.stats.record_plan(total, skipped);

        let queue: VecDeque<(usize, Vec<Chunk>)> = pending
            .chunks(scheduler.batch_size)
            .enumerate()
            .map(|(i, batch)| (i + 1, batch.to_vec()))
            .collect();

        info!(
            run_id = %self.ctx.run_id,
            total,
            skipped,
            pending = pending.len(),
            batches = queue.len(),
            workers = scheduler.workers,
            "Starting extraction"
        );

        let queue: BatchQueue = Arc::new(Mutex::new(queue));
        let (tx, mut rx) = mpsc::channel::<BatchReport>(scheduler.workers);

        let mut workers = JoinSet::new();
        for worker_id in 0..scheduler.workers {
            let ctx = self.ctx.clone();
            let extractor = self.extractor.clone();
            let emitter = self.emitter.clone();
            let queue = queue.clone();
            let tx = tx.clone();
            workers.spawn(async move {
                worker_loop(worker_id, ctx, extractor, emitter, queue, tx).await;
            });
        }
        drop(tx);

        let mut since_save = 0;
        let mut last_progress = 0;
        let mut cancel_logged = false;

        while let Some(report) = rx.recv().await {
            if self.ctx.is_cancelled() && !cancel_logged {
                warn!("Cancellation requested, waiting for workers to stop");
                cancel_logged = true;
            }

            let chunks_done = self.handle_report(report, &mut processed);
            since_save += chunks_done;

            let done = self.ctx.stats.chunks_processed();
            if done - last_progress >= scheduler.progress_interval {
                info!(
                    processed = done,
                    scheduled = pending.len(),
                    entities = self.ctx.stats.entities_accepted(),
                    relationships = self.ctx.stats.relationships_accepted(),
                    elapsed_secs = self.ctx.stats.elapsed().as_secs(),
                    "Progress"
                );
                last_progress = done;
            }

            if since_save >= scheduler.checkpoint_interval {
                self.save_state(&processed).await;
                since_save = 0;
            }
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                if e.is_panic() {
                    error!(error = %e, "Worker panicked; its unreported chunks stay pending");
                } else {
                    warn!(error = %e, "Worker task did not complete");
                }
            }
        }

        if self.ctx.is_cancelled() {
            self.ctx.stats.mark_cancelled();
            warn!(processed = processed.len(), "Run cancelled, flushing checkpoint");
        }
        self.save_state(&processed).await;

        self.ctx.stats.summary(self.ctx.run_id)
    }

    /// Returns the number of chunks newly marked processed.
    fn handle_report(&mut self, report: BatchReport, processed: &mut BTreeSet<String>) -> usize {
        let emit = match report.emit {
            Ok(emit) => emit,
            Err(e) => {
                error!(batch = report.batch, chunks = report.chunk_ids.len(), error = %e, "Persistence failed, batch stays pending");
                self.ctx.stats.record_persistence_error();
                return 0;
            }
        };

        let failed = if report.failed { report.chunk_ids.len() } else { 0 };
        self.ctx.stats.record_validation(&report.validation);
        self.ctx.stats.record_batch(
            report.chunk_ids.len(),
            failed,
            report.entities,
            report.relationships,
            &emit,
        );

        for record in report.records {
            self.entities_index.insert(record);
        }

        let mut added = 0;
        for id in report.chunk_ids {
            if processed.insert(id) {
                added += 1;
            }
        }
        added
    }

    /// Entities index first, so the checkpoint never names a chunk whose
    /// record is missing.
    async fn save_state(&self, processed: &BTreeSet<String>) {
        if let Err(e) = self.entities_index.save().await {
            error!(error = %format!("{:#}", e), "Failed to save entities index; checkpoint not advanced");
            self.ctx.stats.record_persistence_error();
            return;
        }
        if let Err(e) = self.checkpoint.save(processed).await {
            error!(error = %format!("{:#}", e), "Failed to save checkpoint");
            self.ctx.stats.record_persistence_error();
            return;
        }
        debug!(processed = processed.len(), "Checkpoint saved");
    }
}

async fn worker_loop(
    worker_id: usize,
    ctx: Arc<RunContext>,
    extractor: Arc<Extractor>,
    emitter: Arc<GraphEmitter>,
    queue: BatchQueue,
    tx: mpsc::Sender<BatchReport>,
) {
    let validator = OntologyValidator::new();

    loop {
        if ctx.is_cancelled() {
            break;
        }
        let Some((batch, chunks)) = queue.lock().await.pop_front() else {
            break;
        };

        let Some(report) = process_batch(&ctx, &extractor, &emitter, validator, batch, chunks).await else {
            debug!(worker_id, batch, "Batch abandoned on cancellation");
            break;
        };
        if tx.send(report).await.is_err() {
            break;
        }
    }

    debug!(worker_id, "Worker stopped");
}

/// Extract, validate and emit one batch. `None` means the batch was abandoned.
async fn process_batch(
    ctx: &RunContext,
    extractor: &Extractor,
    emitter: &GraphEmitter,
    validator: OntologyValidator,
    batch: usize,
    chunks: Vec<Chunk>,
) -> Option<BatchReport> {
    let started = Instant::now();
    let extraction = tokio::select! {
        _ = ctx.cancel.cancelled() => return None,
        extraction = extractor.extract_batch(&chunks) => extraction,
    };
    ctx.stats.record_extract(started.elapsed());

    let chunk_ids = extraction.chunk_ids();

    match extraction.outcome {
        ExtractionOutcome::Failure { reason } => Some(BatchReport {
            batch,
            records: entities_index::failed(&extraction.chunks, &reason),
            chunk_ids,
            failed: true,
            entities: 0,
            relationships: 0,
            validation: ValidationReport::default(),
            emit: Ok(EmitReport::default()),
        }),
        ExtractionOutcome::Success {
            entities,
            relationships,
        } => {
            let validated = validator.validate(entities, relationships);
            if ctx.is_cancelled() {
                return None;
            }

            let label = format!(
                "batch {} run={} chunks={} at={}",
                batch,
                ctx.run_id,
                chunk_ids.join(","),
                Utc::now().to_rfc3339()
            );
            let emit = emitter
                .emit_batch(&label, &validated.entities, &validated.relationships, &ctx.dedup)
                .await
                .map_err(|e| format!("{:#}", e));

            Some(BatchReport {
                batch,
                entities: validated.entities.len(),
                relationships: validated.relationships.len(),
                records: entities_index::attribute(
                    &extraction.chunks,
                    validated.entities,
                    validated.relationships,
                ),
                chunk_ids,
                failed: false,
                validation: validated.report,
                emit,
            })
        }
    }
}
