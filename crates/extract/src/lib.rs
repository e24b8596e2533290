pub mod llm;
pub mod prompt;
pub mod rate_limit;
pub mod repair;
pub mod retry;
pub mod schema;

pub use llm::{CompletionClient, OllamaClient, ProviderError};
pub use rate_limit::RateLimiter;
pub use repair::{parse_or_repair, ParsedResponse};
pub use retry::{RetryError, RetryPolicy};
pub use schema::{BatchExtraction, ChunkMetadata, ExtractionOutcome, FailureReason, RawExtraction};

use ingest::Chunk;
use ontology::{lookup_key, unit_score, CandidateEntity, CandidateRelationship, DEFAULT_SCORE};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Domain recorded for entities when neither the model nor the chunk names one.
pub const FALLBACK_DOMAIN: &str = "general";

/// Turns a batch of chunks into candidate entities and relationships with
/// one completion request.
///
/// Never returns an error: provider failures and unreadable responses come
/// back as [`ExtractionOutcome::Failure`] for the whole batch.
pub struct Extractor {
    client: Arc<dyn CompletionClient>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    system_prompt: String,
    correction_attempts: u32,
}

impl Extractor {
    pub fn new(client: Arc<dyn CompletionClient>, limiter: Arc<RateLimiter>, retry: RetryPolicy) -> Self {
        Self {
            client,
            limiter,
            retry,
            system_prompt: prompt::build_system_prompt(),
            correction_attempts: 0,
        }
    }

    /// After local repair fails, ask the model to fix its own output up to
    /// `attempts` times before giving up on the batch.
    pub fn with_correction_attempts(mut self, attempts: u32) -> Self {
        self.correction_attempts = attempts;
        self
    }

    pub async fn extract_batch(&self, chunks: &[Chunk]) -> BatchExtraction {
        let metadata: Vec<ChunkMetadata> = chunks.iter().map(ChunkMetadata::from).collect();

        if chunks.is_empty() {
            return BatchExtraction {
                chunks: metadata,
                outcome: ExtractionOutcome::Success {
                    entities: Vec::new(),
                    relationships: Vec::new(),
                },
            };
        }

        let prompt = prompt::build_batch_prompt(chunks);
        debug!(
            chunks = chunks.len(),
            estimated_tokens = chunks.iter().map(Chunk::estimated_tokens).sum::<usize>(),
            "Requesting extraction"
        );

        let raw = match self.request(&prompt).await {
            Ok(raw) => raw,
            Err(reason) => {
                warn!(chunks = chunks.len(), reason = %reason, "Extraction degraded to empty result");
                return BatchExtraction::failure(metadata, reason);
            }
        };

        let parsed = match self.parse_response(raw).await {
            Ok(parsed) => parsed,
            Err(reason) => {
                warn!(chunks = chunks.len(), reason = %reason, "Extraction degraded to empty result");
                return BatchExtraction::failure(metadata, reason);
            }
        };

        let raw_extraction = match RawExtraction::from_value(parsed.value) {
            Ok(raw) => raw,
            Err(detail) => {
                let reason = FailureReason::MalformedResponse { detail };
                warn!(chunks = chunks.len(), reason = %reason, "Extraction degraded to empty result");
                return BatchExtraction::failure(metadata, reason);
            }
        };

        if raw_extraction.skipped > 0 {
            debug!(skipped = raw_extraction.skipped, "Skipped unreadable items in response");
        }

        let (entities, relationships) = to_candidates(raw_extraction, chunks);
        debug!(
            chunks = chunks.len(),
            entities = entities.len(),
            relationships = relationships.len(),
            repaired = parsed.repaired,
            "Extracted batch"
        );

        BatchExtraction {
            chunks: metadata,
            outcome: ExtractionOutcome::Success {
                entities,
                relationships,
            },
        }
    }

    /// One logical request: rate limited and retried per the policy.
    async fn request(&self, prompt: &str) -> Result<String, FailureReason> {
        let client = &self.client;
        let limiter = &self.limiter;
        let system = self.system_prompt.as_str();

        self.retry
            .run("completion", ProviderError::is_retryable, move || async move {
                limiter.acquire().await;
                client.complete(system, prompt).await
            })
            .await
            .map_err(|e| match e {
                RetryError::Exhausted { attempts, last_error } => FailureReason::ProviderExhausted {
                    attempts,
                    last_error: last_error.to_string(),
                },
                RetryError::Permanent { error, .. } => FailureReason::Permanent {
                    error: error.to_string(),
                },
            })
    }

    async fn parse_response(&self, mut raw: String) -> Result<ParsedResponse, FailureReason> {
        let mut corrections = 0;
        loop {
            match parse_or_repair(&raw) {
                Ok(parsed) => return Ok(parsed),
                Err(detail) if corrections >= self.correction_attempts => {
                    return Err(FailureReason::MalformedResponse { detail });
                }
                Err(detail) => {
                    corrections += 1;
                    debug!(attempt = corrections, error = %detail, "Asking model to correct its JSON");
                    raw = self.request(&prompt::build_retry_prompt(&raw)).await?;
                }
            }
        }
    }
}

/// Model chunk numbers are 1-based; anything else falls back to the first chunk.
fn chunk_for(chunks: &[Chunk], tag: Option<f64>) -> &Chunk {
    tag.filter(|t| t.fract() == 0.0 && *t >= 1.0 && *t <= chunks.len() as f64)
        .map(|t| &chunks[t as usize - 1])
        .unwrap_or(&chunks[0])
}

/// Attribute each item to a chunk of the batch and fill provenance fields.
fn to_candidates(raw: RawExtraction, chunks: &[Chunk]) -> (Vec<CandidateEntity>, Vec<CandidateRelationship>) {
    let mut entity_chunk: HashMap<String, &Chunk> = HashMap::new();
    let mut entities = Vec::with_capacity(raw.entities.len());

    for entity in raw.entities {
        let chunk = chunk_for(chunks, entity.chunk);
        let name = entity.name.unwrap_or_default();
        entity_chunk.entry(lookup_key(&name)).or_insert(chunk);

        let domain = entity
            .domain
            .filter(|d| !d.trim().is_empty())
            .or_else(|| chunk.domain_hints.first().cloned())
            .unwrap_or_else(|| FALLBACK_DOMAIN.to_string());

        entities.push(CandidateEntity {
            name,
            entity_type: entity.entity_type.unwrap_or_default(),
            description: entity.description.unwrap_or_default(),
            domain,
            relevance_score: unit_score(entity.relevance.map(|v| v as f32).unwrap_or(DEFAULT_SCORE)),
            source_document_id: chunk.source_document_id.clone(),
            position: chunk.position,
        });
    }

    let relationships = raw
        .relationships
        .into_iter()
        .map(|rel| {
            let source_name = rel.source.unwrap_or_default();
            let chunk = match rel.chunk {
                Some(_) => chunk_for(chunks, rel.chunk),
                None => entity_chunk
                    .get(&lookup_key(&source_name))
                    .copied()
                    .unwrap_or(&chunks[0]),
            };

            CandidateRelationship {
                source_name,
                target_name: rel.target.unwrap_or_default(),
                relationship_type: rel.relationship_type.unwrap_or_default(),
                description: rel.description.unwrap_or_default(),
                strength: unit_score(rel.strength.map(|v| v as f32).unwrap_or(DEFAULT_SCORE)),
                context: rel.context.unwrap_or_default(),
                provenance: chunk.chunk_id.clone(),
            }
        })
        .collect();

    (entities, relationships)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replays canned responses in order and counts calls.
    struct ScriptedClient {
        responses: Mutex<VecDeque<Result<String, ProviderError>>>,
        calls: Mutex<u32>,
    }

    impl ScriptedClient {
        fn new(responses: Vec<Result<String, ProviderError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(0),
            })
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl CompletionClient for ScriptedClient {
        async fn complete(&self, _system: &str, _prompt: &str) -> Result<String, ProviderError> {
            *self.calls.lock().unwrap() += 1;
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(ProviderError::Transport("script exhausted".into())))
        }

        fn model(&self) -> &str {
            "scripted"
        }
    }

    fn extractor(client: Arc<ScriptedClient>) -> Extractor {
        Extractor::new(
            client,
            Arc::new(RateLimiter::new(Duration::ZERO)),
            RetryPolicy::new(3, 1, 2),
        )
    }

    fn chunks() -> Vec<Chunk> {
        vec![
            Chunk::new("gof".into(), 1, "The Observer pattern...".into(), vec!["design patterns".into()]),
            Chunk::new("gof".into(), 2, "Single Responsibility...".into(), vec![]),
            Chunk::new("solid".into(), 0, "Each class one reason...".into(), vec![]),
        ]
    }

    const GOOD_RESPONSE: &str = r#"{
        "entities": [
            {"name": "Observer Pattern", "type": "Pattern", "description": "Publish/subscribe", "relevance": 0.9, "chunk": 1},
            {"name": "Single Responsibility Principle", "type": "Principle", "chunk": 3}
        ],
        "relationships": [
            {"source": "Observer Pattern", "target": "Single Responsibility Principle", "type": "helps achieve", "strength": 0.8}
        ]
    }"#;

    #[tokio::test]
    async fn test_successful_extraction_attributes_chunks() {
        let client = ScriptedClient::new(vec![Ok(GOOD_RESPONSE.to_string())]);
        let batch = chunks();

        let result = extractor(client.clone()).extract_batch(&batch).await;

        let ExtractionOutcome::Success { entities, relationships } = &result.outcome else {
            panic!("expected success, got {:?}", result.outcome);
        };
        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].domain, "design patterns");
        assert_eq!(entities[1].source_document_id, "solid");
        assert_eq!(entities[1].domain, FALLBACK_DOMAIN);
        assert_eq!(entities[1].relevance_score, DEFAULT_SCORE);
        // provenance follows the source entity's chunk
        assert_eq!(relationships[0].provenance, batch[0].chunk_id);
        assert_eq!(result.chunks.len(), 3);
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let client = ScriptedClient::new(vec![
            Err(ProviderError::Timeout),
            Err(ProviderError::Throttled),
            Ok(GOOD_RESPONSE.to_string()),
        ]);

        let result = extractor(client.clone()).extract_batch(&chunks()).await;

        assert!(result.success());
        assert_eq!(client.calls(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_degrade_to_failure() {
        let client = ScriptedClient::new(vec![
            Err(ProviderError::Timeout),
            Err(ProviderError::Timeout),
            Err(ProviderError::Timeout),
            Ok(GOOD_RESPONSE.to_string()),
        ]);

        let result = extractor(client.clone()).extract_batch(&chunks()).await;

        assert_eq!(
            result.outcome,
            ExtractionOutcome::Failure {
                reason: FailureReason::ProviderExhausted {
                    attempts: 3,
                    last_error: "request timed out".into()
                }
            }
        );
        assert_eq!(result.chunk_ids().len(), 3);
        assert_eq!(client.calls(), 3);
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let client = ScriptedClient::new(vec![Err(ProviderError::Client { status: 400 })]);

        let result = extractor(client.clone()).extract_batch(&chunks()).await;

        assert!(matches!(
            result.outcome,
            ExtractionOutcome::Failure { reason: FailureReason::Permanent { .. } }
        ));
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn test_malformed_response_degrades_to_failure() {
        let client = ScriptedClient::new(vec![Ok("I found some patterns but no JSON".into())]);

        let result = extractor(client).extract_batch(&chunks()).await;

        assert!(matches!(
            result.outcome,
            ExtractionOutcome::Failure { reason: FailureReason::MalformedResponse { .. } }
        ));
    }

    #[tokio::test]
    async fn test_repairable_response_succeeds() {
        let client = ScriptedClient::new(vec![Ok(
            "```json\n{'entities': [{'name': 'Facade Pattern', 'type': 'Pattern',},], 'relationships': []}\n```".into(),
        )]);

        let result = extractor(client).extract_batch(&chunks()).await;

        let ExtractionOutcome::Success { entities, .. } = result.outcome else {
            panic!("expected success");
        };
        assert_eq!(entities[0].name, "Facade Pattern");
    }

    #[tokio::test]
    async fn test_correction_round_trip() {
        let client = ScriptedClient::new(vec![
            Ok("entities: Observer Pattern".into()),
            Ok(GOOD_RESPONSE.to_string()),
        ]);

        let result = extractor(client.clone())
            .with_correction_attempts(1)
            .extract_batch(&chunks())
            .await;

        assert!(result.success());
        assert_eq!(client.calls(), 2);
    }

    #[tokio::test]
    async fn test_empty_batch_needs_no_request() {
        let client = ScriptedClient::new(vec![]);

        let result = extractor(client.clone()).extract_batch(&[]).await;

        assert!(result.success());
        assert_eq!(client.calls(), 0);
    }
}
