use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use ontology::{CandidateEntity, CandidateRelationship};

/// Provenance of one chunk in an extraction batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkMetadata {
    pub chunk_id: String,
    pub source_document_id: String,
    pub position: usize,
    pub domain_hints: Vec<String>,
}

impl From<&ingest::Chunk> for ChunkMetadata {
    fn from(chunk: &ingest::Chunk) -> Self {
        Self {
            chunk_id: chunk.chunk_id.clone(),
            source_document_id: chunk.source_document_id.clone(),
            position: chunk.position,
            domain_hints: chunk.domain_hints.clone(),
        }
    }
}

/// Why an extraction degraded to an empty result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    #[error("provider failed after {attempts} attempts: {last_error}")]
    ProviderExhausted { attempts: u32, last_error: String },
    #[error("provider rejected the request: {error}")]
    Permanent { error: String },
    #[error("malformed response: {detail}")]
    MalformedResponse { detail: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExtractionOutcome {
    Success {
        entities: Vec<CandidateEntity>,
        relationships: Vec<CandidateRelationship>,
    },
    Failure {
        reason: FailureReason,
    },
}

/// Result of one extraction request. A failure is a normal value, not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchExtraction {
    pub chunks: Vec<ChunkMetadata>,
    pub outcome: ExtractionOutcome,
}

impl BatchExtraction {
    pub fn failure(chunks: Vec<ChunkMetadata>, reason: FailureReason) -> Self {
        Self {
            chunks,
            outcome: ExtractionOutcome::Failure { reason },
        }
    }

    pub fn success(&self) -> bool {
        matches!(self.outcome, ExtractionOutcome::Success { .. })
    }

    pub fn chunk_ids(&self) -> Vec<String> {
        self.chunks.iter().map(|c| c.chunk_id.clone()).collect()
    }
}

// ---------------------------------------------------------------------------
// Model response payload. Field names vary between models, so everything is
// optional and several aliases are accepted.
// ---------------------------------------------------------------------------

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').parse().ok(),
        _ => None,
    }))
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items
                .into_iter()
                .filter_map(|i| i.as_str().map(str::to_string))
                .collect();
            (!parts.is_empty()).then(|| parts.join(", "))
        }
        _ => None,
    }))
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawEntity {
    #[serde(default, deserialize_with = "lenient_string", alias = "label", alias = "concept")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", rename = "type", alias = "entity_type", alias = "category")]
    pub entity_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub domain: Option<String>,
    #[serde(default, deserialize_with = "lenient_number", alias = "relevance_score", alias = "importance")]
    pub relevance: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number", alias = "chunk_index", alias = "chunk_number")]
    pub chunk: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRelationship {
    #[serde(default, deserialize_with = "lenient_string", alias = "source_name", alias = "from")]
    pub source: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", alias = "target_name", alias = "to")]
    pub target: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_string",
        rename = "type",
        alias = "relation",
        alias = "relationship",
        alias = "relationship_type"
    )]
    pub relationship_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient_number", alias = "confidence", alias = "weight")]
    pub strength: Option<f64>,
    #[serde(default, deserialize_with = "lenient_string", alias = "evidence", alias = "quote")]
    pub context: Option<String>,
    #[serde(default, deserialize_with = "lenient_number", alias = "chunk_index", alias = "chunk_number")]
    pub chunk: Option<f64>,
}

/// The two lists pulled out of a parsed response.
#[derive(Debug, Clone, Default)]
pub struct RawExtraction {
    pub entities: Vec<RawEntity>,
    pub relationships: Vec<RawRelationship>,
    /// Entries that were present but could not be read.
    pub skipped: usize,
}

impl RawExtraction {
    /// Accepts `{entities, relationships}` (or `relations`), a bare array of
    /// entities, and entities given as plain name strings. Unreadable entries
    /// are skipped; a root that is neither object nor array is an error.
    pub fn from_value(value: Value) -> Result<Self, String> {
        let (entities, relationships) = match value {
            Value::Object(mut map) => {
                let entities = map.remove("entities").unwrap_or(Value::Null);
                let relationships = map
                    .remove("relationships")
                    .or_else(|| map.remove("relations"))
                    .unwrap_or(Value::Null);
                (entities, relationships)
            }
            Value::Array(items) => (Value::Array(items), Value::Null),
            other => return Err(format!("expected a JSON object, got {}", json_kind(&other))),
        };

        let mut raw = RawExtraction::default();

        for item in into_items(entities) {
            match item {
                Value::String(name) => raw.entities.push(RawEntity {
                    name: Some(name),
                    ..RawEntity::default()
                }),
                other => match serde_json::from_value::<RawEntity>(other) {
                    Ok(entity) => raw.entities.push(entity),
                    Err(_) => raw.skipped += 1,
                },
            }
        }

        for item in into_items(relationships) {
            match serde_json::from_value::<RawRelationship>(item) {
                Ok(relationship) => raw.relationships.push(relationship),
                Err(_) => raw.skipped += 1,
            }
        }

        Ok(raw)
    }
}

fn into_items(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        single => vec![single],
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
