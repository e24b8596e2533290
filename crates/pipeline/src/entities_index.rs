//! Per-chunk record of what extraction produced, keyed by document then chunk.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::warn;

use extract::{ChunkMetadata, FailureReason};
use ontology::{Entity, Relationship};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkExtractionRecord {
    pub position: usize,
    pub success: bool,
    #[serde(default)]
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<FailureReason>,
    pub extracted_at: DateTime<Utc>,
}

/// A record ready to be merged into the index.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub source_document_id: String,
    pub chunk_id: String,
    pub record: ChunkExtractionRecord,
}

/// Split a batch's accepted items back onto the chunks they came from.
///
/// Entities are matched by `(source_document_id, position)`, relationships by
/// provenance chunk id. Anything unmatched lands on the first chunk.
pub fn attribute(
    chunks: &[ChunkMetadata],
    entities: Vec<Entity>,
    relationships: Vec<Relationship>,
) -> Vec<ChunkRecord> {
    let now = Utc::now();
    let mut records: Vec<ChunkRecord> = chunks
        .iter()
        .map(|chunk| ChunkRecord {
            source_document_id: chunk.source_document_id.clone(),
            chunk_id: chunk.chunk_id.clone(),
            record: ChunkExtractionRecord {
                position: chunk.position,
                success: true,
                entities: Vec::new(),
                relationships: Vec::new(),
                error: None,
                extracted_at: now,
            },
        })
        .collect();

    if records.is_empty() {
        return records;
    }

    for entity in entities {
        let slot = chunks
            .iter()
            .position(|c| c.source_document_id == entity.source_document_id && c.position == entity.position)
            .unwrap_or(0);
        records[slot].record.entities.push(entity);
    }
    for rel in relationships {
        let slot = chunks
            .iter()
            .position(|c| c.chunk_id == rel.provenance)
            .unwrap_or(0);
        records[slot].record.relationships.push(rel);
    }

    records
}

pub fn failed(chunks: &[ChunkMetadata], reason: &FailureReason) -> Vec<ChunkRecord> {
    let now = Utc::now();
    chunks
        .iter()
        .map(|chunk| ChunkRecord {
            source_document_id: chunk.source_document_id.clone(),
            chunk_id: chunk.chunk_id.clone(),
            record: ChunkExtractionRecord {
                position: chunk.position,
                success: false,
                entities: Vec::new(),
                relationships: Vec::new(),
                error: Some(reason.clone()),
                extracted_at: now,
            },
        })
        .collect()
}

type Documents = BTreeMap<String, BTreeMap<String, ChunkExtractionRecord>>;

pub struct EntitiesIndex {
    path: PathBuf,
    documents: Documents,
}

impl EntitiesIndex {
    /// Open the index file; a corrupt file is logged and replaced on next save.
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let documents = match tokio::fs::read_to_string(&path).await {
            Ok(text) => match serde_json::from_str::<Documents>(&text) {
                Ok(documents) => documents,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Entities index corrupt, starting empty");
                    Documents::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Documents::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Entities index unreadable, starting empty");
                Documents::new()
            }
        };
        Self { path, documents }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn insert(&mut self, record: ChunkRecord) {
        self.documents
            .entry(record.source_document_id)
            .or_default()
            .insert(record.chunk_id, record.record);
    }

    pub fn get(&self, source_document_id: &str, chunk_id: &str) -> Option<&ChunkExtractionRecord> {
        self.documents.get(source_document_id)?.get(chunk_id)
    }

    pub fn chunk_count(&self) -> usize {
        self.documents.values().map(BTreeMap::len).sum()
    }

    /// Records in document order, then by position within each document.
    pub fn records(&self) -> Vec<(&str, &str, &ChunkExtractionRecord)> {
        let mut out = Vec::with_capacity(self.chunk_count());
        for (doc, chunks) in &self.documents {
            let mut sorted: Vec<_> = chunks.iter().collect();
            sorted.sort_by(|a, b| a.1.position.cmp(&b.1.position).then_with(|| a.0.cmp(b.0)));
            out.extend(sorted.into_iter().map(|(id, record)| (doc.as_str(), id.as_str(), record)));
        }
        out
    }

    pub async fn save(&self) -> Result<()> {
        let json = serde_json::to_vec_pretty(&self.documents).context("Failed to serialize entities index")?;
        index::write_atomic(&self.path, &json)
            .await
            .with_context(|| format!("Failed to save entities index {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ontology::{EntityType, RelationshipType};
    use tempfile::TempDir;

    fn meta(id: &str, position: usize) -> ChunkMetadata {
        ChunkMetadata {
            chunk_id: id.into(),
            source_document_id: "gof".into(),
            position,
            domain_hints: Vec::new(),
        }
    }

    fn entity(name: &str, position: usize) -> Entity {
        Entity {
            name: name.into(),
            entity_type: EntityType::Pattern,
            description: "a pattern".into(),
            domain: "design".into(),
            relevance_score: 0.5,
            source_document_id: "gof".into(),
            position,
        }
    }

    #[test]
    fn test_attribute_splits_by_chunk() {
        let chunks = vec![meta("c1", 0), meta("c2", 1)];
        let rel = Relationship {
            source_name: "Observer".into(),
            target_name: "Strategy".into(),
            relationship_type: RelationshipType::AlternativeTo,
            description: String::new(),
            strength: 0.6,
            context: String::new(),
            provenance: "c2".into(),
        };

        let records = attribute(&chunks, vec![entity("Observer", 0), entity("Strategy", 1), entity("Stray", 9)], vec![rel]);

        assert_eq!(records[0].record.entities.len(), 2);
        assert_eq!(records[1].record.entities[0].name, "Strategy");
        assert_eq!(records[1].record.relationships.len(), 1);
        assert!(records.iter().all(|r| r.record.success));
    }

    #[tokio::test]
    async fn test_save_and_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("entities_index.json");

        let mut index = EntitiesIndex::open(&path).await;
        let reason = FailureReason::MalformedResponse { detail: "eof".into() };
        for record in failed(&[meta("c1", 0)], &reason) {
            index.insert(record);
        }
        for record in attribute(&[meta("c2", 1)], vec![entity("Observer", 1)], Vec::new()) {
            index.insert(record);
        }
        index.save().await.unwrap();

        let reopened = EntitiesIndex::open(&path).await;
        assert_eq!(reopened.chunk_count(), 2);
        assert!(!reopened.get("gof", "c1").unwrap().success);
        assert_eq!(reopened.get("gof", "c1").unwrap().error, Some(reason));
        assert_eq!(reopened.get("gof", "c2").unwrap().entities[0].name, "Observer");

        let order: Vec<&str> = reopened.records().into_iter().map(|(_, id, _)| id).collect();
        assert_eq!(order, vec!["c1", "c2"]);
    }

    #[tokio::test]
    async fn test_corrupt_index_opens_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("entities_index.json");
        std::fs::write(&path, "[[[").unwrap();

        assert_eq!(EntitiesIndex::open(&path).await.chunk_count(), 0);
    }
}
