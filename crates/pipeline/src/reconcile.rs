//! Consolidation pass over the entities index.
//!
//! Re-reads every recorded extraction and produces one deduplicated script:
//! entities merged by name, relationships merged by key, and relationships
//! whose endpoints are unknown anywhere in the index dropped.

use anyhow::Result;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use tracing::info;

use index::{write_script, GraphStore, Statement, Upsert};
use ontology::{Entity, Relationship, RelationshipKey};

use crate::context::OutputLayout;
use crate::entities_index::EntitiesIndex;

#[derive(Debug, Default)]
pub struct Consolidated {
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
    pub entities_merged: usize,
    pub relationships_merged: usize,
    pub relationships_dropped: usize,
}

impl Consolidated {
    pub fn upserts(&self) -> Vec<Upsert> {
        self.entities
            .iter()
            .cloned()
            .map(Upsert::Entity)
            .chain(self.relationships.iter().cloned().map(Upsert::Relationship))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileSummary {
    pub chunks: usize,
    pub entities: usize,
    pub relationships: usize,
    pub entities_merged: usize,
    pub relationships_merged: usize,
    pub relationships_dropped: usize,
    pub applied: bool,
}

/// Merge all successful records. First-seen type wins; description is the
/// longest seen and relevance the highest. Relationships keep the strongest.
pub fn consolidate(index: &EntitiesIndex) -> Consolidated {
    let mut out = Consolidated::default();
    let mut entity_slots: BTreeMap<String, usize> = BTreeMap::new();
    let mut rel_slots: BTreeMap<RelationshipKey, usize> = BTreeMap::new();
    let mut relationships: Vec<Relationship> = Vec::new();

    for (_, _, record) in index.records() {
        if !record.success {
            continue;
        }

        for entity in &record.entities {
            match entity_slots.get(&entity.name) {
                Some(&slot) => {
                    let kept = &mut out.entities[slot];
                    if entity.description.len() > kept.description.len() {
                        kept.description = entity.description.clone();
                    }
                    kept.relevance_score = kept.relevance_score.max(entity.relevance_score);
                    out.entities_merged += 1;
                }
                None => {
                    entity_slots.insert(entity.name.clone(), out.entities.len());
                    out.entities.push(entity.clone());
                }
            }
        }

        for rel in &record.relationships {
            let key = rel.key();
            match rel_slots.get(&key) {
                Some(&slot) => {
                    if rel.strength > relationships[slot].strength {
                        relationships[slot] = rel.clone();
                    }
                    out.relationships_merged += 1;
                }
                None => {
                    rel_slots.insert(key, relationships.len());
                    relationships.push(rel.clone());
                }
            }
        }
    }

    let known: HashSet<&str> = out.entities.iter().map(|e| e.name.as_str()).collect();
    let (kept, dropped): (Vec<Relationship>, Vec<Relationship>) = relationships
        .into_iter()
        .partition(|r| known.contains(r.source_name.as_str()) && known.contains(r.target_name.as_str()));

    out.relationships = kept;
    out.relationships_dropped = dropped.len();
    out
}

/// Write the consolidated script and optionally apply it to the store.
pub async fn reconcile(layout: &OutputLayout, store: Option<&dyn GraphStore>) -> Result<ReconcileSummary> {
    let index = EntitiesIndex::open(layout.entities_index()).await;
    let consolidated = consolidate(&index);
    let upserts = consolidated.upserts();

    let statements: Vec<Statement> = upserts.iter().map(Upsert::statement).collect();
    write_script(&layout.consolidated_script(), "Consolidated knowledge graph script", &statements).await?;

    let applied = match store {
        Some(store) => {
            store.apply(&upserts).await?;
            true
        }
        None => false,
    };

    let summary = ReconcileSummary {
        chunks: index.chunk_count(),
        entities: consolidated.entities.len(),
        relationships: consolidated.relationships.len(),
        entities_merged: consolidated.entities_merged,
        relationships_merged: consolidated.relationships_merged,
        relationships_dropped: consolidated.relationships_dropped,
        applied,
    };

    info!(
        chunks = summary.chunks,
        entities = summary.entities,
        relationships = summary.relationships,
        dropped = summary.relationships_dropped,
        applied,
        path = %layout.consolidated_script().display(),
        "Reconciliation complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities_index::{attribute, failed};
    use extract::{ChunkMetadata, FailureReason};
    use index::MemoryGraphStore;
    use ontology::{EntityType, RelationshipType};
    use tempfile::TempDir;

    fn meta(id: &str, position: usize) -> ChunkMetadata {
        ChunkMetadata {
            chunk_id: id.into(),
            source_document_id: "solid".into(),
            position,
            domain_hints: Vec::new(),
        }
    }

    fn entity(name: &str, ty: EntityType, description: &str, relevance: f32, position: usize) -> Entity {
        Entity {
            name: name.into(),
            entity_type: ty,
            description: description.into(),
            domain: "oop".into(),
            relevance_score: relevance,
            source_document_id: "solid".into(),
            position,
        }
    }

    fn rel(source: &str, target: &str, strength: f32, provenance: &str) -> Relationship {
        Relationship {
            source_name: source.into(),
            target_name: target.into(),
            relationship_type: RelationshipType::Supports,
            description: String::new(),
            strength,
            context: String::new(),
            provenance: provenance.into(),
        }
    }

    async fn populated(dir: &TempDir) -> EntitiesIndex {
        let mut index = EntitiesIndex::open(dir.path().join("entities_index.json")).await;

        let first = attribute(
            &[meta("c1", 0)],
            vec![
                entity("Single Responsibility", EntityType::Principle, "short", 0.4, 0),
                entity("Cohesion", EntityType::QualityAttribute, "how related things are", 0.6, 0),
            ],
            vec![rel("Single Responsibility", "Cohesion", 0.6, "c1")],
        );
        let second = attribute(
            &[meta("c2", 1)],
            vec![entity("Single Responsibility", EntityType::Practice, "one reason to change", 0.9, 1)],
            vec![
                rel("Single Responsibility", "Cohesion", 0.9, "c2"),
                rel("Single Responsibility", "Ghost", 0.9, "c2"),
            ],
        );
        let third = failed(&[meta("c3", 2)], &FailureReason::Permanent { error: "400".into() });

        for record in first.into_iter().chain(second).chain(third) {
            index.insert(record);
        }
        index
    }

    #[tokio::test]
    async fn test_consolidate_merges_across_chunks() {
        let dir = TempDir::new().unwrap();
        let index = populated(&dir).await;

        let consolidated = consolidate(&index);

        assert_eq!(consolidated.entities.len(), 2);
        let srp = &consolidated.entities[0];
        assert_eq!(srp.name, "Single Responsibility");
        assert_eq!(srp.entity_type, EntityType::Principle);
        assert_eq!(srp.description, "one reason to change");
        assert!((srp.relevance_score - 0.9).abs() < f32::EPSILON);
        assert_eq!(consolidated.entities_merged, 1);

        assert_eq!(consolidated.relationships.len(), 1);
        assert!((consolidated.relationships[0].strength - 0.9).abs() < f32::EPSILON);
        assert_eq!(consolidated.relationships_dropped, 1);
    }

    #[tokio::test]
    async fn test_reconcile_writes_and_applies() {
        let dir = TempDir::new().unwrap();
        populated(&dir).await.save().await.unwrap();
        let layout = OutputLayout::new(dir.path());
        let store = MemoryGraphStore::new();

        let summary = reconcile(&layout, Some(&store)).await.unwrap();

        assert!(summary.applied);
        assert_eq!(summary.chunks, 3);
        let script = std::fs::read_to_string(layout.consolidated_script()).unwrap();
        assert_eq!(script.matches("MERGE (c:Concept {name: 'Single Responsibility'})").count(), 1);
        assert!(!script.contains("Ghost"));

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.nodes.len(), 2);
        assert_eq!(snapshot.edges.len(), 1);
    }
}
