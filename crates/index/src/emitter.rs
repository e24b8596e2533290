use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, warn};

use ontology::{Entity, Relationship};

use crate::dedup::DeduplicationIndex;
use crate::script::IncrementalScript;
use crate::store::GraphStore;
use crate::upsert::{Statement, Upsert};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmitReport {
    pub entities_new: usize,
    pub entities_known: usize,
    pub relationships: usize,
    pub statements: usize,
}

/// Turns a validated batch into upserts, appends them to the incremental
/// script and applies them to the graph store.
pub struct GraphEmitter {
    store: Arc<dyn GraphStore>,
    script: Option<Arc<IncrementalScript>>,
}

impl GraphEmitter {
    pub fn new(store: Arc<dyn GraphStore>, script: Option<Arc<IncrementalScript>>) -> Self {
        Self { store, script }
    }

    /// Every accepted entity and relationship is upserted; the `MERGE`
    /// keys make repeats harmless. The dedup index only decides which
    /// entities count as new, and is updated once the batch has persisted.
    pub async fn emit_batch(
        &self,
        label: &str,
        entities: &[Entity],
        relationships: &[Relationship],
        dedup: &DeduplicationIndex,
    ) -> Result<EmitReport> {
        let mut report = EmitReport::default();
        let mut upserts = Vec::with_capacity(entities.len() + relationships.len());

        upserts.extend(entities.iter().cloned().map(Upsert::Entity));
        upserts.extend(relationships.iter().cloned().map(Upsert::Relationship));
        report.relationships = relationships.len();
        report.statements = upserts.len();

        if upserts.is_empty() {
            return Ok(report);
        }

        if let Err(e) = self.persist(label, &upserts).await {
            warn!(batch = label, error = %e, "Batch persistence failed");
            return Err(e);
        }

        for entity in entities {
            if dedup.mark_emitted(&entity.name) {
                report.entities_new += 1;
            } else {
                report.entities_known += 1;
            }
        }

        debug!(
            batch = label,
            entities_new = report.entities_new,
            entities_known = report.entities_known,
            relationships = report.relationships,
            "Batch emitted"
        );
        Ok(report)
    }

    async fn persist(&self, label: &str, upserts: &[Upsert]) -> Result<()> {
        if let Some(script) = &self.script {
            let statements: Vec<Statement> = upserts.iter().map(Upsert::statement).collect();
            script.append_batch(label, &statements).await?;
        }
        self.store.apply(upserts).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryGraphStore;
    use async_trait::async_trait;
    use ontology::{EntityType, RelationshipType};
    use tempfile::TempDir;

    fn entity(name: &str) -> Entity {
        Entity {
            name: name.into(),
            entity_type: EntityType::Pattern,
            description: "a reusable solution".into(),
            domain: "design".into(),
            relevance_score: 0.8,
            source_document_id: "gof".into(),
            position: 0,
        }
    }

    fn rel(source: &str, target: &str) -> Relationship {
        Relationship {
            source_name: source.into(),
            target_name: target.into(),
            relationship_type: RelationshipType::Supports,
            description: String::new(),
            strength: 0.7,
            context: String::new(),
            provenance: "c1".into(),
        }
    }

    struct FailingStore;

    #[async_trait]
    impl GraphStore for FailingStore {
        async fn entity_names(&self) -> Result<Vec<String>> {
            Ok(Vec::new())
        }

        async fn apply(&self, _upserts: &[Upsert]) -> Result<()> {
            anyhow::bail!("database unavailable")
        }
    }

    #[tokio::test]
    async fn test_known_entities_are_refreshed_but_not_counted() {
        let dir = TempDir::new().unwrap();
        let script = Arc::new(IncrementalScript::new(dir.path().join("g.cypher")));
        let store = Arc::new(MemoryGraphStore::new());
        let emitter = GraphEmitter::new(store.clone(), Some(script.clone()));
        let dedup = DeduplicationIndex::new();

        let first = emitter
            .emit_batch("batch 1", &[entity("Observer"), entity("Loose Coupling")], &[rel("Observer", "Loose Coupling")], &dedup)
            .await
            .unwrap();
        assert_eq!(first.entities_new, 2);
        assert_eq!(first.statements, 3);

        let second = emitter
            .emit_batch("batch 2", &[entity("Observer")], &[rel("Observer", "Loose Coupling")], &dedup)
            .await
            .unwrap();
        assert_eq!(second.entities_new, 0);
        assert_eq!(second.entities_known, 1);
        assert_eq!(second.relationships, 1);

        let text = std::fs::read_to_string(script.path()).unwrap();
        assert_eq!(text.matches("MERGE (c:Concept {name: 'Observer'})").count(), 2);
        assert_eq!(store.snapshot().await.edges.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_persist_leaves_names_new() {
        let emitter = GraphEmitter::new(Arc::new(FailingStore), None);
        let dedup = DeduplicationIndex::new();

        let result = emitter.emit_batch("batch 1", &[entity("Observer")], &[], &dedup).await;

        assert!(result.is_err());
        assert!(dedup.is_new("Observer"));
    }

    #[tokio::test]
    async fn test_name_known_elsewhere_still_gets_properties() {
        let store = Arc::new(MemoryGraphStore::new());
        let emitter = GraphEmitter::new(store.clone(), None);

        // another batch has already claimed "Observer" but never persisted it
        let dedup = DeduplicationIndex::new();
        assert!(dedup.mark_emitted("Observer"));

        emitter
            .emit_batch("batch 2", &[entity("Observer"), entity("Mediator")], &[rel("Observer", "Mediator")], &dedup)
            .await
            .unwrap();

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.nodes["Observer"].entity_type, "Pattern");
        assert_eq!(snapshot.nodes["Observer"].description, "a reusable solution");

        // a later run seeded from the store re-emits the name and still converges
        let resumed = DeduplicationIndex::new();
        resumed.seed(store.as_ref()).await.unwrap();
        let report = emitter
            .emit_batch("batch 1 retry", &[entity("Observer"), entity("Loose Coupling")], &[rel("Observer", "Loose Coupling")], &resumed)
            .await
            .unwrap();

        assert_eq!(report.entities_new, 1);
        assert_eq!(store.snapshot().await.nodes["Observer"].entity_type, "Pattern");
    }

    #[tokio::test]
    async fn test_empty_batch_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let script = Arc::new(IncrementalScript::new(dir.path().join("g.cypher")));
        let emitter = GraphEmitter::new(Arc::new(MemoryGraphStore::new()), Some(script.clone()));

        let report = emitter
            .emit_batch("batch 1", &[], &[], &DeduplicationIndex::new())
            .await
            .unwrap();

        assert_eq!(report, EmitReport::default());
        assert!(!script.path().exists());
    }
}
