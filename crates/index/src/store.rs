use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::Mutex;

use ontology::{EntityType, RelationshipKey};

use crate::upsert::Upsert;

/// The graph the pipeline writes into. Uniqueness is enforced here and
/// nowhere else.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// All distinct entity names currently stored.
    async fn entity_names(&self) -> Result<Vec<String>>;

    /// Apply upserts in order.
    async fn apply(&self, upserts: &[Upsert]) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeRecord {
    pub entity_type: String,
    pub description: String,
    pub domain: String,
    pub relevance: f32,
    pub source_document_id: String,
    pub position: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EdgeRecord {
    pub description: String,
    pub strength: f32,
    pub context: String,
    pub teaching_value: u8,
    pub provenance: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphSnapshot {
    pub nodes: BTreeMap<String, NodeRecord>,
    pub edges: BTreeMap<RelationshipKey, EdgeRecord>,
}

impl GraphSnapshot {
    fn placeholder() -> NodeRecord {
        NodeRecord {
            entity_type: EntityType::DEFAULT.as_str().to_string(),
            description: String::new(),
            domain: String::new(),
            relevance: 0.0,
            source_document_id: String::new(),
            position: 0,
        }
    }

    fn apply(&mut self, upsert: &Upsert) {
        match upsert {
            Upsert::Entity(entity) => {
                self.nodes.insert(
                    entity.name.clone(),
                    NodeRecord {
                        entity_type: entity.entity_type.as_str().to_string(),
                        description: entity.description.clone(),
                        domain: entity.domain.clone(),
                        relevance: entity.relevance_score,
                        source_document_id: entity.source_document_id.clone(),
                        position: entity.position,
                    },
                );
            }
            Upsert::Relationship(rel) => {
                self.nodes
                    .entry(rel.source_name.clone())
                    .or_insert_with(Self::placeholder);
                self.nodes
                    .entry(rel.target_name.clone())
                    .or_insert_with(Self::placeholder);
                self.edges.insert(
                    rel.key(),
                    EdgeRecord {
                        description: rel.description.clone(),
                        strength: rel.strength,
                        context: rel.context.clone(),
                        teaching_value: rel.relationship_type.spec().teaching_value,
                        provenance: rel.provenance.clone(),
                    },
                );
            }
        }
    }
}

/// Graph store held in memory with the same merge semantics as the Cypher
/// statements. Used for dry runs.
#[derive(Debug, Default)]
pub struct MemoryGraphStore {
    graph: Mutex<GraphSnapshot>,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> GraphSnapshot {
        self.graph.lock().await.clone()
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn entity_names(&self) -> Result<Vec<String>> {
        Ok(self.graph.lock().await.nodes.keys().cloned().collect())
    }

    async fn apply(&self, upserts: &[Upsert]) -> Result<()> {
        let mut graph = self.graph.lock().await;
        for upsert in upserts {
            graph.apply(upsert);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ontology::{Entity, Relationship, RelationshipType};

    fn entity(name: &str, description: &str) -> Upsert {
        Upsert::Entity(Entity {
            name: name.into(),
            entity_type: EntityType::Pattern,
            description: description.into(),
            domain: "design".into(),
            relevance_score: 0.9,
            source_document_id: "gof".into(),
            position: 1,
        })
    }

    fn supports(source: &str, target: &str) -> Upsert {
        Upsert::Relationship(Relationship {
            source_name: source.into(),
            target_name: target.into(),
            relationship_type: RelationshipType::Supports,
            description: String::new(),
            strength: 0.8,
            context: String::new(),
            provenance: "c1".into(),
        })
    }

    #[tokio::test]
    async fn test_replay_is_idempotent() {
        let upserts = vec![
            entity("Observer Pattern", "pub/sub"),
            supports("Observer Pattern", "Loose Coupling"),
        ];

        let once = MemoryGraphStore::new();
        once.apply(&upserts).await.unwrap();

        let twice = MemoryGraphStore::new();
        twice.apply(&upserts).await.unwrap();
        twice.apply(&upserts).await.unwrap();

        assert_eq!(once.snapshot().await, twice.snapshot().await);
    }

    #[tokio::test]
    async fn test_order_independent_convergence() {
        let a = MemoryGraphStore::new();
        a.apply(&[supports("Observer Pattern", "Loose Coupling"), entity("Observer Pattern", "pub/sub")])
            .await
            .unwrap();

        let b = MemoryGraphStore::new();
        b.apply(&[entity("Observer Pattern", "pub/sub"), supports("Observer Pattern", "Loose Coupling")])
            .await
            .unwrap();

        assert_eq!(a.snapshot().await, b.snapshot().await);
    }

    #[tokio::test]
    async fn test_relationship_creates_placeholder_endpoints() {
        let store = MemoryGraphStore::new();
        store.apply(&[supports("A", "B")]).await.unwrap();

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.nodes["B"].entity_type, "DomainConcept");
        assert_eq!(store.entity_names().await.unwrap(), vec!["A".to_string(), "B".to_string()]);
    }

    #[tokio::test]
    async fn test_entity_refresh_is_last_write_wins() {
        let store = MemoryGraphStore::new();
        store.apply(&[entity("Observer Pattern", "old"), entity("Observer Pattern", "new")])
            .await
            .unwrap();

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.nodes.len(), 1);
        assert_eq!(snapshot.nodes["Observer Pattern"].description, "new");
    }
}
