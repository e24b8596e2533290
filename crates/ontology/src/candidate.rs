use serde::{Deserialize, Serialize};

use crate::vocabulary::{EntityType, RelationshipType};

/// Score used when the model omits or garbles a relevance/strength value.
pub const DEFAULT_SCORE: f32 = 0.5;

/// Clamp a model-provided score into `[0, 1]`; non-finite values become the default.
pub fn unit_score(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        DEFAULT_SCORE
    }
}

/// An entity as extracted, before its type is checked against the vocabulary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidateEntity {
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub description: String,
    pub domain: String,
    pub relevance_score: f32,
    pub source_document_id: String,
    pub position: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidateRelationship {
    pub source_name: String,
    pub target_name: String,
    #[serde(rename = "type")]
    pub relationship_type: String,
    pub description: String,
    pub strength: f32,
    pub context: String,
    /// Chunk the relationship was read from.
    pub provenance: String,
}

/// An accepted entity. `name` is canonical and is the graph key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Entity {
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub description: String,
    pub domain: String,
    pub relevance_score: f32,
    pub source_document_id: String,
    pub position: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Relationship {
    pub source_name: String,
    pub target_name: String,
    #[serde(rename = "type")]
    pub relationship_type: RelationshipType,
    pub description: String,
    pub strength: f32,
    pub context: String,
    pub provenance: String,
}

/// Upsert identity of a relationship.
pub type RelationshipKey = (String, String, RelationshipType);

impl Relationship {
    pub fn key(&self) -> RelationshipKey {
        (
            self.source_name.clone(),
            self.target_name.clone(),
            self.relationship_type,
        )
    }

    /// Bidirectional types store their endpoints in lexicographic order so
    /// `A-B` and `B-A` share one key.
    pub fn canonicalize_direction(&mut self) {
        if self.relationship_type.spec().bidirectional && self.source_name > self.target_name {
            std::mem::swap(&mut self.source_name, &mut self.target_name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_score() {
        assert_eq!(unit_score(1.7), 1.0);
        assert_eq!(unit_score(-0.2), 0.0);
        assert_eq!(unit_score(0.42), 0.42);
        assert_eq!(unit_score(f32::NAN), DEFAULT_SCORE);
    }

    #[test]
    fn test_bidirectional_direction_is_canonical() {
        let mut rel = Relationship {
            source_name: "Microservices".into(),
            target_name: "Monolith".into(),
            relationship_type: RelationshipType::AlternativeTo,
            description: String::new(),
            strength: 0.8,
            context: String::new(),
            provenance: String::new(),
        };
        let mut reversed = rel.clone();
        std::mem::swap(&mut reversed.source_name, &mut reversed.target_name);

        rel.canonicalize_direction();
        reversed.canonicalize_direction();

        assert_eq!(rel.key(), reversed.key());
    }

    #[test]
    fn test_directed_types_keep_direction() {
        let mut rel = Relationship {
            source_name: "Observer Pattern".into(),
            target_name: "Loose Coupling".into(),
            relationship_type: RelationshipType::Supports,
            description: String::new(),
            strength: 0.8,
            context: String::new(),
            provenance: String::new(),
        };
        rel.canonicalize_direction();

        assert_eq!(rel.source_name, "Observer Pattern");
    }
}
