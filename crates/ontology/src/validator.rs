use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

use crate::candidate::{
    unit_score, CandidateEntity, CandidateRelationship, Entity, Relationship, RelationshipKey,
};
use crate::inference::{resolve_entity_type, resolve_relationship_type, Resolution};
use crate::normalizer::{canonical_name, lookup_key};
use crate::vocabulary::MIN_DESCRIPTION_CHARS;

/// Why a candidate was dropped. Rejections are expected and not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    EmptyName,
    SelfLoop,
    UnknownEndpoint,
    BelowMinStrength,
    MissingDescription,
}

/// Per-batch counters of what the validator changed or dropped.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub entities_rejected: usize,
    pub entities_merged: usize,
    pub entity_types_inferred: usize,
    pub entity_types_defaulted: usize,
    pub relationships_rejected: usize,
    pub relationships_merged: usize,
    pub relationship_types_remapped: usize,
    pub relationship_types_defaulted: usize,
    pub self_loops: usize,
    pub unknown_endpoints: usize,
    pub below_min_strength: usize,
    pub missing_descriptions: usize,
}

impl ValidationReport {
    fn reject_relationship(&mut self, reason: Rejection) {
        self.relationships_rejected += 1;
        match reason {
            Rejection::SelfLoop => self.self_loops += 1,
            Rejection::UnknownEndpoint => self.unknown_endpoints += 1,
            Rejection::BelowMinStrength => self.below_min_strength += 1,
            Rejection::MissingDescription => self.missing_descriptions += 1,
            Rejection::EmptyName => {}
        }
    }

    pub fn merge(&mut self, other: &ValidationReport) {
        self.entities_rejected += other.entities_rejected;
        self.entities_merged += other.entities_merged;
        self.entity_types_inferred += other.entity_types_inferred;
        self.entity_types_defaulted += other.entity_types_defaulted;
        self.relationships_rejected += other.relationships_rejected;
        self.relationships_merged += other.relationships_merged;
        self.relationship_types_remapped += other.relationship_types_remapped;
        self.relationship_types_defaulted += other.relationship_types_defaulted;
        self.self_loops += other.self_loops;
        self.unknown_endpoints += other.unknown_endpoints;
        self.below_min_strength += other.below_min_strength;
        self.missing_descriptions += other.missing_descriptions;
    }
}

#[derive(Debug, Clone, Default)]
pub struct Validated {
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
    pub report: ValidationReport,
}

/// Checks one batch of candidates against the closed vocabularies.
///
/// Stateless: the result depends only on the inputs and the static tables.
#[derive(Debug, Clone, Copy, Default)]
pub struct OntologyValidator;

impl OntologyValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate(
        &self,
        candidate_entities: Vec<CandidateEntity>,
        candidate_relationships: Vec<CandidateRelationship>,
    ) -> Validated {
        let mut report = ValidationReport::default();

        let entities = self.validate_entities(candidate_entities, &mut report);

        // Endpoints may only reference entities accepted from this batch
        let known: HashMap<String, &str> = entities
            .iter()
            .map(|e| (lookup_key(&e.name), e.name.as_str()))
            .collect();

        let relationships = self.validate_relationships(candidate_relationships, &known, &mut report);

        Validated {
            entities,
            relationships,
            report,
        }
    }

    fn validate_entities(
        &self,
        candidates: Vec<CandidateEntity>,
        report: &mut ValidationReport,
    ) -> Vec<Entity> {
        let mut accepted: Vec<Entity> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for candidate in candidates {
            let name = canonical_name(&candidate.name);
            if name.is_empty() {
                debug!(rejection = ?Rejection::EmptyName, "Dropping entity");
                report.entities_rejected += 1;
                continue;
            }

            let key = lookup_key(&name);
            if let Some(&i) = index.get(&key) {
                // Same concept named twice in the batch: first type wins
                let existing = &mut accepted[i];
                if candidate.description.trim().len() > existing.description.len() {
                    existing.description = candidate.description.trim().to_string();
                }
                existing.relevance_score = existing
                    .relevance_score
                    .max(unit_score(candidate.relevance_score));
                report.entities_merged += 1;
                continue;
            }

            let (entity_type, resolution) =
                resolve_entity_type(&candidate.entity_type, &name, &candidate.description);
            match resolution {
                Resolution::Exact => {}
                Resolution::Inferred => {
                    debug!(entity = %name, label = %candidate.entity_type, inferred = %entity_type, "Inferred entity type");
                    report.entity_types_inferred += 1;
                }
                Resolution::Defaulted => {
                    debug!(entity = %name, label = %candidate.entity_type, "Defaulted entity type");
                    report.entity_types_defaulted += 1;
                }
            }

            index.insert(key, accepted.len());
            accepted.push(Entity {
                name,
                entity_type,
                description: candidate.description.trim().to_string(),
                domain: candidate.domain,
                relevance_score: unit_score(candidate.relevance_score),
                source_document_id: candidate.source_document_id,
                position: candidate.position,
            });
        }

        accepted
    }

    fn validate_relationships(
        &self,
        candidates: Vec<CandidateRelationship>,
        known: &HashMap<String, &str>,
        report: &mut ValidationReport,
    ) -> Vec<Relationship> {
        let mut accepted: Vec<Relationship> = Vec::new();
        let mut index: HashMap<RelationshipKey, usize> = HashMap::new();

        for candidate in candidates {
            match self.check_relationship(&candidate, known, report) {
                Ok(mut relationship) => {
                    relationship.canonicalize_direction();
                    let key = relationship.key();
                    if let Some(&i) = index.get(&key) {
                        if relationship.strength > accepted[i].strength {
                            accepted[i] = relationship;
                        }
                        report.relationships_merged += 1;
                    } else {
                        index.insert(key, accepted.len());
                        accepted.push(relationship);
                    }
                }
                Err(reason) => {
                    debug!(
                        source = %candidate.source_name,
                        target = %candidate.target_name,
                        label = %candidate.relationship_type,
                        rejection = ?reason,
                        "Dropping relationship"
                    );
                    report.reject_relationship(reason);
                }
            }
        }

        accepted
    }

    /// Rules run in a fixed order; the first failing rule is the rejection reason.
    fn check_relationship(
        &self,
        candidate: &CandidateRelationship,
        known: &HashMap<String, &str>,
        report: &mut ValidationReport,
    ) -> Result<Relationship, Rejection> {
        let source_key = lookup_key(&candidate.source_name);
        let target_key = lookup_key(&candidate.target_name);

        if source_key == target_key {
            return Err(Rejection::SelfLoop);
        }

        let (Some(source_name), Some(target_name)) = (known.get(&source_key), known.get(&target_key))
        else {
            return Err(Rejection::UnknownEndpoint);
        };

        let (relationship_type, resolution) = resolve_relationship_type(&candidate.relationship_type);
        match resolution {
            Resolution::Exact => {}
            Resolution::Inferred => report.relationship_types_remapped += 1,
            Resolution::Defaulted => report.relationship_types_defaulted += 1,
        }

        let spec = relationship_type.spec();
        let strength = unit_score(candidate.strength);
        if strength < spec.min_strength {
            return Err(Rejection::BelowMinStrength);
        }

        let description = candidate.description.trim();
        if spec.requires_description && description.chars().count() < MIN_DESCRIPTION_CHARS {
            return Err(Rejection::MissingDescription);
        }

        Ok(Relationship {
            source_name: source_name.to_string(),
            target_name: target_name.to_string(),
            relationship_type,
            description: description.to_string(),
            strength,
            context: candidate.context.trim().to_string(),
            provenance: candidate.provenance.clone(),
        })
    }
}
