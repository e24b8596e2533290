//! Closed domain ontology for extracted concepts.
//!
//! The vocabularies, keyword inference and validator here are pure and do
//! no IO, so the whole crate is testable without a model or a database.

pub mod candidate;
pub mod inference;
pub mod normalizer;
pub mod validator;
pub mod vocabulary;

pub use candidate::{
    unit_score, CandidateEntity, CandidateRelationship, Entity, Relationship, RelationshipKey,
    DEFAULT_SCORE,
};
pub use inference::{
    infer_entity_type, parse_entity_type, parse_relationship_type, remap_relationship_type,
    resolve_entity_type, resolve_relationship_type, Resolution,
};
pub use normalizer::{canonical_name, lookup_key};
pub use validator::{OntologyValidator, Rejection, ValidationReport, Validated};
pub use vocabulary::{EntityType, RelationshipSpec, RelationshipType, MIN_DESCRIPTION_CHARS};
