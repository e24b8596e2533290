//! Graph persistence: idempotent upserts, the deduplication index, graph
//! stores and the Cypher script outputs.

pub mod dedup;
pub mod emitter;
pub mod neo4j_index;
pub mod script;
pub mod store;
pub mod upsert;

pub use dedup::DeduplicationIndex;
pub use emitter::{EmitReport, GraphEmitter};
pub use neo4j_index::Neo4jGraphStore;
pub use script::{write_atomic, write_script, IncrementalScript};
pub use store::{GraphSnapshot, GraphStore, MemoryGraphStore};
pub use upsert::{Param, Statement, Upsert, NODE_LABEL, SCHEMA_STATEMENTS};
