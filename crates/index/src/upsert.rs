//! Idempotent upsert statements.
//!
//! Every statement is a `MERGE` keyed by a stable identity, so replaying a
//! statement any number of times, in any order, converges to the same graph.

use ontology::{Entity, EntityType, Relationship};

/// Label of every concept node.
pub const NODE_LABEL: &str = "Concept";

/// Statements written once at the top of every script.
pub const SCHEMA_STATEMENTS: [&str; 2] = [
    "CREATE CONSTRAINT concept_name IF NOT EXISTS FOR (c:Concept) REQUIRE c.name IS UNIQUE",
    "CREATE INDEX concept_type IF NOT EXISTS FOR (c:Concept) ON (c.type)",
];

#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Str(String),
    Float(f64),
    Int(i64),
}

impl Param {
    /// Cypher literal for script output.
    pub fn literal(&self) -> String {
        match self {
            Param::Str(s) => format!("'{}'", escape(s)),
            Param::Float(f) => format!("{:.3}", f),
            Param::Int(i) => i.to_string(),
        }
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out
}

/// A parameterised Cypher statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub cypher: String,
    pub params: Vec<(&'static str, Param)>,
}

impl Statement {
    /// Inline the parameters as literals, producing a standalone `;`-terminated statement.
    pub fn to_script(&self) -> String {
        // Single pass, so `$` inside substituted values is never expanded again
        let mut text = String::with_capacity(self.cypher.len() * 2);
        let mut chars = self.cypher.chars().peekable();

        while let Some(c) = chars.next() {
            if c != '$' {
                text.push(c);
                continue;
            }
            let mut name = String::new();
            while let Some(&next) = chars.peek() {
                if next.is_ascii_alphanumeric() || next == '_' {
                    name.push(next);
                    chars.next();
                } else {
                    break;
                }
            }
            match self.params.iter().find(|(param, _)| *param == name) {
                Some((_, value)) => text.push_str(&value.literal()),
                None => {
                    text.push('$');
                    text.push_str(&name);
                }
            }
        }

        format!("{};", text.trim())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Upsert {
    /// Keyed by `name`: create if absent, otherwise refresh properties.
    Entity(Entity),
    /// Keyed by `(source_name, target_name, type)`; endpoints are merged first.
    Relationship(Relationship),
}

impl Upsert {
    pub fn statement(&self) -> Statement {
        match self {
            Upsert::Entity(entity) => Statement {
                cypher: format!(
                    "MERGE (c:{NODE_LABEL} {{name: $name}})
ON CREATE SET c.created_at = timestamp()
SET c.type = $type, c.description = $description, c.domain = $domain, c.relevance = $relevance, c.source_document_id = $source_document_id, c.position = $position"
                ),
                params: vec![
                    ("name", Param::Str(entity.name.clone())),
                    ("type", Param::Str(entity.entity_type.as_str().to_string())),
                    ("description", Param::Str(entity.description.clone())),
                    ("domain", Param::Str(entity.domain.clone())),
                    ("relevance", Param::Float(entity.relevance_score as f64)),
                    ("source_document_id", Param::Str(entity.source_document_id.clone())),
                    ("position", Param::Int(entity.position as i64)),
                ],
            },
            Upsert::Relationship(rel) => {
                let spec = rel.relationship_type.spec();
                // The type comes from a closed enum, so it is safe to inline as a label
                Statement {
                    cypher: format!(
                        "MERGE (s:{NODE_LABEL} {{name: $source}})
ON CREATE SET s.type = '{placeholder}', s.created_at = timestamp()
MERGE (t:{NODE_LABEL} {{name: $target}})
ON CREATE SET t.type = '{placeholder}', t.created_at = timestamp()
MERGE (s)-[r:{rel_type}]->(t)
SET r.description = $description, r.strength = $strength, r.context = $context, r.teaching_value = $teaching_value, r.provenance = $provenance",
                        placeholder = EntityType::DEFAULT.as_str(),
                        rel_type = rel.relationship_type.as_str(),
                    ),
                    params: vec![
                        ("source", Param::Str(rel.source_name.clone())),
                        ("target", Param::Str(rel.target_name.clone())),
                        ("description", Param::Str(rel.description.clone())),
                        ("strength", Param::Float(rel.strength as f64)),
                        ("context", Param::Str(rel.context.clone())),
                        ("teaching_value", Param::Int(spec.teaching_value as i64)),
                        ("provenance", Param::Str(rel.provenance.clone())),
                    ],
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ontology::RelationshipType;

    fn entity() -> Entity {
        Entity {
            name: "Liskov's Substitution".into(),
            entity_type: EntityType::Principle,
            description: "Subtypes must be\nsubstitutable".into(),
            domain: "oop".into(),
            relevance_score: 0.75,
            source_document_id: "solid".into(),
            position: 4,
        }
    }

    #[test]
    fn test_entity_script_escapes_literals() {
        let script = Upsert::Entity(entity()).statement().to_script();

        assert!(script.starts_with("MERGE (c:Concept {name: 'Liskov\\'s Substitution'})"));
        assert!(script.contains("c.description = 'Subtypes must be\\nsubstitutable'"));
        assert!(script.contains("c.relevance = 0.750"));
        assert!(script.contains("c.source_document_id = 'solid'"));
        assert!(script.contains("c.position = 4"));
        assert!(script.ends_with(';'));
        assert!(!script.contains('$'));
    }

    #[test]
    fn test_relationship_statement_uses_type_label() {
        let rel = Relationship {
            source_name: "Observer Pattern".into(),
            target_name: "Loose Coupling".into(),
            relationship_type: RelationshipType::Supports,
            description: String::new(),
            strength: 0.8,
            context: "observers are decoupled".into(),
            provenance: "abc".into(),
        };

        let statement = Upsert::Relationship(rel).statement();
        assert!(statement.cypher.contains("MERGE (s)-[r:SUPPORTS]->(t)"));

        let script = statement.to_script();
        assert!(script.contains("MERGE (s:Concept {name: 'Observer Pattern'})"));
        assert!(script.contains("r.teaching_value = 4"));
        assert!(!script.contains('$'));
    }
}
