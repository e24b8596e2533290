use ingest::Chunk;
use ontology::{EntityType, RelationshipType};

pub fn build_system_prompt() -> String {
    let mut entity_types = String::new();
    for ty in EntityType::ALL {
        entity_types.push_str(&format!("- {}: {}\n", ty.as_str(), ty.description()));
    }

    let relationship_types = RelationshipType::ALL
        .iter()
        .map(|ty| ty.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"You extract a concept graph from software engineering teaching material.

ENTITY TYPES:
{entity_types}
RELATIONSHIP TYPES:
{relationship_types}

SCHEMA:
{{
  "entities": [
    {{"name": "Concept Name", "type": "EntityType", "description": "one sentence", "domain": "subject area", "relevance": 0.0, "chunk": 1}}
  ],
  "relationships": [
    {{"source": "Concept Name", "target": "Other Concept", "type": "RELATIONSHIP_TYPE", "description": "why they are related", "strength": 0.0, "context": "quote from text", "chunk": 1}}
  ]
}}

RULES:
- Output ONLY the JSON object, no markdown, no explanations
- "chunk" is the number of the chunk the item was found in
- Use the full, conventional concept name ("Observer Pattern", not "observer")
- Relationship source and target must be names from your entities list
- Never relate a concept to itself
- relevance and strength are numbers between 0 and 1
- CONFLICTS_WITH, VIOLATES and PREVENTS need a description"#
    )
}

pub fn build_batch_prompt(chunks: &[Chunk]) -> String {
    let mut hints: Vec<&str> = Vec::new();
    for chunk in chunks {
        for hint in &chunk.domain_hints {
            if !hints.contains(&hint.as_str()) {
                hints.push(hint);
            }
        }
    }

    let mut prompt = String::from("Extract entities and relationships from the chunks below.\n\n");

    if !hints.is_empty() {
        prompt.push_str(&format!("DOMAIN HINTS: {}\n\n", hints.join(", ")));
    }

    for (i, chunk) in chunks.iter().enumerate() {
        prompt.push_str(&format!(
            "[CHUNK {}] (document: {}, position: {})\n{}\n\n",
            i + 1,
            chunk.source_document_id,
            chunk.position,
            chunk.text.trim()
        ));
    }

    prompt.push_str("JSON OUTPUT:");
    prompt
}

pub fn build_retry_prompt(invalid_json: &str) -> String {
    format!(
        r#"The following JSON is invalid:

{}

Fix this JSON. Output only valid JSON with no markdown formatting, no code blocks, no explanations. Just the raw JSON object."#,
        invalid_json
    )
}
