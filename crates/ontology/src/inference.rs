//! Keyword-based type inference and remapping.
//!
//! Pure functions over the static tables in [`crate::vocabulary`]; no IO.

use crate::vocabulary::{EntityType, RelationshipType};

/// How a type label was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The label named a vocabulary entry directly.
    Exact,
    /// The label was unknown and keywords picked a replacement.
    Inferred,
    /// Nothing matched; the default/fallback type was used.
    Defaulted,
}

/// Lowercase, keep `[a-z0-9-/]`, collapse everything else into single spaces.
/// The leading space lets every keyword match on a word start, the trailing
/// one lets a keyword ending in a space match on a word end.
fn keyword_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 1);
    out.push(' ');
    let mut last_space = true;
    for c in s.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() || c == '-' || c == '/' {
            out.push(c);
            last_space = false;
        } else if !last_space {
            out.push(' ');
            last_space = true;
        }
    }
    if !last_space {
        out.push(' ');
    }
    out
}

fn keyword_hits(text: &str, keywords: &[&str]) -> usize {
    keywords
        .iter()
        .filter(|kw| text.contains(&format!(" {kw}")))
        .count()
}

/// Letters and digits only, lowercased: `"Architecture_Style"` -> `"architecturestyle"`.
fn compact(label: &str) -> String {
    label
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Match a label against the entity vocabulary, ignoring case and separators.
pub fn parse_entity_type(label: &str) -> Option<EntityType> {
    let key = compact(label);
    if key.is_empty() {
        return None;
    }

    let key = match key.as_str() {
        "designpattern" => "pattern",
        "architecture" | "architecturalstyle" | "architecturepattern" => "architecturestyle",
        "concept" | "domain" => "domainconcept",
        "smell" | "codesmell" => "antipattern",
        "quality" => "qualityattribute",
        other => other.strip_suffix('s').unwrap_or(other),
    };

    EntityType::ALL
        .into_iter()
        .find(|ty| compact(ty.as_str()) == key)
}

/// Score every entity type by keyword hits (name counts double) and pick
/// the best; ties go to the earlier table entry.
pub fn infer_entity_type(name: &str, description: &str) -> Option<EntityType> {
    let name_text = keyword_text(name);
    let desc_text = keyword_text(description);

    let mut best: Option<(EntityType, usize)> = None;
    for ty in EntityType::ALL {
        let score = 2 * keyword_hits(&name_text, ty.keywords()) + keyword_hits(&desc_text, ty.keywords());
        if score > 0 && best.is_none_or(|(_, s)| score > s) {
            best = Some((ty, score));
        }
    }

    best.map(|(ty, _)| ty)
}

pub fn resolve_entity_type(label: &str, name: &str, description: &str) -> (EntityType, Resolution) {
    if let Some(ty) = parse_entity_type(label) {
        return (ty, Resolution::Exact);
    }
    match infer_entity_type(name, description) {
        Some(ty) => (ty, Resolution::Inferred),
        None => (EntityType::DEFAULT, Resolution::Defaulted),
    }
}

/// Match a label against the relationship vocabulary: `"conflicts with"`,
/// `"Conflicts-With"` and `"CONFLICTS_WITH"` are all the same entry.
pub fn parse_relationship_type(label: &str) -> Option<RelationshipType> {
    let key = compact(label);
    if key.is_empty() {
        return None;
    }
    RelationshipType::ALL
        .into_iter()
        .find(|ty| compact(ty.as_str()) == key)
}

/// Remap an unknown relationship label to the vocabulary entry with the
/// most keyword hits.
pub fn remap_relationship_type(label: &str) -> Option<RelationshipType> {
    let text = keyword_text(label);

    let mut best: Option<(RelationshipType, usize)> = None;
    for ty in RelationshipType::ALL {
        let score = keyword_hits(&text, ty.keywords());
        if score > 0 && best.is_none_or(|(_, s)| score > s) {
            best = Some((ty, score));
        }
    }

    best.map(|(ty, _)| ty)
}

pub fn resolve_relationship_type(label: &str) -> (RelationshipType, Resolution) {
    if let Some(ty) = parse_relationship_type(label) {
        return (ty, Resolution::Exact);
    }
    match remap_relationship_type(label) {
        Some(ty) => (ty, Resolution::Inferred),
        None => (RelationshipType::FALLBACK, Resolution::Defaulted),
    }
}
