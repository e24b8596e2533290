//! Closed vocabularies of entity and relationship types.
//!
//! Everything here is static data. The validator and the keyword
//! inference only ever read these tables.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Minimum trimmed length for a relationship description to count as present.
pub const MIN_DESCRIPTION_CHARS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityType {
    AntiPattern,
    Pattern,
    Principle,
    ArchitectureStyle,
    QualityAttribute,
    Practice,
    CodeStructure,
    DomainConcept,
}

impl EntityType {
    /// Table order doubles as the tie-break order for keyword inference:
    /// more specific types come first.
    pub const ALL: [EntityType; 8] = [
        EntityType::AntiPattern,
        EntityType::Pattern,
        EntityType::Principle,
        EntityType::ArchitectureStyle,
        EntityType::QualityAttribute,
        EntityType::Practice,
        EntityType::CodeStructure,
        EntityType::DomainConcept,
    ];

    /// Fallback when neither the label nor the keywords resolve.
    pub const DEFAULT: EntityType = EntityType::DomainConcept;

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::AntiPattern => "AntiPattern",
            EntityType::Pattern => "Pattern",
            EntityType::Principle => "Principle",
            EntityType::ArchitectureStyle => "ArchitectureStyle",
            EntityType::QualityAttribute => "QualityAttribute",
            EntityType::Practice => "Practice",
            EntityType::CodeStructure => "CodeStructure",
            EntityType::DomainConcept => "DomainConcept",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            EntityType::AntiPattern => "A recurring solution that causes more problems than it solves",
            EntityType::Pattern => "A reusable solution to a recurring design problem",
            EntityType::Principle => "A guideline that shapes design decisions",
            EntityType::ArchitectureStyle => "A system-level organisation of components and connectors",
            EntityType::QualityAttribute => "A measurable property a system should exhibit",
            EntityType::Practice => "An engineering activity or habit",
            EntityType::CodeStructure => "A language-level construct used to organise code",
            EntityType::DomainConcept => "Any other concept of the subject domain",
        }
    }

    /// Keywords matched at word starts, so `"pattern"` also hits `"patterns"`.
    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            EntityType::AntiPattern => &[
                "anti-pattern", "antipattern", "god object", "god class", "spaghetti",
                "code smell", "smell", "big ball of mud", "golden hammer", "lava flow",
            ],
            EntityType::Pattern => &[
                "pattern", "observer", "factory", "singleton", "strategy", "adapter",
                "decorator", "facade", "proxy", "visitor", "builder", "mediator",
                "composite", "iterator", "repository",
            ],
            EntityType::Principle => &[
                "principle", "solid", "dry", "kiss", "yagni", "single responsibility",
                "open/closed", "open-closed", "liskov", "interface segregation",
                "dependency inversion", "law of demeter", "separation of concerns",
            ],
            EntityType::ArchitectureStyle => &[
                "architecture", "architectural", "microservice", "monolith", "layered",
                "event-driven", "hexagonal", "client-server", "serverless",
                "pipes and filters", "service-oriented", "mvc",
            ],
            EntityType::QualityAttribute => &[
                "maintainability", "scalability", "performance", "reliability",
                "availability", "security", "testability", "usability", "modifiability",
                "portability", "extensibility", "readability", "reusability", "robustness",
                "quality attribute",
            ],
            EntityType::Practice => &[
                "practice", "refactoring", "testing", "test-driven", "tdd", "code review",
                "continuous integration", "pair programming", "unit test", "deployment",
            ],
            EntityType::CodeStructure => &[
                "class", "interface", "module", "function", "method", "package",
                "component", "inheritance", "polymorphism", "encapsulation", "abstraction",
                "coupling", "cohesion", "namespace",
            ],
            EntityType::DomainConcept => &[],
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validation metadata attached to every relationship type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelationshipSpec {
    /// 1 (incidental) to 5 (core lesson).
    pub teaching_value: u8,
    pub requires_description: bool,
    pub min_strength: f32,
    /// Direction carries no meaning; `A-B` and `B-A` are the same edge.
    pub bidirectional: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipType {
    Violates,
    ConflictsWith,
    Prevents,
    Implements,
    Specializes,
    ComposedOf,
    DependsOn,
    Enables,
    Supports,
    AlternativeTo,
    Applies,
    RelatedTo,
}

impl RelationshipType {
    /// Table order is the tie-break order for keyword remapping.
    pub const ALL: [RelationshipType; 12] = [
        RelationshipType::Violates,
        RelationshipType::ConflictsWith,
        RelationshipType::Prevents,
        RelationshipType::Implements,
        RelationshipType::Specializes,
        RelationshipType::ComposedOf,
        RelationshipType::DependsOn,
        RelationshipType::Enables,
        RelationshipType::Supports,
        RelationshipType::AlternativeTo,
        RelationshipType::Applies,
        RelationshipType::RelatedTo,
    ];

    /// Generic low-value type used when a label cannot be remapped.
    pub const FALLBACK: RelationshipType = RelationshipType::RelatedTo;

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::Violates => "VIOLATES",
            RelationshipType::ConflictsWith => "CONFLICTS_WITH",
            RelationshipType::Prevents => "PREVENTS",
            RelationshipType::Implements => "IMPLEMENTS",
            RelationshipType::Specializes => "SPECIALIZES",
            RelationshipType::ComposedOf => "COMPOSED_OF",
            RelationshipType::DependsOn => "DEPENDS_ON",
            RelationshipType::Enables => "ENABLES",
            RelationshipType::Supports => "SUPPORTS",
            RelationshipType::AlternativeTo => "ALTERNATIVE_TO",
            RelationshipType::Applies => "APPLIES",
            RelationshipType::RelatedTo => "RELATED_TO",
        }
    }

    pub fn spec(&self) -> RelationshipSpec {
        let (teaching_value, requires_description, min_strength, bidirectional) = match self {
            RelationshipType::Violates => (5, true, 0.6, false),
            RelationshipType::ConflictsWith => (5, true, 0.6, true),
            RelationshipType::Prevents => (4, true, 0.6, false),
            RelationshipType::Implements => (5, false, 0.6, false),
            RelationshipType::Specializes => (3, false, 0.5, false),
            RelationshipType::ComposedOf => (3, false, 0.5, false),
            RelationshipType::DependsOn => (3, false, 0.5, false),
            RelationshipType::Enables => (4, false, 0.5, false),
            RelationshipType::Supports => (4, false, 0.5, false),
            RelationshipType::AlternativeTo => (4, false, 0.5, true),
            RelationshipType::Applies => (4, false, 0.5, false),
            RelationshipType::RelatedTo => (1, false, 0.3, true),
        };

        RelationshipSpec {
            teaching_value,
            requires_description,
            min_strength,
            bidirectional,
        }
    }

    /// Word-start keywords used to remap free-form labels. A trailing space
    /// pins the word end, so `"use "` hits `"use"` but not `"user"`.
    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            RelationshipType::Violates => &["violat", "break", "breach", "contradict"],
            RelationshipType::ConflictsWith => &["conflict", "tension", "trade", "oppos", "clash", "compet"],
            RelationshipType::Prevents => &["prevent", "avoid", "mitigat", "reduc", "protect", "guard", "eliminat"],
            RelationshipType::Implements => &["implement", "realiz", "realis", "instantiat", "embod"],
            RelationshipType::Specializes => &["speciali", "extend", "inherit", "subtype", "subclass", "kind of ", "type of ", "variant", "refin"],
            RelationshipType::ComposedOf => &["compos", "contain", "consist", "includ", "part of ", "aggregat", "made of "],
            RelationshipType::DependsOn => &["depend", "requir", "relies", "rely", "need", "prerequisite", "built on ", "based on "],
            RelationshipType::Enables => &["enabl", "allow", "facilitat", "permit", "empower", "make possible"],
            RelationshipType::Supports => &["support", "achiev", "improv", "promot", "enhanc", "help", "foster", "increas", "boost", "contribut"],
            RelationshipType::AlternativeTo => &["alternativ", "instead", "replac", "substitut", "versus", "vs "],
            RelationshipType::Applies => &["apply", "applie", "applying", "use ", "used ", "uses ", "using", "employ", "leverag", "utili", "adopt"],
            RelationshipType::RelatedTo => &[],
        }
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
