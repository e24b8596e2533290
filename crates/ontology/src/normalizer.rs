use regex::Regex;
use std::sync::LazyLock;

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));
static EDGE_PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^["'`*\s]+|["'`*.,;:!?\s]+$"#).expect("valid regex"));

/// Canonical form of a concept name: surrounding quotes, markdown emphasis
/// and trailing punctuation removed, whitespace collapsed. Case is kept.
///
/// The canonical name is the dedup key and the upsert key, so two spellings
/// that only differ in spacing or quoting land on the same node.
pub fn canonical_name(name: &str) -> String {
    let collapsed = WHITESPACE.replace_all(name.trim(), " ");
    EDGE_PUNCTUATION.replace_all(&collapsed, "").to_string()
}

/// Case-insensitive lookup key, used to match relationship endpoints to
/// entities of the same batch.
pub fn lookup_key(name: &str) -> String {
    canonical_name(name).to_lowercase()
}
