use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Number of leading characters of the text that take part in the chunk ID.
pub const ID_PREFIX_CHARS: usize = 200;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub chunk_id: String,
    pub source_document_id: String,
    pub position: usize,
    pub text: String,
    pub domain_hints: Vec<String>,
}

impl Chunk {
    pub fn new(
        source_document_id: String,
        position: usize,
        text: String,
        domain_hints: Vec<String>,
    ) -> Self {
        // Stable across runs: the ID is the checkpoint key
        let chunk_id = Self::generate_chunk_id(&source_document_id, position, &text);

        Self {
            chunk_id,
            source_document_id,
            position,
            text,
            domain_hints,
        }
    }

    pub fn generate_chunk_id(source_document_id: &str, position: usize, text: &str) -> String {
        let prefix: String = text.chars().take(ID_PREFIX_CHARS).collect();

        let mut hasher = Sha256::new();
        hasher.update(source_document_id.as_bytes());
        hasher.update([0x1f]);
        hasher.update(position.to_string().as_bytes());
        hasher.update([0x1f]);
        hasher.update(prefix.as_bytes());
        let result = hasher.finalize();
        hex::encode(&result[..16]) // Use first 16 bytes (32 hex chars)
    }

    /// Estimate token count (rough: 1.3 tokens per word)
    pub fn estimated_tokens(&self) -> usize {
        let word_count = self.text.split_whitespace().count();
        (word_count as f64 * 1.3) as usize
    }
}
