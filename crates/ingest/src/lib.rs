pub mod chunk;
pub mod reader;

pub use chunk::Chunk;
pub use reader::ChunkReader;

use anyhow::Result;
use std::collections::HashSet;
use std::path::Path;
use tracing::{info, warn};

/// Load all chunks under `dir`, dropping repeated chunk IDs.
///
/// The same chunk can appear twice when a chunk file was re-exported;
/// only its first occurrence is kept.
pub async fn load_chunks(dir: &Path) -> Result<Vec<Chunk>> {
    let chunks = ChunkReader::read_directory(dir).await?;
    let total = chunks.len();

    let mut seen = HashSet::new();
    let unique: Vec<Chunk> = chunks
        .into_iter()
        .filter(|c| seen.insert(c.chunk_id.clone()))
        .collect();

    if unique.len() < total {
        warn!(duplicates = total - unique.len(), "Dropped duplicate chunks");
    }
    info!(chunks = unique.len(), dir = ?dir, "Loaded chunks");

    Ok(unique)
}
