use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

use crate::chunk::Chunk;

/// One line of a chunk file as written by the chunking stage.
#[derive(Debug, Deserialize)]
struct ChunkRecord {
    text: String,
    #[serde(default)]
    domains: Vec<String>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    position: Option<usize>,
}

pub struct ChunkReader;

impl ChunkReader {
    /// Parse one JSONL chunk file. Lines that are not UTF-8 or do not parse
    /// are skipped.
    pub async fn read_file(path: &Path) -> Result<Vec<Chunk>> {
        let content = fs::read(path)
            .await
            .context(format!("Failed to read chunk file: {:?}", path))?;

        let fallback_source = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown")
            .to_string();

        Ok(Self::parse_lines(&content, &fallback_source, path))
    }

    fn parse_lines(content: &[u8], fallback_source: &str, path: &Path) -> Vec<Chunk> {
        let mut chunks = Vec::new();

        for (line_no, bytes) in content.split(|b| *b == b'\n').enumerate() {
            let line = match std::str::from_utf8(bytes) {
                Ok(line) => line.trim(),
                Err(e) => {
                    warn!(file = ?path, line = line_no + 1, error = %e, "Skipping non-UTF-8 chunk line");
                    continue;
                }
            };
            if line.is_empty() {
                continue;
            }

            let record: ChunkRecord = match serde_json::from_str(line) {
                Ok(record) => record,
                Err(e) => {
                    warn!(file = ?path, line = line_no + 1, error = %e, "Skipping unparsable chunk line");
                    continue;
                }
            };

            if record.text.trim().is_empty() {
                debug!(file = ?path, line = line_no + 1, "Skipping empty chunk");
                continue;
            }

            let source = record
                .source
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| fallback_source.to_string());

            chunks.push(Chunk::new(
                source,
                record.position.unwrap_or(line_no),
                record.text,
                record.domains,
            ));
        }

        chunks
    }

    /// Read every chunk file in `dir`. A missing directory or a directory
    /// without chunk files is an error.
    pub async fn read_directory(dir: &Path) -> Result<Vec<Chunk>> {
        if !fs::try_exists(dir).await.unwrap_or(false) {
            anyhow::bail!("Chunk directory does not exist: {:?}", dir);
        }

        let mut entries = fs::read_dir(dir)
            .await
            .context(format!("Failed to list chunk directory: {:?}", dir))?;

        let mut files: Vec<PathBuf> = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.is_file() && Self::is_chunk_file(&path) {
                files.push(path);
            }
        }

        if files.is_empty() {
            anyhow::bail!("No chunk files (*.jsonl, *.json) found in {:?}", dir);
        }

        // Directory order is filesystem dependent
        files.sort();

        let mut all_chunks = Vec::new();
        for path in &files {
            let chunks = Self::read_file(path).await?;
            debug!(file = ?path, chunks = chunks.len(), "Read chunk file");
            all_chunks.extend(chunks);
        }

        Ok(all_chunks)
    }

    fn is_chunk_file(path: &Path) -> bool {
        matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("jsonl") | Some("json")
        )
    }
}
