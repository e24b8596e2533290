//! Cypher script output.
//!
//! The incremental script is an append-only log of every upsert the run
//! emitted, replayable against an empty database. The consolidated script is
//! written in one piece by the reconcile pass.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::upsert::{Statement, SCHEMA_STATEMENTS};

pub fn script_header(title: &str) -> String {
    let mut header = format!("// {}\n// Every statement is idempotent; the script can be replayed.\n\n", title);
    for statement in SCHEMA_STATEMENTS {
        header.push_str(statement);
        header.push_str(";\n");
    }
    header.push('\n');
    header
}

/// Append-only script shared by every worker.
pub struct IncrementalScript {
    path: PathBuf,
    lock: Mutex<()>,
}

impl IncrementalScript {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one batch as a single write, preceded by a `//` comment line.
    pub async fn append_batch(&self, comment: &str, statements: &[Statement]) -> Result<()> {
        let _guard = self.lock.lock().await;

        let needs_header = match fs::metadata(&self.path).await {
            Ok(meta) => meta.len() == 0,
            Err(_) => true,
        };

        let mut block = String::new();
        if needs_header {
            block.push_str(&script_header("Incremental knowledge graph script"));
        }
        block.push_str("// ");
        block.push_str(&comment.replace('\n', " "));
        block.push('\n');
        for statement in statements {
            block.push_str(&statement.to_script());
            block.push('\n');
        }
        block.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open {}", self.path.display()))?;
        file.write_all(block.as_bytes())
            .await
            .with_context(|| format!("Failed to append to {}", self.path.display()))?;
        file.flush().await?;

        Ok(())
    }
}

/// Write a complete script atomically: temp file, sync, rename.
pub async fn write_script(path: &Path, title: &str, statements: &[Statement]) -> Result<()> {
    let mut body = script_header(title);
    for statement in statements {
        body.push_str(&statement.to_script());
        body.push('\n');
    }
    write_atomic(path, body.as_bytes()).await
}

pub async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    {
        let mut file = fs::File::create(&tmp)
            .await
            .with_context(|| format!("Failed to create {}", tmp.display()))?;
        file.write_all(contents).await?;
        file.sync_all().await?;
    }
    fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Failed to move {} into place", path.display()))?;
    Ok(())
}
