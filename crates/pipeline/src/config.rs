use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub llm: LlmConfig,
    pub retry: RetryConfig,
    pub graph: GraphConfig,
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub request_timeout_secs: u64,
    pub temperature: f32,
    /// Minimum gap between the starts of two completion requests.
    pub min_request_interval_ms: u64,
    /// Times the model is asked to fix JSON that local repair could not.
    pub correction_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub uri: String,
    pub user: String,
    #[serde(skip_serializing)]
    pub password: String,
    /// Use the in-memory store instead of Neo4j.
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub batch_size: usize,
    pub workers: usize,
    pub checkpoint_interval: usize,
    pub progress_interval: usize,
    pub limit: Option<usize>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "llama3".to_string(),
            request_timeout_secs: 120,
            temperature: 0.1,
            min_request_interval_ms: 500,
            correction_attempts: 0,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 1000,
            max_backoff_ms: 10000,
        }
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".to_string(),
            user: "neo4j".to_string(),
            password: String::new(),
            dry_run: false,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            batch_size: 3,
            workers: default_workers(),
            checkpoint_interval: 20,
            progress_interval: 10,
            limit: None,
        }
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl LlmConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn min_request_interval(&self) -> Duration {
        Duration::from_millis(self.min_request_interval_ms)
    }
}

impl RetryConfig {
    pub fn policy(&self) -> extract::RetryPolicy {
        extract::RetryPolicy::new(self.max_attempts, self.initial_backoff_ms, self.max_backoff_ms)
    }
}

impl PipelineConfig {
    /// Read a JSON config file; missing sections and fields keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: PipelineConfig = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Clamp values that would stall the scheduler.
    pub fn normalized(mut self) -> Self {
        self.scheduler.batch_size = self.scheduler.batch_size.max(1);
        self.scheduler.workers = self.scheduler.workers.max(1);
        self.scheduler.checkpoint_interval = self.scheduler.checkpoint_interval.max(1);
        self.scheduler.progress_interval = self.scheduler.progress_interval.max(1);
        self.retry.max_attempts = self.retry.max_attempts.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();

        assert_eq!(config.scheduler.batch_size, 3);
        assert_eq!(config.scheduler.checkpoint_interval, 20);
        assert!(config.scheduler.workers >= 1);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.llm.correction_attempts, 0);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"scheduler": {"batch_size": 5}, "llm": {"model": "mistral"}}"#).unwrap();

        let config = PipelineConfig::load(&path).unwrap();

        assert_eq!(config.scheduler.batch_size, 5);
        assert_eq!(config.scheduler.checkpoint_interval, 20);
        assert_eq!(config.llm.model, "mistral");
        assert_eq!(config.llm.base_url, "http://localhost:11434");
    }

    #[test]
    fn test_unreadable_config_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(PipelineConfig::load(&path).is_err());
        assert!(PipelineConfig::load(&dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_normalized_clamps_zero() {
        let mut config = PipelineConfig::default();
        config.scheduler.batch_size = 0;
        config.scheduler.workers = 0;

        let config = config.normalized();

        assert_eq!(config.scheduler.batch_size, 1);
        assert_eq!(config.scheduler.workers, 1);
    }
}
