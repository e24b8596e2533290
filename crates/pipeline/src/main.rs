use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pipeline::{OutputLayout, PipelineConfig, RunOptions};

#[derive(Debug, Parser)]
#[command(name = "kg-pipeline", version, about = "Build a concept graph from pre-chunked text with an LLM")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Emit logs as JSON lines
    #[arg(long, global = true, default_value_t = false)]
    log_json: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Extract, validate and persist every pending chunk
    Run(RunArgs),
    /// Rebuild the consolidated script from the entities index
    Reconcile(ReconcileArgs),
}

#[derive(Debug, Args)]
struct GraphArgs {
    /// JSON config file; flags below override it
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[arg(long, env = "NEO4J_URI")]
    neo4j_uri: Option<String>,

    #[arg(long, env = "NEO4J_USER")]
    neo4j_user: Option<String>,

    #[arg(long, env = "NEO4J_PASSWORD", hide_env_values = true)]
    neo4j_password: Option<String>,
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Directory of chunk files (one JSON record per line)
    #[arg(long, value_name = "DIR")]
    input: PathBuf,

    /// Directory for checkpoint, entities index and scripts
    #[arg(long, value_name = "DIR")]
    output: PathBuf,

    #[command(flatten)]
    graph: GraphArgs,

    #[arg(long, env = "OLLAMA_URL")]
    ollama_url: Option<String>,

    #[arg(long, env = "OLLAMA_MODEL")]
    model: Option<String>,

    /// Worker count (default: available CPU parallelism)
    #[arg(long)]
    workers: Option<usize>,

    /// Chunks per extraction request
    #[arg(long)]
    batch_size: Option<usize>,

    /// Save the checkpoint every K processed chunks
    #[arg(long)]
    checkpoint_interval: Option<usize>,

    /// Schedule at most N pending chunks
    #[arg(long)]
    limit: Option<usize>,

    /// Clear checkpoint, entities index and scripts before starting
    #[arg(long, default_value_t = false)]
    reset: bool,

    /// Write the consolidated script after the run
    #[arg(long, default_value_t = false)]
    reconcile: bool,

    /// Use an in-memory graph store instead of Neo4j
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

#[derive(Debug, Args)]
struct ReconcileArgs {
    #[arg(long, value_name = "DIR")]
    output: PathBuf,

    #[command(flatten)]
    graph: GraphArgs,

    /// Also apply the consolidated upserts to the graph store
    #[arg(long, default_value_t = false)]
    apply: bool,
}

impl GraphArgs {
    fn load_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::load(path)?,
            None => PipelineConfig::default(),
        };
        if let Some(uri) = &self.neo4j_uri {
            config.graph.uri = uri.clone();
        }
        if let Some(user) = &self.neo4j_user {
            config.graph.user = user.clone();
        }
        if let Some(password) = &self.neo4j_password {
            config.graph.password = password.clone();
        }
        Ok(config)
    }
}

impl RunArgs {
    fn config(&self) -> Result<PipelineConfig> {
        let mut config = self.graph.load_config()?;
        if let Some(url) = &self.ollama_url {
            config.llm.base_url = url.clone();
        }
        if let Some(model) = &self.model {
            config.llm.model = model.clone();
        }
        if let Some(workers) = self.workers {
            config.scheduler.workers = workers;
        }
        if let Some(batch_size) = self.batch_size {
            config.scheduler.batch_size = batch_size;
        }
        if let Some(interval) = self.checkpoint_interval {
            config.scheduler.checkpoint_interval = interval;
        }
        if self.limit.is_some() {
            config.scheduler.limit = self.limit;
        }
        if self.dry_run {
            config.graph.dry_run = true;
        }
        Ok(config.normalized())
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Run(args) => {
            let config = args.config()?;
            let options = RunOptions {
                input_dir: args.input.clone(),
                output_dir: args.output.clone(),
                reset: args.reset,
                reconcile: args.reconcile,
            };

            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received, finishing current batches");
                    on_signal.cancel();
                }
            });

            pipeline::run(config, options, cancel).await?;
        }
        Command::Reconcile(args) => {
            let mut config = args.graph.load_config()?;
            let layout = OutputLayout::new(&args.output);

            let summary = if args.apply {
                config.graph.dry_run = false;
                let store = pipeline::connect_store(&config).await?;
                pipeline::reconcile(&layout, Some(store.as_ref())).await?
            } else {
                pipeline::reconcile(&layout, None).await?
            };
            info!(entities = summary.entities, relationships = summary.relationships, "Done");
        }
    }

    Ok(())
}
