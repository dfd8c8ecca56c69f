//! Command-line interface for clarifai.
//!
//! Provides commands for serving the HTTP API, analyzing a text from the
//! terminal, printing the graph and configuration, and inspecting run
//! journals.

use std::io::{self, IsTerminal, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use futures::StreamExt;
use uuid::Uuid;

use crate::adapters::{OpenAiModel, RetryingModel, RetryingSearch, SerperSearch};
use crate::config::{self, Configuration, Credentials, ResolvedConfig, VerificationSource};
use crate::core::{fact_check_graph, Pipeline, RunJournal, Services, StreamMessage};
use crate::domain::RecordType;
use crate::server;

/// clarifai - fact-checking pipeline for claims and biases
#[derive(Parser, Debug)]
#[command(name = "clarifai")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP server
    Serve {
        /// Address to bind to (defaults to the configured server address)
        #[arg(short, long)]
        address: Option<String>,
    },

    /// Analyze a text and print the report
    Analyze {
        /// Input file (reads from stdin if not provided)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Print server-sent events as they are produced
        #[arg(long)]
        stream: bool,

        /// Override the claim verification source
        #[arg(long, value_enum)]
        source: Option<SourceArg>,
    },

    /// Print the graph as a Mermaid flowchart
    Graph,

    /// Show the resolved configuration
    Config,

    /// List journaled runs
    Runs {
        /// Maximum number of runs to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Show the journal of a run
    Status {
        /// Run ID (UUID)
        run_id: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SourceArg {
    Llm,
    Web,
}

impl From<SourceArg> for VerificationSource {
    fn from(source: SourceArg) -> Self {
        match source {
            SourceArg::Llm => VerificationSource::Llm,
            SourceArg::Web => VerificationSource::Web,
        }
    }
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Serve { address } => serve(address).await,
            Commands::Analyze {
                input,
                stream,
                source,
            } => analyze(input, stream, source).await,
            Commands::Graph => show_graph(),
            Commands::Config => show_config(),
            Commands::Runs { limit } => list_runs(limit).await,
            Commands::Status { run_id } => show_status(&run_id).await,
        }
    }
}

/// Build the services described by `credentials`
pub fn build_services(credentials: &Credentials, cfg: &ResolvedConfig) -> Services {
    let request_timeout = cfg.limits.request_timeout(cfg.retry.max_attempts);
    let mut model =
        OpenAiModel::new(&credentials.openai_api_key).with_request_timeout(request_timeout);
    if let Some(base_url) = &credentials.openai_base_url {
        model = model.with_base_url(base_url);
    }

    let mut services = Services::new(Arc::new(RetryingModel::new(model, cfg.retry.clone())));
    if let Some(key) = &credentials.serper_api_key {
        let search = SerperSearch::new(key).with_request_timeout(request_timeout);
        services = services.with_search(Arc::new(RetryingSearch::new(search, cfg.retry.clone())));
    }
    services
}

/// Build a pipeline from the resolved configuration and environment credentials
fn build_pipeline(cfg: &ResolvedConfig, pipeline_config: Configuration) -> Result<Pipeline> {
    pipeline_config.validate()?;
    let credentials = Credentials::from_env(&pipeline_config)?;
    let services = build_services(&credentials, cfg);

    Pipeline::with_engine(
        pipeline_config,
        services,
        cfg.limits.clone(),
        cfg.journal_dir.clone(),
    )
    .context("Failed to build the analysis graph")
}

async fn serve(address: Option<String>) -> Result<()> {
    let cfg = config::config()?;
    let pipeline = build_pipeline(cfg, cfg.pipeline.clone())?;
    let address = address.unwrap_or_else(|| cfg.server.address.clone());

    server::serve(pipeline, &address).await
}

fn read_input(input_file: Option<PathBuf>) -> Result<String> {
    if let Some(path) = input_file {
        return std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read input file: {}", path.display()));
    }

    if io::stdin().is_terminal() {
        anyhow::bail!("No input provided. Use --input <file> or pipe to stdin");
    }

    let mut buffer = String::new();
    io::stdin()
        .read_to_string(&mut buffer)
        .context("Failed to read from stdin")?;
    Ok(buffer)
}

/// Analyze a text from a file or stdin
async fn analyze(
    input_file: Option<PathBuf>,
    stream: bool,
    source: Option<SourceArg>,
) -> Result<()> {
    let cfg = config::config()?;
    let mut pipeline_config = cfg.pipeline.clone();
    if let Some(source) = source {
        pipeline_config.claim_verification_source = source.into();
    }

    let input = read_input(input_file)?;
    let pipeline = build_pipeline(cfg, pipeline_config)?;

    if stream {
        pipeline.check_input(&input)?;
        let mut messages = Box::pin(pipeline.stream(input));
        let mut stdout = io::stdout();
        let mut failed = false;
        while let Some(message) = messages.next().await {
            failed |= matches!(message, StreamMessage::Error { .. });
            stdout
                .write_all(message.to_sse_frame().as_bytes())
                .context("Failed to write to stdout")?;
            stdout.flush().context("Failed to flush stdout")?;
        }
        if failed {
            anyhow::bail!("Analysis failed");
        }
        return Ok(());
    }

    let execution = pipeline.run(input).await?;
    println!("{}", execution.state.report);

    if !execution.state.details.is_empty() {
        println!();
        println!("{}", serde_json::to_string_pretty(&execution.state.details)?);
    }
    eprintln!("\n[Run {} completed]", execution.run_id);

    Ok(())
}

fn show_graph() -> Result<()> {
    let graph = fact_check_graph()?;
    print!("{}", graph.to_mermaid());
    Ok(())
}

/// Show the resolved configuration (for debugging)
fn show_config() -> Result<()> {
    let cfg = config::config()?;

    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("{}", serde_yaml::to_string(cfg).context("Failed to render configuration")?);

    match Credentials::from_env(&cfg.pipeline) {
        Ok(credentials) => println!("Credentials: {:?}", credentials),
        Err(e) => println!("Credentials: {}", e),
    }

    Ok(())
}

fn journal_dir(cfg: &ResolvedConfig) -> Result<&Path> {
    cfg.journal_dir
        .as_deref()
        .context("Run journal is disabled. Set journal_dir or CLARIFAI_JOURNAL_DIR")
}

/// List journaled runs
async fn list_runs(limit: usize) -> Result<()> {
    let cfg = config::config()?;
    let dir = journal_dir(cfg)?;

    let runs = RunJournal::list_runs(dir).await?;
    if runs.is_empty() {
        println!("No runs found");
        return Ok(());
    }

    let mut rows = Vec::with_capacity(runs.len());
    for run_id in runs {
        let Some(journal) = RunJournal::existing(dir, run_id).await? else {
            continue;
        };
        let records = journal.replay().await?;
        let started = records.first().map(|r| r.timestamp);
        let outcome = records
            .iter()
            .rev()
            .find(|r| {
                matches!(
                    r.record_type,
                    RecordType::RunCompleted | RecordType::RunFailed
                )
            })
            .map(|r| format!("{:?}", r.status))
            .unwrap_or_else(|| "Running".to_string());
        rows.push((started, run_id, outcome));
    }
    rows.sort_by(|a, b| b.0.cmp(&a.0));

    println!("{:<38} {:<22} {:<10}", "RUN ID", "STARTED", "STATUS");
    println!("{}", "-".repeat(72));
    for (started, run_id, outcome) in rows.into_iter().take(limit) {
        let started = started
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default();
        println!("{:<38} {:<22} {:<10}", run_id, started, outcome);
    }

    Ok(())
}

/// Show the journal of a run
async fn show_status(run_id_str: &str) -> Result<()> {
    let run_id =
        Uuid::parse_str(run_id_str).with_context(|| format!("Invalid run ID: {}", run_id_str))?;
    let cfg = config::config()?;
    let journal = RunJournal::existing(journal_dir(cfg)?, run_id)
        .await?
        .with_context(|| format!("No journal found for run {}", run_id))?;

    let records = journal.replay().await?;
    if records.is_empty() {
        anyhow::bail!("No journal found for run {}", run_id);
    }

    println!("Run ID: {}", run_id);
    println!("Journal: {}", journal.events_path().display());
    if let Some(failed) = journal.last_of_type(RecordType::RunFailed).await? {
        println!("State: failed ({})", failed.error.unwrap_or_default());
    } else if let Some(done) = journal.last_of_type(RecordType::RunCompleted).await? {
        println!("State: completed in {}ms", done.duration_ms.unwrap_or_default());
    } else {
        println!("State: running");
    }

    println!("\nNodes:");
    for record in records.iter().filter(|r| r.node.is_some()) {
        let node = record.node.as_deref().unwrap_or_default();
        match record.duration_ms {
            Some(ms) => println!("  {:<20} {:?} ({}ms)", node, record.status, ms),
            None => println!("  {:<20} {:?}", node, record.status),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials(serper: Option<&str>) -> Credentials {
        Credentials {
            openai_api_key: "sk-test".to_string(),
            openai_base_url: None,
            serper_api_key: serper.map(str::to_string),
        }
    }

    #[test]
    fn test_search_backend_only_with_key() {
        let cfg = ResolvedConfig::default();

        let services = build_services(&credentials(None), &cfg);
        assert_eq!(services.model.name(), "openai");
        assert!(services.search.is_none());

        let services = build_services(&credentials(Some("serp")), &cfg);
        assert_eq!(services.search.as_ref().map(|s| s.name()), Some("serper"));
    }
}
