use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use support_agents::config::PipelineConfig;
use support_agents::generation;
use support_agents::policies;
use support_agents::prompts::PROMPT_VERSION;
use support_agents::report::{self, BatchSummary};
use support_agents::resilience::ResilientIndex;
use support_agents::retrieval::{InMemoryPolicyIndex, PineconeIndex, PolicyIndex, SearchRequest};
use support_agents::{Ticket, TicketPipeline};

/// Used when `run` is given neither tickets nor a file.
const SAMPLE_TICKETS: [&str; 4] = [
    "Can I get a refund if I change my mind?",
    "Why did I get charged an extra 5% fee?",
    "Will my subscription renew automatically?",
    "What are your password rules?",
];

/// Triage, draft, review and escalate customer support tickets.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML config file. Environment variables override its values.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run tickets through the pipeline and print one report per ticket
    Run {
        /// Ticket texts. Defaults to the built-in samples.
        tickets: Vec<String>,

        /// Read tickets from a file, one per non-empty line
        #[arg(long, conflicts_with = "tickets")]
        file: Option<PathBuf>,

        /// Emit a JSON report instead of text
        #[arg(long, default_value_t = false)]
        json: bool,

        /// Use an in-process index seeded with the policy corpus
        #[arg(long, default_value_t = false)]
        offline: bool,
    },
    /// Create the policy index if needed and upsert the seed corpus
    Seed {
        /// Seconds to wait for the index to serve new records
        #[arg(long, default_value_t = policies::DEFAULT_SETTLE.as_secs())]
        settle_secs: u64,
    },
    /// Query the policy index directly
    Search {
        query: String,

        #[arg(long)]
        top_k: Option<usize>,

        #[arg(long)]
        rerank_top_n: Option<usize>,

        /// Search the in-process seed corpus instead of the hosted index
        #[arg(long, default_value_t = false)]
        offline: bool,
    },
    /// Print record counts per namespace
    Stats,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = PipelineConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Run {
            tickets,
            file,
            json,
            offline,
        } => run(config, tickets, file.as_deref(), json, offline).await,
        Command::Seed { settle_secs } => seed(config, Duration::from_secs(settle_secs)).await,
        Command::Search {
            query,
            top_k,
            rerank_top_n,
            offline,
        } => search(config, query, top_k, rerank_top_n, offline).await,
        Command::Stats => stats(config).await,
    }
}

async fn run(
    config: PipelineConfig,
    tickets: Vec<String>,
    file: Option<&Path>,
    json: bool,
    offline: bool,
) -> Result<ExitCode> {
    config.validate().map_err(|e| anyhow!(e))?;
    let tickets = load_tickets(tickets, file)?;

    let generator = generation::from_config(&config.generation)?;
    let index = open_index(&config, offline)?;
    info!(
        backend = generator.name(),
        prompt_version = PROMPT_VERSION,
        offline,
        tickets = tickets.len(),
        "Support pipeline starting"
    );

    let pipeline = TicketPipeline::with_resilience(&config, generator, index);
    let results = pipeline.run_batch(&tickets).await;
    let summary = BatchSummary::from_results(&results);

    if json {
        println!("{}", report::render_json(&results)?);
    } else {
        for (i, result) in results.iter().enumerate() {
            println!("{}", report::render_text(i + 1, result));
        }
        println!("{}", report::render_summary(&summary));
    }

    Ok(if summary.has_failures() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

async fn seed(config: PipelineConfig, settle: Duration) -> Result<ExitCode> {
    let index = open_resilient_index(&config, false)?;
    let outcome = policies::seed_index(&index, &config.retrieval).await?;
    if !settle.is_zero() {
        info!(secs = settle.as_secs(), "Waiting for index to settle");
        tokio::time::sleep(settle).await;
    }
    println!(
        "Seeded {} policies into '{}' ({:?})",
        policies::seed_records().len(),
        config.retrieval.namespace,
        outcome
    );
    Ok(ExitCode::SUCCESS)
}

async fn search(
    mut config: PipelineConfig,
    query: String,
    top_k: Option<usize>,
    rerank_top_n: Option<usize>,
    offline: bool,
) -> Result<ExitCode> {
    if let Some(top_k) = top_k {
        config.retrieval.top_k = top_k;
    }
    if let Some(top_n) = rerank_top_n {
        config.retrieval.rerank_top_n = top_n;
    }
    let index = open_resilient_index(&config, offline)?;
    let request = SearchRequest::reranked(&config.retrieval, query, config.retrieval.top_k);
    let passages = index.search(&request).await?;
    println!("{}", report::render_passages(&passages));
    Ok(ExitCode::SUCCESS)
}

async fn stats(config: PipelineConfig) -> Result<ExitCode> {
    let index = open_resilient_index(&config, false)?;
    let stats = index.describe().await?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(ExitCode::SUCCESS)
}

fn open_index(config: &PipelineConfig, offline: bool) -> Result<Arc<dyn PolicyIndex>> {
    config.validate_retrieval_shape().map_err(|e| anyhow!(e))?;
    if offline {
        return Ok(Arc::new(InMemoryPolicyIndex::with_records(
            &config.retrieval.namespace,
            policies::seed_records(),
        )));
    }
    config.validate_remote_retrieval().map_err(|e| anyhow!(e))?;
    Ok(Arc::new(PineconeIndex::new(config.retrieval.clone())?))
}

/// Index for direct commands. The pipeline applies its own resilience wrapper.
fn open_resilient_index(config: &PipelineConfig, offline: bool) -> Result<ResilientIndex> {
    Ok(ResilientIndex::from_config(open_index(config, offline)?, &config.resilience))
}

fn load_tickets(args: Vec<String>, file: Option<&Path>) -> Result<Vec<Ticket>> {
    let texts: Vec<String> = match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read tickets from {}", path.display()))?
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect(),
        None if !args.is_empty() => args,
        None => SAMPLE_TICKETS.iter().map(|t| t.to_string()).collect(),
    };
    Ok(texts.into_iter().map(Ticket::new).collect())
}
