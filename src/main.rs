use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use sentinel::clock::{Clock, SystemClock};
use sentinel::config::{Config, PolicyConfig};
use sentinel::error::ModerationResult;
use sentinel::metrics::{InMemoryMetrics, MetricsSink};
use sentinel::models::{Decision, Dimension, ReviewAction, ReviewOutcome, Severity};
use sentinel::output::terminal;
use sentinel::pipeline::Orchestrator;
use sentinel::realtime::{PartitionedPool, RealtimeEngine};
use sentinel::reputation::ReputationStore;
use sentinel::scoring::{HeuristicSpamScorer, HttpModelAdapter, LexiconScorer, ScoringAdapter};
use sentinel::simulation::{chat, ChatConfig, ContentGenerator, Scenario, SimulatedModel};
use sentinel::sink::{open_sink, DecisionSink};
use sentinel::windowing::WindowedStore;

/// Sentinel: tiered content moderation and real-time chat decisions.
///
/// Runs synthetic traffic through the content pipeline or the chat flow
/// and reports how it was decided.
#[derive(Parser)]
#[command(name = "sentinel", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the SQLite decision store
    Init,

    /// Run synthetic forum posts, images and profiles through the content pipeline
    SimulateContent {
        /// Number of items to generate (default: 1000)
        #[arg(long, default_value = "1000")]
        count: usize,

        /// RNG seed for reproducible traffic
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Distinct authors
        #[arg(long, default_value = "150")]
        authors: usize,

        /// Resolve pending review tasks with a simulated moderator
        #[arg(long)]
        review: bool,

        /// Print every metrics counter
        #[arg(long)]
        verbose: bool,
    },

    /// Replay synthetic chat traffic (with a raid) through the real-time engine
    SimulateChat {
        /// Number of regular messages (default: 5000)
        #[arg(long, default_value = "5000")]
        messages: usize,

        /// RNG seed for reproducible traffic
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Messages in the raid; 0 disables it
        #[arg(long, default_value = "150")]
        raid_size: usize,

        /// Print every metrics counter
        #[arg(long)]
        verbose: bool,
    },

    /// Print the effective policy bundle as JSON
    Policy,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if missing)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("sentinel=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Init => init(&config).await?,

        Commands::SimulateContent {
            count,
            seed,
            authors,
            review,
            verbose,
        } => simulate_content(&config, count, seed, authors, review, verbose).await?,

        Commands::SimulateChat {
            messages,
            seed,
            raid_size,
            verbose,
        } => simulate_chat(&config, messages, seed, raid_size, verbose).await?,

        Commands::Policy => {
            let policies = config.policies()?;
            println!("{}", policies.to_json()?);
        }
    }

    Ok(())
}

#[cfg(feature = "sqlite")]
async fn init(config: &Config) -> Result<()> {
    info!("Initializing decision store...");
    let sink = sentinel::sink::SqliteSink::open(&config.db_path)?;
    let table_count = sink.table_count().await?;
    println!("Decision store initialized at: {}", config.db_path);
    println!("Tables created: {table_count}");
    println!("\nSet SENTINEL_SINK=sqlite to write decisions here.");
    Ok(())
}

#[cfg(not(feature = "sqlite"))]
async fn init(_config: &Config) -> Result<()> {
    anyhow::bail!("`sentinel init` requires the `sqlite` feature")
}

/// Adapters for the content pipeline: the cheap scorers, the simulated
/// model, and the remote model when one is configured.
fn content_adapters(config: &Config) -> Vec<Arc<dyn ScoringAdapter>> {
    let mut adapters: Vec<Arc<dyn ScoringAdapter>> = vec![
        Arc::new(LexiconScorer::default()),
        Arc::new(HeuristicSpamScorer::default()),
        Arc::new(SimulatedModel::default()),
    ];
    if let Ok(url) = config.require_model_endpoint() {
        info!(endpoint = url, "Using remote model adapter");
        let mut remote = HttpModelAdapter::new(
            "remote_model",
            url,
            vec![Dimension::TOXICITY, Dimension::HATE_SPEECH, Dimension::HARASSMENT],
        )
        .with_qps(config.model_qps);
        if let Some(key) = &config.model_api_key {
            remote = remote.with_api_key(key.clone());
        }
        adapters.push(Arc::new(remote));
    }
    adapters
}

fn progress_bar(len: usize, label: &str) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    let template = format!("  {label} [{{bar:30}}] {{pos}}/{{len}} ({{eta}})");
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&template)
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    pb
}

async fn simulate_content(
    config: &Config,
    count: usize,
    seed: u64,
    authors: usize,
    review: bool,
    verbose: bool,
) -> Result<()> {
    let policies = config.policies()?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let metrics = Arc::new(InMemoryMetrics::new());
    let sink = open_sink(config)?;

    let orchestrator = Orchestrator::builder()
        .policies(&policies)
        .adapters(content_adapters(config))
        .sink(Arc::clone(&sink))
        .metrics(Arc::clone(&metrics) as Arc<dyn MetricsSink>)
        .clock(Arc::clone(&clock))
        .build()
        .context("Failed to build content pipeline")?;

    let items = ContentGenerator::new(seed, authors, clock.now()).generate(count);
    println!("Processing {} synthetic items...", items.len());

    let pb = progress_bar(items.len(), "Moderating");
    let results: Vec<(Scenario, ModerationResult<Decision>)> = stream::iter(items.iter())
        .map(|(scenario, item)| {
            let orchestrator = &orchestrator;
            let pb = &pb;
            async move {
                let result = orchestrator.submit(item).await;
                pb.inc(1);
                (*scenario, result)
            }
        })
        .buffer_unordered(policies.orchestrator.concurrency)
        .collect()
        .await;
    pb.finish_and_clear();

    let mut decided = Vec::with_capacity(results.len());
    let mut failed = 0usize;
    for (scenario, result) in results {
        match result {
            Ok(decision) => decided.push((scenario, decision)),
            Err(e) => {
                failed += 1;
                warn!(error = %e, "Item not decided");
            }
        }
    }

    terminal::display_content_summary(&decided);
    terminal::display_latency(&metrics, "content.latency", policies.orchestrator.item_deadline_ms);
    if failed > 0 {
        println!("\n  {} {} items failed hand-off", "!!".red().bold(), failed);
    }

    let pending = orchestrator.review_queue().pending();
    terminal::display_review_queue(&pending, 15);

    if review && !pending.is_empty() {
        println!("\nResolving {} review tasks...", pending.len());
        let mut overturned = 0usize;
        for task in &pending {
            let outcome = simulated_review(task.combined_risk, &task.flags);
            let decision = orchestrator.ingest_review_outcome(task.id, outcome).await?;
            if decision.is_rejected() {
                overturned += 1;
            }
        }
        println!(
            "  {} rejected by review, {} approved",
            overturned.to_string().red(),
            (pending.len() - overturned).to_string().green()
        );
    }

    let breached = orchestrator.sweep_sla(clock.now());
    if !breached.is_empty() {
        println!("  {} {} tasks past SLA", "!".bright_red(), breached.len());
    }

    if verbose {
        terminal::display_counters(&metrics);
    }
    Ok(())
}

/// A moderator that rejects high-risk or hard-flagged items.
fn simulated_review(risk: f64, flags: &std::collections::BTreeSet<String>) -> ReviewOutcome {
    let mut outcome = if !flags.is_empty() {
        ReviewOutcome {
            action: ReviewAction::Ban,
            ..ReviewOutcome::reject(Severity::Critical)
        }
    } else if risk >= 0.5 {
        ReviewOutcome::reject(Severity::from_score(risk))
    } else {
        ReviewOutcome::approve()
    };
    outcome.reviewer = Some("sim-moderator".to_string());
    outcome
}

async fn simulate_chat(config: &Config, messages: usize, seed: u64, raid_size: usize, verbose: bool) -> Result<()> {
    let policies: PolicyConfig = config.policies()?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let metrics = Arc::new(InMemoryMetrics::new());
    let sink: Arc<dyn DecisionSink> = open_sink(config)?;

    let store = Arc::new(WindowedStore::new(policies.window.clone(), Arc::clone(&clock)));
    let reputation = Arc::new(ReputationStore::new(policies.reputation.clone(), Arc::clone(&clock))?);
    let adapters: Vec<Arc<dyn ScoringAdapter>> = vec![
        Arc::new(LexiconScorer::default()),
        Arc::new(HeuristicSpamScorer::default()),
    ];
    let engine = RealtimeEngine::new(
        store,
        adapters,
        policies.realtime.clone(),
        Arc::clone(&metrics) as Arc<dyn MetricsSink>,
    )?
    .with_reputation(reputation);

    let chat_config = ChatConfig {
        messages,
        raid_at: (raid_size > 0).then_some(0.5),
        raid_size,
        ..ChatConfig::default()
    };
    let traffic = chat::generate(&chat_config, seed, clock.now());
    println!(
        "Replaying {} chat messages across {} workers...",
        traffic.len(),
        config.workers
    );

    let pool = PartitionedPool::new(config.workers, Arc::new(engine), sink);
    let pb = progress_bar(traffic.len(), "Deciding");
    let mut decisions = Vec::with_capacity(traffic.len());
    // Replay in small batches so queue wait doesn't eat the per-message budget.
    for batch in traffic.chunks(64) {
        let mut pending = Vec::with_capacity(batch.len());
        for message in batch {
            pending.push(pool.submit(message.clone()).await);
        }
        for rx in pending {
            match rx.await {
                Ok(Ok(decision)) => decisions.push(decision),
                Ok(Err(e)) => warn!(error = %e, "Chat decision not handed off"),
                Err(_) => warn!("Chat worker dropped a message"),
            }
            pb.inc(1);
        }
    }
    pb.finish_and_clear();
    pool.shutdown().await;

    terminal::display_chat_summary(&decisions);
    println!("\n  {}", "Latency:".bold());
    terminal::display_latency(&metrics, "chat.latency", policies.realtime.budget_ms);
    let over = decisions.iter().filter(|d| d.latency > Duration::from_millis(policies.realtime.budget_ms)).count();
    if over > 0 {
        println!("  {} {} messages over the {} ms budget", "!".bright_red(), over, policies.realtime.budget_ms);
    }

    if verbose {
        terminal::display_counters(&metrics);
    }
    Ok(())
}
