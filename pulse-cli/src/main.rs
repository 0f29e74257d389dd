#![warn(clippy::all)]
#![allow(clippy::pedantic)]

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use pulse_analyzer::{aggregate_with_nodes, create_analyzer, LogProgress};
use pulse_common::{logging, AnalyzerKind, Config};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

mod input;

use input::{InputDocument, OutputDocument};

/// Pulse - sentiment, KPI and node attribution for short texts.
#[derive(Parser, Debug)]
#[command(name = "pulse")]
#[command(version = "0.1.0")]
#[command(about = "Sentiment, KPI and node attribution for short texts.", long_about = None)]
struct Cli {
    /// Config file (defaults to ~/.pulse/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyze a `{"texts": [...], "nodes": [...]}` document
    Analyze {
        /// Input document
        input: PathBuf,

        /// Analyzer to use (local or remote), overriding the config
        #[arg(long)]
        analyzer: Option<AnalyzerKind>,

        /// Also emit per-node aggregation
        #[arg(long)]
        aggregate: bool,

        /// Write JSON here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the effective configuration
    Config,
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let Some(path) = path else {
        return Config::load_and_validate();
    };
    let mut config = Config::load_from(path)?;
    config.apply_env_overrides();
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
    Ok(config)
}

async fn run_analyze(
    mut config: Config,
    input: &Path,
    analyzer_kind: Option<AnalyzerKind>,
    with_aggregate: bool,
    output: Option<&Path>,
) -> Result<()> {
    if let Some(kind) = analyzer_kind {
        config.analyzer = kind;
    }
    if config.analyzer == AnalyzerKind::Remote && config.remote.api_key.is_none() {
        warn!("No API key configured for the remote analyzer");
    }

    let doc = InputDocument::load(input)?;
    let analyzer = create_analyzer(&config)?;
    info!(
        analyzer = analyzer.name(),
        texts = doc.texts.len(),
        nodes = doc.nodes.len(),
        "Running analysis"
    );

    let run = analyzer
        .analyze(&doc.texts, &doc.nodes, &LogProgress)
        .await
        .context("analysis failed")?;

    if let Some(reason) = &run.partial {
        warn!(reason = %reason, "{}", reason.advisory());
    }
    for warning in &run.warnings {
        warn!(?warning, "Run warning");
    }

    let nodes = with_aggregate.then(|| aggregate_with_nodes(&run.results, &doc.nodes));
    OutputDocument {
        analyzer: analyzer.name(),
        run: &run,
        nodes,
    }
    .write(output)?;

    if run.results.is_empty() {
        bail!("no texts could be analyzed");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    logging::init_from_config(&config.observability);

    match cli.command {
        Commands::Analyze {
            input,
            analyzer,
            aggregate,
            output,
        } => run_analyze(config, &input, analyzer, aggregate, output.as_deref()).await,
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}
