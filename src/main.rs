use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sscap::core::{ReferenceFigures, RunConfig, build_report, load_geo_or_skip};
use sscap::data::PopulationData;
use sscap::output::{Table, write_tables};

#[derive(Parser)]
#[command(name = "sscap")]
#[command(about = "Salary-sacrifice cap - fiscal and distributional impact model")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline and write the CSV tables
    Generate {
        #[command(flatten)]
        run: RunArgs,

        /// Output directory for the CSV tables
        #[arg(long, default_value = "public/data")]
        out: PathBuf,
    },

    /// Run the pipeline and serve the tables over HTTP
    Serve {
        #[command(flatten)]
        run: RunArgs,

        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Population microdata JSON; a seeded synthetic population is used
    /// when absent
    #[arg(long)]
    population: Option<PathBuf>,

    /// Synthetic population size
    #[arg(long, default_value_t = 20_000)]
    synthetic_persons: usize,

    /// Synthetic population seed
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Salary-sacrifice cap in £ per year
    #[arg(long, default_value_t = 2_000.0)]
    cap: f64,

    /// Target tax year
    #[arg(long, default_value_t = 2029)]
    year: u32,

    /// Statutory employer NICs rate
    #[arg(long, default_value_t = 0.15)]
    employer_ni_rate: f64,

    /// Reference-figure JSON overriding the shipped set
    #[arg(long)]
    reference: Option<PathBuf>,

    /// Geographic unit weights JSON (year-keyed unit x household matrices)
    #[arg(long)]
    geo_weights: Option<PathBuf>,

    /// Geographic unit metadata CSV with code and name columns
    #[arg(long)]
    constituencies: Option<PathBuf>,

    /// Calibration year of the geographic weights
    #[arg(long, default_value_t = 2025)]
    geo_weights_year: u32,
}

fn build_tables(run: &RunArgs) -> Result<Vec<Table>> {
    let population = match &run.population {
        Some(path) => PopulationData::from_json_file(path)
            .with_context(|| format!("loading population from {}", path.display()))?,
        None => {
            info!(
                persons = run.synthetic_persons,
                seed = run.seed,
                "no population file given; generating synthetic microdata"
            );
            PopulationData::synthetic(run.synthetic_persons, run.seed)
        }
    };

    let reference = match &run.reference {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading reference figures from {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("parsing reference figures from {}", path.display()))?
        }
        None => ReferenceFigures::default(),
    };

    let geo = match (&run.geo_weights, &run.constituencies) {
        (Some(weights), Some(metadata)) => {
            load_geo_or_skip(weights, metadata, run.geo_weights_year)
        }
        (None, None) => None,
        _ => {
            warn!("need both --geo-weights and --constituencies; constituency table skipped");
            None
        }
    };

    let config = RunConfig {
        cap: run.cap,
        year: run.year,
        employer_ni_rate: run.employer_ni_rate,
    };

    let tables = build_report(&population, config, &reference, geo.as_ref())?;
    Ok(tables)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "sscap=debug" } else { "sscap=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match cli.command {
        Commands::Generate { run, out } => {
            let tables = build_tables(&run)?;
            write_tables(&out, &tables)?;
            info!(dir = %out.display(), tables = tables.len(), "all tables written");
        }
        Commands::Serve { run, port } => {
            let tables = build_tables(&run)?;
            sscap::api::run_http_server(port, tables).await?;
        }
    }
    Ok(())
}
