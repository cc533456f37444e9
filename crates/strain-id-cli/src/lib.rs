//! Command surface of the `strain-id` binary, also embeddable by host runtimes.
//!
//! - [`run_cli`] for full parsed CLI execution.
//! - [`run_with_db`] for direct [`Command`] execution against a DB path.
//! - [`run_command`] for execution against an existing [`SqliteStrainStore`].
//! - [`run_benchmark`] for the latency harness, which never touches `--db`.
//!
//! Every successful command prints one pretty JSON document on stdout.

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use strain_id_core::{IdentificationPayload, ScoringRuleset, StrainId, TestId};
use strain_id_store_sqlite::{
    BenchmarkConfig, BenchmarkReport, BenchmarkThresholds, CatalogImport, SqliteStrainStore,
    StrainFilter, StrainInput,
};
use tracing::debug;

#[derive(Debug, Parser)]
#[command(name = "strain-id")]
#[command(about = "Bacterial strain identification from laboratory test results")]
pub struct Cli {
    #[arg(long, global = true, default_value = "./strain_id.sqlite3")]
    pub db: PathBuf,

    /// Raise the default log level to debug (overridden by `STRAIN_ID_LOG`).
    #[arg(long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    Catalog {
        #[command(subcommand)]
        command: CatalogCommand,
    },
    Strain {
        #[command(subcommand)]
        command: StrainCommand,
    },
    Species {
        #[command(subcommand)]
        command: SpeciesCommand,
    },
    Identify(IdentifyArgs),
    Stats,
    Ruleset {
        #[command(subcommand)]
        command: RulesetCommand,
    },
    Benchmark {
        #[command(subcommand)]
        command: BenchmarkCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum CatalogCommand {
    Import(FileArgs),
    List(CatalogListArgs),
    Categories,
    Options(TestIdArgs),
}

#[derive(Debug, Subcommand)]
pub enum StrainCommand {
    Import(FileArgs),
    List(StrainListArgs),
    Show(StrainIdArgs),
    Deactivate(StrainIdArgs),
}

#[derive(Debug, Subcommand)]
pub enum SpeciesCommand {
    List(SpeciesListArgs),
}

#[derive(Debug, Subcommand)]
pub enum RulesetCommand {
    Show(RulesetShowArgs),
    Set(FileArgs),
}

#[derive(Debug, Subcommand)]
pub enum BenchmarkCommand {
    Run(BenchmarkRunArgs),
}

#[derive(Debug, Args)]
pub struct FileArgs {
    #[arg(long)]
    file: PathBuf,
}

#[derive(Debug, Args)]
pub struct CatalogListArgs {
    #[arg(long)]
    include_inactive: bool,
}

#[derive(Debug, Args)]
pub struct TestIdArgs {
    #[arg(long)]
    test_id: TestId,
}

#[derive(Debug, Args)]
pub struct StrainListArgs {
    /// Case-insensitive match on identifier, scientific or common name.
    #[arg(long)]
    search: Option<String>,
    #[arg(long)]
    scientific_name: Option<String>,
    #[arg(long)]
    include_inactive: bool,
    #[arg(long, default_value_t = 0)]
    skip: usize,
    #[arg(long)]
    limit: Option<usize>,
}

#[derive(Debug, Args)]
pub struct SpeciesListArgs {
    #[arg(long)]
    include_inactive: bool,
}

#[derive(Debug, Args)]
pub struct StrainIdArgs {
    #[arg(long)]
    strain_id: StrainId,
}

#[derive(Debug, Args)]
pub struct IdentifyArgs {
    /// Request JSON file, or `-` for stdin.
    #[arg(long)]
    request: String,
    #[arg(long)]
    limit: Option<usize>,
    #[arg(long)]
    min_confidence: Option<f64>,
    #[arg(long, default_value_t = 1)]
    ruleset_version: u32,
}

#[derive(Debug, Args)]
pub struct RulesetShowArgs {
    #[arg(long)]
    version: Option<u32>,
}

#[derive(Debug, Args)]
pub struct BenchmarkRunArgs {
    #[arg(long = "volume")]
    volumes: Vec<usize>,
    #[arg(long, default_value_t = 3)]
    repetitions: usize,
    #[arg(long)]
    output: Option<PathBuf>,
    #[arg(long)]
    json: bool,
    #[arg(long)]
    identify_p95_max_ms: Option<f64>,
}

/// Strain import files are either a bare array or `{"strains": [...]}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StrainImportFile {
    List(Vec<StrainInput>),
    Wrapped { strains: Vec<StrainInput> },
}

impl StrainImportFile {
    fn into_strains(self) -> Vec<StrainInput> {
        match self {
            Self::List(strains) | Self::Wrapped { strains } => strains,
        }
    }
}

#[derive(Debug, Serialize)]
struct DeactivationReport {
    strain_id: StrainId,
    is_active: bool,
}

/// Executes the parsed top-level CLI command graph.
///
/// # Errors
/// Returns an error when store open/migrate fails or the requested command fails.
pub fn run_cli(cli: Cli) -> Result<()> {
    run_with_db(&cli.db, cli.command)
}

/// Executes a parsed command using the provided `SQLite` DB path.
///
/// # Errors
/// Returns an error when store open/migrate fails or the requested command fails.
pub fn run_with_db(db_path: &Path, command: Command) -> Result<()> {
    match command {
        Command::Benchmark { command } => run_benchmark(command),
        command => {
            let mut store = SqliteStrainStore::open(db_path)?;
            store.migrate()?;
            run_command(command, &mut store)
        }
    }
}

/// Executes a parsed command against an existing store handle.
///
/// # Errors
/// Returns an error when input files cannot be read or decoded, validation
/// rejects the input, or a store operation fails.
pub fn run_command(command: Command, store: &mut SqliteStrainStore) -> Result<()> {
    match command {
        Command::Catalog { command } => run_catalog(command, store),
        Command::Strain { command } => run_strain(command, store),
        Command::Species {
            command: SpeciesCommand::List(args),
        } => print_json(&store.list_species(!args.include_inactive)?),
        Command::Identify(args) => {
            let raw = read_input(&args.request)?;
            let payload: IdentificationPayload = serde_json::from_str(&raw).with_context(|| {
                format!(
                    "identification request {} matches neither the test_values nor the test_results shape",
                    args.request
                )
            })?;
            let mut request = store.resolve_payload(payload)?;
            if args.limit.is_some() {
                request.limit = args.limit;
            }
            if args.min_confidence.is_some() {
                request.min_confidence = args.min_confidence;
            }

            let response = store.identify(&request, args.ruleset_version)?;
            print_json(&response)
        }
        Command::Stats => print_json(&store.identification_stats()?),
        Command::Ruleset { command } => run_ruleset(command, store),
        Command::Benchmark { .. } => Err(anyhow!(
            "internal dispatch error: benchmark should be handled before store initialization"
        )),
    }
}

fn run_catalog(command: CatalogCommand, store: &mut SqliteStrainStore) -> Result<()> {
    match command {
        CatalogCommand::Import(args) => {
            let catalog: CatalogImport = read_json_file(&args.file)?;
            let report = store.import_catalog(&catalog)?;
            print_json(&report)
        }
        CatalogCommand::List(args) => print_json(&store.list_tests(args.include_inactive)?),
        CatalogCommand::Categories => print_json(&store.list_categories()?),
        CatalogCommand::Options(args) => print_json(&store.test_options(args.test_id)?),
    }
}

fn run_strain(command: StrainCommand, store: &mut SqliteStrainStore) -> Result<()> {
    match command {
        StrainCommand::Import(args) => {
            let file: StrainImportFile = read_json_file(&args.file)?;
            let strains = file.into_strains();
            debug!(count = strains.len(), "importing strains");
            let report = store.import_strains(&strains)?;
            print_json(&report)
        }
        StrainCommand::List(args) => {
            let filter = StrainFilter {
                search: args.search,
                scientific_name: args.scientific_name,
                active_only: !args.include_inactive,
            };
            print_json(&store.list_strains(&filter, args.skip, args.limit)?)
        }
        StrainCommand::Show(args) => {
            let stored = store
                .get_strain(args.strain_id)?
                .ok_or_else(|| anyhow!("strain {} not found", args.strain_id))?;
            print_json(&stored)
        }
        StrainCommand::Deactivate(args) => {
            store.deactivate_strain(args.strain_id)?;
            print_json(&DeactivationReport {
                strain_id: args.strain_id,
                is_active: false,
            })
        }
    }
}

fn run_ruleset(command: RulesetCommand, store: &SqliteStrainStore) -> Result<()> {
    match command {
        RulesetCommand::Show(args) => match args.version {
            Some(version) => print_json(&store.get_ruleset(version)?),
            None => print_json(&store.get_rulesets()?),
        },
        RulesetCommand::Set(args) => {
            let value: serde_json::Value = read_json_file(&args.file)?;
            let ruleset = ScoringRuleset::from_json(&value)
                .map_err(|err| anyhow!("invalid ruleset file {}: {err}", args.file.display()))?;
            store.upsert_ruleset(&ruleset)?;
            print_json(&store.get_ruleset(ruleset.ruleset_version)?)
        }
    }
}

/// Runs the identification latency harness on temporary databases.
///
/// # Errors
/// Returns an error when the harness fails, the report cannot be written, or
/// any configured threshold is violated.
pub fn run_benchmark(command: BenchmarkCommand) -> Result<()> {
    match command {
        BenchmarkCommand::Run(args) => {
            let volumes = if args.volumes.is_empty() {
                vec![100, 500, 2_000]
            } else {
                args.volumes
            };
            let thresholds = args
                .identify_p95_max_ms
                .map(|identify_p95_ms_max| BenchmarkThresholds {
                    identify_p95_ms_max,
                });
            let config = BenchmarkConfig {
                volumes,
                repetitions: args.repetitions,
            };

            // Benchmark runner uses isolated temporary sqlite files and does not depend on --db.
            let benchmark_runner = SqliteStrainStore::open(Path::new(":memory:"))?;
            let report = benchmark_runner.run_benchmark(&config, thresholds)?;

            if let Some(path) = args.output {
                let serialized = serde_json::to_string_pretty(&report)?;
                std::fs::write(&path, serialized).with_context(|| {
                    format!("failed writing benchmark report to {}", path.display())
                })?;
            }

            if args.json {
                print_json(&report)?;
            } else {
                print_benchmark_report(&report);
            }

            if !report.within_thresholds {
                return Err(anyhow!(
                    "benchmark thresholds violated: {}",
                    report.violations.join("; ")
                ));
            }
            Ok(())
        }
    }
}

fn read_input(source: &str) -> Result<String> {
    if source == "-" {
        let mut body = String::new();
        std::io::stdin()
            .read_to_string(&mut body)
            .context("failed reading request from stdin")?;
        return Ok(body);
    }
    std::fs::read_to_string(source).with_context(|| format!("failed reading {source}"))
}

fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let body = std::fs::read_to_string(path)
        .with_context(|| format!("failed reading {}", path.display()))?;
    serde_json::from_str(&body).with_context(|| format!("invalid JSON in {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_benchmark_report(report: &BenchmarkReport) {
    println!(
        "contract={} generated_at={} repetitions={} within_thresholds={}",
        report.contract_version,
        report.generated_at,
        report.repetitions,
        if report.within_thresholds {
            "yes"
        } else {
            "no"
        }
    );
    println!(
        "{:<10} {:<12} {:<12} {:<14} {:<14}",
        "strains", "seed_p50", "seed_p95", "identify_p50", "identify_p95"
    );
    println!("{}", "-".repeat(66));
    for item in &report.volumes {
        println!(
            "{:<10} {:<12.3} {:<12.3} {:<14.3} {:<14.3}",
            item.strain_count,
            item.seed_p50_ms,
            item.seed_p95_ms,
            item.identify_p50_ms,
            item.identify_p95_ms
        );
    }

    if !report.violations.is_empty() {
        println!("violations={}", report.violations.join(" | "));
    }
}
