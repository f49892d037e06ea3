//! speechloop - test-driven self-improvement loop for a math-to-speech engine
//!
//! ## Commands
//!
//! - `init`: write the reference engine artifact
//! - `generate` / `run` / `improve` / `validate`: run one loop stage
//! - `cycle`: run full improvement cycles
//! - `task`: execute a JSON task descriptor
//! - `rollback`: restore the artifact from a cycle backup
//! - `naturalize`: speak one expression with the current artifact

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing::{info, Level};

use speechloop_core::config::DEFAULT_CONFIG_FILE;
use speechloop_core::reporting::{render_cycle_report_md, render_validation_md};
use speechloop_core::{LoopConfig, Orchestrator, Phase, TaskDescriptor, TaskType, ValidationRecord};
use speechloop_engine::{ArtifactEngineLoader, EngineLoader};

#[derive(Parser)]
#[command(name = "speechloop")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Test-driven improvement loop for a math-to-speech engine", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Config file (default: ./speechloop.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Data directory for corpora, results, backups and state
    #[arg(long, global = true, env = "SPEECHLOOP_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Engine artifact path (default: <data-dir>/engine/artifact.json)
    #[arg(long, global = true)]
    artifact: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the reference engine artifact
    Init {
        /// Overwrite an existing artifact
        #[arg(long)]
        force: bool,

        /// Also write the effective config to ./speechloop.toml
        #[arg(long)]
        write_config: bool,
    },

    /// Generate the corpus for a cycle
    Generate {
        /// Cycle number (default: next cycle)
        #[arg(long)]
        cycle: Option<u32>,

        /// Force a phase: broad, structural, targeted or edge
        #[arg(long)]
        phase: Option<String>,
    },

    /// Evaluate the engine against a cycle's corpus
    Run {
        /// Cycle number (default: current cycle)
        #[arg(long)]
        cycle: Option<u32>,

        /// Corpus file (default: the cycle's generated corpus)
        #[arg(long)]
        corpus: Option<PathBuf>,
    },

    /// Synthesize and apply patches from a cycle's results
    Improve {
        /// Cycle number (default: current cycle)
        #[arg(long)]
        cycle: Option<u32>,

        /// Results file (default: the cycle's results)
        #[arg(long)]
        results: Option<PathBuf>,
    },

    /// Re-evaluate after patching and check for regressions
    Validate {
        /// Cycle number (default: current cycle)
        #[arg(long)]
        cycle: Option<u32>,

        /// Corpus file (default: the cycle's generated corpus)
        #[arg(long)]
        corpus: Option<PathBuf>,

        /// Baseline score to compare against (default: stored baseline)
        #[arg(long)]
        baseline: Option<f64>,
    },

    /// Run full improvement cycles
    Cycle {
        /// Number of cycles to run
        #[arg(short = 'n', long, default_value = "1")]
        count: u32,

        /// Restore the backup when a cycle regresses
        #[arg(long)]
        rollback_on_regression: bool,
    },

    /// Execute a task descriptor (JSON file, or stdin when omitted)
    Task {
        file: Option<PathBuf>,
    },

    /// Restore the artifact from a cycle backup
    Rollback {
        /// Cycle whose backup to restore (default: latest backup)
        cycle: Option<u32>,
    },

    /// Speak one expression with the current artifact
    Naturalize {
        expression: String,

        /// Category hint, e.g. `arithmetic`
        #[arg(long)]
        context: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    speechloop_core::telemetry::init_tracing(cli.json, level);

    let config = load_config(
        cli.config.as_deref(),
        cli.data_dir.as_deref(),
        cli.artifact.as_deref(),
    )?;

    match cli.command {
        Commands::Init {
            force,
            write_config,
        } => cmd_init(config, force, write_config),
        Commands::Generate { cycle, phase } => cmd_generate(config, cycle, phase.as_deref()).await,
        Commands::Run { cycle, corpus } => cmd_run(config, cycle, corpus).await,
        Commands::Improve { cycle, results } => cmd_improve(config, cycle, results).await,
        Commands::Validate {
            cycle,
            corpus,
            baseline,
        } => cmd_validate(config, cycle, corpus, baseline).await,
        Commands::Cycle {
            count,
            rollback_on_regression,
        } => {
            let mut config = config;
            config.rollback_on_regression |= rollback_on_regression;
            cmd_cycle(config, count).await
        }
        Commands::Task { file } => cmd_task(config, file.as_deref()).await,
        Commands::Rollback { cycle } => cmd_rollback(config, cycle),
        Commands::Naturalize {
            expression,
            context,
        } => cmd_naturalize(config, &expression, context.as_deref()).await,
    }
}

/// Config file, then command-line overrides.
fn load_config(
    path: Option<&Path>,
    data_dir: Option<&Path>,
    artifact: Option<&Path>,
) -> Result<LoopConfig> {
    let mut config = LoopConfig::load_or_default(path).context("Failed to load config")?;
    if let Some(dir) = data_dir {
        config = config.with_data_dir(dir);
    }
    if let Some(artifact) = artifact {
        config.artifact_path = Some(artifact.to_path_buf());
    }
    Ok(config)
}

fn open(config: LoopConfig) -> Result<Orchestrator> {
    Orchestrator::new(config).context("Failed to open speechloop data directory")
}

/// Run one stage through the task interface and unwrap its payload.
async fn run_stage(orchestrator: &mut Orchestrator, task: TaskDescriptor) -> Result<Value> {
    let result = orchestrator.run_task(&task).await;
    if !result.is_completed() {
        bail!(
            "{} failed: {}",
            task.id,
            result.message.unwrap_or_else(|| "unknown error".to_string())
        );
    }
    Ok(result.payload)
}

fn stage_task(task_type: TaskType, cycle: u32) -> TaskDescriptor {
    let name = serde_json::to_value(task_type)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| "task".to_string());
    TaskDescriptor::new(task_type, format!("cli-{}-{}", name, cycle), cycle)
}

fn cmd_init(config: LoopConfig, force: bool, write_config: bool) -> Result<()> {
    let orchestrator = open(config.clone())?;
    let artifact_path = orchestrator.artifact_path().to_path_buf();

    if orchestrator.init_artifact(force)? {
        println!("Wrote reference artifact to {:?}", artifact_path);
    } else {
        println!(
            "Artifact already exists at {:?} (use --force to overwrite)",
            artifact_path
        );
    }

    if write_config {
        let text = config.to_toml_string()?;
        std::fs::write(DEFAULT_CONFIG_FILE, text)
            .context(format!("Failed to write {}", DEFAULT_CONFIG_FILE))?;
        println!("Wrote {}", DEFAULT_CONFIG_FILE);
    }

    Ok(())
}

async fn cmd_generate(config: LoopConfig, cycle: Option<u32>, phase: Option<&str>) -> Result<()> {
    let mut orchestrator = open(config)?;
    let cycle = cycle.unwrap_or_else(|| orchestrator.state().next_cycle());

    let mut params = json!({});
    if let Some(phase) = phase {
        let phase: Phase = phase.parse().map_err(anyhow::Error::msg)?;
        params = json!({ "phase": phase });
    }
    let task = stage_task(TaskType::GenerateExamples, cycle).with_parameters(params);
    let payload = run_stage(&mut orchestrator, task).await?;

    println!(
        "Cycle {}: generated {} examples ({} phase)",
        cycle,
        payload["total_examples"],
        payload["phase"].as_str().unwrap_or("?")
    );
    println!("Corpus: {}", payload["path"].as_str().unwrap_or("?"));
    Ok(())
}

async fn cmd_run(config: LoopConfig, cycle: Option<u32>, corpus: Option<PathBuf>) -> Result<()> {
    let mut orchestrator = open(config)?;
    let cycle = cycle.unwrap_or(orchestrator.state().cycle_number);

    let task = stage_task(TaskType::RunTests, cycle)
        .with_parameters(json!({ "corpus_path": corpus }));
    run_stage(&mut orchestrator, task).await?;

    let summary_path = orchestrator.layout().summary_path(cycle);
    let summary = std::fs::read_to_string(&summary_path)
        .context(format!("Failed to read summary: {:?}", summary_path))?;
    print!("{}", summary);
    Ok(())
}

async fn cmd_improve(
    config: LoopConfig,
    cycle: Option<u32>,
    results: Option<PathBuf>,
) -> Result<()> {
    let mut orchestrator = open(config)?;
    let cycle = cycle.unwrap_or(orchestrator.state().cycle_number);

    let task = stage_task(TaskType::ImplementImprovements, cycle)
        .with_parameters(json!({ "results_path": results }));
    let payload = run_stage(&mut orchestrator, task).await?;

    println!(
        "Cycle {}: {} patches synthesized, {} applied, {} changed the artifact",
        cycle, payload["synthesized"], payload["applied"], payload["changed"]
    );
    if let Some(outcomes) = payload["outcomes"].as_array() {
        for outcome in outcomes {
            println!(
                "  - {}: {}",
                outcome["description"].as_str().unwrap_or("?"),
                outcome["message"].as_str().unwrap_or("")
            );
        }
    }
    Ok(())
}

async fn cmd_validate(
    config: LoopConfig,
    cycle: Option<u32>,
    corpus: Option<PathBuf>,
    baseline: Option<f64>,
) -> Result<()> {
    let mut orchestrator = open(config)?;
    let cycle = cycle.unwrap_or(orchestrator.state().cycle_number);

    let task = stage_task(TaskType::ValidateImprovements, cycle)
        .with_parameters(json!({ "corpus_path": corpus, "baseline": baseline }));
    let payload = run_stage(&mut orchestrator, task).await?;
    let record: ValidationRecord =
        serde_json::from_value(payload).context("Unexpected validation payload")?;

    print!("{}", render_validation_md(&record));
    if record.regression_found {
        bail!("regression detected in cycle {}", cycle);
    }
    Ok(())
}

async fn cmd_cycle(config: LoopConfig, count: u32) -> Result<()> {
    let mut orchestrator = open(config)?;
    info!(count, "Running improvement cycles");

    let mut failed = 0;
    for report in orchestrator.run_cycles(count).await {
        match report {
            Ok(report) => println!("{}", render_cycle_report_md(&report)),
            Err(err) => {
                failed += 1;
                eprintln!("Cycle failed: {}", err);
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} cycles failed", failed, count);
    }
    Ok(())
}

async fn cmd_task(config: LoopConfig, file: Option<&Path>) -> Result<()> {
    let json = match file {
        Some(path) => std::fs::read_to_string(path)
            .context(format!("Failed to read task file: {:?}", path))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read task from stdin")?;
            buf
        }
    };
    let task = TaskDescriptor::from_json(&json).context("Failed to parse task descriptor")?;

    let mut orchestrator = open(config)?;
    let result = orchestrator.run_task(&task).await;
    println!("{}", serde_json::to_string_pretty(&result)?);

    if !result.is_completed() {
        bail!("task {} failed", result.task_id);
    }
    Ok(())
}

fn cmd_rollback(config: LoopConfig, cycle: Option<u32>) -> Result<()> {
    let mut orchestrator = open(config)?;
    let cycle = match cycle {
        Some(cycle) => cycle,
        None => orchestrator
            .backups()
            .latest()?
            .context("No backups found; nothing to roll back")?,
    };

    let backup = orchestrator
        .rollback(cycle)
        .context(format!("Failed to roll back cycle {}", cycle))?;
    println!(
        "Restored {:?} from cycle {} backup ({})",
        orchestrator.artifact_path(),
        cycle,
        backup.digest
    );
    Ok(())
}

async fn cmd_naturalize(config: LoopConfig, expression: &str, context: Option<&str>) -> Result<()> {
    let artifact_path = config.artifact_path();
    speechloop_core::applicator::ensure_artifact(&artifact_path)?;
    let engine = ArtifactEngineLoader
        .load(&artifact_path)
        .await
        .context(format!("Failed to load engine from {:?}", artifact_path))?;

    println!("{}", engine.naturalize(expression, context)?);
    Ok(())
}
