use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::Serialize;

use cairn::config::Config;
use cairn::core::{IntegrityIssue, TaskId, TaskStatus};
use cairn::import::{
    export_package, import_package, ConflictStrategy, ImportOptions, MissingDepStrategy,
};
use cairn::orchestration::{CompletionReport, ReadinessAnalyzer, SpawnCoordinator, ValidatorRegistry};
use cairn::storage::{TaskFile, TaskRepository};
use cairn::util::blocking;
use cairn::{clog, clog_error, Result};

/// Cairn - task dependency graph and agent orchestration
#[derive(Parser, Debug)]
#[command(name = "cairn")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    CAIRN_DEBUG=1     Enable debug logging (alternative to --debug)")]
pub struct Cli {
    /// Task document to operate on (default: .cairn/tasks.json)
    #[arg(short = 'f', long, global = true)]
    pub file: Option<PathBuf>,

    /// Enable debug logging (writes to ~/.cairn/cairn.log)
    #[arg(short = 'd', long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Create an empty task document
    Init,

    /// Execution waves, critical path and blocked tasks for an epic
    Analyze { epic: TaskId },

    /// Tasks under an epic that can be handed to an agent now
    Ready {
        epic: TaskId,

        /// Only a batch with no ordering constraint between members
        #[arg(long)]
        parallel: bool,
    },

    /// The single best task to start next
    Next { epic: TaskId },

    /// Status counts, critical path and top blockers for an epic
    Context { epic: TaskId },

    /// Claim a task for a worker and print its brief
    Spawn { task: TaskId },

    /// Validate a worker's completion report and record the outcome
    Complete {
        task: TaskId,

        /// Completion report JSON
        #[arg(long)]
        report: PathBuf,
    },

    /// Merge an exported task package into the store
    Import {
        package: PathBuf,

        #[arg(long)]
        dry_run: bool,

        /// Attach imported root tasks under this task
        #[arg(long)]
        parent: Option<TaskId>,

        #[arg(long)]
        phase: Option<String>,

        /// Label added to every imported task
        #[arg(long)]
        label: Option<String>,

        /// Force every imported task to this status
        #[arg(long)]
        reset_status: Option<TaskStatus>,

        #[arg(long, value_enum)]
        on_conflict: Option<ConflictStrategy>,

        #[arg(long, value_enum)]
        on_missing_dep: Option<MissingDepStrategy>,

        /// Skip title-conflict detection
        #[arg(long)]
        force: bool,
    },

    /// Write tasks to a package other stores can import
    Export {
        /// Root task to export with its descendants (repeatable; default all)
        #[arg(long = "root")]
        roots: Vec<TaskId>,

        #[arg(long)]
        out: PathBuf,
    },

    /// Verify the document's checksum and structural invariants
    Check,
}

fn main() {
    let cli = Cli::parse();

    cairn::log::init_with_debug(cli.debug);
    if cli.debug {
        clog!("Cairn starting (debug mode enabled)");
    }

    if let Err(e) = run(cli) {
        clog_error!("Command failed: {}", e);
        eprintln!("error: {}", e);
        std::process::exit(e.exit_code());
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let path = match &cli.file {
        Some(path) => path.clone(),
        None => config.task_file_in(&std::env::current_dir()?),
    };
    let file = TaskFile::new(path);
    clog!("Command: {:?} on {}", cli.command, file.path().display());

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(dispatch(cli.command, file, config))
}

async fn dispatch(command: Command, file: TaskFile, config: Config) -> Result<()> {
    match command {
        Command::Init => {
            let created = {
                let file = file.clone();
                blocking(move || file.init()).await?
            };
            print_json(&serde_json::json!({
                "path": file.path().display().to_string(),
                "created": created,
            }))
        }

        Command::Analyze { epic } => {
            let store = file.load_async().await?;
            print_json(&ReadinessAnalyzer::new(&store).analyze_epic(&epic)?)
        }

        Command::Ready { epic, parallel } => {
            let store = file.load_async().await?;
            let analyzer = ReadinessAnalyzer::new(&store);
            let mut ready = analyzer.ready_tasks(&epic)?;
            if parallel {
                ready = analyzer.parallel_safe(&ready);
            }
            print_json(&ready)
        }

        Command::Next { epic } => {
            let store = file.load_async().await?;
            print_json(&ReadinessAnalyzer::new(&store).next_task(&epic)?)
        }

        Command::Context { epic } => {
            let store = file.load_async().await?;
            print_json(&ReadinessAnalyzer::new(&store).epic_context(&epic)?)
        }

        Command::Spawn { task } => {
            let attempts = config.spawn.max_claim_attempts;
            let context = blocking(move || {
                SpawnCoordinator::new(ValidatorRegistry::new())
                    .with_max_claim_attempts(attempts)
                    .claim(&file, &task)
            })
            .await?;
            print_json(&serde_json::json!({
                "context": context,
                "brief": context.render_brief(),
            }))
        }

        Command::Complete { task, report } => {
            let report: CompletionReport = serde_json::from_str(&std::fs::read_to_string(&report)?)?;
            let verdict = blocking(move || {
                SpawnCoordinator::default().record_outcome(&file, &task, &report)
            })
            .await?;
            print_json(&verdict)
        }

        Command::Import {
            package,
            dry_run,
            parent,
            phase,
            label,
            reset_status,
            on_conflict,
            on_missing_dep,
            force,
        } => {
            let options = ImportOptions {
                dry_run,
                parent_id: parent,
                phase_override: phase,
                add_label: label,
                reset_status,
                on_conflict: on_conflict.unwrap_or(config.import.on_conflict),
                on_missing_dep: on_missing_dep.unwrap_or(config.import.on_missing_dep),
                force,
            };
            let result = blocking(move || import_package(&file, &package, &options)).await?;
            print_json(&result)
        }

        Command::Export { roots, out } => {
            let store = file.load_async().await?;
            let package = export_package(&store, &roots, config.project_name())?;
            package.write(&out)?;
            print_json(&serde_json::json!({
                "path": out.display().to_string(),
                "tasks": package.tasks.len(),
            }))
        }

        Command::Check => {
            let store = blocking(move || file.load()).await?;
            let issues: Vec<IntegrityIssue> = store.validate_integrity();
            print_json(&serde_json::json!({
                "tasks": store.len(),
                "checksum": store.checksum(),
                "valid": issues.is_empty(),
                "issues": issues,
            }))
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
