//! Conductor CLI: a thin `clap` wrapper over the control surface,
//! mapping each subcommand's outcome to an exit code (0 completed / 2
//! paused / 3 failed / 4 budget exceeded / 5 storage unavailable).

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use conductor::cmd::{cmd_cancel, cmd_resume, cmd_rollback, cmd_start, cmd_status};
use conductor::cmd::start::StartRequest;
use conductor::phase::{Phase, ResumeDecision};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "conductor")]
#[command(version, about = "Deterministic orchestrator for the five-phase SDLC")]
struct Cli {
    /// Directory holding (or to hold) `.conductor/`. Defaults to the
    /// current directory.
    #[arg(long, global = true)]
    project_dir: Option<PathBuf>,

    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new workflow and drive it until it pauses or finishes
    /// (§6.1 `start`).
    Start {
        /// Project identifier; a project with an active workflow already
        /// running gets that workflow's id back unchanged (idempotent).
        #[arg(long)]
        project: String,
        /// The feature request text handed to the writer agent at Phase 1.
        #[arg(long, conflicts_with = "brief_file")]
        brief: Option<String>,
        /// Read the feature request from a file instead of `--brief`.
        #[arg(long)]
        brief_file: Option<PathBuf>,
        /// Phase to begin at (1-5). Defaults to Planning.
        #[arg(long)]
        start_phase: Option<u8>,
        /// Stop once this phase would be entered, without executing it.
        #[arg(long)]
        end_phase: Option<u8>,
        /// Mark Phase 2 completed without dispatching reviewers.
        #[arg(long)]
        skip_validation: bool,
        /// Run unattended: loop past `needs_changes` up to the retry cap
        /// instead of pausing for confirmation.
        #[arg(long)]
        autonomous: bool,
    },
    /// Apply a human decision to a paused workflow and resume the run loop
    /// (§6.1 `resume`). With no `--decision`, prompts interactively.
    Resume {
        workflow_id: String,
        #[arg(long, value_enum)]
        decision: Option<Decision>,
    },
    /// Report current phase, per-phase status, pending interrupt, and
    /// iteration counter (§6.1 `status`).
    Status { workflow_id: String },
    /// Make an earlier checkpoint current without deleting any phase
    /// output recorded after it (§6.1 `rollback`, invariant 6).
    Rollback {
        workflow_id: String,
        checkpoint_seq: i64,
    },
    /// Cooperative stop: admits no new tasks, finishes in-flight work, then
    /// transitions the workflow to cancelled (§6.1 `cancel`).
    Cancel { workflow_id: String },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum Decision {
    Proceed,
    Abort,
}

impl From<Decision> for ResumeDecision {
    fn from(d: Decision) -> Self {
        match d {
            Decision::Proceed => ResumeDecision::Proceed,
            Decision::Abort => ResumeDecision::Abort,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let project_dir = match cli.project_dir {
        Some(dir) => dir,
        None => std::env::current_dir().context("failed to get current directory")?,
    };

    let exit_code = match cli.command {
        Commands::Start {
            project,
            brief,
            brief_file,
            start_phase,
            end_phase,
            skip_validation,
            autonomous,
        } => {
            let feature_brief = match (brief, brief_file) {
                (Some(text), None) => text,
                (None, Some(path)) => {
                    std::fs::read_to_string(&path).with_context(|| format!("failed to read brief file {}", path.display()))?
                }
                (None, None) => anyhow::bail!("one of --brief or --brief-file is required"),
                (Some(_), Some(_)) => unreachable!("clap enforces conflicts_with"),
            };
            let request = StartRequest {
                project,
                feature_brief,
                start_phase: start_phase.and_then(Phase::from_number),
                end_phase: end_phase.and_then(Phase::from_number),
                skip_validation,
                autonomous,
            };
            let response = cmd_start(&project_dir, request).await?;
            println!("workflow_id: {}", response.workflow_id);
            println!("accepted:    {}", response.accepted);
            response.exit_code
        }
        Commands::Resume { workflow_id, decision } => {
            let response = cmd_resume(&project_dir, &workflow_id, decision.map(Into::into)).await?;
            println!("workflow_id: {}", response.workflow_id);
            response.exit_code
        }
        Commands::Status { workflow_id } => {
            let report = cmd_status(&project_dir, &workflow_id)?;
            println!("workflow_id:      {}", report.workflow_id);
            println!("current_phase:    {} ({})", report.current_phase.number(), report.current_phase);
            println!("iteration:        {}/{}", report.iteration_count, report.iteration_cap);
            println!("checkpoint_seq:   {}", report.checkpoint_seq);
            println!("pending_interrupt: {}", report.pending_interrupt.as_deref().unwrap_or("none"));
            println!();
            println!("{:<14} {}", "phase", "status");
            for (phase, status) in &report.phase_status {
                println!("{:<14} {:?}", phase.to_string(), status);
            }
            report.exit_code
        }
        Commands::Rollback { workflow_id, checkpoint_seq } => {
            let response = cmd_rollback(&project_dir, &workflow_id, checkpoint_seq)?;
            println!("workflow_id:    {}", response.workflow_id);
            println!("restored_phase: {} ({})", response.restored_phase.number(), response.restored_phase);
            response.exit_code
        }
        Commands::Cancel { workflow_id } => {
            let response = cmd_cancel(&project_dir, &workflow_id)?;
            println!("workflow_id: {}", response.workflow_id);
            println!("cancelled");
            response.exit_code
        }
    };

    std::process::exit(exit_code);
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::{EnvFilter, fmt};

    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(format!("conductor={default_level}")));
    fmt().with_env_filter(filter).with_target(false).init();
}
