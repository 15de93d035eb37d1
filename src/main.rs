use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use branchflow::commands::{
    AbortOptions, CommandOutcome, ErrorKind, LaunchOptions, Orchestrator, ShipOptions,
    WorkflowError,
};
use branchflow::config::Config;
use branchflow::git::GitCli;
use branchflow::persistence::SessionStore;
use branchflow::platform::NoPlatform;
use branchflow::types::{SessionId, Severity};
use branchflow::validation::{BranchValidator, validate_branch_name};

#[derive(Parser)]
#[command(name = "branchflow")]
#[command(about = "Git workflow sessions with pre-flight checks and linear history")]
#[command(version)]
struct Cli {
    /// Config file. Defaults to .branchflow.toml in the working copy.
    #[arg(long, global = true, env = "BRANCHFLOW_CONFIG")]
    config: Option<PathBuf>,

    /// Session store directory, overriding the config.
    #[arg(long, global = true, env = "BRANCHFLOW_STATE_DIR")]
    state_dir: Option<PathBuf>,

    /// Base branch, overriding the config.
    #[arg(long, global = true)]
    base: Option<String>,

    /// Working copy to operate on.
    #[arg(short = 'C', long = "repo", global = true, default_value = ".")]
    repo: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start a feature session on a new branch.
    Launch { branch: String },

    /// Start an expedited hotfix session.
    Hotfix {
        branch: String,
        #[arg(long, default_value = "high")]
        severity: Severity,
    },

    /// Commit, push and open or update the pull request.
    Ship {
        /// Commit uncommitted changes with this message first.
        #[arg(short, long)]
        message: Option<String>,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        body: Option<String>,
        /// Wait for checks, rebase and merge.
        #[arg(long)]
        merge: bool,
        /// Hotfix only: push straight onto the base branch.
        #[arg(long)]
        direct: bool,
    },

    /// Check out another session's branch.
    Swap { branch: String },

    /// Abort a session.
    Abort {
        #[arg(long)]
        branch: Option<String>,
        #[arg(long)]
        reason: Option<String>,
        /// Also delete the branch locally and on the remote.
        #[arg(long)]
        delete_branch: bool,
    },

    /// Delete a merged branch and finish its session.
    Cleanup {
        #[arg(long)]
        branch: Option<String>,
    },

    /// Show the session on a branch (default: the checked-out one).
    Status {
        #[arg(long)]
        branch: Option<String>,
        #[arg(long)]
        json: bool,
    },

    /// List sessions.
    List {
        /// Include finished and expired sessions.
        #[arg(long)]
        all: bool,
        #[arg(long)]
        json: bool,
    },

    /// Check whether a new session may use a branch name.
    CheckBranch { name: String },

    /// Remove expired sessions.
    Gc,

    /// Release a lock left behind by a crashed command.
    Unlock { session: SessionId },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "branchflow=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {:#}", e);
            let Some(workflow) = e.downcast_ref::<WorkflowError>() else {
                return ExitCode::FAILURE;
            };
            if let WorkflowError::PreflightFailed { report, .. } = workflow {
                eprintln!("{}", report);
            }
            for suggestion in workflow.suggestions() {
                eprintln!("  hint: {}", suggestion);
            }
            ExitCode::from(exit_code(workflow.kind()))
        }
    }
}

fn exit_code(kind: ErrorKind) -> u8 {
    match kind {
        ErrorKind::External => 1,
        ErrorKind::Validation => 2,
        ErrorKind::Conflict => 3,
        ErrorKind::Busy => 4,
        ErrorKind::Integrity => 5,
    }
}

async fn run(cli: Cli) -> Result<()> {
    let workdir = cli.repo.clone();
    let mut config = match &cli.config {
        Some(path) => Config::load(path),
        None => Config::discover(&workdir),
    }
    .context("loading configuration")?;
    if let Some(dir) = cli.state_dir {
        config.state_dir = Some(dir);
    }
    if let Some(base) = cli.base {
        config.base_branch = base;
    }
    config.validate()?;

    let state_dir = config.state_dir_for(&workdir);
    let store = SessionStore::open(&state_dir, config.session_ttl())
        .with_context(|| format!("opening session store at {}", state_dir.display()))?;
    let mut git = GitCli::new(&workdir, config.remote.as_str());
    if let Some(identity) = &config.commit_identity {
        git = git.with_identity(identity.into());
    }
    let orchestrator = Orchestrator::new(&store, &git, &config).with_project_path(workdir.clone());

    match cli.command {
        Command::Launch { branch } => {
            let outcome = orchestrator
                .launch(&LaunchOptions { branch, base: None })
                .await?;
            report(&outcome);
        }
        Command::Hotfix { branch, severity } => {
            report(&orchestrator.hotfix(&branch, severity).await?);
        }
        Command::Ship {
            message,
            title,
            body,
            merge,
            direct,
        } => {
            let options = ShipOptions {
                message,
                title,
                body,
                merge,
                direct,
            };
            report(&orchestrator.ship(&NoPlatform, &options).await?);
        }
        Command::Swap { branch } => report(&orchestrator.swap(&branch).await?),
        Command::Abort {
            branch,
            reason,
            delete_branch,
        } => {
            let options = AbortOptions {
                branch,
                reason,
                delete_branch,
            };
            report(&orchestrator.abort(&options).await?);
        }
        Command::Cleanup { branch } => report(&orchestrator.cleanup(branch.as_deref()).await?),
        Command::Status { branch, json } => {
            let summary = orchestrator.status(branch.as_deref()).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("{}", summary.render());
            }
        }
        Command::List { all, json } => {
            let summaries = orchestrator.list(all)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summaries)?);
            } else if summaries.is_empty() {
                println!("no sessions");
            } else {
                for summary in &summaries {
                    println!("{}", summary.render());
                }
            }
        }
        Command::CheckBranch { name } => {
            validate_branch_name(&name).with_context(|| format!("'{}'", name))?;
            let verdict = BranchValidator::new(&store).check_branch_name_availability(&name)?;
            if let Some(reason) = verdict.reason() {
                println!("{}", reason);
            }
            if !verdict.available {
                for suggestion in &verdict.suggestions {
                    println!("  try: {}", suggestion);
                }
                bail!("branch '{}' is not available", name);
            }
            println!("branch '{}' is available", name);
        }
        Command::Gc => {
            let removed = store.cleanup_expired()?;
            println!("removed {} expired session(s)", removed);
        }
        Command::Unlock { session } => {
            let session = store.require(session)?;
            if !store.is_locked(session.id) {
                println!("session {} is not locked", session.id.short());
                return Ok(());
            }
            tracing::warn!(session = %session.id, branch = %session.branch_name, "releasing lock by hand");
            store.release_lock(session.id)?;
            println!("released lock on {}", session.branch_name);
        }
    }
    Ok(())
}

fn report(outcome: &CommandOutcome) {
    for warning in outcome
        .preflight
        .results
        .iter()
        .filter(|r| !r.passed && !r.is_blocking())
    {
        eprintln!("{}", warning.render_line());
    }
    for note in &outcome.notes {
        println!("{}", note);
    }
    let session = &outcome.session;
    println!(
        "{}: {} is {}",
        outcome.command,
        session.branch_name,
        session.current_state()
    );
    if !outcome.postflight.passed() {
        eprintln!("{}", outcome.postflight);
    }
}
