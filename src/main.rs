//! Tasuki 命令行
//!
//! - `tasuki run <instruction>`：创建（或恢复）会话并运行若干轮
//! - `tasuki init [DIR]`：写出默认配置与 prompt

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tasuki::config::{init_project, load_config};
use tasuki::core::{RoundScheduler, Session, TaskStatus};

#[derive(Parser, Debug)]
#[command(name = "tasuki", version, about = "Planner / worker coding harness")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run planning + worker rounds for an instruction.
    Run {
        /// What the agents should accomplish.
        instruction: String,

        /// Number of rounds to run.
        #[arg(long, default_value_t = 3)]
        rounds: usize,

        /// Extra config file layered over config/default.toml.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Resume an existing session id instead of creating one.
        #[arg(long)]
        session: Option<String>,

        /// Source repository workers copy from (defaults to [repo].path or the current directory).
        #[arg(long)]
        repo: Option<PathBuf>,
    },
    /// Write the default config/ directory.
    Init {
        /// Target directory (defaults to the current directory).
        dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tasuki::observability::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Init { dir } => {
            let dest = init_project(dir.as_deref()).context("Failed to write default config")?;
            println!("Wrote {}", dest.display());
        }
        Command::Run {
            instruction,
            rounds,
            config,
            session,
            repo,
        } => {
            let cfg = load_config(config).context("Failed to load config")?;
            let repo_path = match repo.or_else(|| cfg.repo.path.clone()) {
                Some(p) => p,
                None => std::env::current_dir().context("Cannot resolve current directory")?,
            };
            let repo_path = repo_path.canonicalize().unwrap_or(repo_path);

            let session = match session {
                Some(id) => Session::open(&cfg.session.root, &id)
                    .with_context(|| format!("Failed to resume session {id}"))?,
                None => Session::create(&cfg.session.root).context("Failed to create session")?,
            };
            let scheduler =
                RoundScheduler::from_config(&cfg, repo_path).context("Failed to build scheduler")?;

            tracing::info!(
                session = %session.id(),
                repo = %scheduler.repo_path().display(),
                max_workers = scheduler.max_workers(),
                rounds,
                "Starting"
            );

            let reports = scheduler
                .run_rounds(&session, &instruction, rounds, |report| match &report.error {
                    None => println!(
                        "Round {}: {} task(s) completed",
                        report.round,
                        report.completed.len()
                    ),
                    Some(e) => println!("Round {} failed: {e}", report.round),
                })
                .await;
            let total: usize = reports.iter().map(|r| r.completed.len()).sum();
            let failed = reports.iter().filter(|r| r.error.is_some()).count();

            let pending = session.tasks().count(TaskStatus::Pending).await;
            let running = session.tasks().count(TaskStatus::Running).await;
            println!(
                "Total completed: {total} (pending: {pending}, running: {running}, failed rounds: {failed})\nSession: {}",
                session.root().display()
            );
        }
    }
    Ok(())
}
