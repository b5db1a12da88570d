use benchd::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use colored::Colorize;
use std::io;

#[derive(Parser)]
#[command(name = "benchd")]
#[command(author = "Chris Cheng <chris.cheng@shopee.com>")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Multi-model benchmark orchestrator with reversible workspace snapshots", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a benchmark: one child session and isolated worktree per model
    Start {
        /// Parent session id (created if missing; a fresh one when omitted)
        #[arg(short, long)]
        session: Option<String>,

        /// Number of children when no models are given
        #[arg(short, long)]
        count: Option<usize>,

        /// Model to race, as provider/model (repeat for several)
        #[arg(short, long = "model")]
        models: Vec<String>,

        /// Allow the same model to appear more than once
        #[arg(long)]
        allow_duplicates: bool,
    },

    /// Stop the benchmark and remove its worktrees
    Stop {
        /// Any session in the benchmark
        #[arg(short, long)]
        session: String,
    },

    /// Apply one variant's results to the live workspace
    Apply {
        /// A child session, or the parent combined with --target
        #[arg(short, long)]
        session: String,

        /// Child session to apply when --session names the parent
        #[arg(short, long)]
        target: Option<String>,

        /// Overwrite uncommitted changes without asking
        #[arg(long)]
        allow_dirty: bool,
    },

    /// Restore the workspace to its pre-apply checkpoint
    Undo {
        /// Any session in the benchmark
        #[arg(short, long)]
        session: String,

        /// Overwrite uncommitted changes without asking
        #[arg(long)]
        allow_dirty: bool,
    },

    /// Show the benchmark attached to a session
    Status {
        #[arg(short, long)]
        session: String,

        /// Output in JSON format
        #[arg(short, long)]
        json: bool,
    },

    /// Show what a variant changed relative to the benchmark base
    Diff {
        #[arg(short, long)]
        session: String,

        /// Child session to diff when --session names the parent
        #[arg(short, long)]
        target: Option<String>,
    },

    /// List sessions
    Sessions,

    /// Generate shell completions
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    let cli = Cli::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to create tokio runtime");

    if let Err(e) = runtime.block_on(run_async(cli)) {
        eprintln!("{}", format!("Error: {}", e).red());
        std::process::exit(1);
    }
}

async fn run_async(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Start {
            session,
            count,
            models,
            allow_duplicates,
        } => {
            benchd::cli::start::run(session, count, models, allow_duplicates).await?;
        }

        Commands::Stop { session } => {
            benchd::cli::stop::run(&session).await?;
        }

        Commands::Apply {
            session,
            target,
            allow_dirty,
        } => {
            benchd::cli::apply::run(&session, target, allow_dirty).await?;
        }

        Commands::Undo { session, allow_dirty } => {
            benchd::cli::undo::run(&session, allow_dirty).await?;
        }

        Commands::Status { session, json } => {
            benchd::cli::status::run(&session, json).await?;
        }

        Commands::Diff { session, target } => {
            benchd::cli::diff::run(&session, target).await?;
        }

        Commands::Sessions => {
            benchd::cli::sessions::run().await?;
        }

        Commands::Completions { shell } => {
            generate(shell, &mut Cli::command(), "benchd", &mut io::stdout());
        }
    }

    Ok(())
}
