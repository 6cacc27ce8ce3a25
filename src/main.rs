use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use atelier::config::{AtelierConfig, ReviewerMode};
use atelier::engine::PhaseStateMachine;
use atelier::models::Actor;
use atelier::notify::BroadcastSink;
use atelier::reviewer::{CommandReviewer, ReviewerAdapter, StaticReviewer};
use atelier::store::{DbHandle, WorkflowDb};

mod cmd;

#[derive(Parser)]
#[command(name = "atelier")]
#[command(version, about = "Approval workflow engine for an AI-agent company")]
pub struct Cli {
    /// Path to atelier.toml. Defaults to ./atelier.toml when present.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Database file path, overriding the configured one.
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage projects
    Project {
        #[command(subcommand)]
        command: ProjectCommands,
    },
    /// Work with deliverables
    Deliverable {
        #[command(subcommand)]
        command: DeliverableCommands,
    },
    /// Team operations
    Team {
        #[command(subcommand)]
        command: TeamCommands,
    },
    /// Complete the active phase when all of its deliverables are approved
    Advance { project_id: i64 },
    /// Consolidated phase reports
    Report {
        #[command(subcommand)]
        command: ReportCommands,
    },
}

#[derive(Subcommand)]
pub enum ProjectCommands {
    /// Create a project from the default six-phase template
    Create {
        #[arg(long)]
        name: String,
    },
    List,
    /// Phase-by-phase progress for a project
    Status { project_id: i64 },
}

#[derive(Subcommand)]
pub enum DeliverableCommands {
    /// Generate (or regenerate) content through the reviewer adapter
    Generate {
        deliverable_id: i64,
        /// Revision feedback; regeneration resets both approval flags
        #[arg(long)]
        feedback: Option<String>,
    },
    /// Record a human or automated approval verdict
    Approve {
        deliverable_id: i64,
        /// Who is signing off: reviewer or owner
        #[arg(long)]
        actor: ActorArg,
        /// Record a rejection instead of an approval
        #[arg(long)]
        reject: bool,
        #[arg(long)]
        comment: Option<String>,
    },
    /// Run the automated review and record its verdict
    Review { deliverable_id: i64 },
    Show { deliverable_id: i64 },
}

#[derive(Subcommand)]
pub enum TeamCommands {
    /// Match idle members to the active phase's open deliverables
    Assign { team_id: i64 },
}

#[derive(Subcommand)]
pub enum ReportCommands {
    Show { phase_id: i64 },
    /// Recompile a completed phase's report (safe to repeat)
    Compile { phase_id: i64 },
}

/// CLI-facing actor choice. `Actor::System` is engine-internal and not a
/// valid sign-off party, so it is not offered here.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ActorArg {
    Reviewer,
    Owner,
}

impl From<ActorArg> for Actor {
    fn from(value: ActorArg) -> Self {
        match value {
            ActorArg::Reviewer => Actor::Reviewer,
            ActorArg::Owner => Actor::Owner,
        }
    }
}

fn build_engine(cli: &Cli) -> Result<PhaseStateMachine> {
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from("atelier.toml"));
    let config = AtelierConfig::load(Some(&config_path))?;

    let db_path = cli
        .db
        .clone()
        .unwrap_or_else(|| config.storage.resolve_db_path());
    if let Some(parent) = db_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create data directory {}", parent.display()))?;
    }
    let db = DbHandle::new(WorkflowDb::new(&db_path)?);

    let reviewer: Arc<dyn ReviewerAdapter> = match config.reviewer.mode {
        ReviewerMode::Command => Arc::new(CommandReviewer::new(&config.reviewer.cmd)),
        ReviewerMode::Static => Arc::new(StaticReviewer),
    };
    let sink = Arc::new(BroadcastSink::new(config.notifications.channel_capacity));

    Ok(PhaseStateMachine::new(
        db,
        reviewer,
        sink,
        config.generation_timeout(),
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("atelier=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let engine = build_engine(&cli)?;

    match &cli.command {
        Commands::Project { command } => match command {
            ProjectCommands::Create { name } => cmd::project_create(&engine, name).await?,
            ProjectCommands::List => cmd::project_list(&engine).await?,
            ProjectCommands::Status { project_id } => {
                cmd::project_status(&engine, *project_id).await?
            }
        },
        Commands::Deliverable { command } => match command {
            DeliverableCommands::Generate {
                deliverable_id,
                feedback,
            } => cmd::deliverable_generate(&engine, *deliverable_id, feedback.clone()).await?,
            DeliverableCommands::Approve {
                deliverable_id,
                actor,
                reject,
                comment,
            } => {
                cmd::deliverable_approve(
                    &engine,
                    *deliverable_id,
                    Actor::from(*actor),
                    !reject,
                    comment.clone(),
                )
                .await?
            }
            DeliverableCommands::Review { deliverable_id } => {
                cmd::deliverable_review(&engine, *deliverable_id).await?
            }
            DeliverableCommands::Show { deliverable_id } => {
                cmd::deliverable_show(&engine, *deliverable_id).await?
            }
        },
        Commands::Team { command } => match command {
            TeamCommands::Assign { team_id } => cmd::team_assign(&engine, *team_id).await?,
        },
        Commands::Advance { project_id } => cmd::advance(&engine, *project_id).await?,
        Commands::Report { command } => match command {
            ReportCommands::Show { phase_id } => cmd::report_show(&engine, *phase_id).await?,
            ReportCommands::Compile { phase_id } => cmd::report_compile(&engine, *phase_id).await?,
        },
    }

    Ok(())
}
