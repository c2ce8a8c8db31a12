mod script;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sea_orm::DatabaseConnection;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

use fta::database::connection::{establish_connection, get_database_url};
use fta::database::migrations::{run_migrations, MigrateDirection};
use fta::reconcile::ApplyOutcome;
use fta::services::{AnalysisService, FaultTreeService};
use fta::{EditSession, EditorConfig};

#[derive(Parser)]
#[clap(author, version, about)]
struct Cli {
    #[clap(short, long, global = true)]
    log_level: Option<String>,
    /// Editor settings file (TOML)
    #[clap(short, long, global = true)]
    config: Option<PathBuf>,
    /// Override the undo history limit
    #[clap(long, global = true)]
    history_limit: Option<usize>,
    /// Override the number of attempts per remote call
    #[clap(long, global = true)]
    max_attempts: Option<u32>,
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Db {
        #[clap(subcommand)]
        command: DbCommands,
    },
    Analysis {
        #[clap(subcommand)]
        command: AnalysisCommands,
    },
    /// Run an edit script against an analysis through the undo/redo engine
    Replay {
        #[clap(short, long, default_value = "fta.db")]
        database: String,
        #[clap(short, long)]
        analysis: String,
        #[clap(short, long)]
        script: PathBuf,
        /// Undo this many commands after the script
        #[clap(long, default_value = "0")]
        undo: usize,
        /// Then redo this many
        #[clap(long, default_value = "0")]
        redo: usize,
    },
    /// Print an analysis' fault tree
    Show {
        #[clap(short, long, default_value = "fta.db")]
        database: String,
        #[clap(short, long)]
        analysis: String,
        #[clap(long)]
        json: bool,
    },
}

#[derive(Subcommand, Debug)]
enum DbCommands {
    Init {
        #[clap(short, long, default_value = "fta.db")]
        database: String,
    },
    Migrate {
        #[clap(subcommand)]
        direction: MigrateCommand,
        #[clap(short, long, default_value = "fta.db")]
        database: String,
    },
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum MigrateCommand {
    /// Apply pending migrations
    Up,
    /// Roll back the last migration
    Down,
    /// Drop everything and migrate from scratch
    Fresh,
}

impl From<MigrateCommand> for MigrateDirection {
    fn from(command: MigrateCommand) -> Self {
        match command {
            MigrateCommand::Up => MigrateDirection::Up,
            MigrateCommand::Down => MigrateDirection::Down,
            MigrateCommand::Fresh => MigrateDirection::Fresh,
        }
    }
}

#[derive(Subcommand, Debug)]
enum AnalysisCommands {
    Create {
        #[clap(short, long)]
        name: String,
        #[clap(long)]
        description: Option<String>,
        #[clap(short, long, default_value = "fta.db")]
        database: String,
    },
    List {
        #[clap(short, long, default_value = "fta.db")]
        database: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    setup_logging(&args.log_level);
    let config = load_config(&args)?;

    match args.command {
        Commands::Db { command } => match command {
            DbCommands::Init { database } => {
                info!("Initializing database: {}", database);
                migrate_database(&database, MigrateDirection::Up).await?;
            }
            DbCommands::Migrate {
                direction,
                database,
            } => {
                info!("Running database migration: {:?}", direction);
                migrate_database(&database, direction.into()).await?;
            }
        },
        Commands::Analysis { command } => match command {
            AnalysisCommands::Create {
                name,
                description,
                database,
            } => {
                let db = connect(&database).await?;
                let analysis = AnalysisService::new(db)
                    .create_analysis(&name, description.as_deref())
                    .await?;
                println!("{}", analysis.id);
            }
            AnalysisCommands::List { database } => {
                let db = connect(&database).await?;
                for analysis in AnalysisService::new(db).list_analyses().await? {
                    println!(
                        "{}  v{:<4} {}",
                        analysis.id, analysis.version, analysis.name
                    );
                }
            }
        },
        Commands::Replay {
            database,
            analysis,
            script,
            undo,
            redo,
        } => {
            replay(&config, &database, &analysis, &script, undo, redo).await?;
        }
        Commands::Show {
            database,
            analysis,
            json,
        } => {
            show(&database, &analysis, json).await?;
        }
    }

    Ok(())
}

/// Defaults, then the config file, then `FTA_*` variables, then flags.
fn load_config(args: &Cli) -> Result<EditorConfig> {
    let mut config = match &args.config {
        Some(path) => EditorConfig::from_toml_file(path)?,
        None => EditorConfig::default(),
    }
    .with_env();

    if let Some(limit) = args.history_limit {
        config.history_limit = limit;
    }
    if let Some(attempts) = args.max_attempts {
        config.retry.max_attempts = attempts;
    }
    config.validate().context("Invalid editor configuration")?;
    Ok(config)
}

async fn connect(database: &str) -> Result<DatabaseConnection> {
    let url = get_database_url(Some(database));
    establish_connection(&url)
        .await
        .with_context(|| format!("Failed to open database {}", database))
}

async fn migrate_database(database: &str, direction: MigrateDirection) -> Result<()> {
    let db = connect(database).await?;
    run_migrations(&db, direction)
        .await
        .context("Migration failed")?;
    info!("Database {} is up to date", database);
    Ok(())
}

async fn replay(
    config: &EditorConfig,
    database: &str,
    analysis_id: &str,
    script: &std::path::Path,
    undo: usize,
    redo: usize,
) -> Result<()> {
    let steps = script::load_script(script)?;
    let db = connect(database).await?;
    AnalysisService::new(db.clone())
        .get_analysis(analysis_id)
        .await?;

    let service = Arc::new(FaultTreeService::new(db, analysis_id));
    let mut session = EditSession::load(service, config).await?;
    info!("Replaying {} steps from {}", steps.len(), script.display());

    let mut applied = 0;
    let mut skipped = 0;
    let mut unsynced = 0;
    for (index, step) in steps.into_iter().enumerate() {
        match step.run(&mut session).await {
            Ok(Some(report)) => {
                match &report.outcome {
                    ApplyOutcome::Applied { .. } => applied += 1,
                    ApplyOutcome::Skipped { reason } => {
                        skipped += 1;
                        warn!("Step {} skipped: {}", index + 1, reason);
                    }
                }
                for (key, error) in &report.failed {
                    unsynced += 1;
                    warn!("Step {}: {} not saved: {}", index + 1, key, error);
                }
            }
            Ok(None) => {
                skipped += 1;
                warn!("Step {}: nothing to undo or redo", index + 1);
            }
            Err(err) => {
                skipped += 1;
                warn!("Step {} rejected: {}", index + 1, err);
            }
        }
    }

    for _ in 0..undo {
        if session.undo().await.is_none() {
            break;
        }
    }
    for _ in 0..redo {
        if session.redo().await.is_none() {
            break;
        }
    }

    let retried = session.retry_failed().await;
    if !retried.synced.is_empty() {
        info!("Saved {} entities on retry", retried.synced.len());
    }

    let store = session.store();
    println!(
        "applied {}, skipped {}, failed saves {}, still unsynced {}",
        applied,
        skipped,
        unsynced,
        session.unsynced().len()
    );
    println!(
        "graph: {} nodes, {} edges; history {} (undo: {}, redo: {})",
        store.node_count(),
        store.edge_count(),
        session.log().len(),
        session.can_undo(),
        session.can_redo()
    );
    Ok(())
}

async fn show(database: &str, analysis_id: &str, json: bool) -> Result<()> {
    let db = connect(database).await?;
    let analysis = AnalysisService::new(db.clone())
        .get_analysis(analysis_id)
        .await?;
    let graph = FaultTreeService::new(db, analysis_id).fetch_graph().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&graph)?);
        return Ok(());
    }

    println!("{} (version {})", analysis.name, analysis.version);
    for node in &graph.nodes {
        let rpn = node
            .rpn()
            .map(|rpn| format!("RPN {}", rpn))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<20} {:<22} ({:>7.1}, {:>7.1})  {:<8} {}",
            node.id,
            node.node_type.as_storage_name(),
            node.position.x,
            node.position.y,
            rpn,
            node.label
        );
    }
    for edge in &graph.edges {
        println!(
            "  {} -> {} [{}] ({})",
            edge.source,
            edge.target,
            edge.gate.as_storage_name(),
            edge.id
        );
    }
    Ok(())
}

fn setup_logging(log_level: &Option<String>) {
    let log_level = match log_level
        .as_ref()
        .unwrap_or(&"info".to_string())
        .to_lowercase()
        .as_str()
    {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(format!("sqlx=warn,sea_orm=warn,{}", log_level)))
        .without_time()
        .init();
}
