mod config;
mod repair_cmd;
mod serve_cmd;
mod status_cmd;

#[cfg(test)]
mod test_util;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use uuid::Uuid;

use waypoint_core::generator::TemplateGenerator;
use waypoint_core::journey;
use waypoint_db::models::{CompletionRecord, CompletionStage};
use waypoint_db::pool;
use waypoint_db::queries::completions;

use config::WaypointConfig;

#[derive(Parser)]
#[command(name = "waypoint", about = "Coaching journey gate and plan generation service")]
struct Cli {
    /// Database URL (overrides WAYPOINT_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a waypoint config file (no database required)
    Init {
        /// PostgreSQL connection URL
        #[arg(long, default_value = "postgresql://localhost:5432/waypoint")]
        db_url: String,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Initialize the waypoint database (requires config file or env vars)
    DbInit,
    /// Run the HTTP server
    Serve {
        /// Bind address
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
        /// Port to listen on
        #[arg(long, default_value_t = 8080)]
        port: u16,
        /// Maximum artifacts generated concurrently per plan
        #[arg(long)]
        max_concurrent: Option<usize>,
        /// Generator call timeout in seconds
        #[arg(long)]
        generation_timeout: Option<u64>,
    },
    /// Show the resolved journey step for a user
    Journey {
        /// User ID to resolve
        user_id: String,
    },
    /// Show plan status and per-artifact progress for a user
    Status {
        /// User ID to show status for
        user_id: String,
    },
    /// Raise a completion flag for a user (operator tool / upstream stand-in)
    Complete {
        /// User ID to mark
        user_id: String,
        /// Stage to mark: interview, payment, module_1, module_2, module_3, plan
        stage: String,
    },
    /// Repair a stuck or missing plan and re-run generation
    Repair {
        /// User ID whose plan to repair
        user_id: String,
        /// Also reset terminal artifacts so everything regenerates
        #[arg(long)]
        force: bool,
        /// Requeue only this artifact key (targeted retry)
        #[arg(long)]
        artifact: Option<String>,
    },
}

/// Execute the `waypoint init` command: write config file.
fn cmd_init(db_url: &str, force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let cfg = config::ConfigFile {
        database: config::DatabaseSection {
            url: db_url.to_string(),
        },
        generation: config::GenerationSection::default(),
    };

    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  database.url = {db_url}");
    println!("  generation.max_concurrent = {}", cfg.generation.max_concurrent);
    println!("  generation.timeout_secs = {}", cfg.generation.timeout_secs);
    println!();
    println!("Next: run `waypoint db-init` to create and migrate the database.");

    Ok(())
}

/// Execute the `waypoint db-init` command: create database and run migrations.
async fn cmd_db_init(cli_db_url: Option<&str>) -> anyhow::Result<()> {
    let resolved = WaypointConfig::resolve(cli_db_url)?;

    println!("Initializing waypoint database...");

    // 1. Create the database if it does not exist.
    pool::ensure_database_exists(&resolved.db_config).await?;

    // 2. Connect to the target database.
    let db_pool = pool::create_pool(&resolved.db_config).await?;

    // 3. Run migrations.
    pool::run_migrations(&db_pool).await?;

    // 4. Print success with table counts.
    let counts = pool::table_counts(&db_pool).await?;
    println!("Database ready. Tables:");
    for (table, count) in &counts {
        println!("  {table}: {count} rows");
    }

    // 5. Clean shutdown.
    db_pool.close().await;

    println!("waypoint db-init complete.");
    Ok(())
}

fn parse_user_id(raw: &str) -> anyhow::Result<Uuid> {
    Uuid::parse_str(raw).with_context(|| format!("invalid user ID: {raw}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { db_url, force } => {
            cmd_init(&db_url, force)?;
        }
        Commands::DbInit => {
            cmd_db_init(cli.database_url.as_deref()).await?;
        }
        Commands::Serve {
            bind,
            port,
            max_concurrent,
            generation_timeout,
        } => {
            let resolved = WaypointConfig::resolve(cli.database_url.as_deref())?;
            let mut pipeline = resolved.pipeline;
            if let Some(max) = max_concurrent {
                pipeline.max_concurrent = max;
            }
            if let Some(secs) = generation_timeout {
                pipeline.generation_timeout = Duration::from_secs(secs);
                pipeline.stuck_after = pipeline.generation_timeout * 2;
            }

            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let state = serve_cmd::AppState {
                pool: db_pool.clone(),
                generator: Arc::new(TemplateGenerator::new()),
                pipeline,
            };
            let result = serve_cmd::run_serve(state, &bind, port).await;
            db_pool.close().await;
            result?;
        }
        Commands::Journey { user_id } => {
            let resolved = WaypointConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let id = parse_user_id(&user_id)?;
            let record = completions::get_completion_record(&db_pool, id)
                .await?
                .unwrap_or_else(|| CompletionRecord::new(id));
            let resolution = journey::resolve(&record);
            println!("{} -> {}", resolution.step, resolution.path);
            db_pool.close().await;
        }
        Commands::Status { user_id } => {
            let resolved = WaypointConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let id = parse_user_id(&user_id)?;
            let result = status_cmd::run_status(&db_pool, id).await;
            db_pool.close().await;
            result?;
        }
        Commands::Complete { user_id, stage } => {
            let resolved = WaypointConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let id = parse_user_id(&user_id)?;
            let stage: CompletionStage = stage.parse()?;
            let record = completions::mark_stage(&db_pool, id, stage).await;
            db_pool.close().await;
            let record = record?;
            let resolution = journey::resolve(&record);
            println!("Marked {stage} complete for user {id}.");
            println!("Journey step is now {} -> {}", resolution.step, resolution.path);
        }
        Commands::Repair {
            user_id,
            force,
            artifact,
        } => {
            let resolved = WaypointConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let id = parse_user_id(&user_id)?;
            let result = repair_cmd::run_repair(
                &db_pool,
                Arc::new(TemplateGenerator::new()),
                id,
                force,
                artifact.as_deref(),
                &resolved.pipeline,
            )
            .await;
            db_pool.close().await;
            result?;
        }
    }

    Ok(())
}
