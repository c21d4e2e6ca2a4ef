//! Process Import Worker - bulk import of judicial processes from spreadsheets
//!
//! Uploaded spreadsheets are stored as batches; the import job claims waiting
//! batches, validates every row and creates the valid processes.

mod cli;
mod config;
mod db;
mod error;
mod services;
mod types;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Command};
use services::files::{self, FileKind};
use services::import_processor::{ImportProcessor, PgBatchStore};
use services::reference::PgFlowLookup;

#[tokio::main]
async fn main() -> Result<()> {
    // Logs directory - use LOGS_DIR env var or default to ./logs
    let logs_dir = std::env::var("LOGS_DIR").unwrap_or_else(|_| "./logs".to_string());
    std::fs::create_dir_all(&logs_dir).ok();

    // File appender for persistent logs (daily rotation)
    let file_appender = RollingFileAppender::new(Rotation::DAILY, &logs_dir, "import-worker.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    // stdout is reserved for command output, so console logs go to stderr
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,process_import_worker=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    let cli = Cli::parse();

    let config = config::Config::from_env()?;
    info!("Configuration loaded");

    let pool = db::create_pool(&config.database_url, config.max_connections).await?;
    info!("Connected to PostgreSQL");

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            db::run_migrations(&pool).await?;
            let processor = Arc::new(build_processor(&pool, &config));
            let shutdown = CancellationToken::new();

            let signal_token = shutdown.clone();
            tokio::spawn(async move {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => info!("Shutdown requested"),
                    Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
                }
                signal_token.cancel();
            });

            info!("Starting import worker...");
            processor.start_processing(config.poll_interval, shutdown).await;
        }
        Command::Migrate => {
            db::run_migrations(&pool).await?;
            info!("Database migrations complete");
        }
        Command::RunOnce => {
            let report = build_processor(&pool, &config).run_once().await?;
            print_json(&report)?;
        }
        Command::Upload {
            file,
            name,
            imported_by,
            mime_type,
        } => {
            let file_name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let mime_type = match mime_type {
                Some(mime) => mime,
                None => files::mime_for_file_name(&file_name)
                    .unwrap_or_default()
                    .to_string(),
            };
            let data = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;

            let id = files::create_upload(&pool, &name, &file_name, &mime_type, data, &imported_by).await?;
            print_json(&serde_json::json!({ "idProcessesFile": id, "status": "waiting" }))?;
        }
        Command::List => {
            print_json(&db::queries::batch::list_batches(&pool).await?)?;
        }
        Command::Items { batch_id } => {
            print_json(&db::queries::batch::list_rows(&pool, batch_id).await?)?;
        }
        Command::Download {
            batch_id,
            kind,
            output,
        } => {
            let file = files::find_file(&pool, batch_id, kind.into()).await?;
            write_output(output, &file).await?;
        }
        Command::Report { batch_id, output } => {
            let file = files::find_file(&pool, batch_id, FileKind::Report).await?;
            write_output(output, &file).await?;
        }
        Command::Reset { batch_id } => {
            if db::queries::batch::reset_batch(&pool, batch_id).await? {
                info!("Batch {} is waiting again", batch_id);
            } else {
                warn!("Batch {} not found or not in error", batch_id);
            }
        }
        Command::MarkRow { row_id, process_id } => {
            if db::queries::batch::mark_row_manually_imported(&pool, row_id, process_id).await? {
                info!("Row {} marked as manually imported", row_id);
            } else {
                warn!("Row {} not found or not in error", row_id);
            }
        }
        Command::Delete { batch_id } => {
            if db::queries::batch::delete_batch(&pool, batch_id).await? {
                info!("Batch {} and its rows deleted", batch_id);
            } else {
                warn!("Batch {} not found", batch_id);
            }
        }
    }

    Ok(())
}

fn build_processor(pool: &sqlx::PgPool, config: &config::Config) -> ImportProcessor {
    ImportProcessor::new(
        Arc::new(PgBatchStore::new(pool.clone())),
        Arc::new(PgFlowLookup::new(pool.clone())),
        config.batch_size,
    )
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn write_output(output: Option<PathBuf>, file: &files::StoredFile) -> Result<()> {
    let path = output.unwrap_or_else(|| Path::new(&file.file_name).to_path_buf());
    tokio::fs::write(&path, &file.data)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Wrote {} ({} bytes)", path.display(), file.data.len());
    Ok(())
}
