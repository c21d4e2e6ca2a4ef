//! Batch import processor
//!
//! Claims waiting batches and runs each one through
//! ingest -> header resolution -> row validation -> persistence.
//!
//! ## Failure model
//! - Row problems are stored on the row; the batch still ends `imported`
//! - Parse, header, lookup and persistence failures end the batch in `error`
//!   with the error text as its message
//! - One failing batch never stops the rest of the run

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::db::queries;
use crate::error::ImportError;
use crate::types::{ClaimedBatch, PersistSummary, ValidatedRow};

use super::headers::resolve_headers;
use super::ingest::ingest;
use super::reference::FlowLookup;
use super::validator::{distinct_flow_names, extract_rows, validate_rows};

/// Storage operations the processor needs
#[async_trait]
pub trait BatchStore: Send + Sync {
    async fn claim_batches(&self, max_count: i64) -> Result<Vec<ClaimedBatch>>;

    async fn persist_batch(
        &self,
        batch_id: i64,
        imported_by: &str,
        rows: &[ValidatedRow],
    ) -> Result<PersistSummary>;

    async fn mark_batch_error(&self, batch_id: i64, message: &str) -> Result<()>;
}

/// Batch store backed by PostgreSQL
pub struct PgBatchStore {
    pool: PgPool,
}

impl PgBatchStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BatchStore for PgBatchStore {
    async fn claim_batches(&self, max_count: i64) -> Result<Vec<ClaimedBatch>> {
        queries::batch::claim_batches(&self.pool, max_count).await
    }

    async fn persist_batch(
        &self,
        batch_id: i64,
        imported_by: &str,
        rows: &[ValidatedRow],
    ) -> Result<PersistSummary> {
        queries::batch::persist_batch(&self.pool, batch_id, imported_by, rows).await
    }

    async fn mark_batch_error(&self, batch_id: i64, message: &str) -> Result<()> {
        queries::batch::mark_batch_error(&self.pool, batch_id, message).await
    }
}

/// Outcome of one processor run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub claimed: usize,
    pub imported: usize,
    pub failed: usize,
}

/// Parse and validate an uploaded file. Header indexes come from the first
/// worksheet and apply to every worksheet.
pub async fn prepare_rows(
    data: &[u8],
    file_name: &str,
    flows: &dyn FlowLookup,
) -> Result<Vec<ValidatedRow>, ImportError> {
    let grids = ingest(data, file_name)?;
    let headers = resolve_headers(&grids[0])?;

    let mut validated = Vec::new();
    for grid in &grids {
        let raw_rows = extract_rows(grid, &headers);
        let names = distinct_flow_names(&raw_rows);
        let resolved = flows
            .find_flows_by_names(&names)
            .await
            .map_err(ImportError::ReferenceData)?;
        validated.extend(validate_rows(raw_rows, &resolved));
    }

    Ok(validated)
}

pub struct ImportProcessor {
    store: Arc<dyn BatchStore>,
    flows: Arc<dyn FlowLookup>,
    batch_size: i64,
}

impl ImportProcessor {
    pub fn new(store: Arc<dyn BatchStore>, flows: Arc<dyn FlowLookup>, batch_size: i64) -> Self {
        Self {
            store,
            flows,
            batch_size,
        }
    }

    /// Claim up to `batch_size` waiting batches and process them one by one
    pub async fn run_once(&self) -> Result<RunReport> {
        let batches = self.store.claim_batches(self.batch_size).await?;
        let mut report = RunReport {
            claimed: batches.len(),
            ..Default::default()
        };

        if batches.is_empty() {
            return Ok(report);
        }
        info!("Claimed {} import batch(es)", batches.len());

        for batch in &batches {
            match self.process_batch(batch).await {
                Ok(_) => report.imported += 1,
                Err(e) => {
                    report.failed += 1;
                    error!("Erro ao processar planilha [{}-{}]: {}", batch.id, batch.file_name, e);
                    if let Err(mark_err) = self.store.mark_batch_error(batch.id, &e.to_string()).await {
                        error!("Failed to mark batch {} as error: {}", batch.id, mark_err);
                    }
                }
            }
        }

        Ok(report)
    }

    async fn process_batch(&self, batch: &ClaimedBatch) -> Result<PersistSummary, ImportError> {
        let start_time = Instant::now();
        info!("Iniciando processamento arquivo [{}-{}]", batch.id, batch.file_name);

        let rows = prepare_rows(&batch.data_original_file, &batch.file_name, self.flows.as_ref()).await?;

        let summary = self
            .store
            .persist_batch(batch.id, &batch.imported_by, &rows)
            .await
            .map_err(ImportError::Persistence)?;

        info!(
            "Arquivo [{}-{}] importado em {}ms: {} importados, {} com erro",
            batch.id,
            batch.file_name,
            start_time.elapsed().as_millis(),
            summary.imported,
            summary.failed
        );
        Ok(summary)
    }

    /// Run the import job every `interval` until `shutdown` is cancelled
    pub async fn start_processing(self: Arc<Self>, interval: Duration, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!("Import processor started (every {:?}, up to {} batches)", interval, self.batch_size);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Import processor stopping");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once().await {
                        warn!("Import run failed: {}", e);
                    }
                }
            }
        }
    }
}

// ==========================================================================
// Tests
// ==========================================================================
