//! Vectorization pass: push accepted FAQ records into the vector index.
//!
//! Runs on demand, independently of the extraction scheduler. Records whose
//! source email id is already in the vectorization ledger are skipped; the
//! rest are upserted in batches and each batch is marked only after its
//! upsert succeeds. Delivery is at-least-once, which is safe because the
//! gateway replaces by id.

use std::collections::HashSet;

use tracing::{error, info};

use crate::config::Config;
use crate::error::PipelineError;
use crate::ledger::IdLedger;
use crate::models::FaqRecord;
use crate::store::FaqStore;
use crate::vector::{self, VectorGateway, VectorRecord};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VectorizeSummary {
    /// Records in the FAQ store.
    pub total: usize,
    /// Records not yet vectorized at the start of the run.
    pub pending: usize,
    pub upserted: usize,
    pub batches: usize,
}

impl VectorizeSummary {
    pub fn print(&self, dry_run: bool) {
        if dry_run {
            println!("vectorize (dry-run)");
        } else {
            println!("vectorize");
        }
        println!("  total records: {}", self.total);
        println!("  pending: {}", self.pending);
        if !dry_run {
            println!("  upserted: {}", self.upserted);
            println!("  batches: {}", self.batches);
        }
        println!("ok");
    }
}

fn to_vector_record(record: &FaqRecord) -> Result<VectorRecord, PipelineError> {
    let payload = serde_json::to_value(record)
        .map_err(|e| PipelineError::VectorGateway(anyhow::anyhow!(e)))?;
    Ok(VectorRecord {
        id: record.source_email_id.clone(),
        embedding_text: record.embedding_text(),
        payload,
    })
}

/// Select the records that still need vectorizing, first occurrence wins.
pub fn pending_records<'a>(store: &'a FaqStore, ledger: &IdLedger) -> Vec<&'a FaqRecord> {
    let mut seen = HashSet::new();
    store
        .records()
        .iter()
        .filter(|r| !r.source_email_id.is_empty())
        .filter(|r| !ledger.is_processed(&r.source_email_id))
        .filter(|r| seen.insert(r.source_email_id.as_str()))
        .collect()
}

/// Run one vectorization pass from configuration and print its summary.
pub async fn run_vectorize(
    config: &Config,
    dry_run: bool,
) -> Result<VectorizeSummary, PipelineError> {
    let store = FaqStore::open(config.data.faq_store_path())?;
    let mut ledger = IdLedger::open(config.data.vectorized_ledger_path());

    // A dry run only counts, so it needs no credentials.
    let summary = if dry_run {
        VectorizeSummary {
            total: store.len(),
            pending: pending_records(&store, &ledger).len(),
            ..Default::default()
        }
    } else {
        let gateway = vector::create_gateway(config).map_err(PipelineError::Initialization)?;
        run_vectorization(
            &store,
            &mut ledger,
            gateway.as_ref(),
            config.vector.batch_size,
        )
        .await?
    };
    summary.print(dry_run);
    Ok(summary)
}

/// Embed and upsert every pending record, `batch_size` at a time.
///
/// # Errors
///
/// - [`PipelineError::VectorGateway`] when a batch fails; batches before it
///   stay marked, it and the ones after it do not.
/// - [`PipelineError::Persistence`] when the ledger cannot be written.
pub async fn run_vectorization(
    store: &FaqStore,
    ledger: &mut IdLedger,
    gateway: &dyn VectorGateway,
    batch_size: usize,
) -> Result<VectorizeSummary, PipelineError> {
    let pending = pending_records(store, ledger);
    let mut summary = VectorizeSummary {
        total: store.len(),
        pending: pending.len(),
        ..Default::default()
    };
    info!(
        total = summary.total,
        pending = summary.pending,
        "vectorization started"
    );

    if pending.is_empty() {
        return Ok(summary);
    }

    for batch in pending.chunks(batch_size.max(1)) {
        let records = batch
            .iter()
            .map(|r| to_vector_record(r))
            .collect::<Result<Vec<_>, _>>()?;

        let written = gateway.upsert(&records).await.map_err(|e| {
            error!(
                batch = summary.batches + 1,
                size = records.len(),
                error = %format!("{e:#}"),
                "upsert failed, aborting run"
            );
            PipelineError::VectorGateway(e)
        })?;

        ledger.mark_many(records.iter().map(|r| r.id.as_str()))?;
        summary.upserted += written;
        summary.batches += 1;
        info!(batch = summary.batches, written, "batch upserted");
    }

    Ok(summary)
}
