//! Error kinds surfaced by the extraction and vectorization pipelines.
//!
//! Validator faults are deliberately absent: they are folded into the
//! verdict handling of [`crate::pipeline`] according to the configured
//! [`FaultPolicy`](crate::config::FaultPolicy) and never abort a tick.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Missing configuration or credentials for a collaborator. Fatal.
    #[error("initialization failed: {0:#}")]
    Initialization(anyhow::Error),

    /// The mail source could not be read. Aborts the current tick only.
    #[error("mail fetch failed: {0:#}")]
    Fetch(anyhow::Error),

    /// A ledger or the FAQ store could not be read or written.
    #[error("persistence failed: {0:#}")]
    Persistence(anyhow::Error),

    /// Embedding or upsert failed during a vectorization run.
    #[error("vector gateway failed: {0:#}")]
    VectorGateway(anyhow::Error),
}

impl PipelineError {
    /// Short machine-readable name of the error kind, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Initialization(_) => "initialization",
            PipelineError::Fetch(_) => "fetch",
            PipelineError::Persistence(_) => "persistence",
            PipelineError::VectorGateway(_) => "vector_gateway",
        }
    }
}
