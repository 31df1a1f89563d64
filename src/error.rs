//! Error taxonomy
//!
//! Malformed balance amounts are not errors: they are logged during ingestion
//! and counted as zero. Everything else that can stop a query lives here.

use thiserror::Error;

use crate::cartographer::Vertex;

/// Structural failures while building a snapshot. Any of these aborts the
/// whole ingestion pass; a partial graph is never returned.
#[derive(Debug, Error)]
pub enum IngestionError {
    #[error("{kind} record {row} has an empty `{field}` field")]
    MissingField {
        kind: &'static str,
        row: usize,
        field: &'static str,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures inside a max-flow backend
#[derive(Debug, Error)]
pub enum SolverError {
    #[error("vertex `{0}` is not part of the flow network")]
    MissingVertex(Vertex),

    #[error("source and sink are the same vertex `{0}`")]
    SourceIsSink(Vertex),
}

/// Errors surfaced to callers of the analysis layer and the coordinator
#[derive(Debug, Error)]
pub enum PathfinderError {
    #[error("address `{0}` is not present in the snapshot")]
    UnknownAddress(String),

    #[error("vertex `{0}` is not present in the graph")]
    UnknownVertex(Vertex),

    #[error("ingestion failed: {0}")]
    Ingestion(#[from] IngestionError),

    #[error("solver failed: {0}")]
    Solver(#[from] SolverError),

    #[error("arbitrage overlay cleanup failed: {0}")]
    ResourceCleanup(String),
}

pub type Result<T, E = PathfinderError> = std::result::Result<T, E>;
