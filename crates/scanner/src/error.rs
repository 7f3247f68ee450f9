use thiserror::Error;

/// Failures reported by a [`crate::ledger::ScanningContextLedger`] or
/// [`crate::consumer::ChunkConsumer`] collaborator. Never propagated out of
/// `try_advance_state_machine`: the machine catches these at the call site and folds them into
/// [`crate::machine::ScanMachineStatus::Fail`] (spec.md §7 "Propagation").
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("scanning context failed to produce the next chunk: {0}")]
    ChunkFetch(String),
    #[error("consumer rejected chunk: {0}")]
    Consume(String),
    #[error("chunk failed semantic validation: {0}")]
    InvalidChunk(String),
}
