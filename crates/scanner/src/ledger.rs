//! The scan machine's input-side collaborator (spec.md §6 "ScanningContextLedger").

use tn_types::BlockIndex;

use crate::context::{ChunkData, LedgerChunk, Record as ChunkRecord};
use crate::error::ScanError;

/// Drives a scanning context against a ledger back-end. The context is expected to block (or
/// poll) until a chunk is available, or to return an empty termination chunk at the current chain
/// tip.
pub trait ScanningContextLedger<R: ChunkRecord, K: crate::context::KeyImageSet> {
    type Chunk: LedgerChunk<R, K>;

    /// Starts (or restarts) scanning from `start_index`, fetching chunks no larger than
    /// `max_chunk_size`.
    fn begin_scanning_from_index(&mut self, start_index: BlockIndex, max_chunk_size: u64);

    /// Blocks or polls for the next chunk. Returns an empty termination chunk at chain tip or
    /// after `terminate_scanning()`.
    fn get_onchain_chunk(&mut self) -> Result<Self::Chunk, ScanError>;

    /// Idempotent, no-fail. After this call, `get_onchain_chunk` returns empty termination chunks
    /// and `is_aborted` returns `true`.
    fn terminate_scanning(&mut self);

    fn is_aborted(&self) -> bool;
}

// Re-exported so downstream crates can name `ChunkData` without importing `context` directly.
pub use crate::context::ChunkData as LedgerChunkData;
