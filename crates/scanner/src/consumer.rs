//! The scan machine's output-side collaborator (spec.md §6 "ChunkConsumer").

use tn_types::{BlockId, BlockIndex};

use crate::context::{ChunkData, KeyImageSet, Record};

/// Applies validated, aligned chunks to whatever persistent (or in-memory) state tracks recovered
/// balance. Implementors are expected to atomically roll back any of their own state at or above
/// `first_new_index` before applying `new_block_ids` (spec.md §3).
pub trait ChunkConsumer<R: Record, K: KeyImageSet> {
    /// Lowest block index this consumer will accept data for.
    fn refresh_index(&self) -> BlockIndex;

    /// Where the scanner should resume: typically one past the consumer's current tip.
    fn desired_first_block(&self) -> BlockIndex;

    /// The id this consumer currently associates with `index`, if known.
    fn try_get_block_id(&self, index: BlockIndex) -> Option<BlockId>;

    /// Rolls back any state at or above `first_new_index`, then applies `new_block_ids` (and the
    /// chunk's record/key-image data) starting at `first_new_index`, anchored on
    /// `alignment_block_id`.
    fn consume_onchain_chunk(
        &mut self,
        data: Option<&ChunkData<R, K>>,
        first_new_index: BlockIndex,
        alignment_block_id: BlockId,
        new_block_ids: &[BlockId],
    );
}
