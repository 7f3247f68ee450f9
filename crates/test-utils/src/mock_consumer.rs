//! An in-memory [`ChunkConsumer`] that tracks a simple block-id tip, for `tn-scanner`'s
//! integration tests and `tn-scan-demo`.

use tn_scanner::{ChunkConsumer, ChunkData};
use tn_types::{BlockId, BlockIndex};

use crate::record::{TestKeyImageSet, TestRecord};

/// Records one call to `consume_onchain_chunk`, for test assertions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsumeCall {
    pub first_new_index: BlockIndex,
    pub alignment_block_id: BlockId,
    pub new_block_ids: Vec<BlockId>,
}

/// Tracks `refresh_index` and a contiguous run of known block ids starting there, plus every
/// `consume_onchain_chunk` call for assertions.
pub struct MockConsumer {
    refresh_index: BlockIndex,
    tip_ids: Vec<BlockId>,
    pub consume_calls: Vec<ConsumeCall>,
}

impl MockConsumer {
    pub fn new(refresh_index: BlockIndex) -> Self {
        Self { refresh_index, tip_ids: Vec::new(), consume_calls: Vec::new() }
    }

    pub fn with_known_ids(refresh_index: BlockIndex, ids: Vec<BlockId>) -> Self {
        Self { refresh_index, tip_ids: ids, consume_calls: Vec::new() }
    }

    pub fn tip_ids(&self) -> &[BlockId] {
        &self.tip_ids
    }

    /// Index of the last known block, if any.
    pub fn tip_index(&self) -> Option<BlockIndex> {
        if self.tip_ids.is_empty() {
            None
        } else {
            Some(self.refresh_index + self.tip_ids.len() as BlockIndex - 1)
        }
    }
}

impl ChunkConsumer<TestRecord, TestKeyImageSet> for MockConsumer {
    fn refresh_index(&self) -> BlockIndex {
        self.refresh_index
    }

    fn desired_first_block(&self) -> BlockIndex {
        self.refresh_index + self.tip_ids.len() as BlockIndex
    }

    fn try_get_block_id(&self, index: BlockIndex) -> Option<BlockId> {
        if index < self.refresh_index {
            return None;
        }
        let offset = (index - self.refresh_index) as usize;
        self.tip_ids.get(offset).copied()
    }

    fn consume_onchain_chunk(
        &mut self,
        _data: Option<&ChunkData<TestRecord, TestKeyImageSet>>,
        first_new_index: BlockIndex,
        alignment_block_id: BlockId,
        new_block_ids: &[BlockId],
    ) {
        let truncate_at =
            first_new_index.saturating_sub(self.refresh_index).min(self.tip_ids.len() as BlockIndex) as usize;
        self.tip_ids.truncate(truncate_at);
        self.tip_ids.extend_from_slice(new_block_ids);
        self.consume_calls.push(ConsumeCall {
            first_new_index,
            alignment_block_id,
            new_block_ids: new_block_ids.to_vec(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(n: u8) -> BlockId {
        BlockId::new([n; 32])
    }

    #[test]
    fn fresh_consumer_desires_its_refresh_index() {
        let consumer = MockConsumer::new(0);
        assert_eq!(consumer.desired_first_block(), 0);
        assert_eq!(consumer.try_get_block_id(0), None);
    }

    #[test]
    fn consume_truncates_and_extends_tip() {
        let mut consumer = MockConsumer::with_known_ids(0, vec![block(1), block(2), block(3)]);
        consumer.consume_onchain_chunk(None, 2, block(2), &[block(9)]);
        assert_eq!(consumer.tip_ids(), &[block(1), block(2), block(9)]);
        assert_eq!(consumer.consume_calls.len(), 1);
    }

    #[test]
    fn desired_first_block_tracks_tip_length() {
        let consumer = MockConsumer::with_known_ids(5, vec![block(1), block(2)]);
        assert_eq!(consumer.desired_first_block(), 7);
        assert_eq!(consumer.tip_index(), Some(6));
    }
}
