//! An in-memory [`ScanningContextLedger`] supporting reorgs and cancellation, for `tn-scanner`'s
//! integration tests and `tn-scan-demo`.

use std::collections::HashMap;

use tn_scanner::{ChunkContext, ChunkData, LedgerChunk, ScanError, ScanningContextLedger};
use tn_types::{BlockId, BlockIndex};
use tracing::debug;

use crate::record::{TestKeyImageSet, TestRecord};

/// A chunk handed out by [`MockLedger`]; carries no per-subconsumer data since the mock chain
/// tracks only block ids, not records or key-images.
pub struct MockChunk {
    context: ChunkContext,
    data: HashMap<String, ChunkData<TestRecord, TestKeyImageSet>>,
}

impl LedgerChunk<TestRecord, TestKeyImageSet> for MockChunk {
    fn get_context(&self) -> &ChunkContext {
        &self.context
    }

    fn try_get_data(&self, subconsumer_id: &str) -> Option<&ChunkData<TestRecord, TestKeyImageSet>> {
        self.data.get(subconsumer_id)
    }

    fn subconsumer_ids(&self) -> Vec<String> {
        self.data.keys().cloned().collect()
    }
}

/// A fixed in-memory chain, `chain[i]` being the id of block `i`. Supports reorgs (truncate +
/// replace the tail) and `terminate_scanning` for cancellation tests.
pub struct MockLedger {
    chain: Vec<BlockId>,
    cursor: Option<BlockIndex>,
    max_chunk_size: u64,
    aborted: bool,
}

impl MockLedger {
    pub fn new(chain: Vec<BlockId>) -> Self {
        Self { chain, cursor: None, max_chunk_size: u64::MAX, aborted: false }
    }

    /// Replaces every block at or above `at_index` with `new_ids`, simulating a reorg.
    pub fn apply_reorg(&mut self, at_index: BlockIndex, new_ids: Vec<BlockId>) {
        self.chain.truncate(at_index as usize);
        self.chain.extend(new_ids);
    }

    pub fn chain(&self) -> &[BlockId] {
        &self.chain
    }
}

impl ScanningContextLedger<TestRecord, TestKeyImageSet> for MockLedger {
    type Chunk = MockChunk;

    fn begin_scanning_from_index(&mut self, start_index: BlockIndex, max_chunk_size: u64) {
        debug!(target: "tn_test_utils", start_index, max_chunk_size, "mock ledger begin_scanning_from_index");
        self.cursor = Some(start_index);
        self.max_chunk_size = max_chunk_size.max(1);
    }

    fn get_onchain_chunk(&mut self) -> Result<MockChunk, ScanError> {
        let start = self.cursor.unwrap_or(0);

        if self.aborted {
            let prefix_block_id =
                if start == 0 { None } else { self.chain.get(start as usize - 1).copied() };
            return Ok(MockChunk {
                context: ChunkContext { start_index: start, prefix_block_id, block_ids: vec![] },
                data: HashMap::new(),
            });
        }

        // Top of chain reached. Report the chain's *true* length as the termination marker's
        // start_index, not the stale `start` that was requested: if a reorg shortened the chain out
        // from under an in-progress scan, echoing the requested start would make the termination
        // marker look contiguous with whatever the scanner already believed, hiding the reorg.
        if start as usize >= self.chain.len() {
            let tip_len = self.chain.len() as BlockIndex;
            let prefix_block_id = tip_len.checked_sub(1).and_then(|i| self.chain.get(i as usize)).copied();
            return Ok(MockChunk {
                context: ChunkContext { start_index: tip_len, prefix_block_id, block_ids: vec![] },
                data: HashMap::new(),
            });
        }

        let prefix_block_id =
            if start == 0 { None } else { self.chain.get(start as usize - 1).copied() };

        let end = (start + self.max_chunk_size).min(self.chain.len() as u64) as usize;
        let block_ids = self.chain[start as usize..end].to_vec();
        self.cursor = Some(end as BlockIndex);

        Ok(MockChunk {
            context: ChunkContext { start_index: start, prefix_block_id, block_ids },
            data: HashMap::new(),
        })
    }

    fn terminate_scanning(&mut self) {
        self.aborted = true;
    }

    fn is_aborted(&self) -> bool {
        self.aborted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(n: u8) -> BlockId {
        BlockId::new([n; 32])
    }

    #[test]
    fn yields_whole_chain_then_termination_marker() {
        let mut ledger = MockLedger::new(vec![block(1), block(2), block(3)]);
        ledger.begin_scanning_from_index(0, 100);

        let chunk = ledger.get_onchain_chunk().unwrap();
        assert_eq!(chunk.get_context().block_ids, vec![block(1), block(2), block(3)]);

        let termination = ledger.get_onchain_chunk().unwrap();
        assert!(termination.get_context().is_termination_marker());
        assert_eq!(termination.get_context().start_index, 3);
    }

    #[test]
    fn reorg_replaces_tail() {
        let mut ledger = MockLedger::new(vec![block(1), block(2), block(3)]);
        ledger.apply_reorg(2, vec![block(9)]);
        assert_eq!(ledger.chain(), &[block(1), block(2), block(9)]);
    }

    #[test]
    fn terminate_scanning_forces_termination_chunks() {
        let mut ledger = MockLedger::new(vec![block(1)]);
        ledger.begin_scanning_from_index(0, 100);
        ledger.terminate_scanning();
        assert!(ledger.is_aborted());
        let chunk = ledger.get_onchain_chunk().unwrap();
        assert!(chunk.get_context().is_termination_marker());
    }
}
