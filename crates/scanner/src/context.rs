//! Value types flowing between a [`crate::ledger::ScanningContextLedger`] and the scan machine.

use std::collections::HashMap;
use std::fmt;

use tn_types::{BlockId, BlockIndex, TxId};

/// A span of consecutive on-chain blocks, plus the id of the block immediately before the span
/// (the "pre-chunk anchor" the machine uses to check contiguity).
///
/// An empty `block_ids` is a *termination marker*: "top of chain reached at height
/// `start_index - 1`".
#[derive(Clone, Debug)]
pub struct ChunkContext {
    pub start_index: BlockIndex,
    pub prefix_block_id: Option<BlockId>,
    pub block_ids: Vec<BlockId>,
}

impl ChunkContext {
    pub fn is_termination_marker(&self) -> bool {
        self.block_ids.is_empty()
    }

    /// Index of the last block in this chunk, if non-empty.
    pub fn last_index(&self) -> Option<BlockIndex> {
        if self.block_ids.is_empty() {
            None
        } else {
            Some(self.start_index + self.block_ids.len() as BlockIndex - 1)
        }
    }
}

/// A generic balance-recovery record: an owned-enote candidate found in a chunk. Left opaque (a
/// plain payload) since curve arithmetic and note-identification are out of scope (spec.md
/// Non-goals); callers substitute their own `Record` type.
pub trait Record: Clone + Send + Sync + 'static {
    /// The block index this record was found in; must lie within its chunk's span.
    fn block_index(&self) -> BlockIndex;
}

/// A key-image set referencing a `TxId` that must appear (possibly with an empty record list) as
/// a key in the owning [`ChunkData`].
pub trait KeyImageSet: Clone + Send + Sync + 'static {
    fn tx_id(&self) -> TxId;
}

/// `{basic_records_per_tx, contextual_key_images}` for one chunk.
#[derive(Clone, Debug)]
pub struct ChunkData<R: Record, K: KeyImageSet> {
    pub basic_records_per_tx: HashMap<TxId, Vec<R>>,
    pub contextual_key_images: Vec<K>,
}

impl<R: Record, K: KeyImageSet> ChunkData<R, K> {
    pub fn new() -> Self {
        Self { basic_records_per_tx: HashMap::new(), contextual_key_images: Vec::new() }
    }

    /// Checks the invariant from spec.md §3: every key-image set's tx-id is a key in
    /// `basic_records_per_tx`, and every record's block index lies within `[start, end]`.
    pub fn validate(&self, start_index: BlockIndex, end_index: BlockIndex) -> Result<(), String> {
        for key_image_set in &self.contextual_key_images {
            if !self.basic_records_per_tx.contains_key(&key_image_set.tx_id()) {
                return Err(format!(
                    "key-image set references tx {:?} with no entry in basic_records_per_tx",
                    key_image_set.tx_id()
                ));
            }
        }
        for records in self.basic_records_per_tx.values() {
            for record in records {
                let index = record.block_index();
                if index < start_index || index > end_index {
                    return Err(format!(
                        "record block index {index} out of chunk range [{start_index}, {end_index}]"
                    ));
                }
            }
        }
        Ok(())
    }
}

impl<R: Record, K: KeyImageSet> Default for ChunkData<R, K> {
    fn default() -> Self {
        Self::new()
    }
}

/// Lazy container exposing a chunk's context and (possibly not-yet-available) per-subconsumer
/// data, permitting asynchronous back-ends where context arrives before data.
pub trait LedgerChunk<R: Record, K: KeyImageSet>: Send {
    fn get_context(&self) -> &ChunkContext;
    fn try_get_data(&self, subconsumer_id: &str) -> Option<&ChunkData<R, K>>;
    fn subconsumer_ids(&self) -> Vec<String>;
}

/// "The scanner believes the chain up to `block_index` has id `block_id`." An absent `block_id`
/// means "index known, id not enforced" — deliberately asymmetric so a marker with no id is
/// considered contiguous with every marker at or below its index (spec.md §4.B.3).
///
/// `block_index == GENESIS` is the pre-chunk anchor for a scan that covers block 0: there is no
/// real parent block to point at, so this sentinel stands in for "index −1" rather than letting a
/// `saturating_sub` clamp the anchor onto block 0 itself. Every comparison on `block_index` goes
/// through [`Self::cmp_index`] so `GENESIS` always orders as "before every real index" instead of
/// its literal `u64::MAX` value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContiguityMarker {
    pub block_index: BlockIndex,
    pub block_id: Option<BlockId>,
}

impl ContiguityMarker {
    /// Sentinel anchor for "the nonexistent parent of block 0".
    pub const GENESIS: BlockIndex = BlockIndex::MAX;

    pub fn new(block_index: BlockIndex, block_id: Option<BlockId>) -> Self {
        Self { block_index, block_id }
    }

    pub fn block_id_or_zero(&self) -> BlockId {
        self.block_id.unwrap_or(BlockId::ZERO)
    }

    /// The index at which scanning resumes just after this marker. `GENESIS` resumes at `0`
    /// rather than wrapping past it.
    pub fn next_index(&self) -> BlockIndex {
        if self.block_index == Self::GENESIS {
            0
        } else {
            self.block_index + 1
        }
    }

    /// Orders two raw indices treating [`Self::GENESIS`] as preceding every real index, instead
    /// of comparing its literal (maximal) `u64` value.
    fn cmp_index(a: BlockIndex, b: BlockIndex) -> std::cmp::Ordering {
        use std::cmp::Ordering;
        match (a == Self::GENESIS, b == Self::GENESIS) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => a.cmp(&b),
        }
    }

    /// `lhs >= rhs`, genesis-aware. Used by reorg detection to tell whether contiguity advanced
    /// past the scan's starting anchor.
    pub fn index_at_or_after(lhs: BlockIndex, rhs: BlockIndex) -> bool {
        Self::cmp_index(lhs, rhs) != std::cmp::Ordering::Less
    }

    /// True iff `index` lies strictly after this marker (`GENESIS` precedes every real index).
    /// Used to crop a chunk down to the blocks a consumer hasn't already aligned on.
    pub fn precedes(&self, index: BlockIndex) -> bool {
        Self::cmp_index(self.block_index, index) == std::cmp::Ordering::Less
    }

    /// Two markers are contiguous iff either has no id (absent-id markers are contiguous with
    /// every marker at or below their index), or their ids match.
    pub fn is_contiguous_with(&self, other: &ContiguityMarker) -> bool {
        match (self.block_id, other.block_id) {
            (None, _) => Self::cmp_index(self.block_index, other.block_index) != std::cmp::Ordering::Greater,
            (_, None) => Self::cmp_index(other.block_index, self.block_index) != std::cmp::Ordering::Greater,
            (Some(a), Some(b)) => a == b,
        }
    }
}

impl PartialOrd for ContiguityMarker {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ContiguityMarker {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        Self::cmp_index(self.block_index, other.block_index)
    }
}

impl fmt::Display for ContiguityMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let index = if self.block_index == Self::GENESIS {
            "genesis".to_string()
        } else {
            self.block_index.to_string()
        };
        match self.block_id {
            Some(id) => write!(f, "{{index={index}, id={id}}}"),
            None => write!(f, "{{index={index}, id=?}}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn termination_marker_has_no_blocks() {
        let context = ChunkContext { start_index: 5, prefix_block_id: Some(BlockId::ZERO), block_ids: vec![] };
        assert!(context.is_termination_marker());
        assert_eq!(context.last_index(), None);
    }

    #[test]
    fn last_index_accounts_for_chunk_length() {
        let context = ChunkContext {
            start_index: 10,
            prefix_block_id: None,
            block_ids: vec![BlockId::new([1; 32]), BlockId::new([2; 32]), BlockId::new([3; 32])],
        };
        assert_eq!(context.last_index(), Some(12));
    }

    #[test]
    fn absent_id_marker_contiguous_with_any_marker_at_or_below_index() {
        let unknown = ContiguityMarker::new(5, None);
        let known_below = ContiguityMarker::new(3, Some(BlockId::new([9; 32])));
        let known_above = ContiguityMarker::new(7, Some(BlockId::new([9; 32])));
        assert!(unknown.is_contiguous_with(&known_below));
        assert!(!unknown.is_contiguous_with(&known_above));
    }

    #[test]
    fn matching_ids_are_contiguous() {
        let id = BlockId::new([4; 32]);
        let a = ContiguityMarker::new(5, Some(id));
        let b = ContiguityMarker::new(5, Some(id));
        assert!(a.is_contiguous_with(&b));
    }

    #[test]
    fn mismatched_ids_are_not_contiguous() {
        let a = ContiguityMarker::new(5, Some(BlockId::new([1; 32])));
        let b = ContiguityMarker::new(5, Some(BlockId::new([2; 32])));
        assert!(!a.is_contiguous_with(&b));
    }

    #[test]
    fn genesis_anchor_resumes_scanning_at_index_zero() {
        let anchor = ContiguityMarker::new(ContiguityMarker::GENESIS, None);
        assert_eq!(anchor.next_index(), 0);
    }

    #[test]
    fn genesis_anchor_precedes_every_real_index() {
        let anchor = ContiguityMarker::new(ContiguityMarker::GENESIS, None);
        assert!(anchor.precedes(0));
        assert!(anchor.is_contiguous_with(&ContiguityMarker::new(0, None)));
    }

    #[test]
    fn index_at_or_after_treats_genesis_as_before_every_real_index() {
        assert!(!ContiguityMarker::index_at_or_after(ContiguityMarker::GENESIS, 0));
        assert!(ContiguityMarker::index_at_or_after(0, ContiguityMarker::GENESIS));
        assert!(ContiguityMarker::index_at_or_after(ContiguityMarker::GENESIS, ContiguityMarker::GENESIS));
    }

    #[derive(Clone)]
    struct TestRecord {
        block_index: BlockIndex,
    }
    impl Record for TestRecord {
        fn block_index(&self) -> BlockIndex {
            self.block_index
        }
    }
    #[derive(Clone)]
    struct TestKeyImageSet {
        tx_id: TxId,
    }
    impl KeyImageSet for TestKeyImageSet {
        fn tx_id(&self) -> TxId {
            self.tx_id
        }
    }

    #[test]
    fn chunk_data_validates_key_image_references() {
        let tx_id = TxId::new([1; 32]);
        let mut data: ChunkData<TestRecord, TestKeyImageSet> = ChunkData::new();
        data.contextual_key_images.push(TestKeyImageSet { tx_id });
        assert!(data.validate(0, 10).is_err());

        data.basic_records_per_tx.insert(tx_id, vec![]);
        assert!(data.validate(0, 10).is_ok());
    }

    #[test]
    fn chunk_data_validates_record_range() {
        let tx_id = TxId::new([1; 32]);
        let mut data: ChunkData<TestRecord, TestKeyImageSet> = ChunkData::new();
        data.basic_records_per_tx.insert(tx_id, vec![TestRecord { block_index: 20 }]);
        assert!(data.validate(0, 10).is_err());
        assert!(data.validate(0, 20).is_ok());
    }
}
