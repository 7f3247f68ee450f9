//! Minimal `Record`/`KeyImageSet` payloads used by [`crate::MockLedger`] and
//! [`crate::MockConsumer`] in place of real curve-arithmetic-derived types (out of scope per
//! spec.md Non-goals).

use tn_scanner::{KeyImageSet, Record};
use tn_types::{BlockIndex, TxId};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TestRecord {
    pub block_index: BlockIndex,
}

impl Record for TestRecord {
    fn block_index(&self) -> BlockIndex {
        self.block_index
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TestKeyImageSet {
    pub tx_id: TxId,
}

impl KeyImageSet for TestKeyImageSet {
    fn tx_id(&self) -> TxId {
        self.tx_id
    }
}
