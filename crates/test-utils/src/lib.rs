//! In-memory test doubles for `tn-scanner`'s `ScanningContextLedger`/`ChunkConsumer` interfaces.

mod mock_consumer;
mod mock_ledger;
mod record;

pub use mock_consumer::{ConsumeCall, MockConsumer};
pub use mock_ledger::{MockChunk, MockLedger};
pub use record::{TestKeyImageSet, TestRecord};
