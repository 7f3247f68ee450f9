//! An incremental, reorg-aware balance-recovery scan state machine.
//!
//! Drives a [`ledger::ScanningContextLedger`] for chunks of on-chain blocks and feeds validated,
//! aligned data to a [`consumer::ChunkConsumer`], retrying through [`machine::ScanMachineStatus`]
//! transitions when a reorg is detected. See `DESIGN.md` for how each piece is grounded in this
//! workspace's existing crates.

pub mod consumer;
pub mod context;
pub mod error;
pub mod ledger;
pub mod machine;

pub use consumer::ChunkConsumer;
pub use context::{ChunkContext, ChunkData, ContiguityMarker, KeyImageSet, LedgerChunk, Record};
pub use error::ScanError;
pub use ledger::ScanningContextLedger;
pub use machine::{try_advance_state_machine, ScanMachineMetadata, ScanMachineStatus};
#[cfg(feature = "metrics")]
pub use machine::try_advance_state_machine_with_metrics;
