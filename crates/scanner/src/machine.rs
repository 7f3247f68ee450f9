//! `try_advance_state_machine` and the `ScanMachineStatus` transition table (spec.md §4.B).

use tn_config::ScanMachineConfig;
use tn_types::{BlockId, BlockIndex};
use tracing::{debug, error, instrument, warn};

use crate::{
    consumer::ChunkConsumer,
    context::{ChunkContext, ContiguityMarker, KeyImageSet, LedgerChunk, Record},
    error::ScanError,
    ledger::ScanningContextLedger,
};

/// State graph per spec.md §4.B.1:
///
/// ```text
/// NeedFullscan -> StartScan -> DoScan -> DoScan -> ... -> Success
///      ^                         |                          |
///      |                         v                          |
///      +---- (too deep reorg) -- NeedPartialscan -> StartScan
///                                                          |
///                                              Fail / Aborted (terminal)
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanMachineStatus {
    NeedFullscan,
    NeedPartialscan,
    StartScan,
    DoScan,
    Success,
    Fail,
    Aborted,
}

impl ScanMachineStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ScanMachineStatus::Success | ScanMachineStatus::Fail | ScanMachineStatus::Aborted)
    }
}

/// `{config, status, partialscan_attempts, fullscan_attempts, contiguity_marker,
/// first_contiguity_index}`. Owned entirely by its caller; carries no external references.
#[derive(Clone, Debug)]
pub struct ScanMachineMetadata {
    pub config: ScanMachineConfig,
    pub status: ScanMachineStatus,
    pub partialscan_attempts: u32,
    pub fullscan_attempts: u32,
    pub contiguity_marker: ContiguityMarker,
    pub first_contiguity_index: BlockIndex,
}

impl ScanMachineMetadata {
    pub fn new(config: ScanMachineConfig) -> Self {
        Self {
            config,
            status: ScanMachineStatus::NeedFullscan,
            partialscan_attempts: 0,
            fullscan_attempts: 0,
            contiguity_marker: ContiguityMarker::new(ContiguityMarker::GENESIS, None),
            first_contiguity_index: ContiguityMarker::GENESIS,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Performs exactly one transition of `metadata.status`, driving `ledger` and `consumer` as
/// needed. Returns `true` iff the resulting status is non-terminal, so a driver can loop
/// `while try_advance_state_machine(...) { }`.
///
/// Never panics or propagates collaborator errors: any `ScanError` from `ledger` or `consumer` is
/// logged and mapped to `ScanMachineStatus::Fail`, with a best-effort `terminate_scanning()`
/// attempted first (spec.md §7 "Propagation").
#[instrument(level = "debug", skip_all, fields(status = ?metadata.status))]
pub fn try_advance_state_machine<R, K, L, C>(
    metadata: &mut ScanMachineMetadata,
    ledger: &mut L,
    consumer: &mut C,
) -> bool
where
    R: Record,
    K: KeyImageSet,
    L: ScanningContextLedger<R, K>,
    C: ChunkConsumer<R, K>,
{
    let next = match metadata.status {
        ScanMachineStatus::NeedFullscan => advance_need_fullscan(metadata, consumer),
        ScanMachineStatus::NeedPartialscan => advance_need_partialscan(metadata, consumer),
        ScanMachineStatus::StartScan => advance_start_scan(metadata, ledger),
        ScanMachineStatus::DoScan => advance_do_scan(metadata, ledger, consumer),
        terminal @ (ScanMachineStatus::Success | ScanMachineStatus::Fail | ScanMachineStatus::Aborted) => terminal,
    };

    debug!(target: "tn_scanner", from = ?metadata.status, to = ?next, "scan machine transition");
    metadata.status = next;
    !metadata.status.is_terminal()
}

/// As [`try_advance_state_machine`], but also records the transition and current attempt counters
/// against `metrics`. Kept as a separate entry point rather than an `Option<&ScanMetrics>`
/// parameter on the hot path so the metrics-free build pays nothing for it.
#[cfg(feature = "metrics")]
pub fn try_advance_state_machine_with_metrics<R, K, L, C>(
    metadata: &mut ScanMachineMetadata,
    ledger: &mut L,
    consumer: &mut C,
    metrics: &consensus_metrics::ScanMetrics,
) -> bool
where
    R: Record,
    K: KeyImageSet,
    L: ScanningContextLedger<R, K>,
    C: ChunkConsumer<R, K>,
{
    let still_running = try_advance_state_machine(metadata, ledger, consumer);

    metrics.status_transitions.with_label_values(&[&format!("{:?}", metadata.status)]).inc();
    metrics.contiguity_index.set(metadata.contiguity_marker.block_index as i64);
    metrics.partialscan_attempts.set(metadata.partialscan_attempts as i64);
    metrics.fullscan_attempts.set(metadata.fullscan_attempts as i64);

    still_running
}

fn advance_need_fullscan<R, K, C>(metadata: &mut ScanMachineMetadata, consumer: &C) -> ScanMachineStatus
where
    R: Record,
    K: KeyImageSet,
    C: ChunkConsumer<R, K>,
{
    let k = metadata.fullscan_attempts;
    let depth = metadata.config.reorg_avoidance_depth(k);
    let start = consumer.desired_first_block().saturating_sub(depth).max(consumer.refresh_index());

    metadata.contiguity_marker = pre_chunk_anchor(start, consumer);
    metadata.fullscan_attempts += 1;

    if metadata.fullscan_attempts > ScanMachineConfig::MAX_FULLSCAN_ATTEMPTS {
        error!(target: "tn_scanner", attempts = metadata.fullscan_attempts, "exceeded max fullscan attempts");
        ScanMachineStatus::Fail
    } else {
        ScanMachineStatus::StartScan
    }
}

fn advance_need_partialscan<R, K, C>(metadata: &mut ScanMachineMetadata, consumer: &C) -> ScanMachineStatus
where
    R: Record,
    K: KeyImageSet,
    C: ChunkConsumer<R, K>,
{
    let depth = metadata.config.reorg_avoidance_increment;
    let start = consumer.desired_first_block().saturating_sub(depth).max(consumer.refresh_index());

    metadata.contiguity_marker = pre_chunk_anchor(start, consumer);
    metadata.partialscan_attempts += 1;

    if metadata.partialscan_attempts > metadata.config.max_partialscan_attempts {
        warn!(target: "tn_scanner", attempts = metadata.partialscan_attempts, "exceeded max partialscan attempts");
        ScanMachineStatus::Fail
    } else {
        ScanMachineStatus::StartScan
    }
}

fn advance_start_scan<R, K, L>(metadata: &mut ScanMachineMetadata, ledger: &mut L) -> ScanMachineStatus
where
    R: Record,
    K: KeyImageSet,
    L: ScanningContextLedger<R, K>,
{
    let start_index = metadata.contiguity_marker.next_index();
    ledger.begin_scanning_from_index(start_index, metadata.config.max_chunk_size);
    metadata.first_contiguity_index = metadata.contiguity_marker.block_index;
    ScanMachineStatus::DoScan
}

fn advance_do_scan<R, K, L, C>(
    metadata: &mut ScanMachineMetadata,
    ledger: &mut L,
    consumer: &mut C,
) -> ScanMachineStatus
where
    R: Record,
    K: KeyImageSet,
    L: ScanningContextLedger<R, K>,
    C: ChunkConsumer<R, K>,
{
    let chunk = match ledger.get_onchain_chunk() {
        Ok(chunk) => chunk,
        Err(err) => {
            error!(target: "tn_scanner", error = %err, "scanning context failed to produce a chunk");
            ledger.terminate_scanning();
            return ScanMachineStatus::Fail;
        }
    };

    let context = chunk.get_context().clone();

    // A termination chunk's start_index is the ledger's own idea of "top of chain", which may sit
    // below the contiguity marker the machine requested from (a reorg shortened the chain out from
    // under it). That mismatch is the reorg signal itself, not a validation failure, so termination
    // chunks route straight to the contiguity check instead of through validate_chunk_context.
    if context.is_termination_marker() {
        return handle_termination_chunk(metadata, ledger, consumer, &context);
    }

    if let Err(invalid) = validate_chunk_context(&context, metadata.contiguity_marker) {
        error!(target: "tn_scanner", error = %invalid, "chunk failed semantic validation");
        ledger.terminate_scanning();
        return ScanMachineStatus::Fail;
    }

    handle_nonempty_chunk(metadata, consumer, &chunk, &context)
}

/// The pre-chunk anchor for a scan starting at `start`: the nonexistent parent of block 0 when
/// `start == 0`, otherwise the real block just before it.
fn pre_chunk_anchor<R, K, C>(start: BlockIndex, consumer: &C) -> ContiguityMarker
where
    R: Record,
    K: KeyImageSet,
    C: ChunkConsumer<R, K>,
{
    if start == 0 {
        ContiguityMarker::new(ContiguityMarker::GENESIS, None)
    } else {
        let index = start - 1;
        ContiguityMarker::new(index, consumer.try_get_block_id(index))
    }
}

/// The marker a chunk implies for the block just before its own span, mirroring
/// [`pre_chunk_anchor`]'s genesis handling for `start_index == 0`.
fn prev_marker(start_index: BlockIndex, block_id: Option<BlockId>) -> ContiguityMarker {
    if start_index == 0 {
        ContiguityMarker::new(ContiguityMarker::GENESIS, block_id)
    } else {
        ContiguityMarker::new(start_index - 1, block_id)
    }
}

fn validate_chunk_context(context: &ChunkContext, expected_marker: ContiguityMarker) -> Result<(), ScanError> {
    if context.start_index != expected_marker.next_index() {
        return Err(ScanError::InvalidChunk(format!(
            "chunk start_index {} does not follow contiguity marker at {expected_marker}",
            context.start_index
        )));
    }
    if context.block_ids.is_empty() {
        return Err(ScanError::InvalidChunk("non-termination chunk has no block ids".into()));
    }
    Ok(())
}

fn handle_termination_chunk<R, K, L, C>(
    metadata: &mut ScanMachineMetadata,
    ledger: &mut L,
    consumer: &mut C,
    context: &ChunkContext,
) -> ScanMachineStatus
where
    R: Record,
    K: KeyImageSet,
    L: ScanningContextLedger<R, K>,
    C: ChunkConsumer<R, K>,
{
    if ledger.is_aborted() {
        return ScanMachineStatus::Aborted;
    }

    let implicit_marker = prev_marker(context.start_index, context.prefix_block_id);

    if !implicit_marker.is_contiguous_with(&metadata.contiguity_marker) {
        return reorg_detected(metadata);
    }

    // Only roll the consumer back if the ledger's top-of-chain marker actually moved; an
    // unchanged marker means this termination chunk confirms the consumer's own tip exactly.
    if implicit_marker != metadata.contiguity_marker {
        consumer.consume_onchain_chunk(None, implicit_marker.next_index(), implicit_marker.block_id_or_zero(), &[]);
    }
    metadata.contiguity_marker = implicit_marker;
    ScanMachineStatus::Success
}

fn handle_nonempty_chunk<R, K, C, Chunk>(
    metadata: &mut ScanMachineMetadata,
    consumer: &mut C,
    chunk: &Chunk,
    context: &ChunkContext,
) -> ScanMachineStatus
where
    R: Record,
    K: KeyImageSet,
    C: ChunkConsumer<R, K>,
    Chunk: LedgerChunk<R, K>,
{
    let prefix_marker = prev_marker(context.start_index, context.prefix_block_id);

    if !prefix_marker.is_contiguous_with(&metadata.contiguity_marker) {
        return reorg_detected(metadata);
    }

    // Walk forward from the current marker, sliding it up over every block the consumer already
    // agrees with, so only the strict suffix is ever handed to consume_onchain_chunk (spec.md
    // §4.B.4: this is what avoids a redundant/incorrect rollback).
    let mut alignment = metadata.contiguity_marker;
    for (offset, block_id) in context.block_ids.iter().enumerate() {
        let index = context.start_index + offset as BlockIndex;
        match consumer.try_get_block_id(index) {
            Some(known_id) if known_id == *block_id => {
                alignment = ContiguityMarker::new(index, Some(known_id));
            }
            _ => break,
        }
    }

    let cropped: Vec<_> = context
        .block_ids
        .iter()
        .enumerate()
        .filter_map(|(offset, id)| {
            let index = context.start_index + offset as BlockIndex;
            alignment.precedes(index).then_some(*id)
        })
        .collect();

    if !cropped.is_empty() {
        let data = chunk.subconsumer_ids().first().and_then(|id| chunk.try_get_data(id));
        consumer.consume_onchain_chunk(data, alignment.next_index(), alignment.block_id_or_zero(), &cropped);
    }

    let last_index = context.last_index().expect("non-empty chunk has a last index");
    let last_id = *context.block_ids.last().expect("non-empty chunk has a last id");
    metadata.contiguity_marker = ContiguityMarker::new(last_index, Some(last_id));

    ScanMachineStatus::DoScan
}

fn reorg_detected(metadata: &ScanMachineMetadata) -> ScanMachineStatus {
    if ContiguityMarker::index_at_or_after(metadata.first_contiguity_index, metadata.contiguity_marker.block_index) {
        ScanMachineStatus::NeedFullscan
    } else {
        ScanMachineStatus::NeedPartialscan
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses_report_terminal() {
        assert!(ScanMachineStatus::Success.is_terminal());
        assert!(ScanMachineStatus::Fail.is_terminal());
        assert!(ScanMachineStatus::Aborted.is_terminal());
        assert!(!ScanMachineStatus::DoScan.is_terminal());
        assert!(!ScanMachineStatus::NeedFullscan.is_terminal());
    }

    #[test]
    fn fresh_metadata_starts_at_need_fullscan() {
        let metadata = ScanMachineMetadata::new(ScanMachineConfig::default());
        assert_eq!(metadata.status, ScanMachineStatus::NeedFullscan);
        assert!(!metadata.is_terminal());
    }

    #[test]
    fn reorg_detected_picks_fullscan_before_first_contiguity() {
        let mut metadata = ScanMachineMetadata::new(ScanMachineConfig::default());
        metadata.first_contiguity_index = 5;
        metadata.contiguity_marker = ContiguityMarker::new(5, None);
        assert_eq!(reorg_detected(&metadata), ScanMachineStatus::NeedFullscan);
    }

    #[test]
    fn reorg_detected_picks_partialscan_after_first_contiguity() {
        let mut metadata = ScanMachineMetadata::new(ScanMachineConfig::default());
        metadata.first_contiguity_index = 2;
        metadata.contiguity_marker = ContiguityMarker::new(5, None);
        assert_eq!(reorg_detected(&metadata), ScanMachineStatus::NeedPartialscan);
    }

    #[test]
    fn reorg_detected_picks_partialscan_when_genesis_anchor_has_advanced() {
        // first_contiguity_index still GENESIS (nothing confirmed yet at StartScan time) but the
        // marker has since advanced past it: progress was made this pass, so retry shallow.
        let mut metadata = ScanMachineMetadata::new(ScanMachineConfig::default());
        metadata.first_contiguity_index = ContiguityMarker::GENESIS;
        metadata.contiguity_marker = ContiguityMarker::new(2, None);
        assert_eq!(reorg_detected(&metadata), ScanMachineStatus::NeedPartialscan);
    }

    #[test]
    fn genesis_pre_chunk_anchor_starts_scanning_at_block_zero() {
        let anchor = ContiguityMarker::new(ContiguityMarker::GENESIS, None);
        assert_eq!(anchor.next_index(), 0);
    }
}
