//! End-to-end scan machine scenarios (spec.md §8 "End-to-end scenarios").

use tn_config::ScanMachineConfig;
use tn_scanner::{try_advance_state_machine, ScanMachineMetadata, ScanMachineStatus};
use tn_test_utils::{MockConsumer, MockLedger};
use tn_types::BlockId;

fn block(n: u8) -> BlockId {
    BlockId::new([n; 32])
}

fn drive(
    metadata: &mut ScanMachineMetadata,
    ledger: &mut MockLedger,
    consumer: &mut MockConsumer,
) {
    let mut guard = 0;
    while try_advance_state_machine(metadata, ledger, consumer) {
        guard += 1;
        assert!(guard < 10_000, "state machine did not converge");
    }
}

#[test]
fn cold_sync_three_blocks() {
    let mut ledger = MockLedger::new(vec![block(1), block(2), block(3)]);
    let mut consumer = MockConsumer::new(0);
    let mut metadata = ScanMachineMetadata::new(ScanMachineConfig::default());

    drive(&mut metadata, &mut ledger, &mut consumer);

    assert_eq!(metadata.status, ScanMachineStatus::Success);
    assert_eq!(consumer.tip_ids(), &[block(1), block(2), block(3)]);
    assert_eq!(consumer.tip_index(), Some(2));
    assert_eq!(consumer.consume_calls.len(), 1);
    assert_eq!(consumer.consume_calls[0].first_new_index, 0);
    assert_eq!(consumer.consume_calls[0].new_block_ids, vec![block(1), block(2), block(3)]);
}

#[test]
fn no_op_rescan_consumes_nothing_new() {
    let mut ledger = MockLedger::new(vec![block(1), block(2), block(3)]);
    let mut consumer = MockConsumer::with_known_ids(0, vec![block(1), block(2), block(3)]);
    let mut metadata = ScanMachineMetadata::new(ScanMachineConfig::default());

    drive(&mut metadata, &mut ledger, &mut consumer);

    assert_eq!(metadata.status, ScanMachineStatus::Success);
    // Alignment consumes the entire chunk; no non-empty consume_onchain_chunk call is made.
    assert!(consumer.consume_calls.iter().all(|call| call.new_block_ids.is_empty()));
    assert_eq!(consumer.tip_ids(), &[block(1), block(2), block(3)]);
}

#[test]
fn one_block_reorg_recovers_via_partialscan() {
    let mut ledger = MockLedger::new(vec![block(1), block(2), block(0x9)]);
    let mut consumer = MockConsumer::with_known_ids(0, vec![block(1), block(2), block(3)]);
    let mut metadata = ScanMachineMetadata::new(ScanMachineConfig::default());

    drive(&mut metadata, &mut ledger, &mut consumer);

    assert_eq!(metadata.status, ScanMachineStatus::Success);
    assert_eq!(consumer.tip_ids(), &[block(1), block(2), block(0x9)]);
    assert!(metadata.partialscan_attempts >= 1);

    let reorg_call = consumer
        .consume_calls
        .iter()
        .find(|call| !call.new_block_ids.is_empty())
        .expect("a reorg recovery call must have happened");
    assert_eq!(reorg_call.first_new_index, 2);
    assert_eq!(reorg_call.alignment_block_id, block(2));
    assert_eq!(reorg_call.new_block_ids, vec![block(0x9)]);
}

#[test]
fn deep_reorg_exceeding_partialscan_budget_escalates_to_fullscan() {
    // Consumer believes it has 12 blocks; the true chain diverges at index 2 (10 below the
    // consumer's desired start of 12), further than a single partialscan attempt at depth 1 can
    // reach, so it must escalate to NeedFullscan.
    let known_ids: Vec<BlockId> = (0u8..12).map(block).collect();
    let mut consumer = MockConsumer::with_known_ids(0, known_ids);

    let mut true_chain: Vec<BlockId> = (0u8..2).map(block).collect();
    true_chain.extend((100u8..110).map(block));
    let mut ledger = MockLedger::new(true_chain.clone());

    let config = ScanMachineConfig { reorg_avoidance_increment: 1, max_partialscan_attempts: 1, ..Default::default() };
    let mut metadata = ScanMachineMetadata::new(config);

    drive(&mut metadata, &mut ledger, &mut consumer);

    assert_eq!(metadata.status, ScanMachineStatus::Success);
    assert_eq!(metadata.partialscan_attempts, 1);
    assert!(metadata.fullscan_attempts >= 2, "must have escalated past the first (k=0) fullscan attempt");
    assert_eq!(consumer.tip_ids(), &true_chain[..]);
}

#[test]
fn empty_chunk_immediately_after_start_scan_succeeds_with_no_consumption() {
    let mut ledger = MockLedger::new(vec![]);
    let mut consumer = MockConsumer::new(0);
    let mut metadata = ScanMachineMetadata::new(ScanMachineConfig::default());

    drive(&mut metadata, &mut ledger, &mut consumer);

    assert_eq!(metadata.status, ScanMachineStatus::Success);
    assert!(consumer.tip_ids().is_empty());
}

#[test]
fn reorg_removing_all_known_blocks_rolls_back_to_refresh_index() {
    let mut consumer = MockConsumer::with_known_ids(0, vec![block(1), block(2), block(3)]);
    let mut ledger = MockLedger::new(vec![block(9), block(10)]);
    let mut metadata = ScanMachineMetadata::new(ScanMachineConfig::default());

    drive(&mut metadata, &mut ledger, &mut consumer);

    assert_eq!(metadata.status, ScanMachineStatus::Success);
    assert_eq!(consumer.tip_ids(), &[block(9), block(10)]);
}
