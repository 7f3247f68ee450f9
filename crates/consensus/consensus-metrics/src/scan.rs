use prometheus::{register_int_counter_vec_with_registry, register_int_gauge_with_registry};

use crate::{IntCounterVec, IntGauge, Registry};

/// Metrics for a `tn_scanner` scan state machine.
#[derive(Clone)]
pub struct ScanMetrics {
    /// Transitions into each `ScanMachineStatus` variant.
    pub status_transitions: IntCounterVec,
    /// Current contiguous block index the scanner believes it has reached.
    pub contiguity_index: IntGauge,
    /// Current partial-scan attempt count for the in-progress reorg recovery, if any.
    pub partialscan_attempts: IntGauge,
    /// Current full-scan attempt count for the in-progress reorg recovery, if any.
    pub fullscan_attempts: IntGauge,
}

impl ScanMetrics {
    pub fn new(registry: &Registry) -> Self {
        Self {
            status_transitions: register_int_counter_vec_with_registry!(
                "scan_status_transitions_total",
                "Transitions of the scan state machine, labeled by destination status",
                &["status"],
                registry
            )
            .expect("scan_status_transitions_total metric registers exactly once"),
            contiguity_index: register_int_gauge_with_registry!(
                "scan_contiguity_index",
                "Highest block index the scanner believes is contiguous with the consumer",
                registry
            )
            .expect("scan_contiguity_index metric registers exactly once"),
            partialscan_attempts: register_int_gauge_with_registry!(
                "scan_partialscan_attempts",
                "Partial-scan attempts made during the current reorg recovery",
                registry
            )
            .expect("scan_partialscan_attempts metric registers exactly once"),
            fullscan_attempts: register_int_gauge_with_registry!(
                "scan_fullscan_attempts",
                "Full-scan attempts made during the current reorg recovery",
                registry
            )
            .expect("scan_fullscan_attempts metric registers exactly once"),
        }
    }
}
