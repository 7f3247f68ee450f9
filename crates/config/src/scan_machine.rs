use thiserror::Error;

/// Construction-time errors for [`ScanMachineConfig`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScanMachineConfigError {
    #[error("reorg_avoidance_increment must be at least 1")]
    NoReorgAvoidanceIncrement,
    #[error("max_chunk_size must be at least 1")]
    NoChunkSize,
}

/// Configuration for `tn_scanner`'s `ScanStateMachine`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ScanMachineConfig {
    /// Fixed rescan depth used for partial scans, and the base of the exponential back-off used
    /// for full scans (`reorg_avoidance_increment * 10^(fullscan_attempts - 1)`).
    pub reorg_avoidance_increment: u64,
    /// Maximum number of blocks the scanning context is asked for per chunk.
    pub max_chunk_size: u64,
    /// Partial-scan attempts allowed for a single reorg before escalating to a full scan.
    pub max_partialscan_attempts: u32,
}

impl Default for ScanMachineConfig {
    fn default() -> Self {
        Self { reorg_avoidance_increment: 10, max_chunk_size: 1_000, max_partialscan_attempts: 3 }
    }
}

impl ScanMachineConfig {
    /// Hard cap on full-scan attempts before giving up; not configurable (mirrors the original's
    /// fixed retry ceiling in `scan_state_machine.cpp`).
    pub const MAX_FULLSCAN_ATTEMPTS: u32 = 50;

    pub fn validate(&self) -> Result<(), ScanMachineConfigError> {
        if self.reorg_avoidance_increment == 0 {
            return Err(ScanMachineConfigError::NoReorgAvoidanceIncrement);
        }
        if self.max_chunk_size == 0 {
            return Err(ScanMachineConfigError::NoChunkSize);
        }
        Ok(())
    }

    /// `reorg_avoidance_depth(k)` from spec.md §4.B.2: `0` for `k == 0`, otherwise
    /// `10^(k-1) * reorg_avoidance_increment`.
    pub fn reorg_avoidance_depth(&self, fullscan_attempts: u32) -> u64 {
        if fullscan_attempts == 0 {
            0
        } else {
            10u64.saturating_pow(fullscan_attempts - 1).saturating_mul(self.reorg_avoidance_increment)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_is_zero_on_first_attempt() {
        let config = ScanMachineConfig::default();
        assert_eq!(config.reorg_avoidance_depth(0), 0);
    }

    #[test]
    fn depth_grows_exponentially() {
        let config = ScanMachineConfig { reorg_avoidance_increment: 10, ..Default::default() };
        assert_eq!(config.reorg_avoidance_depth(1), 10);
        assert_eq!(config.reorg_avoidance_depth(2), 100);
        assert_eq!(config.reorg_avoidance_depth(3), 1_000);
    }

    #[test]
    fn zero_increment_rejected() {
        let config = ScanMachineConfig { reorg_avoidance_increment: 0, ..Default::default() };
        assert_eq!(config.validate(), Err(ScanMachineConfigError::NoReorgAvoidanceIncrement));
    }
}
