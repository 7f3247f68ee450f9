//! Configuration structs for the task engine and scan state machine.

mod scan_machine;
mod thread_pool;

pub use scan_machine::{ScanMachineConfig, ScanMachineConfigError};
pub use thread_pool::{ThreadPoolConfig, ThreadPoolConfigError};
