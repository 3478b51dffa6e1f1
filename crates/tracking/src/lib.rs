//! Per-device orientation state, motion history, and the shared registry
//! that the network listener writes and the render loop reads.

pub mod calibration;
pub mod device;
pub mod history;
pub mod registry;

pub use calibration::CalibrationCoordinator;
pub use device::DeviceState;
pub use history::MotionHistoryBuffer;
pub use registry::{DeviceQuery, DeviceRegistry, RegistrySnapshot};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Samples retained per device for distance averaging.
    pub history_capacity: usize,
    /// Most recent samples used by the speed estimate.
    pub speed_window: usize,
    /// Backward jumps larger than this are a sensor reset, not reordering.
    pub stale_window_ms: u32,
    /// Forget devices silent for this long. `None` keeps them forever.
    pub device_timeout_ms: Option<u64>,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            history_capacity: 500,
            speed_window: 10,
            stale_window_ms: 1000,
            device_timeout_ms: None,
        }
    }
}
