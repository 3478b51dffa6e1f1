use std::sync::atomic::{AtomicBool, Ordering};

use crate::registry::DeviceRegistry;

/// Edge-triggered "calibrate now" command. Anyone may raise it; the consumer
/// tick samples it once and clears it.
#[derive(Debug, Default)]
pub struct CalibrationCoordinator {
    requested: AtomicBool,
}

impl CalibrationCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::Release);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    /// If a request is pending, clear it and calibrate every device.
    /// Returns the number calibrated, or `None` when nothing was pending.
    pub fn poll(&self, registry: &DeviceRegistry) -> Option<usize> {
        if self.requested.swap(false, Ordering::AcqRel) {
            Some(registry.calibrate_all())
        } else {
            None
        }
    }
}
