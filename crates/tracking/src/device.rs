use model::{quat, DeviceId, Quat, Timestamp};

use crate::history::MotionHistoryBuffer;
use crate::TrackingConfig;

/// Orientation state of one sensor.
///
/// The calibration origin only moves through [`DeviceState::calibrate`];
/// orientation, timestamp, and history only move through an accepted
/// [`DeviceState::apply_sample`].
#[derive(Clone, Debug)]
pub struct DeviceState {
    device_id: DeviceId,
    last_timestamp: Timestamp,
    calibration_origin: Quat,
    current_orientation: Quat,
    action_flag: u8,
    stale_window_ms: i64,
    history: MotionHistoryBuffer,
}

impl DeviceState {
    pub fn create(
        device_id: DeviceId,
        timestamp: Timestamp,
        calibration_origin: Quat,
        initial_orientation: Quat,
        cfg: &TrackingConfig,
    ) -> Self {
        let mut history = MotionHistoryBuffer::new(cfg.history_capacity, cfg.speed_window);
        history.record(timestamp, initial_orientation);
        Self {
            device_id,
            last_timestamp: timestamp,
            calibration_origin,
            current_orientation: initial_orientation,
            action_flag: 0,
            stale_window_ms: cfg.stale_window_ms as i64,
            history,
        }
    }

    /// Stand-in for a device that has never reported.
    pub fn unregistered(device_id: DeviceId) -> Self {
        Self::create(device_id, 0, quat::IDENTITY, quat::IDENTITY, &TrackingConfig::default())
    }

    pub fn device_id(&self) -> DeviceId {
        self.device_id
    }

    pub fn last_timestamp(&self) -> Timestamp {
        self.last_timestamp
    }

    pub fn calibration_origin(&self) -> Quat {
        self.calibration_origin
    }

    pub fn current_orientation(&self) -> Quat {
        self.current_orientation
    }

    pub fn action_flag(&self) -> u8 {
        self.action_flag
    }

    pub fn history(&self) -> &MotionHistoryBuffer {
        &self.history
    }

    /// Freeze the present pose as "forward".
    pub fn calibrate(&mut self) {
        self.calibration_origin = self.current_orientation;
    }

    /// Rotation from the live sensor frame back onto the calibrated frame.
    pub fn relative_rotation(&self) -> Quat {
        quat::inverse(self.current_orientation) * self.calibration_origin
    }

    pub fn sum_distances(&self) -> f32 {
        self.history.sum_distances()
    }

    pub fn approximate_speed(&self) -> f32 {
        self.history.approximate_speed()
    }

    /// Newer than the last sample, or far enough behind it to be a sensor
    /// restart rather than a reordered datagram.
    pub fn accepts(&self, timestamp: Timestamp) -> bool {
        let ts = timestamp as i64;
        let last = self.last_timestamp as i64;
        ts > last || ts < last - self.stale_window_ms
    }

    /// Returns `false` and leaves the state untouched for stale samples.
    pub fn apply_sample(&mut self, timestamp: Timestamp, orientation: Quat, action_flag: u8) -> bool {
        if !self.accepts(timestamp) {
            return false;
        }
        self.current_orientation = orientation;
        self.last_timestamp = timestamp;
        self.action_flag = action_flag;
        self.history.record(timestamp, orientation);
        true
    }
}
