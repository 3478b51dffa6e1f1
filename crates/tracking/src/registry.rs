use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use model::{quat, DecodedSample, DeviceId, Quat, Timestamp};
use orient_ingest_core::{IngestOutcome, SampleSink};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::device::DeviceState;
use crate::TrackingConfig;

struct Slot {
    state: Arc<DeviceState>,
    last_seen: Instant,
}

/// All known devices behind one lock.
///
/// States are held as `Arc`s and updated copy-on-write, so a
/// [`RegistrySnapshot`] is a cheap shallow copy that later writes never touch.
pub struct DeviceRegistry {
    cfg: TrackingConfig,
    devices: Mutex<HashMap<DeviceId, Slot>>,
}

impl DeviceRegistry {
    pub fn new(cfg: TrackingConfig) -> Self {
        Self { cfg, devices: Mutex::new(HashMap::new()) }
    }

    pub fn len(&self) -> usize {
        self.devices.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.lock().is_empty()
    }

    pub fn contains(&self, id: DeviceId) -> bool {
        self.devices.lock().contains_key(&id)
    }

    /// Look up `id`, creating it from this first observation if unseen.
    pub fn get_or_create(&self, id: DeviceId, timestamp: Timestamp, orientation: Quat) -> Arc<DeviceState> {
        let mut devices = self.devices.lock();
        let (slot, _) = self.slot_or_insert(&mut devices, id, timestamp, orientation);
        slot.state.clone()
    }

    /// Never fails: an unknown id yields an identity-calibrated stand-in.
    pub fn get(&self, id: DeviceId) -> Arc<DeviceState> {
        self.devices
            .lock()
            .get(&id)
            .map(|slot| slot.state.clone())
            .unwrap_or_else(|| Arc::new(DeviceState::unregistered(id)))
    }

    /// Calibrate every registered device under one lock. Returns how many.
    pub fn calibrate_all(&self) -> usize {
        let mut devices = self.devices.lock();
        for slot in devices.values_mut() {
            Arc::make_mut(&mut slot.state).calibrate();
        }
        info!(devices = devices.len(), "calibrated all devices");
        devices.len()
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        let devices = self.devices.lock();
        RegistrySnapshot {
            devices: devices.iter().map(|(id, slot)| (*id, slot.state.clone())).collect(),
        }
    }

    /// Drop devices silent for longer than the configured timeout.
    /// A no-op unless `device_timeout_ms` is set.
    pub fn evict_idle(&self, now: Instant) -> Vec<DeviceId> {
        let Some(timeout_ms) = self.cfg.device_timeout_ms else {
            return Vec::new();
        };
        let timeout = Duration::from_millis(timeout_ms);
        let mut evicted = Vec::new();
        self.devices.lock().retain(|id, slot| {
            let keep = now.saturating_duration_since(slot.last_seen) <= timeout;
            if !keep {
                evicted.push(*id);
            }
            keep
        });
        for id in &evicted {
            info!(device_id = *id, "evicted idle device");
        }
        evicted
    }

    fn slot_or_insert<'a>(
        &self,
        devices: &'a mut HashMap<DeviceId, Slot>,
        id: DeviceId,
        timestamp: Timestamp,
        orientation: Quat,
    ) -> (&'a mut Slot, bool) {
        let mut created = false;
        let slot = devices.entry(id).or_insert_with(|| {
            created = true;
            info!(device_id = id, timestamp, "registered device");
            Slot {
                state: Arc::new(DeviceState::create(id, timestamp, quat::IDENTITY, orientation, &self.cfg)),
                last_seen: Instant::now(),
            }
        });
        (slot, created)
    }
}

impl SampleSink for DeviceRegistry {
    /// Get-or-create and apply as one atomic step.
    fn ingest(&self, sample: &DecodedSample) -> IngestOutcome {
        let mut devices = self.devices.lock();
        let (slot, created) =
            self.slot_or_insert(&mut devices, sample.device_id, sample.timestamp, sample.orientation);
        if created {
            return IngestOutcome::Registered;
        }
        if !slot.state.accepts(sample.timestamp) {
            debug!(
                device_id = sample.device_id,
                timestamp = sample.timestamp,
                last = slot.state.last_timestamp(),
                "dropped stale sample"
            );
            return IngestOutcome::Stale;
        }
        Arc::make_mut(&mut slot.state).apply_sample(sample.timestamp, sample.orientation, sample.action_flag);
        slot.last_seen = Instant::now();
        IngestOutcome::Accepted
    }
}

/// Point-in-time view of the registry for one consumer frame.
#[derive(Clone, Default)]
pub struct RegistrySnapshot {
    devices: BTreeMap<DeviceId, Arc<DeviceState>>,
}

impl RegistrySnapshot {
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Ascending device id.
    pub fn device_ids(&self) -> impl Iterator<Item = DeviceId> + '_ {
        self.devices.keys().copied()
    }
}

/// Read surface for the rendering side. Every query has an identity or
/// zero answer for a device that has never reported.
pub trait DeviceQuery {
    fn with_device<R>(&self, id: DeviceId, f: impl FnOnce(&DeviceState) -> R) -> Option<R>;

    fn relative_rotation(&self, id: DeviceId) -> Quat {
        self.with_device(id, |d| d.relative_rotation()).unwrap_or(quat::IDENTITY)
    }

    fn calibration_origin(&self, id: DeviceId) -> Quat {
        self.with_device(id, |d| d.calibration_origin()).unwrap_or(quat::IDENTITY)
    }

    fn sum_distances(&self, id: DeviceId) -> f32 {
        self.with_device(id, |d| d.sum_distances()).unwrap_or(0.0)
    }

    fn approximate_speed(&self, id: DeviceId) -> f32 {
        self.with_device(id, |d| d.approximate_speed()).unwrap_or(0.0)
    }

    fn action_flag(&self, id: DeviceId) -> u8 {
        self.with_device(id, |d| d.action_flag()).unwrap_or(0)
    }
}

impl DeviceQuery for DeviceRegistry {
    fn with_device<R>(&self, id: DeviceId, f: impl FnOnce(&DeviceState) -> R) -> Option<R> {
        let devices = self.devices.lock();
        devices.get(&id).map(|slot| f(slot.state.as_ref()))
    }
}

impl DeviceQuery for RegistrySnapshot {
    fn with_device<R>(&self, id: DeviceId, f: impl FnOnce(&DeviceState) -> R) -> Option<R> {
        self.devices.get(&id).map(|s| f(s.as_ref()))
    }
}
