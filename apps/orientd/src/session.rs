use std::{sync::Arc, time::{Duration, Instant}};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};

use model::DeviceId;
use orient_ingest_core::Shutdown;
use orient_ingest_udp::ListenerStats;
use tracking::{CalibrationCoordinator, DeviceQuery, DeviceRegistry, RegistrySnapshot};

use crate::config::ConsumerConfig;

/// Everything the listener and the consumer loop share.
pub struct AppSession {
    pub registry: Arc<DeviceRegistry>,
    pub calibration: CalibrationCoordinator,
    pub stats: Arc<ListenerStats>,
    pub inner: Mutex<Inner>,
}

pub struct Inner {
    pub frame: u64,
    pub last_frame: Vec<DeviceReport>,
}

/// What the render side sees for one device in one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceReport {
    pub device_id: DeviceId,
    /// x, y, z, w
    pub relative_rotation: [f32; 4],
    pub calibration_origin: [f32; 4],
    pub sum_distances: f32,
    pub approximate_speed: f32,
    pub action_flag: u8,
}

pub fn frame_report(snap: &RegistrySnapshot) -> Vec<DeviceReport> {
    snap.device_ids()
        .map(|id| DeviceReport {
            device_id: id,
            relative_rotation: snap.relative_rotation(id).to_array(),
            calibration_origin: snap.calibration_origin(id).to_array(),
            sum_distances: snap.sum_distances(id),
            approximate_speed: snap.approximate_speed(id),
            action_flag: snap.action_flag(id),
        })
        .collect()
}

impl AppSession {
    pub fn new(registry: Arc<DeviceRegistry>, stats: Arc<ListenerStats>) -> Self {
        Self {
            registry,
            calibration: CalibrationCoordinator::new(),
            stats,
            inner: Mutex::new(Inner { frame: 0, last_frame: Vec::new() }),
        }
    }

    /// One consumer frame: honour a pending calibrate, expire idle devices,
    /// then read a snapshot. Returns the frame number.
    pub fn tick(&self, now: Instant) -> u64 {
        self.calibration.poll(&self.registry);
        self.registry.evict_idle(now);
        let report = frame_report(&self.registry.snapshot());

        let mut inner = self.inner.lock();
        inner.frame += 1;
        inner.last_frame = report;
        inner.frame
    }

    pub fn last_frame(&self) -> Vec<DeviceReport> {
        self.inner.lock().last_frame.clone()
    }
}

fn log_frame(frame: u64, report: &[DeviceReport]) {
    debug!(frame, devices = report.len(), "frame");
    for d in report {
        debug!(
            device_id = d.device_id,
            rotation = ?d.relative_rotation,
            sum_distances = d.sum_distances,
            speed = d.approximate_speed,
            action = d.action_flag,
            "device"
        );
    }
}

/// Fixed-cadence stand-in for the render loop.
pub async fn run_consumer(session: Arc<AppSession>, cfg: ConsumerConfig, mut shutdown: Shutdown) {
    let period = Duration::from_secs_f64(1.0 / cfg.frame_rate_hz.max(1) as f64);
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(hz = cfg.frame_rate_hz, "consumer loop running");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let frame = session.tick(Instant::now());
                if cfg.metrics_log_every > 0 && frame % cfg.metrics_log_every == 0 {
                    log_frame(frame, &session.last_frame());
                }
            }
        }
    }
    info!("consumer loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::{quat, DecodedSample, Quat};
    use orient_ingest_core::{shutdown_channel, SampleSink};
    use tracking::TrackingConfig;

    fn session_with(cfg: TrackingConfig) -> AppSession {
        AppSession::new(Arc::new(DeviceRegistry::new(cfg)), Arc::new(ListenerStats::default()))
    }

    fn feed(session: &AppSession, device_id: DeviceId, timestamp: i32, orientation: Quat) {
        session.registry.ingest(&DecodedSample { device_id, timestamp, orientation, action_flag: 0 });
    }

    #[test]
    fn tick_reports_devices_in_id_order() {
        let s = session_with(TrackingConfig::default());
        feed(&s, 9, 0, quat::IDENTITY);
        feed(&s, 2, 0, quat::IDENTITY);
        assert_eq!(s.tick(Instant::now()), 1);
        let ids: Vec<_> = s.last_frame().iter().map(|d| d.device_id).collect();
        assert_eq!(ids, vec![2, 9]);
    }

    #[test]
    fn tick_applies_pending_calibration() {
        let s = session_with(TrackingConfig::default());
        feed(&s, 1, 0, Quat::from_rotation_x(1.0));
        s.tick(Instant::now());
        assert!(quat::shortest_arc_angle(Quat::from_array(s.last_frame()[0].relative_rotation), quat::IDENTITY) > 1e-3);

        s.calibration.request();
        s.tick(Instant::now());
        assert!(!s.calibration.is_requested());
        let rot = Quat::from_array(s.last_frame()[0].relative_rotation);
        assert!(quat::shortest_arc_angle(rot, quat::IDENTITY) < 1e-5);
    }

    #[test]
    fn tick_evicts_when_configured() {
        let s = session_with(TrackingConfig { device_timeout_ms: Some(10), ..TrackingConfig::default() });
        feed(&s, 4, 0, quat::IDENTITY);
        s.tick(Instant::now() + Duration::from_secs(1));
        assert!(s.last_frame().is_empty());
        assert!(s.registry.is_empty());
    }

    #[tokio::test]
    async fn consumer_ticks_until_shutdown() {
        let s = Arc::new(session_with(TrackingConfig::default()));
        let (handle, shutdown) = shutdown_channel();
        let cfg = ConsumerConfig { frame_rate_hz: 200, metrics_log_every: 1 };
        let task = tokio::spawn(run_consumer(s.clone(), cfg, shutdown));

        tokio::time::timeout(Duration::from_secs(2), async {
            while s.inner.lock().frame < 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("consumer did not tick");

        handle.trigger();
        tokio::time::timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
    }
}
