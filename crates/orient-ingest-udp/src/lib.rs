//! UDP listener for wearable orientation sensors.

pub mod packet;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time;
use tracing::{error, info, warn};

use orient_ingest_core::*;

pub use packet::{decode, DecodeError, PACKET_LEN};

const RECV_BACKOFF_BASE: Duration = Duration::from_millis(10);
const RECV_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Pause after the `consecutive`-th receive error in a row: doubles from
/// 10ms, capped at 1s.
fn recv_backoff(consecutive: u32) -> Duration {
    let shift = consecutive.saturating_sub(1).min(16);
    RECV_BACKOFF_BASE.saturating_mul(1 << shift).min(RECV_BACKOFF_MAX)
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UdpConfig {
    pub bind_addr: String, // e.g. "0.0.0.0:5005"
    /// Receive buffer; anything beyond the first 14 bytes is ignored.
    pub recv_buffer: usize,
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self { bind_addr: "0.0.0.0:5005".into(), recv_buffer: 2048 }
    }
}

/// Running totals, readable while the loop is live.
#[derive(Debug, Default)]
pub struct ListenerStats {
    received: AtomicU64,
    rejected: AtomicU64,
    registered: AtomicU64,
    accepted: AtomicU64,
    stale: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub received: u64,
    pub rejected: u64,
    pub registered: u64,
    pub accepted: u64,
    pub stale: u64,
    pub failed: u64,
}

impl ListenerStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            registered: self.registered.load(Ordering::Relaxed),
            accepted: self.accepted.load(Ordering::Relaxed),
            stale: self.stale.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// A bound sensor socket. Binding happens up front so a busy port is
/// reported to the caller before anything is spawned.
pub struct UdpSource {
    cfg: UdpConfig,
    socket: UdpSocket,
    stats: Arc<ListenerStats>,
}

impl UdpSource {
    pub async fn bind(cfg: UdpConfig) -> Result<Self, IngestError> {
        let socket = UdpSocket::bind(&cfg.bind_addr).await
            .with_context(|| format!("bind {}", cfg.bind_addr))?;
        info!(addr = %cfg.bind_addr, "orientation listener bound");
        Ok(Self { cfg, socket, stats: Arc::new(ListenerStats::default()) })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, IngestError> {
        Ok(self.socket.local_addr()?)
    }

    pub fn stats(&self) -> Arc<ListenerStats> {
        self.stats.clone()
    }

    fn handle_datagram(&self, buf: &[u8], peer: SocketAddr, sink: &dyn SampleSink) {
        ListenerStats::bump(&self.stats.received);
        let sample = match decode(buf) {
            Ok(s) => s,
            Err(e) => {
                ListenerStats::bump(&self.stats.rejected);
                warn!(%peer, error = %e, "discarding datagram");
                return;
            }
        };
        // a panicking sink must not take the listener down with it
        match panic::catch_unwind(AssertUnwindSafe(|| sink.ingest(&sample))) {
            Ok(IngestOutcome::Registered) => ListenerStats::bump(&self.stats.registered),
            Ok(IngestOutcome::Accepted) => ListenerStats::bump(&self.stats.accepted),
            Ok(IngestOutcome::Stale) => ListenerStats::bump(&self.stats.stale),
            Err(_) => {
                ListenerStats::bump(&self.stats.failed);
                error!(%peer, device_id = sample.device_id, "failed to apply sample");
            }
        }
    }
}

#[async_trait::async_trait]
impl OrientationSource for UdpSource {
    async fn run(&self, sink: Arc<dyn SampleSink>, mut shutdown: Shutdown) -> Result<(), IngestError> {
        let mut buf = vec![0u8; self.cfg.recv_buffer.max(PACKET_LEN)];
        info!(addr = %self.cfg.bind_addr, "orientation listener running");
        let mut recv_errors = 0u32;
        loop {
            let res = tokio::select! {
                _ = shutdown.cancelled() => break,
                res = self.socket.recv_from(&mut buf) => res,
            };
            match res {
                Ok((len, peer)) => {
                    recv_errors = 0;
                    self.handle_datagram(&buf[..len], peer, sink.as_ref());
                }
                Err(e) => {
                    recv_errors = recv_errors.saturating_add(1);
                    let pause = recv_backoff(recv_errors);
                    warn!(error = %e, consecutive = recv_errors, ?pause, "recv failed");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = time::sleep(pause) => {}
                    }
                }
            }
        }
        info!(stats = ?self.stats.snapshot(), "orientation listener stopped");
        Ok(())
    }
}
