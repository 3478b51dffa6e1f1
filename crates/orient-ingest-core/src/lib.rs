//! Core ingest traits shared by orientation sources and the device registry

use serde::{Serialize, Deserialize};
use std::sync::Arc;
use tokio::sync::watch;

pub use model::DecodedSample;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// What a sink did with one decoded sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IngestOutcome {
    /// First packet from this device; a fresh state was created from it.
    Registered,
    /// Newer sample (or an epoch reset) applied to an existing device.
    Accepted,
    /// Out-of-order or duplicate sample; nothing changed.
    Stale,
}

/// Anything that can absorb decoded samples. The device registry is the
/// production sink; tests can plug in their own.
pub trait SampleSink: Send + Sync {
    fn ingest(&self, sample: &DecodedSample) -> IngestOutcome;
}

/// Trait for any live source connector
#[async_trait::async_trait]
pub trait OrientationSource: Send + Sync {
    /// Feed `sink` until `shutdown` fires.
    async fn run(&self, sink: Arc<dyn SampleSink>, shutdown: Shutdown) -> Result<(), IngestError>;
}

/// Receiving half of a stop signal. Cheap to clone; every clone observes the
/// same trigger. Dropping the [`ShutdownHandle`] also counts as a trigger.
#[derive(Clone, Debug)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolves once shutdown has been requested.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

#[derive(Debug)]
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn subscribe(&self) -> Shutdown {
        Shutdown { rx: self.tx.subscribe() }
    }
}

pub fn shutdown_channel() -> (ShutdownHandle, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownHandle { tx }, Shutdown { rx })
}
