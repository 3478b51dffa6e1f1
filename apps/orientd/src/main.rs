mod commands;
mod config;
mod session;

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use config::AppConfig;
use orient_ingest_core::{shutdown_channel, OrientationSource, SampleSink};
use orient_ingest_udp::UdpSource;
use session::AppSession;
use tracking::DeviceRegistry;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "orientd=info,orient_ingest_udp=info,tracking=info".into()),
        )
        .init();

    let config = config::load_config().unwrap_or_else(|e| {
        warn!(?e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    // a bind failure ends startup
    let source = UdpSource::bind(config.listener.clone())
        .await
        .context("starting orientation listener")?;

    let registry = Arc::new(DeviceRegistry::new(config.tracking.clone()));
    let session = Arc::new(AppSession::new(registry.clone(), source.stats()));
    let (handle, shutdown) = shutdown_channel();

    let listener = {
        let sink: Arc<dyn SampleSink> = registry;
        let shutdown = shutdown.clone();
        tokio::spawn(async move { source.run(sink, shutdown).await })
    };
    let consumer = tokio::spawn(session::run_consumer(
        session.clone(),
        config.consumer.clone(),
        shutdown.clone(),
    ));

    let (cmd_tx, mut cmd_rx) = mpsc::channel(16);
    commands::spawn_stdin_reader(cmd_tx);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received");
                break;
            }
            Some(cmd) = cmd_rx.recv() => match commands::execute(cmd, &session) {
                commands::Reply::Text(out) => println!("{out}"),
                commands::Reply::Quit => break,
            },
        }
    }

    handle.trigger();
    listener.await.context("listener task")??;
    consumer.await.context("consumer task")?;
    info!(stats = ?session.stats.snapshot(), "shut down");
    Ok(())
}
