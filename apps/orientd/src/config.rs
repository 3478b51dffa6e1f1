use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

use orient_ingest_udp::UdpConfig;
use tracking::TrackingConfig;

/// Overrides the config file location.
pub const CONFIG_ENV: &str = "ORIENTD_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub listener: UdpConfig,
    pub tracking: TrackingConfig,
    pub consumer: ConsumerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    /// Render-side sampling cadence.
    pub frame_rate_hz: u32,
    /// Log per-device metrics every N frames; 0 disables.
    pub metrics_log_every: u64,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self { frame_rate_hz: 60, metrics_log_every: 60 }
    }
}

/// `$ORIENTD_CONFIG`, else `<config dir>/orientd/config.toml`.
pub fn config_path() -> Result<PathBuf> {
    if let Some(p) = std::env::var_os(CONFIG_ENV) {
        return Ok(PathBuf::from(p));
    }
    let dir = dirs_next::config_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
    Ok(dir.join("orientd").join("config.toml"))
}

pub fn parse_config(contents: &str) -> Result<AppConfig> {
    Ok(toml::from_str(contents)?)
}

/// Load config from disk, or return default if not found.
pub fn load_config() -> Result<AppConfig> {
    let path = config_path()?;
    if path.exists() {
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("read {}", path.display()))?;
        let config = parse_config(&contents).with_context(|| format!("parse {}", path.display()))?;
        info!(?path, "Loaded config");
        Ok(config)
    } else {
        info!(?path, "No config found, using defaults");
        Ok(AppConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        let cfg = parse_config("").unwrap();
        assert_eq!(cfg, AppConfig::default());
        assert_eq!(cfg.listener.bind_addr, "0.0.0.0:5005");
        assert_eq!(cfg.tracking.history_capacity, 500);
        assert_eq!(cfg.tracking.device_timeout_ms, None);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = parse_config(
            r#"
            [listener]
            bind_addr = "127.0.0.1:6000"

            [tracking]
            device_timeout_ms = 5000
            speed_window = 20
            "#,
        )
        .unwrap();
        assert_eq!(cfg.listener.bind_addr, "127.0.0.1:6000");
        assert_eq!(cfg.listener.recv_buffer, 2048);
        assert_eq!(cfg.tracking.device_timeout_ms, Some(5000));
        assert_eq!(cfg.tracking.speed_window, 20);
        assert_eq!(cfg.tracking.stale_window_ms, 1000);
        assert_eq!(cfg.consumer, ConsumerConfig::default());
    }

    #[test]
    fn bad_types_are_rejected() {
        assert!(parse_config("[consumer]\nframe_rate_hz = \"fast\"").is_err());
    }
}
