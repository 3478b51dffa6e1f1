// Operator commands read from stdin.
use std::io::BufRead;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::session::AppSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Raise the calibrate-now flag; the next consumer tick applies it.
    Calibrate,
    Devices,
    Stats,
    Help,
    Quit,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    Quit,
}

pub fn parse_command(line: &str) -> Option<Command> {
    match line.trim().to_ascii_lowercase().as_str() {
        "c" | "cal" | "calibrate" => Some(Command::Calibrate),
        "d" | "devices" => Some(Command::Devices),
        "s" | "stats" => Some(Command::Stats),
        "h" | "?" | "help" => Some(Command::Help),
        "q" | "quit" | "exit" => Some(Command::Quit),
        _ => None,
    }
}

pub fn execute(cmd: Command, session: &AppSession) -> Reply {
    match cmd {
        Command::Calibrate => {
            session.calibration.request();
            info!("calibration requested");
            Reply::Text("calibration queued".into())
        }
        Command::Devices => Reply::Text(to_json(&session.last_frame())),
        Command::Stats => Reply::Text(to_json(&session.stats.snapshot())),
        Command::Help => Reply::Text("commands: calibrate | devices | stats | help | quit".into()),
        Command::Quit => Reply::Quit,
    }
}

fn to_json<T: serde::Serialize>(v: &T) -> String {
    serde_json::to_string_pretty(v).unwrap_or_else(|e| format!("serialize failed: {e}"))
}

/// Pump stdin lines into `tx` from a plain, detached thread.
pub fn spawn_stdin_reader(tx: mpsc::Sender<Command>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            match parse_command(&line) {
                Some(cmd) => {
                    if tx.blocking_send(cmd).is_err() {
                        break;
                    }
                }
                None => warn!(input = %line.trim(), "unknown command, try 'help'"),
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use orient_ingest_udp::ListenerStats;
    use std::sync::Arc;
    use tracking::{DeviceRegistry, TrackingConfig};

    #[test]
    fn parses_aliases() {
        assert_eq!(parse_command("  Calibrate "), Some(Command::Calibrate));
        assert_eq!(parse_command("c"), Some(Command::Calibrate));
        assert_eq!(parse_command("exit"), Some(Command::Quit));
        assert_eq!(parse_command("dance"), None);
    }

    #[test]
    fn calibrate_raises_the_flag() {
        let session = AppSession::new(
            Arc::new(DeviceRegistry::new(TrackingConfig::default())),
            Arc::new(ListenerStats::default()),
        );
        assert!(!session.calibration.is_requested());
        assert!(matches!(execute(Command::Calibrate, &session), Reply::Text(_)));
        assert!(session.calibration.is_requested());
        assert_eq!(execute(Command::Quit, &session), Reply::Quit);
    }

    #[test]
    fn stats_render_as_json() {
        let session = AppSession::new(
            Arc::new(DeviceRegistry::new(TrackingConfig::default())),
            Arc::new(ListenerStats::default()),
        );
        let Reply::Text(out) = execute(Command::Stats, &session) else { panic!("expected text") };
        let v: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["received"], 0);
    }
}
