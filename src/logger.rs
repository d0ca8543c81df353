use std::{fs, io, path::Path};

use anyhow::{Context, Result, anyhow};
use schema_bridge::{BridgeMsg, InboundHandler};
use tracing::{Subscriber, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, prelude::*, registry::LookupSpan};

use crate::config::EditorConfig;

/// Target of the newline-delimited JSON traffic log.
pub const BRIDGE_TARGET: &str = "bridge";
pub const LOG_FILE: &str = "meta-schema.log";
pub const EVENT_FILE: &str = "bridge-events.log";

/// Installs the global subscriber.
///
/// Console output goes to stderr; stdout may be carrying protocol lines. With a `log_dir`,
/// a daily text log and a JSON log of bridge traffic are written there as well. `RUST_LOG`
/// overrides the configured level.
pub fn init_tracing(config: &EditorConfig) -> Result<()> {
    let console_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_target(false)
        .with_filter(level_filter(config));

    let file_layer = match &config.log_dir {
        Some(dir) => Some(file_layers(dir, config)?),
        None => None,
    };

    Registry::default()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("tracing already initialised: {e}"))?;

    if let Some(dir) = &config.log_dir {
        info!("logging to {}", dir.display());
    }
    Ok(())
}

fn level_filter(config: &EditorConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level))
}

fn file_layers<S>(dir: &Path, config: &EditorConfig) -> Result<impl Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fs::create_dir_all(dir).with_context(|| format!("creating log dir {}", dir.display()))?;

    let txt_appender = RollingFileAppender::new(Rotation::DAILY, dir, LOG_FILE);
    let txt_layer = fmt::layer()
        .with_writer(txt_appender)
        .with_ansi(false)
        .with_filter(level_filter(config));

    let json_appender = RollingFileAppender::new(Rotation::DAILY, dir, EVENT_FILE);
    let json_layer = fmt::layer()
        .json()
        .with_writer(json_appender)
        .with_target(true)
        .with_filter(EnvFilter::new(format!("{BRIDGE_TARGET}=debug")));

    Ok(txt_layer.and_then(json_layer))
}

/// Inbound subscriber that records every host message on the traffic log.
pub struct TrafficLog;

impl InboundHandler for TrafficLog {
    fn handle_inbound(&self, msg: &BridgeMsg) {
        log_traffic("in", msg.kind(), msg.msg_type().unwrap_or_default());
    }
}

pub fn log_traffic(direction: &str, kind: &str, msg_type: &str) {
    tracing::debug!(target: BRIDGE_TARGET, direction, kind, msg_type, "bridge message");
}
