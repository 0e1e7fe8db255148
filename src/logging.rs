//! Tracing setup: console output plus the optional OSC traffic file

use anyhow::{Context, Result};
use std::path::Path;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::{EnvFilter, Targets};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use crate::osc::TRAFFIC_TARGET;

pub const OSC_LOG_FILE: &str = "osc-events.log";

/// Console filter: `RUST_LOG` wins, else `level`; traffic never reaches the console
fn console_filter(level: &str) -> Result<EnvFilter> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("Invalid log level '{}'", level))?;
    let quiet = format!("{}=off", TRAFFIC_TARGET)
        .parse()
        .context("Invalid traffic directive")?;
    Ok(filter.add_directive(quiet))
}

/// Install the global subscriber
///
/// With `osc_log_dir` set, every SEND/RECEIVE line goes to a daily-rolling
/// `osc-events.log` there. Keep the returned guard alive until exit or the
/// tail of the file is lost.
pub fn init_logging(level: &str, osc_log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let console = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_filter(console_filter(level)?);

    let Some(dir) = osc_log_dir else {
        tracing_subscriber::registry().with(console).init();
        return Ok(None);
    };

    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
    let appender = tracing_appender::rolling::daily(dir, OSC_LOG_FILE);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let traffic = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(false)
        .with_level(false)
        .with_filter(Targets::new().with_target(TRAFFIC_TARGET, LevelFilter::DEBUG));

    tracing_subscriber::registry()
        .with(console)
        .with(traffic)
        .init();

    Ok(Some(guard))
}
