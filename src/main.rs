//! Live Monitor GW
//!
//! Tracks Ableton Live looper and clip state over AbletonOSC and feeds live indicators.

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use live_monitor_gw::cli;
use live_monitor_gw::config::{parse_looper_id, AppConfig, ClipSelection};
use live_monitor_gw::logging::init_logging;
use live_monitor_gw::model::{LooperInfo, MonitoredItem};
use live_monitor_gw::osc::{Transport, UdpTransport};
use live_monitor_gw::paths::AppPaths;
use live_monitor_gw::session::Session;
use live_monitor_gw::visual::{ConsoleConsumer, JsonLinesConsumer, VisualConsumer};

/// Live Monitor GW - looper and clip state from Ableton Live
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (defaults to the app config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL")]
    log_level: Option<String>,

    /// Live host running AbletonOSC
    #[arg(long, env = "LIVE_OSC_HOST")]
    host: Option<String>,

    /// Port AbletonOSC listens on
    #[arg(long)]
    send_port: Option<u16>,

    /// Local port replies arrive on
    #[arg(long)]
    receive_port: Option<u16>,

    /// Ping Live and exit
    #[arg(long)]
    test: bool,

    /// List every Looper device and exit
    #[arg(long)]
    find_loopers: bool,

    /// List tracks and the scene count, then exit
    #[arg(long)]
    list_tracks: bool,

    /// Monitor a looper, TRACK-DEVICE (repeatable)
    #[arg(long, value_name = "T-D", value_parser = parse_looper_arg)]
    watch_looper: Vec<(i32, i32)>,

    /// Monitor a clip slot, TRACK:SCENE (repeatable)
    #[arg(long, value_name = "T:S", value_parser = parse_clip_arg)]
    watch_clip: Vec<ClipSelection>,

    /// Print state changes as JSON lines instead of colored text
    #[arg(long)]
    json: bool,

    /// Write a default configuration file and exit
    #[arg(long)]
    init_config: bool,
}

fn parse_looper_arg(value: &str) -> Result<(i32, i32), String> {
    parse_looper_id(value)
        .filter(|(t, d)| *t >= 0 && *d >= 0)
        .ok_or_else(|| format!("expected TRACK-DEVICE, got '{}'", value))
}

fn parse_clip_arg(value: &str) -> Result<ClipSelection, String> {
    let parsed = value
        .split_once(':')
        .and_then(|(t, s)| Some((t.trim().parse::<i32>().ok()?, s.trim().parse::<i32>().ok()?)));
    match parsed {
        Some((track, scene)) if track >= 0 && scene >= 0 => Ok(ClipSelection { track, scene }),
        _ => Err(format!("expected TRACK:SCENE, got '{}'", value)),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let paths = AppPaths::detect();
    let config_path = args.config.clone().unwrap_or_else(|| paths.config.clone());
    let config_path_str = config_path.to_string_lossy().to_string();

    if args.init_config {
        AppConfig::default().save(&config_path_str).await?;
        println!("Wrote default configuration to {}", config_path.display());
        return Ok(());
    }

    let mut config = AppConfig::load_or_default(&config_path_str)
        .await
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    apply_overrides(&mut config, &args);
    config.validate()?;

    let osc_log_dir = match (config.logging.osc_log, &config.logging.log_dir) {
        (false, _) => None,
        (true, Some(dir)) => Some(PathBuf::from(dir)),
        (true, None) => {
            paths.ensure_directories()?;
            Some(paths.logs_dir.clone())
        }
    };
    let _log_guard = init_logging(&config.logging.level, osc_log_dir.as_deref())?;

    info!("Starting Live Monitor GW v{}...", env!("CARGO_PKG_VERSION"));
    info!(
        "Configuration file: {} ({} mode)",
        config_path.display(),
        if paths.is_dev { "dev" } else { "installed" }
    );

    let transport: Arc<dyn Transport> = Arc::new(UdpTransport::new());
    let session = Session::new(transport, config);
    session.connect().await?;

    let result = run(&session, &args).await;

    session.shutdown().await;
    info!("Live Monitor GW shutdown complete");
    result
}

fn apply_overrides(config: &mut AppConfig, args: &Args) {
    if let Some(host) = &args.host {
        config.osc.host = host.clone();
    }
    if let Some(port) = args.send_port {
        config.osc.send_port = port;
    }
    if let Some(port) = args.receive_port {
        config.osc.receive_port = port;
    }
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
}

async fn run(session: &Session, args: &Args) -> Result<()> {
    if args.test {
        if session.test_connection().await {
            println!("{}", "✅ Live is reachable".green());
            return Ok(());
        }
        anyhow::bail!("Live did not answer the connection test");
    }

    if args.find_loopers {
        let loopers = session.find_loopers().await?;
        println!("\n{} ({})", "Looper devices".bold(), loopers.len());
        for looper in &loopers {
            println!("  {:<8} {}", looper.id.yellow(), looper.display_name());
        }
        return Ok(());
    }

    if args.list_tracks {
        let tracks = session.track_list().await?;
        println!("\n{} ({})", "Tracks".bold(), tracks.len());
        for track in &tracks {
            println!("  {:>3}  {}", track.index, track.name);
        }
        println!("  {} scenes", session.num_scenes().await);
        return Ok(());
    }

    let factory = |item: &MonitoredItem| -> Arc<dyn VisualConsumer> {
        if args.json {
            JsonLinesConsumer::for_item(item)
        } else {
            ConsoleConsumer::for_item(item)
        }
    };

    let watching = !args.watch_looper.is_empty() || !args.watch_clip.is_empty();
    if !watching {
        return cli::run_repl(session, &factory).await;
    }

    let started = watch(session, args, &factory).await?;
    if started == 0 {
        anyhow::bail!("Nothing could be monitored");
    }
    info!("👀 Watching {} item(s), Ctrl-C to stop", started);
    shutdown_signal().await;
    Ok(())
}

/// Start every item from the command line and the config `monitor` section
async fn watch(
    session: &Session,
    args: &Args,
    factory: &dyn Fn(&MonitoredItem) -> Arc<dyn VisualConsumer>,
) -> Result<usize> {
    let monitor = &session.config().monitor;

    let mut loopers: Vec<LooperInfo> = Vec::new();
    if monitor.discover_loopers {
        match session.find_loopers().await {
            Ok(found) => loopers.extend(found),
            Err(e) => warn!("Looper discovery failed: {}", e),
        }
    }
    let configured = monitor.loopers.iter().filter_map(|id| parse_looper_id(id));
    for (track, device) in args.watch_looper.iter().copied().chain(configured) {
        if loopers.iter().any(|l| l.track_index == track && l.device_index == device) {
            continue;
        }
        loopers.push(session.looper_info(track, device).await);
    }

    let mut selections = args.watch_clip.clone();
    for selection in &monitor.clips {
        if !selections.contains(selection) {
            selections.push(*selection);
        }
    }
    let mut clips = Vec::with_capacity(selections.len());
    for selection in selections {
        clips.push(session.clip_info(selection.track, selection.scene).await);
    }

    let mut started = 0;
    if !loopers.is_empty() {
        started += session.monitor_loopers(&loopers, factory).await;
    }
    if !clips.is_empty() {
        started += session.monitor_clips(&clips, factory).await;
    }
    Ok(started)
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C signal handler");
    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watch_arguments() {
        assert_eq!(parse_looper_arg("3-1"), Ok((3, 1)));
        assert!(parse_looper_arg("3").is_err());
        assert_eq!(parse_clip_arg("0:2"), Ok(ClipSelection { track: 0, scene: 2 }));
        assert!(parse_clip_arg("0-2").is_err());
        assert!(parse_clip_arg("-1:2").is_err());
    }

    #[test]
    fn test_flags_override_config() {
        let args = Args::parse_from([
            "live-monitor-gw",
            "--host",
            "studio.local",
            "--send-port",
            "9000",
            "--watch-looper",
            "0-1",
            "--watch-looper",
            "2-0",
            "--watch-clip",
            "1:3",
        ]);
        let mut config = AppConfig::default();
        apply_overrides(&mut config, &args);

        assert_eq!(config.osc.host, "studio.local");
        assert_eq!(config.osc.send_port, 9000);
        assert_eq!(config.osc.receive_port, 11001);
        assert_eq!(args.watch_looper, vec![(0, 1), (2, 0)]);
        assert_eq!(args.watch_clip, vec![ClipSelection { track: 1, scene: 3 }]);
    }
}
