//! relayd - crackstream relay daemon
//!
//! This daemon:
//! 1. Keeps a supervised connection to the remote MJPEG stream
//! 2. Initialises the local cameras
//! 3. Runs crack detection on the newest remote frame at a fixed interval
//! 4. Logs the stats report, ingestion counters and camera health until Ctrl-C

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crackstream::{
    CameraManager, HttpMjpegConnector, IngestSupervisor, RelayConfig, ShutdownSignal, SourceHandle,
};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Relay a remote MJPEG stream and report crack detection statistics"
)]
struct Args {
    /// Config file (JSON, or TOML with a .toml extension).
    #[arg(long, env = "CRACKSTREAM_CONFIG")]
    config: Option<PathBuf>,

    /// Remote stream URL, overriding the config.
    #[arg(long)]
    url: Option<String>,

    /// Milliseconds between detection passes.
    #[arg(long, env = "CRACKSTREAM_ANALYZE_INTERVAL_MS", default_value = "500")]
    analyze_interval_ms: u64,

    /// Seconds between ingestion counter reports.
    #[arg(long, default_value = "30")]
    report_interval_secs: u64,

    /// Do not open local cameras.
    #[arg(long)]
    no_cameras: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = RelayConfig::load_from(args.config.as_deref())?;
    if let Some(url) = args.url {
        cfg.stream.url = url;
        cfg.validate()?;
    }

    let shutdown = ShutdownSignal::new();
    let handler_signal = shutdown.clone();
    ctrlc::set_handler(move || handler_signal.trigger()).expect("error setting Ctrl-C handler");

    let source = SourceHandle::new("remote");
    let connector = HttpMjpegConnector::new(&cfg.stream.url, cfg.stream.connect_timeout)?;
    let ingest = IngestSupervisor::new(connector, source.clone(), cfg.stream.supervisor())
        .with_shutdown(shutdown.clone())
        .spawn()?;

    let engine = cfg.detector.engine()?;
    if let Err(err) = engine.warm_up() {
        log::warn!("classifier warm-up failed: {:#}", err);
    }

    let cameras = if args.no_cameras {
        None
    } else {
        let cameras = CameraManager::with_system_devices(cfg.cameras.clone());
        let running = cameras.initialize_all();
        log::info!("{} of {} cameras running", running, cameras.camera_count());
        Some(cameras)
    };

    log::info!("relayd running for {}; Ctrl-C to stop", cfg.stream.url);
    let analyze_interval = Duration::from_millis(args.analyze_interval_ms.max(1));
    let report_interval = Duration::from_secs(args.report_interval_secs.max(1));
    let mut last_sequence = 0u64;
    let mut last_report = Instant::now();

    while !shutdown.wait_timeout(analyze_interval) {
        if let Some(frame) = source.live_frame() {
            if frame.sequence() != last_sequence {
                last_sequence = frame.sequence();
                engine.analyze(frame.image());
                let report = engine.report(source.state());
                log::info!("stats {}", serde_json::to_string(&report)?);
            }
        }

        if last_report.elapsed() >= report_interval {
            last_report = Instant::now();
            let (analyzed, failures) = engine.counters();
            log::info!(
                "source {} analyzed={} analysis_failures={}",
                serde_json::to_string(&source.stats())?,
                analyzed,
                failures
            );
            if let Some(cameras) = &cameras {
                // One capture per slot keeps failed devices on the reopen path.
                for id in 0..cameras.camera_count() {
                    cameras.try_capture(id);
                }
                log::info!("cameras {}", serde_json::to_string(&cameras.status())?);
            }
        }
    }

    log::info!("shutdown signal received, stopping relay...");
    if ingest.join().is_err() {
        log::error!("ingestion thread panicked");
    }
    if let Some(cameras) = &cameras {
        cameras.shutdown();
    }
    Ok(())
}
