//! stream_dump - write an MJPEG relay stream to a file or stdout.
//!
//! Produces the exact `multipart/x-mixed-replace` body a consumer would
//! receive, for a fixed number of parts.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crackstream::stream::{
    load_font_or_default, AnnotatedFeed, CameraFeed, FrameFeed, RawFeed, CONTENT_TYPE,
};
use crackstream::{
    CameraManager, EmitterSettings, HttpMjpegConnector, IngestSupervisor, Placeholder, RelayConfig,
    ShutdownSignal, SourceHandle, StreamEmitter,
};

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum FeedKind {
    /// Remote frames as received.
    Raw,
    /// Remote frames with detected contours drawn.
    Annotated,
    /// A local camera slot.
    Camera,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Dump a crackstream MJPEG stream")]
struct Args {
    /// Config file (JSON, or TOML with a .toml extension).
    #[arg(long, env = "CRACKSTREAM_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "raw")]
    feed: FeedKind,

    /// Camera slot for --feed camera.
    #[arg(long, default_value = "0")]
    camera: usize,

    /// Number of multipart parts to write.
    #[arg(long, default_value = "30")]
    frames: usize,

    /// Output path, or "-" for stdout.
    #[arg(long, default_value = "-")]
    out: String,

    /// Seconds to wait for the first remote frame before emitting.
    #[arg(long, default_value = "5")]
    wait_secs: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let cfg = RelayConfig::load_from(args.config.as_deref())?;
    let font = load_font_or_default(cfg.placeholder_font.as_deref());

    let mut out: Box<dyn Write> = if args.out == "-" {
        Box::new(io::stdout().lock())
    } else {
        Box::new(
            std::fs::File::create(&args.out)
                .with_context(|| format!("create output file {}", args.out))?,
        )
    };

    if args.feed == FeedKind::Camera {
        let cameras = Arc::new(CameraManager::with_system_devices(cfg.cameras.clone()));
        let placeholder = Placeholder::camera_not_available().with_font(font);
        let feed = CameraFeed::new(cameras.clone(), args.camera);
        let written = dump(feed, cfg.camera_output.clone(), placeholder, args.frames, &mut out)?;
        cameras.shutdown();
        log::info!("wrote {} parts ({})", written, CONTENT_TYPE);
        return Ok(());
    }

    let shutdown = ShutdownSignal::new();
    let source = SourceHandle::new("remote");
    let connector = HttpMjpegConnector::new(&cfg.stream.url, cfg.stream.connect_timeout)?;
    let ingest = IngestSupervisor::new(connector, source.clone(), cfg.stream.supervisor())
        .with_shutdown(shutdown.clone())
        .spawn()?;

    if source
        .wait_newer(0, Duration::from_secs(args.wait_secs))
        .is_none()
    {
        log::warn!("no frame from {} yet, emitting placeholders", cfg.stream.url);
    }

    let placeholder = Placeholder::waiting_for_stream().with_font(font);
    let written = match args.feed {
        FeedKind::Annotated => {
            let engine = Arc::new(cfg.detector.engine()?);
            let feed = AnnotatedFeed::new(source.clone(), engine);
            dump(feed, cfg.output.clone(), placeholder, args.frames, &mut out)?
        }
        _ => {
            let feed = RawFeed::new(source.clone());
            dump(feed, cfg.output.clone(), placeholder, args.frames, &mut out)?
        }
    };
    log::info!("wrote {} parts ({})", written, CONTENT_TYPE);

    shutdown.trigger();
    if ingest.join().is_err() {
        log::error!("ingestion thread panicked");
    }
    Ok(())
}

fn dump<F: FrameFeed>(
    feed: F,
    settings: EmitterSettings,
    placeholder: Placeholder,
    frames: usize,
    out: &mut dyn Write,
) -> Result<usize> {
    let emitter = StreamEmitter::new(feed, settings, placeholder);
    let mut written = 0;
    for part in emitter.take(frames) {
        out.write_all(&part).context("write stream part")?;
        written += 1;
    }
    out.flush().context("flush output")?;
    Ok(written)
}
