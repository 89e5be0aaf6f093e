//! crackstream: MJPEG relay with crack detection.
//!
//! Pulls a remote MJPEG stream over HTTP, keeps the latest decoded frame,
//! runs a crack classifier with contour analysis on demand, and re-serves
//! raw, annotated and local-camera frames as `multipart/x-mixed-replace`
//! JPEG sequences at a fixed rate.
//!
//! # Module Structure
//!
//! - `ingest`: HTTP connector, JPEG demultiplexer and the reconnecting supervisor
//! - `frame` / `source`: latest-frame cache and per-source connection state
//! - `detect`: classifier backends, contour metrics and the detection engine
//! - `stream`: per-consumer emitters, placeholders and multipart framing
//! - `camera`: local capture slots with lazy (re)initialisation
//! - `config`: file + environment configuration
//!
//! Every concurrent component runs on its own thread and shares state only
//! through `Arc`-owned handles; a failure in one never stops another.

pub mod camera;
pub mod config;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod shutdown;
pub mod source;
pub mod stream;

pub use camera::{CameraManager, CameraSettings};
pub use config::RelayConfig;
pub use detect::{DetectionEngine, DetectionSettings, DetectionStats, StatsReport};
pub use frame::{Frame, LatestFrame};
pub use ingest::{HttpMjpegConnector, IngestSupervisor, MjpegDemuxer, SupervisorConfig};
pub use shutdown::ShutdownSignal;
pub use source::{ConnectionState, SourceHandle, SourceStats};
pub use stream::{EmitterSettings, Placeholder, StreamEmitter};
