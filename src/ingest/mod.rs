//! Remote frame ingestion.
//!
//! - `mjpeg`: SOI/EOI demultiplexer and JPEG decode
//! - `http`: streaming HTTP connector (ureq)
//! - `supervisor`: connect/demux/decode/publish loop with fixed-interval retry
//!
//! The supervisor is the sole writer of its source's latest-frame cache.
//! Everything downstream (emitters, detection) only reads.

pub mod http;
pub mod mjpeg;
pub mod supervisor;

pub use http::HttpMjpegConnector;
pub use mjpeg::{decode_jpeg, MjpegDemuxer};
pub use supervisor::{IngestSupervisor, RetryPolicy, StreamConnector, SupervisorConfig};
