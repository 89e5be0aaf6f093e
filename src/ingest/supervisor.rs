//! Ingestion supervisor for remote MJPEG sources.
//!
//! One supervisor owns one `SourceHandle` and is its only writer. It cycles
//! through `Disconnected -> Connecting -> Connected -> Disconnected` for the
//! lifetime of the process:
//!
//! 1. Connect through a `StreamConnector` (HTTP in production).
//! 2. Read chunks, feed the demultiplexer, decode and publish every frame.
//! 3. On any connect, read or decode failure (or a clean end of stream),
//!    mark the source disconnected, wait the retry interval, and go again.
//!
//! Failures never escape the loop. They are reported through the `log`
//! facade and the source counters.

use anyhow::{Context, Result};
use std::io::Read;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use super::mjpeg::{decode_jpeg, MjpegDemuxer, DEFAULT_MAX_BUFFERED};
use crate::shutdown::ShutdownSignal;
use crate::source::{ConnectionState, SourceHandle};

const READ_CHUNK_BYTES: usize = 8192;

/// Opens a byte stream carrying concatenated JPEGs.
pub trait StreamConnector: Send {
    /// Human-readable source identifier for logs.
    fn describe(&self) -> String;

    /// Open a new stream. Called once per connection attempt.
    fn connect(&mut self) -> Result<Box<dyn Read + Send>>;
}

/// Fixed-interval retry schedule.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    interval: Duration,
    consecutive_failures: u32,
}

impl RetryPolicy {
    pub fn fixed(interval: Duration) -> Self {
        Self {
            interval,
            consecutive_failures: 0,
        }
    }

    /// Record a failed or ended session and return the delay before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.interval
    }

    /// Record a session that delivered at least one frame.
    pub fn reset(&mut self) {
        self.consecutive_failures = 0;
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}

#[derive(Clone, Debug)]
pub struct SupervisorConfig {
    pub retry_interval: Duration,
    pub max_buffered_bytes: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_secs(5),
            max_buffered_bytes: DEFAULT_MAX_BUFFERED,
        }
    }
}

/// How a connected session came to an end.
enum SessionEnd {
    StreamClosed { frames: u64 },
    Shutdown,
}

pub struct IngestSupervisor<C: StreamConnector> {
    connector: C,
    handle: Arc<SourceHandle>,
    config: SupervisorConfig,
    retry: RetryPolicy,
    shutdown: ShutdownSignal,
}

impl<C: StreamConnector + 'static> IngestSupervisor<C> {
    pub fn new(connector: C, handle: Arc<SourceHandle>, config: SupervisorConfig) -> Self {
        let retry = RetryPolicy::fixed(config.retry_interval);
        Self {
            connector,
            handle,
            config,
            retry,
            shutdown: ShutdownSignal::new(),
        }
    }

    pub fn with_shutdown(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Run the supervisor on its own named thread.
    pub fn spawn(self) -> Result<JoinHandle<()>> {
        let name = format!("ingest-{}", self.handle.name());
        std::thread::Builder::new()
            .name(name)
            .spawn(move || self.run())
            .context("spawn ingestion thread")
    }

    /// Connect/retry loop. Returns only once the shutdown signal fires.
    pub fn run(mut self) {
        let source = self.connector.describe();
        loop {
            if self.shutdown.is_triggered() {
                break;
            }

            self.handle.set_state(ConnectionState::Connecting);
            let attempt = self.handle.record_attempt();
            log::info!("attempting to connect to stream {} (attempt {})", source, attempt);

            match self.run_session() {
                Ok(SessionEnd::Shutdown) => break,
                Ok(SessionEnd::StreamClosed { frames }) => {
                    if frames > 0 {
                        self.retry.reset();
                    }
                    log::warn!("stream {} ended after {} frames", source, frames);
                }
                Err(err) => {
                    log::error!("stream connection error on {}: {:#}", source, err);
                }
            }

            self.handle.set_state(ConnectionState::Disconnected);
            let delay = self.retry.next_delay();
            log::info!(
                "retrying {} in {:?} ({} consecutive failures)",
                source,
                delay,
                self.retry.consecutive_failures()
            );
            if self.shutdown.wait_timeout(delay) {
                break;
            }
        }
        self.handle.set_state(ConnectionState::Disconnected);
        log::info!("ingestion for {} stopped", source);
    }

    fn run_session(&mut self) -> Result<SessionEnd> {
        let mut reader = self.connector.connect()?;
        self.handle.set_state(ConnectionState::Connected);
        log::info!("connected to stream {}", self.connector.describe());

        let mut demux = MjpegDemuxer::with_limit(self.config.max_buffered_bytes);
        let mut chunk = vec![0u8; READ_CHUNK_BYTES];
        let mut frames = 0u64;
        loop {
            if self.shutdown.is_triggered() {
                return Ok(SessionEnd::Shutdown);
            }
            let read = reader.read(&mut chunk).context("read mjpeg chunk")?;
            if read == 0 {
                return Ok(SessionEnd::StreamClosed { frames });
            }
            demux.push(&chunk[..read]);
            while let Some(jpeg) = demux.next_frame() {
                let image = decode_jpeg(&jpeg).map_err(|err| {
                    self.handle.record_decode_failure();
                    err.context("failed to decode frame")
                })?;
                self.handle.publish(image);
                frames += 1;
                if frames == 1 {
                    self.retry.reset();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_policy_is_fixed_interval() {
        let mut policy = RetryPolicy::fixed(Duration::from_secs(5));
        assert_eq!(policy.next_delay(), Duration::from_secs(5));
        assert_eq!(policy.next_delay(), Duration::from_secs(5));
        assert_eq!(policy.consecutive_failures(), 2);
        policy.reset();
        assert_eq!(policy.consecutive_failures(), 0);
    }
}
