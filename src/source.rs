//! Shared per-source state: connection state, latest frame and counters.
//!
//! A `SourceHandle` is written by exactly one ingestion task and read by any
//! number of emitters and the detection engine.

use image::RgbImage;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::frame::{Frame, LatestFrame};

/// Connection state of a remote source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            2 => ConnectionState::Connected,
            1 => ConnectionState::Connecting,
            _ => ConnectionState::Disconnected,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        }
    }
}

/// Counters for a source.
#[derive(Clone, Debug, Serialize)]
pub struct SourceStats {
    pub name: String,
    pub state: ConnectionState,
    pub connect_attempts: u64,
    pub frames_decoded: u64,
    pub decode_failures: u64,
    pub last_frame_age_ms: Option<u64>,
}

pub struct SourceHandle {
    name: String,
    frames: LatestFrame,
    state: AtomicU8,
    connect_attempts: AtomicU64,
    decode_failures: AtomicU64,
}

impl SourceHandle {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            frames: LatestFrame::new(),
            state: AtomicU8::new(ConnectionState::Disconnected as u8),
            connect_attempts: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn publish(&self, image: RgbImage) -> u64 {
        self.frames.publish(image)
    }

    /// Latest frame regardless of connection state.
    pub fn latest(&self) -> Option<Arc<Frame>> {
        self.frames.read()
    }

    /// Latest frame, but only while the source is connected.
    pub fn live_frame(&self) -> Option<Arc<Frame>> {
        if self.is_connected() {
            self.frames.read()
        } else {
            None
        }
    }

    /// Wait up to `timeout` for a frame newer than `after`.
    pub fn wait_newer(&self, after: u64, timeout: Duration) -> Option<Arc<Frame>> {
        self.frames.wait_newer(after, timeout)
    }

    pub(crate) fn record_attempt(&self) -> u64 {
        self.connect_attempts.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> SourceStats {
        let latest = self.frames.read();
        SourceStats {
            name: self.name.clone(),
            state: self.state(),
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            frames_decoded: self.frames.published(),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            last_frame_age_ms: latest.map(|frame| frame.age().as_millis() as u64),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_frame_requires_connection() {
        let handle = SourceHandle::new("test");
        handle.publish(RgbImage::new(2, 2));
        assert!(handle.latest().is_some());
        assert!(handle.live_frame().is_none());

        handle.set_state(ConnectionState::Connected);
        assert!(handle.live_frame().is_some());
    }

    #[test]
    fn stats_track_published_frames() {
        let handle = SourceHandle::new("cam");
        handle.record_attempt();
        handle.publish(RgbImage::new(1, 1));
        handle.publish(RgbImage::new(1, 1));

        let stats = handle.stats();
        assert_eq!(stats.name, "cam");
        assert_eq!(stats.connect_attempts, 1);
        assert_eq!(stats.frames_decoded, 2);
        assert_eq!(stats.state, ConnectionState::Disconnected);
        assert!(stats.last_frame_age_ms.is_some());
    }

    #[test]
    fn state_serializes_lowercase() {
        let json = serde_json::to_string(&ConnectionState::Connecting).unwrap();
        assert_eq!(json, "\"connecting\"");
    }
}
