//! MJPEG byte-stream demultiplexer.
//!
//! Scans a growing buffer for a JPEG start-of-image marker (`FF D8`) followed
//! by an end-of-image marker (`FF D9`) and yields the bytes in between,
//! inclusive. Multipart boundaries and part headers are never parsed; they are
//! simply the bytes that precede the next SOI and are discarded with it.

use image::RgbImage;
use std::collections::VecDeque;

use anyhow::{Context, Result};

/// Largest single JPEG we expect from a camera.
pub const MAX_JPEG_BYTES: usize = 5 * 1024 * 1024;

/// Default cap on bytes held between scans.
pub const DEFAULT_MAX_BUFFERED: usize = MAX_JPEG_BYTES * 2;

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];

/// Scans incrementally: each pushed byte is examined about once, and complete
/// frames are queued before the buffer cap is enforced on what remains.
pub struct MjpegDemuxer {
    buffer: Vec<u8>,
    ready: VecDeque<Vec<u8>>,
    /// Offset of the SOI of the frame being assembled.
    frame_start: Option<usize>,
    /// Where the next marker search resumes.
    scan_from: usize,
    max_buffered: usize,
    overflows: u64,
}

impl MjpegDemuxer {
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_MAX_BUFFERED)
    }

    pub fn with_limit(max_buffered: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(64 * 1024),
            ready: VecDeque::new(),
            frame_start: None,
            scan_from: 0,
            max_buffered: max_buffered.max(4),
            overflows: 0,
        }
    }

    /// Append a chunk as delivered by the network.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
        self.scan();
        if self.buffer.len() > self.max_buffered {
            self.shed();
        }
    }

    /// Next complete JPEG, in stream order.
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        self.ready.pop_front()
    }

    /// Bytes buffered awaiting a complete frame.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Number of times the buffer cap forced bytes to be dropped.
    pub fn overflows(&self) -> u64 {
        self.overflows
    }

    fn scan(&mut self) {
        loop {
            match self.frame_start {
                None => match find_marker(&self.buffer, SOI, self.scan_from) {
                    Some(start) => {
                        self.frame_start = Some(start);
                        self.scan_from = start + 2;
                    }
                    None => {
                        // The final byte may be the first half of a marker.
                        self.scan_from = self.buffer.len().saturating_sub(1);
                        return;
                    }
                },
                Some(start) => match find_marker(&self.buffer, EOI, self.scan_from) {
                    Some(eoi) => {
                        let end = eoi + 2;
                        self.ready.push_back(self.buffer[start..end].to_vec());
                        self.buffer.drain(..end);
                        self.frame_start = None;
                        self.scan_from = 0;
                    }
                    None => {
                        self.scan_from = self.buffer.len().saturating_sub(1).max(start + 2);
                        return;
                    }
                },
            }
        }
    }

    /// Only called after `scan`, so the buffer holds no complete frame.
    fn shed(&mut self) {
        self.overflows += 1;
        // Keep a pending frame if one has started; drop the noise before it.
        if let Some(start) = self.frame_start {
            self.buffer.drain(..start);
            self.frame_start = Some(0);
            self.scan_from -= start;
        }
        if self.buffer.len() > self.max_buffered {
            let drain_len = self.buffer.len() - 1;
            self.buffer.drain(..drain_len);
            self.frame_start = None;
            self.scan_from = 0;
        }
        log::warn!(
            "mjpeg buffer exceeded {} bytes without a complete frame; discarded stale bytes",
            self.max_buffered
        );
    }
}

impl Default for MjpegDemuxer {
    fn default() -> Self {
        Self::new()
    }
}

fn find_marker(buffer: &[u8], marker: [u8; 2], from: usize) -> Option<usize> {
    buffer
        .get(from..)?
        .windows(2)
        .position(|pair| pair == marker)
        .map(|pos| pos + from)
}

/// Decode a JPEG payload into an RGB raster.
pub fn decode_jpeg(bytes: &[u8]) -> Result<RgbImage> {
    let image = image::load_from_memory_with_format(bytes, image::ImageFormat::Jpeg)
        .context("decode jpeg")?;
    Ok(image.into_rgb8())
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
