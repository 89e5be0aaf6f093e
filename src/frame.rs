//! Decoded frames and the single-slot latest-frame cache.
//!
//! - `Frame`: an immutable decoded RGB raster tagged with its arrival sequence.
//! - `LatestFrame`: overwrite-on-write slot shared between one producer and any
//!   number of readers.
//!
//! Frames are published behind an `Arc`, so a reader holds either the previous
//! frame or the new one in full. There is no way to observe a half-written
//! raster: the pixel buffer is built before the pointer swap and never mutated
//! afterwards.

use image::RgbImage;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

/// A decoded frame. Capture time is implied by `sequence` (arrival order).
#[derive(Debug)]
pub struct Frame {
    image: RgbImage,
    sequence: u64,
    published_at: Instant,
}

impl Frame {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Monotonic arrival index, starting at 1 for the first published frame.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn age(&self) -> Duration {
        self.published_at.elapsed()
    }
}

// ----------------------------------------------------------------------------
// LatestFrame: single-slot cache
// ----------------------------------------------------------------------------

#[derive(Default)]
struct Slot {
    frame: Option<Arc<Frame>>,
    published: u64,
}

/// Latest-frame-wins cache.
///
/// `publish` replaces the slot unconditionally; `read` clones the `Arc` of
/// whatever is current. Readers never block the writer for longer than a
/// pointer copy.
#[derive(Default)]
pub struct LatestFrame {
    slot: Mutex<Slot>,
    fresh: Condvar,
}

impl LatestFrame {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        // The slot only holds an Arc and a counter; a panic elsewhere cannot
        // leave it half-updated.
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Publish a new frame and return its sequence number.
    pub fn publish(&self, image: RgbImage) -> u64 {
        let mut slot = self.lock();
        slot.published += 1;
        let sequence = slot.published;
        slot.frame = Some(Arc::new(Frame {
            image,
            sequence,
            published_at: Instant::now(),
        }));
        drop(slot);
        self.fresh.notify_all();
        sequence
    }

    /// Most recent frame, or `None` if nothing was ever published.
    pub fn read(&self) -> Option<Arc<Frame>> {
        self.lock().frame.clone()
    }

    /// Wait up to `timeout` for a frame newer than `after`.
    ///
    /// Returns the current frame (possibly not newer) when the timeout elapses.
    pub fn wait_newer(&self, after: u64, timeout: Duration) -> Option<Arc<Frame>> {
        let slot = self.lock();
        let (slot, _) = self
            .fresh
            .wait_timeout_while(slot, timeout, |slot| slot.published <= after)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        slot.frame.clone()
    }

    /// Number of frames published so far.
    pub fn published(&self) -> u64 {
        self.lock().published
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn empty_cache_reads_none() {
        let cache = LatestFrame::new();
        assert!(cache.read().is_none());
        assert_eq!(cache.published(), 0);
    }

    #[test]
    fn publish_overwrites_previous_frame() {
        let cache = LatestFrame::new();
        cache.publish(RgbImage::from_pixel(4, 4, Rgb([1, 1, 1])));
        let seq = cache.publish(RgbImage::from_pixel(8, 2, Rgb([2, 2, 2])));

        let frame = cache.read().expect("frame");
        assert_eq!(seq, 2);
        assert_eq!(frame.sequence(), 2);
        assert_eq!((frame.width(), frame.height()), (8, 2));
        assert_eq!(frame.image().get_pixel(0, 0), &Rgb([2, 2, 2]));
    }

    #[test]
    fn readers_keep_their_frame_after_overwrite() {
        let cache = LatestFrame::new();
        cache.publish(RgbImage::from_pixel(2, 2, Rgb([10, 0, 0])));
        let held = cache.read().expect("frame");
        cache.publish(RgbImage::from_pixel(2, 2, Rgb([20, 0, 0])));

        assert_eq!(held.image().get_pixel(1, 1), &Rgb([10, 0, 0]));
        assert_eq!(cache.read().expect("frame").sequence(), 2);
    }

    #[test]
    fn wait_newer_times_out_with_current_frame() {
        let cache = LatestFrame::new();
        cache.publish(RgbImage::new(1, 1));
        let frame = cache
            .wait_newer(1, Duration::from_millis(10))
            .expect("frame");
        assert_eq!(frame.sequence(), 1);
    }

    #[test]
    fn wait_newer_wakes_on_publish() {
        let cache = Arc::new(LatestFrame::new());
        let writer = {
            let cache = cache.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                cache.publish(RgbImage::new(3, 3));
            })
        };
        let frame = cache.wait_newer(0, Duration::from_secs(5));
        writer.join().unwrap();
        assert_eq!(frame.expect("frame").sequence(), 1);
    }
}
