//! Rate-limited multipart JPEG emitter, one per consumer.
//!
//! Each tick waits until `1/fps` has passed since the previous emission
//! (short sleeps, not a precise timer), asks its feed for a frame, encodes it
//! at the configured size and quality, and wraps it as a multipart part. When
//! the feed has nothing live, the placeholder is emitted at the same size.
//!
//! The sequence is infinite. It ends when the consumer stops pulling, which
//! drops the emitter and nothing else.

use image::imageops::{self, FilterType};
use image::RgbImage;
use std::borrow::Cow;
use std::io::Write;
use std::time::{Duration, Instant};

use super::feed::FrameFeed;
use super::multipart::{encode_jpeg, encode_part};
use super::placeholder::Placeholder;

const POLL_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Clone, Debug)]
pub struct EmitterSettings {
    pub fps: f64,
    pub width: u32,
    pub height: u32,
    pub quality: u8,
}

impl EmitterSettings {
    /// Remote stream defaults: 30 fps, 800x450.
    pub fn remote() -> Self {
        Self {
            fps: 30.0,
            width: 800,
            height: 450,
            quality: 95,
        }
    }

    /// Local camera defaults: 60 fps, 1920x1080.
    pub fn camera() -> Self {
        Self {
            fps: 60.0,
            width: 1920,
            height: 1080,
            quality: 95,
        }
    }

    pub fn frame_interval(&self) -> Duration {
        if self.fps > 0.0 {
            Duration::from_secs_f64(1.0 / self.fps)
        } else {
            Duration::ZERO
        }
    }
}

impl Default for EmitterSettings {
    fn default() -> Self {
        Self::remote()
    }
}

/// Busy-wait pacing with short sleeps.
pub struct Pacer {
    interval: Duration,
    last: Option<Instant>,
}

impl Pacer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// True once `interval` has elapsed since the last tick.
    pub fn ready(&self, now: Instant) -> bool {
        match self.last {
            Some(last) => now.duration_since(last) >= self.interval,
            None => true,
        }
    }

    /// Block until the next tick is due, then start it.
    pub fn wait(&mut self) {
        while !self.ready(Instant::now()) {
            std::thread::sleep(POLL_INTERVAL);
        }
        self.last = Some(Instant::now());
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EmitterCounters {
    pub live: u64,
    pub placeholders: u64,
}

pub struct StreamEmitter<F: FrameFeed> {
    feed: F,
    settings: EmitterSettings,
    pacer: Pacer,
    placeholder: Placeholder,
    placeholder_part: Option<Vec<u8>>,
    counters: EmitterCounters,
}

impl<F: FrameFeed> StreamEmitter<F> {
    pub fn new(feed: F, settings: EmitterSettings, placeholder: Placeholder) -> Self {
        let pacer = Pacer::new(settings.frame_interval());
        Self {
            feed,
            settings,
            pacer,
            placeholder,
            placeholder_part: None,
            counters: EmitterCounters::default(),
        }
    }

    pub fn settings(&self) -> &EmitterSettings {
        &self.settings
    }

    pub fn counters(&self) -> EmitterCounters {
        self.counters
    }

    /// Wait for the next tick and produce one multipart part.
    pub fn next_part(&mut self) -> Vec<u8> {
        self.pacer.wait();
        self.render_part()
    }

    /// Write parts to `out` until the consumer goes away. Returns parts written.
    pub fn pump<W: Write>(&mut self, out: &mut W) -> u64 {
        let mut written = 0u64;
        loop {
            let part = self.next_part();
            if let Err(err) = out.write_all(&part).and_then(|_| out.flush()) {
                log::debug!(
                    "consumer of {} disconnected after {} parts: {}",
                    self.feed.describe(),
                    written,
                    err
                );
                return written;
            }
            written += 1;
        }
    }

    fn render_part(&mut self) -> Vec<u8> {
        let Some(frame) = self.feed.poll_frame() else {
            return self.placeholder_part();
        };
        let image = self.fit(frame.image());
        match encode_jpeg(&image, self.settings.quality) {
            Ok(jpeg) => {
                self.counters.live += 1;
                encode_part(&jpeg)
            }
            Err(err) => {
                log::warn!("failed to encode frame for {}: {:#}", self.feed.describe(), err);
                self.placeholder_part()
            }
        }
    }

    fn fit<'a>(&self, image: &'a RgbImage) -> Cow<'a, RgbImage> {
        if image.width() == self.settings.width && image.height() == self.settings.height {
            Cow::Borrowed(image)
        } else {
            Cow::Owned(imageops::resize(
                image,
                self.settings.width,
                self.settings.height,
                FilterType::Triangle,
            ))
        }
    }

    fn placeholder_part(&mut self) -> Vec<u8> {
        self.counters.placeholders += 1;
        if let Some(part) = &self.placeholder_part {
            return part.clone();
        }
        let image = self
            .placeholder
            .render(self.settings.width, self.settings.height);
        match encode_jpeg(&image, self.settings.quality) {
            Ok(jpeg) => {
                let part = encode_part(&jpeg);
                self.placeholder_part = Some(part.clone());
                part
            }
            Err(err) => {
                log::error!("failed to encode placeholder: {:#}", err);
                encode_part(&[])
            }
        }
    }
}

impl<F: FrameFeed> Iterator for StreamEmitter<F> {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Vec<u8>> {
        Some(self.next_part())
    }
}
