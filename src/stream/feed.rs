//! Frame feeds consumed by stream emitters.

use image::RgbImage;
use std::sync::Arc;

use crate::camera::CameraManager;
use crate::detect::DetectionEngine;
use crate::frame::Frame;
use crate::source::SourceHandle;

/// A frame handed to an emitter, shared with the cache or owned.
pub enum FeedFrame {
    Shared(Arc<Frame>),
    Owned(RgbImage),
}

impl FeedFrame {
    pub fn image(&self) -> &RgbImage {
        match self {
            FeedFrame::Shared(frame) => frame.image(),
            FeedFrame::Owned(image) => image,
        }
    }
}

/// Supplies the frame to show at each emitter tick.
pub trait FrameFeed: Send {
    fn describe(&self) -> String;

    /// Frame to emit now, or `None` when nothing live is available.
    fn poll_frame(&mut self) -> Option<FeedFrame>;
}

/// Latest remote frame as-is.
pub struct RawFeed {
    source: Arc<SourceHandle>,
}

impl RawFeed {
    pub fn new(source: Arc<SourceHandle>) -> Self {
        Self { source }
    }
}

impl FrameFeed for RawFeed {
    fn describe(&self) -> String {
        format!("raw:{}", self.source.name())
    }

    fn poll_frame(&mut self) -> Option<FeedFrame> {
        self.source.live_frame().map(FeedFrame::Shared)
    }
}

/// Latest remote frame run through the detection engine.
pub struct AnnotatedFeed {
    source: Arc<SourceHandle>,
    engine: Arc<DetectionEngine>,
}

impl AnnotatedFeed {
    pub fn new(source: Arc<SourceHandle>, engine: Arc<DetectionEngine>) -> Self {
        Self { source, engine }
    }
}

impl FrameFeed for AnnotatedFeed {
    fn describe(&self) -> String {
        format!("detection:{}", self.source.name())
    }

    fn poll_frame(&mut self) -> Option<FeedFrame> {
        let frame = self.source.live_frame()?;
        let analysis = self.engine.analyze(frame.image());
        Some(FeedFrame::Owned(analysis.visualization))
    }
}

/// Frames captured from one local camera slot.
pub struct CameraFeed {
    cameras: Arc<CameraManager>,
    id: usize,
}

impl CameraFeed {
    pub fn new(cameras: Arc<CameraManager>, id: usize) -> Self {
        Self { cameras, id }
    }
}

impl FrameFeed for CameraFeed {
    fn describe(&self) -> String {
        format!("camera:{}", self.id)
    }

    fn poll_frame(&mut self) -> Option<FeedFrame> {
        self.cameras.try_capture(self.id).map(FeedFrame::Owned)
    }
}
