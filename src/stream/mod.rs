//! Outbound MJPEG streams.
//!
//! Every consumer gets its own `StreamEmitter`, pulling from a shared source
//! at its own pace. Two consumers of the same source may show different frames
//! at the same instant.

pub mod emitter;
pub mod feed;
pub mod multipart;
pub mod placeholder;

pub use emitter::{EmitterCounters, EmitterSettings, Pacer, StreamEmitter};
pub use feed::{AnnotatedFeed, CameraFeed, FeedFrame, FrameFeed, RawFeed};
pub use multipart::{encode_jpeg, encode_part, BOUNDARY, CONTENT_TYPE};
pub use placeholder::{bundled_font, load_font, load_font_or_default, Placeholder};
