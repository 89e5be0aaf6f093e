mod backend;
mod backends;
pub mod contours;
mod engine;
mod result;

pub use backend::{Classifier, InputLayout};
pub use backends::StubClassifier;
#[cfg(feature = "backend-tract")]
pub use backends::TractClassifier;
pub use contours::{CannyContours, Contour, ContourExtractor, CrackMetrics};
pub use engine::{Analysis, DetectionEngine, DetectionSettings};
pub use result::{DetectionStats, StatsReport};
