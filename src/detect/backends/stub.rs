use anyhow::Result;
use image::RgbImage;

use crate::detect::backend::Classifier;

/// Classifier that always returns the same score.
///
/// Used when no model is configured and in tests.
pub struct StubClassifier {
    score: f32,
}

impl StubClassifier {
    pub fn new(score: f32) -> Self {
        Self {
            score: score.clamp(0.0, 1.0),
        }
    }
}

impl Default for StubClassifier {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl Classifier for StubClassifier {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn classify(&mut self, _input: &RgbImage) -> Result<f32> {
        Ok(self.score)
    }
}
