//! Detection engine: classifier inference plus conditional contour metrics.
//!
//! `analyze` never fails. If any step errors, the error is logged, the
//! previous statistics are kept, and the caller gets the frame back without
//! annotation.

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};

use super::backend::Classifier;
use super::contours::{draw_contours, CannyContours, ContourExtractor, CrackMetrics};
use super::result::{DetectionStats, StatsReport};
use crate::source::ConnectionState;

#[derive(Clone, Debug)]
pub struct DetectionSettings {
    /// Classifier input width.
    pub input_width: u32,
    /// Classifier input height.
    pub input_height: u32,
    /// Scores strictly above this run contour analysis.
    pub threshold: f32,
    pub contour_color: Rgb<u8>,
    pub contour_thickness: u32,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            input_width: 128,
            input_height: 128,
            threshold: 0.5,
            contour_color: Rgb([255, 0, 0]),
            contour_thickness: 2,
        }
    }
}

/// Outcome of analysing one frame.
#[derive(Clone, Debug)]
pub struct Analysis {
    pub stats: DetectionStats,
    /// Frame with contours drawn, or the untouched frame on failure / no crack.
    pub visualization: RgbImage,
    /// False when analysis failed and `stats` are the previous values.
    pub fresh: bool,
}

pub struct DetectionEngine {
    classifier: Mutex<Box<dyn Classifier>>,
    extractor: Box<dyn ContourExtractor>,
    settings: DetectionSettings,
    stats: RwLock<DetectionStats>,
    analyzed: AtomicU64,
    failures: AtomicU64,
}

impl DetectionEngine {
    pub fn new<C: Classifier + 'static>(classifier: C, settings: DetectionSettings) -> Self {
        Self {
            classifier: Mutex::new(Box::new(classifier)),
            extractor: Box::new(CannyContours::default()),
            settings,
            stats: RwLock::new(DetectionStats::default()),
            analyzed: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    /// Replace the contour extractor.
    pub fn with_extractor<E: ContourExtractor + 'static>(mut self, extractor: E) -> Self {
        self.extractor = Box::new(extractor);
        self
    }

    pub fn settings(&self) -> &DetectionSettings {
        &self.settings
    }

    /// Analyse a frame, updating the shared statistics on success.
    pub fn analyze(&self, frame: &RgbImage) -> Analysis {
        match self.try_analyze(frame) {
            Ok(analysis) => {
                self.analyzed.fetch_add(1, Ordering::Relaxed);
                analysis
            }
            Err(err) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                log::error!("error in crack detection: {:#}", err);
                Analysis {
                    stats: self.stats(),
                    visualization: frame.clone(),
                    fresh: false,
                }
            }
        }
    }

    fn try_analyze(&self, frame: &RgbImage) -> Result<Analysis> {
        if frame.width() == 0 || frame.height() == 0 {
            return Err(anyhow!("cannot analyse an empty frame"));
        }
        let input = imageops::resize(
            frame,
            self.settings.input_width,
            self.settings.input_height,
            FilterType::Triangle,
        );
        let score = {
            let mut classifier = self
                .classifier
                .lock()
                .map_err(|_| anyhow!("classifier lock poisoned"))?;
            classifier.classify(&input).context("classifier inference")?
        };
        if !score.is_finite() {
            return Err(anyhow!("classifier returned non-finite score {}", score));
        }
        let score = score.clamp(0.0, 1.0);

        let mut visualization = frame.clone();
        let stats = if score > self.settings.threshold {
            let contours = self.extractor.extract(frame);
            draw_contours(
                &mut visualization,
                &contours,
                self.settings.contour_color,
                self.settings.contour_thickness,
            );
            DetectionStats::detected(score, CrackMetrics::from_contours(&contours))
        } else {
            DetectionStats::clear(score)
        };

        *self
            .stats
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = stats.clone();

        Ok(Analysis {
            stats,
            visualization,
            fresh: true,
        })
    }

    /// Most recent statistics.
    pub fn stats(&self) -> DetectionStats {
        self.stats
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Stats payload for the given connection state.
    pub fn report(&self, state: ConnectionState) -> StatsReport {
        self.stats().report(state)
    }

    /// Frames analysed successfully and analysis failures so far.
    pub fn counters(&self) -> (u64, u64) {
        (
            self.analyzed.load(Ordering::Relaxed),
            self.failures.load(Ordering::Relaxed),
        )
    }

    /// Run the classifier's warm-up hook.
    pub fn warm_up(&self) -> Result<()> {
        let mut classifier = self
            .classifier
            .lock()
            .map_err(|_| anyhow!("classifier lock poisoned"))?;
        log::info!("warming up classifier '{}'", classifier.name());
        classifier.warm_up()
    }
}
