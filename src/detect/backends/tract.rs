#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use tract_onnx::prelude::*;

use crate::detect::backend::{Classifier, InputLayout};

/// Tract-based classifier for ONNX models.
///
/// Loads a local model file and scores RGB frames scaled to `[0, 1]`. The
/// first element of the first output is taken as the score.
pub struct TractClassifier {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    width: u32,
    height: u32,
    layout: InputLayout,
    invert_output: bool,
}

impl TractClassifier {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(
        model_path: P,
        width: u32,
        height: u32,
        layout: InputLayout,
    ) -> Result<Self> {
        let model_path = model_path.as_ref();
        let shape = match layout {
            InputLayout::Nhwc => tvec!(1, height as usize, width as usize, 3),
            InputLayout::Nchw => tvec!(1, 3, height as usize, width as usize),
        };
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(0, InferenceFact::dt_shape(f32::datum_type(), shape))
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            width,
            height,
            layout,
            invert_output: false,
        })
    }

    /// Report `1 - output` instead of the raw output.
    ///
    /// For models trained with "no defect" as the positive class.
    pub fn with_inverted_output(mut self, invert: bool) -> Self {
        self.invert_output = invert;
        self
    }

    fn build_input(&self, input: &RgbImage) -> Result<Tensor> {
        if input.width() != self.width || input.height() != self.height {
            return Err(anyhow!(
                "input size {}x{} does not match model input {}x{}",
                input.width(),
                input.height(),
                self.width,
                self.height
            ));
        }

        let width = self.width as usize;
        let height = self.height as usize;
        let pixels = input.as_raw();
        let scale = |y: usize, x: usize, channel: usize| {
            pixels[(y * width + x) * 3 + channel] as f32 / 255.0
        };
        let tensor = match self.layout {
            InputLayout::Nhwc => {
                tract_ndarray::Array4::from_shape_fn((1, height, width, 3), |(_, y, x, c)| {
                    scale(y, x, c)
                })
            }
            InputLayout::Nchw => {
                tract_ndarray::Array4::from_shape_fn((1, 3, height, width), |(_, c, y, x)| {
                    scale(y, x, c)
                })
            }
        };
        Ok(tensor.into_tensor())
    }

    fn extract_score(&self, outputs: TVec<TValue>) -> Result<f32> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let scores = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let raw = scores
            .iter()
            .next()
            .copied()
            .ok_or_else(|| anyhow!("model output tensor was empty"))?;
        if !raw.is_finite() {
            return Err(anyhow!("model produced a non-finite score"));
        }
        let raw = raw.clamp(0.0, 1.0);
        Ok(if self.invert_output { 1.0 - raw } else { raw })
    }
}

impl Classifier for TractClassifier {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn classify(&mut self, input: &RgbImage) -> Result<f32> {
        let tensor = self.build_input(input)?;
        let outputs = self
            .model
            .run(tvec!(tensor.into()))
            .context("ONNX inference failed")?;
        self.extract_score(outputs)
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = RgbImage::new(self.width, self.height);
        self.classify(&blank).map(|_| ())
    }
}
