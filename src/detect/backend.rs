use anyhow::Result;
use image::RgbImage;

/// Pretrained defect classifier.
///
/// The engine resizes every frame to the classifier's input size before
/// calling `classify`; implementations only normalise and run inference.
pub trait Classifier: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Defect-presence score in `[0, 1]`.
    fn classify(&mut self, input: &RgbImage) -> Result<f32>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<T: Classifier + ?Sized> Classifier for Box<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn classify(&mut self, input: &RgbImage) -> Result<f32> {
        (**self).classify(input)
    }

    fn warm_up(&mut self) -> Result<()> {
        (**self).warm_up()
    }
}

/// Tensor layout expected by a model input.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputLayout {
    /// `[1, H, W, 3]`, as exported from Keras.
    #[default]
    Nhwc,
    /// `[1, 3, H, W]`.
    Nchw,
}
