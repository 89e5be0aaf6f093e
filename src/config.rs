use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::camera::CameraSettings;
use crate::detect::{Classifier, DetectionEngine, DetectionSettings, InputLayout, StubClassifier};
use crate::ingest::mjpeg::DEFAULT_MAX_BUFFERED;
use crate::ingest::SupervisorConfig;
use crate::stream::EmitterSettings;

const DEFAULT_STREAM_URL: &str = "http://192.168.2.1:5000/camera/1";
const DEFAULT_RETRY_SECS: u64 = 5;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_INPUT_SIZE: u32 = 128;
const DEFAULT_THRESHOLD: f32 = 0.5;
const DEFAULT_CAMERA_COUNT: usize = 2;
const MAX_CAMERAS: usize = 8;

#[derive(Debug, Deserialize, Default)]
struct RelayConfigFile {
    stream: Option<StreamConfigFile>,
    output: Option<OutputConfigFile>,
    detector: Option<DetectorConfigFile>,
    cameras: Option<Vec<CameraConfigFile>>,
    camera_output: Option<OutputConfigFile>,
    placeholder_font: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct StreamConfigFile {
    url: Option<String>,
    retry_secs: Option<u64>,
    connect_timeout_secs: Option<u64>,
    max_buffer_bytes: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct OutputConfigFile {
    fps: Option<f64>,
    width: Option<u32>,
    height: Option<u32>,
    quality: Option<u8>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    model_path: Option<PathBuf>,
    input_width: Option<u32>,
    input_height: Option<u32>,
    threshold: Option<f32>,
    invert_output: Option<bool>,
    layout: Option<InputLayout>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    device: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    fps: Option<u32>,
    rotate_180: Option<bool>,
    auto_exposure: Option<bool>,
    exposure_us: Option<u32>,
    autofocus: Option<bool>,
    auto_white_balance: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub stream: StreamSettings,
    pub output: EmitterSettings,
    pub detector: DetectorSettings,
    pub cameras: Vec<CameraSettings>,
    pub camera_output: EmitterSettings,
    pub placeholder_font: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub url: String,
    pub retry_interval: Duration,
    pub connect_timeout: Duration,
    pub max_buffer_bytes: usize,
}

impl StreamSettings {
    pub fn supervisor(&self) -> SupervisorConfig {
        SupervisorConfig {
            retry_interval: self.retry_interval,
            max_buffered_bytes: self.max_buffer_bytes,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    /// ONNX model; `None` runs with a stub classifier.
    pub model_path: Option<PathBuf>,
    pub input_width: u32,
    pub input_height: u32,
    pub threshold: f32,
    /// Report `1 - output`; the reference model emits the "no crack" probability.
    pub invert_output: bool,
    pub layout: InputLayout,
}

impl DetectorSettings {
    pub fn engine_settings(&self) -> DetectionSettings {
        DetectionSettings {
            input_width: self.input_width,
            input_height: self.input_height,
            threshold: self.threshold,
            ..DetectionSettings::default()
        }
    }

    /// Build the configured classifier. Without a model, a stub scoring 0.
    pub fn classifier(&self) -> Result<Box<dyn Classifier>> {
        match &self.model_path {
            None => {
                log::warn!("no detector model configured, using stub classifier");
                Ok(Box::new(StubClassifier::default()))
            }
            Some(path) => self.load_model(path),
        }
    }

    pub fn engine(&self) -> Result<DetectionEngine> {
        Ok(DetectionEngine::new(self.classifier()?, self.engine_settings()))
    }

    #[cfg(feature = "backend-tract")]
    fn load_model(&self, path: &Path) -> Result<Box<dyn Classifier>> {
        let classifier = crate::detect::TractClassifier::new(
            path,
            self.input_width,
            self.input_height,
            self.layout,
        )?
        .with_inverted_output(self.invert_output);
        Ok(Box::new(classifier))
    }

    #[cfg(not(feature = "backend-tract"))]
    fn load_model(&self, path: &Path) -> Result<Box<dyn Classifier>> {
        Err(anyhow!(
            "cannot load model {}: built without the backend-tract feature",
            path.display()
        ))
    }
}

impl RelayConfig {
    /// Load from the file named by `CRACKSTREAM_CONFIG`, if set.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("CRACKSTREAM_CONFIG").ok().map(PathBuf::from);
        Self::load_from(config_path.as_deref())
    }

    pub fn load_from(config_path: Option<&Path>) -> Result<Self> {
        let file_cfg = match config_path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: RelayConfigFile) -> Result<Self> {
        let stream_file = file.stream.unwrap_or_default();
        let stream = StreamSettings {
            url: stream_file
                .url
                .unwrap_or_else(|| DEFAULT_STREAM_URL.to_string()),
            retry_interval: Duration::from_secs(
                stream_file.retry_secs.unwrap_or(DEFAULT_RETRY_SECS),
            ),
            connect_timeout: Duration::from_secs(
                stream_file
                    .connect_timeout_secs
                    .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
            ),
            max_buffer_bytes: stream_file.max_buffer_bytes.unwrap_or(DEFAULT_MAX_BUFFERED),
        };

        let detector_file = file.detector.unwrap_or_default();
        let detector = DetectorSettings {
            model_path: detector_file.model_path,
            input_width: detector_file.input_width.unwrap_or(DEFAULT_INPUT_SIZE),
            input_height: detector_file.input_height.unwrap_or(DEFAULT_INPUT_SIZE),
            threshold: detector_file.threshold.unwrap_or(DEFAULT_THRESHOLD),
            invert_output: detector_file.invert_output.unwrap_or(true),
            layout: detector_file.layout.unwrap_or_default(),
        };

        let cameras = match file.cameras {
            Some(cameras) => cameras
                .into_iter()
                .enumerate()
                .map(|(id, camera)| camera_settings(id, camera))
                .collect(),
            None => (0..DEFAULT_CAMERA_COUNT)
                .map(|id| camera_settings(id, CameraConfigFile::default()))
                .collect(),
        };

        Ok(Self {
            stream,
            output: output_settings(file.output, EmitterSettings::remote()),
            detector,
            cameras,
            camera_output: output_settings(file.camera_output, EmitterSettings::camera()),
            placeholder_font: file.placeholder_font,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("CRACKSTREAM_STREAM_URL") {
            if !url.trim().is_empty() {
                self.stream.url = url.trim().to_string();
            }
        }
        if let Ok(path) = std::env::var("CRACKSTREAM_MODEL_PATH") {
            if !path.trim().is_empty() {
                self.detector.model_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(retry) = std::env::var("CRACKSTREAM_RETRY_SECS") {
            let seconds: u64 = retry.trim().parse().map_err(|_| {
                anyhow!("CRACKSTREAM_RETRY_SECS must be an integer number of seconds")
            })?;
            self.stream.retry_interval = Duration::from_secs(seconds);
        }
        if let Ok(fps) = std::env::var("CRACKSTREAM_FPS") {
            self.output.fps = fps
                .trim()
                .parse()
                .map_err(|_| anyhow!("CRACKSTREAM_FPS must be a number"))?;
        }
        if let Ok(path) = std::env::var("CRACKSTREAM_PLACEHOLDER_FONT") {
            if !path.trim().is_empty() {
                self.placeholder_font = Some(PathBuf::from(path));
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.stream.url)
            .map_err(|e| anyhow!("invalid stream url {}: {}", self.stream.url, e))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(anyhow!("stream url must be http or https"));
        }
        if self.stream.retry_interval.is_zero() {
            return Err(anyhow!("stream retry interval must be greater than zero"));
        }
        if self.stream.max_buffer_bytes == 0 {
            return Err(anyhow!("stream max_buffer_bytes must be greater than zero"));
        }
        validate_output("output", &self.output)?;
        validate_output("camera_output", &self.camera_output)?;

        if self.detector.input_width == 0 || self.detector.input_height == 0 {
            return Err(anyhow!("detector input size must be non-zero"));
        }
        if !(0.0..=1.0).contains(&self.detector.threshold) {
            return Err(anyhow!("detector threshold must be within [0, 1]"));
        }

        if self.cameras.len() > MAX_CAMERAS {
            return Err(anyhow!("at most {} cameras are supported", MAX_CAMERAS));
        }
        for (id, camera) in self.cameras.iter().enumerate() {
            if camera.device.trim().is_empty() {
                return Err(anyhow!("camera {} device must not be empty", id));
            }
            if camera.width == 0 || camera.height == 0 {
                return Err(anyhow!("camera {} resolution must be non-zero", id));
            }
        }
        Ok(())
    }
}

fn camera_settings(id: usize, file: CameraConfigFile) -> CameraSettings {
    let device = file.device.unwrap_or_else(|| format!("/dev/video{}", id));
    let defaults = CameraSettings::new(device);
    CameraSettings {
        width: file.width.unwrap_or(defaults.width),
        height: file.height.unwrap_or(defaults.height),
        fps: file.fps.unwrap_or(defaults.fps),
        // The first camera is mounted upside down.
        rotate_180: file.rotate_180.unwrap_or(id == 0),
        auto_exposure: file.auto_exposure.unwrap_or(defaults.auto_exposure),
        exposure_us: file.exposure_us.unwrap_or(defaults.exposure_us),
        autofocus: file.autofocus.unwrap_or(defaults.autofocus),
        auto_white_balance: file
            .auto_white_balance
            .unwrap_or(defaults.auto_white_balance),
        ..defaults
    }
}

fn output_settings(file: Option<OutputConfigFile>, defaults: EmitterSettings) -> EmitterSettings {
    let file = file.unwrap_or_default();
    EmitterSettings {
        fps: file.fps.unwrap_or(defaults.fps),
        width: file.width.unwrap_or(defaults.width),
        height: file.height.unwrap_or(defaults.height),
        quality: file.quality.unwrap_or(defaults.quality),
    }
}

fn validate_output(section: &str, output: &EmitterSettings) -> Result<()> {
    if !(output.fps.is_finite() && output.fps > 0.0) {
        return Err(anyhow!("{} fps must be greater than zero", section));
    }
    if output.width == 0 || output.height == 0 {
        return Err(anyhow!("{} resolution must be non-zero", section));
    }
    if !(1..=100).contains(&output.quality) {
        return Err(anyhow!("{} quality must be within 1..=100", section));
    }
    Ok(())
}

fn read_config_file(path: &Path) -> Result<RelayConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
