//! Capture devices behind the camera manager.
//!
//! Device paths starting with `stub://` open a synthetic camera that produces
//! a moving gradient; anything else is opened through V4L2 when the crate is
//! built with `ingest-v4l2`.

use anyhow::Result;
use image::{Rgb, RgbImage};

/// Per-slot capture configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct CameraSettings {
    /// Device node (e.g. "/dev/video0") or `stub://name`.
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Rotate captured frames by 180 degrees.
    pub rotate_180: bool,
    pub auto_exposure: bool,
    /// Manual exposure, used when `auto_exposure` is off.
    pub exposure_us: u32,
    pub autofocus: bool,
    pub auto_white_balance: bool,
}

impl CameraSettings {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            width: 1920,
            height: 1080,
            fps: 60,
            rotate_180: false,
            auto_exposure: true,
            exposure_us: 33_333,
            autofocus: true,
            auto_white_balance: true,
        }
    }

    pub fn is_synthetic(&self) -> bool {
        self.device.starts_with("stub://")
    }
}

/// An opened camera that yields RGB frames.
pub trait CaptureDevice: Send {
    fn describe(&self) -> String;

    fn capture(&mut self) -> Result<RgbImage>;
}

/// Opens capture devices for camera slots.
pub trait DeviceOpener: Send + Sync {
    fn open(&self, settings: &CameraSettings) -> Result<Box<dyn CaptureDevice>>;
}

/// Opens `stub://` synthetic cameras and V4L2 devices.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemOpener;

impl DeviceOpener for SystemOpener {
    fn open(&self, settings: &CameraSettings) -> Result<Box<dyn CaptureDevice>> {
        if settings.is_synthetic() {
            return Ok(Box::new(SyntheticCamera::new(settings.clone())));
        }
        open_device(settings)
    }
}

#[cfg(feature = "ingest-v4l2")]
fn open_device(settings: &CameraSettings) -> Result<Box<dyn CaptureDevice>> {
    let camera = super::v4l2::V4l2Camera::open(settings.clone())?;
    Ok(Box::new(camera))
}

#[cfg(not(feature = "ingest-v4l2"))]
fn open_device(settings: &CameraSettings) -> Result<Box<dyn CaptureDevice>> {
    anyhow::bail!(
        "cannot open {}: built without the ingest-v4l2 feature",
        settings.device
    )
}

/// Synthetic camera for `stub://` devices.
pub struct SyntheticCamera {
    settings: CameraSettings,
    frame_count: u64,
}

impl SyntheticCamera {
    pub fn new(settings: CameraSettings) -> Self {
        log::info!(
            "camera {}: synthetic {}x{}",
            settings.device,
            settings.width,
            settings.height
        );
        Self {
            settings,
            frame_count: 0,
        }
    }
}

impl CaptureDevice for SyntheticCamera {
    fn describe(&self) -> String {
        format!("{} (synthetic)", self.settings.device)
    }

    fn capture(&mut self) -> Result<RgbImage> {
        self.frame_count += 1;
        let shift = self.frame_count as u32;
        let (w, h) = (self.settings.width, self.settings.height);
        // Vertical gradient, so a 180 degree rotation is observable.
        Ok(RgbImage::from_fn(w, h, |x, y| {
            let level = if h > 1 { (y * 255 / (h - 1)) as u8 } else { 0 };
            Rgb([level, ((x + shift) % 256) as u8, 255 - level])
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_device_opens_without_hardware() -> Result<()> {
        let mut settings = CameraSettings::new("stub://cam0");
        settings.width = 64;
        settings.height = 32;
        let mut camera = SystemOpener.open(&settings)?;
        let frame = camera.capture()?;
        assert_eq!((frame.width(), frame.height()), (64, 32));
        assert_eq!(frame.get_pixel(0, 0)[0], 0);
        assert_eq!(frame.get_pixel(0, 31)[0], 255);
        Ok(())
    }

    #[cfg(not(feature = "ingest-v4l2"))]
    #[test]
    fn real_device_needs_v4l2_feature() {
        let err = SystemOpener
            .open(&CameraSettings::new("/dev/video0"))
            .err()
            .map(|err| err.to_string())
            .unwrap_or_default();
        assert!(err.contains("ingest-v4l2"));
    }
}
