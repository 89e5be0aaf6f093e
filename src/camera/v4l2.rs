//! V4L2 capture device.
//!
//! Requests RGB24 at the configured size and rate, accepts whatever format the
//! driver settles on if it is one `normalize` understands, and applies the
//! exposure, focus and white balance controls best-effort.

use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use ouroboros::self_referencing;
use v4l::control::{Control, Value};

use super::device::{CameraSettings, CaptureDevice};
use super::normalize::{normalize_to_rgb, PixelFormat};

const CID_EXPOSURE_AUTO: u32 = 0x009a_0901;
const CID_EXPOSURE_ABSOLUTE: u32 = 0x009a_0902;
const CID_FOCUS_AUTO: u32 = 0x009a_090c;
const CID_AUTO_WHITE_BALANCE: u32 = 0x0098_090c;

const EXPOSURE_MANUAL: i64 = 1;
const EXPOSURE_APERTURE_PRIORITY: i64 = 3;

pub struct V4l2Camera {
    settings: CameraSettings,
    state: V4l2State,
    format: PixelFormat,
    active_width: u32,
    active_height: u32,
    frame_count: u64,
}

#[self_referencing]
struct V4l2State {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl V4l2Camera {
    pub fn open(settings: CameraSettings) -> Result<Self> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(&settings.device)
            .with_context(|| format!("open v4l2 device {}", settings.device))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = settings.width;
        format.height = settings.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "camera {}: failed to set format: {}",
                    settings.device,
                    err
                );
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };
        let pixel_format = PixelFormat::from_fourcc(&format.fourcc.repr).ok_or_else(|| {
            anyhow!(
                "camera {}: unsupported pixel format {}",
                settings.device,
                format.fourcc
            )
        })?;

        if settings.fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(settings.fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!("camera {}: failed to set fps: {}", settings.device, err);
            }
        }
        apply_controls(&device, &settings);

        let state = V4l2StateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()?;

        log::info!(
            "camera {}: opened {}x{} {}",
            settings.device,
            format.width,
            format.height,
            format.fourcc
        );
        Ok(Self {
            active_width: format.width,
            active_height: format.height,
            format: pixel_format,
            settings,
            state,
            frame_count: 0,
        })
    }
}

impl CaptureDevice for V4l2Camera {
    fn describe(&self) -> String {
        format!(
            "{} ({}x{}, {} frames)",
            self.settings.device, self.active_width, self.active_height, self.frame_count
        )
    }

    fn capture(&mut self) -> Result<RgbImage> {
        use v4l::io::traits::CaptureStream;

        let (width, height, format) = (self.active_width, self.active_height, self.format);
        let image = self.state.with_mut(|fields| -> Result<RgbImage> {
            let (buf, meta) = fields.stream.next().context("capture v4l2 frame")?;
            let used = match meta.bytesused as usize {
                0 => buf.len(),
                n => n.min(buf.len()),
            };
            normalize_to_rgb(&buf[..used], width, height, format)
        })?;
        self.frame_count += 1;
        Ok(image)
    }
}

fn apply_controls(device: &v4l::Device, settings: &CameraSettings) {
    let exposure_mode = if settings.auto_exposure {
        EXPOSURE_APERTURE_PRIORITY
    } else {
        EXPOSURE_MANUAL
    };
    let mut controls = vec![
        ("exposure_auto", CID_EXPOSURE_AUTO, Value::Integer(exposure_mode)),
        (
            "focus_auto",
            CID_FOCUS_AUTO,
            Value::Boolean(settings.autofocus),
        ),
        (
            "white_balance_auto",
            CID_AUTO_WHITE_BALANCE,
            Value::Boolean(settings.auto_white_balance),
        ),
    ];
    if !settings.auto_exposure {
        // V4L2 absolute exposure is in 100us units.
        let units = (settings.exposure_us / 100).max(1) as i64;
        controls.push(("exposure_absolute", CID_EXPOSURE_ABSOLUTE, Value::Integer(units)));
    }

    for (name, id, value) in controls {
        if let Err(err) = device.set_control(Control { id, value }) {
            log::warn!("camera {}: failed to set {}: {}", settings.device, name, err);
        }
    }
}
