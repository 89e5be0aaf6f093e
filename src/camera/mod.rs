//! Local camera slots.
//!
//! `CameraManager` owns a fixed number of slots. Each slot lazily opens its
//! device on first use, and a failed capture drops the device so the next
//! capture re-opens it. Re-open attempts from the capture path are throttled
//! so an unplugged camera does not get hammered at stream rate.

mod device;
#[cfg_attr(not(feature = "ingest-v4l2"), allow(dead_code))]
mod normalize;
#[cfg(feature = "ingest-v4l2")]
mod v4l2;

pub use device::{CameraSettings, CaptureDevice, DeviceOpener, SyntheticCamera, SystemOpener};
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Camera;

use anyhow::{anyhow, Result};
use image::{imageops, RgbImage};
use serde::Serialize;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::stream::Placeholder;

/// Minimum spacing between lazy re-open attempts for one slot.
pub const DEFAULT_REOPEN_INTERVAL: Duration = Duration::from_secs(2);

struct CameraSlot {
    settings: CameraSettings,
    device: Option<Box<dyn CaptureDevice>>,
    last_open_attempt: Option<Instant>,
    frames_captured: u64,
    capture_failures: u64,
}

/// Capture health of one slot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CameraStatus {
    pub id: usize,
    pub device: String,
    pub running: bool,
    pub frames_captured: u64,
    pub capture_failures: u64,
}

pub struct CameraManager {
    slots: Vec<Mutex<CameraSlot>>,
    opener: Box<dyn DeviceOpener>,
    reopen_interval: Duration,
    unavailable: Placeholder,
}

impl CameraManager {
    pub fn new(cameras: Vec<CameraSettings>, opener: Box<dyn DeviceOpener>) -> Self {
        let slots = cameras
            .into_iter()
            .map(|settings| {
                Mutex::new(CameraSlot {
                    settings,
                    device: None,
                    last_open_attempt: None,
                    frames_captured: 0,
                    capture_failures: 0,
                })
            })
            .collect();
        Self {
            slots,
            opener,
            reopen_interval: DEFAULT_REOPEN_INTERVAL,
            unavailable: Placeholder::camera_not_available(),
        }
    }

    /// Manager backed by `SystemOpener`.
    pub fn with_system_devices(cameras: Vec<CameraSettings>) -> Self {
        Self::new(cameras, Box::new(SystemOpener))
    }

    pub fn with_reopen_interval(mut self, interval: Duration) -> Self {
        self.reopen_interval = interval;
        self
    }

    pub fn with_placeholder(mut self, placeholder: Placeholder) -> Self {
        self.unavailable = placeholder;
        self
    }

    pub fn camera_count(&self) -> usize {
        self.slots.len()
    }

    pub fn settings(&self, id: usize) -> Option<CameraSettings> {
        self.slots.get(id).map(|slot| lock(slot).settings.clone())
    }

    /// Open the device for `id`. A running camera is left untouched.
    pub fn initialize(&self, id: usize) -> Result<()> {
        let slot = self
            .slots
            .get(id)
            .ok_or_else(|| anyhow!("no camera slot {}", id))?;
        let mut slot = lock(slot);
        if slot.device.is_some() {
            return Ok(());
        }
        self.open_slot(id, &mut slot)
    }

    /// Try to open every slot. Returns the number of running cameras.
    pub fn initialize_all(&self) -> usize {
        (0..self.slots.len())
            .filter(|&id| match self.initialize(id) {
                Ok(()) => true,
                Err(err) => {
                    log::warn!("camera {} unavailable: {:#}", id, err);
                    false
                }
            })
            .count()
    }

    pub fn is_running(&self, id: usize) -> bool {
        self.slots
            .get(id)
            .map(|slot| lock(slot).device.is_some())
            .unwrap_or(false)
    }

    /// Capture one frame, opening the device first if needed.
    ///
    /// Returns `None` for unknown slots, unavailable devices and capture errors.
    pub fn try_capture(&self, id: usize) -> Option<RgbImage> {
        let slot = self.slots.get(id)?;
        let mut slot = lock(slot);

        if slot.device.is_none() {
            let throttled = slot
                .last_open_attempt
                .map(|at| at.elapsed() < self.reopen_interval)
                .unwrap_or(false);
            if throttled {
                return None;
            }
            if let Err(err) = self.open_slot(id, &mut slot) {
                log::warn!("camera {} unavailable: {:#}", id, err);
                slot.capture_failures += 1;
                return None;
            }
        }

        let device = slot.device.as_mut()?;
        match device.capture() {
            Ok(mut frame) => {
                if slot.settings.rotate_180 {
                    imageops::rotate180_in_place(&mut frame);
                }
                slot.frames_captured += 1;
                Some(frame)
            }
            Err(err) => {
                log::warn!("camera {}: capture failed, closing device: {:#}", id, err);
                slot.device = None;
                slot.capture_failures += 1;
                None
            }
        }
    }

    /// Capture one frame, or the "Camera Not Available" frame at the slot's resolution.
    pub fn capture(&self, id: usize) -> RgbImage {
        if let Some(frame) = self.try_capture(id) {
            return frame;
        }
        let (width, height) = self
            .settings(id)
            .map(|settings| (settings.width, settings.height))
            .unwrap_or((1920, 1080));
        self.unavailable.render(width, height)
    }

    /// Per-slot capture counters, in slot order.
    pub fn status(&self) -> Vec<CameraStatus> {
        self.slots
            .iter()
            .enumerate()
            .map(|(id, slot)| {
                let slot = lock(slot);
                CameraStatus {
                    id,
                    device: slot.settings.device.clone(),
                    running: slot.device.is_some(),
                    frames_captured: slot.frames_captured,
                    capture_failures: slot.capture_failures,
                }
            })
            .collect()
    }

    /// Release every open device.
    pub fn shutdown(&self) {
        for (id, slot) in self.slots.iter().enumerate() {
            let mut slot = lock(slot);
            if let Some(device) = slot.device.take() {
                log::info!("camera {}: closed {}", id, device.describe());
            }
        }
    }

    fn open_slot(&self, id: usize, slot: &mut CameraSlot) -> Result<()> {
        slot.last_open_attempt = Some(Instant::now());
        let device = self.opener.open(&slot.settings)?;
        log::info!("camera {}: running {}", id, device.describe());
        slot.device = Some(device);
        Ok(())
    }
}

impl Drop for CameraManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn lock(slot: &Mutex<CameraSlot>) -> MutexGuard<'_, CameraSlot> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
