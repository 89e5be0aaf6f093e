use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use image::{Rgb, RgbImage};

use crackstream::camera::{
    CameraManager, CameraSettings, CameraStatus, CaptureDevice, DeviceOpener, SyntheticCamera,
};

fn stub(name: &str) -> CameraSettings {
    let mut settings = CameraSettings::new(format!("stub://{}", name));
    settings.width = 64;
    settings.height = 36;
    settings
}

/// Opens synthetic cameras, failing devices whose path contains "broken".
struct CountingOpener {
    opens: Arc<AtomicUsize>,
}

impl DeviceOpener for CountingOpener {
    fn open(&self, settings: &CameraSettings) -> Result<Box<dyn CaptureDevice>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if settings.device.contains("broken") {
            return Err(anyhow!("no such device {}", settings.device));
        }
        Ok(Box::new(SyntheticCamera::new(settings.clone())))
    }
}

/// Captures `good` frames, then errors.
struct FlakyCamera {
    good: usize,
}

impl CaptureDevice for FlakyCamera {
    fn describe(&self) -> String {
        "flaky".to_string()
    }

    fn capture(&mut self) -> Result<RgbImage> {
        if self.good == 0 {
            return Err(anyhow!("device unplugged"));
        }
        self.good -= 1;
        Ok(RgbImage::new(4, 4))
    }
}

struct FlakyOpener {
    opens: Arc<AtomicUsize>,
}

impl DeviceOpener for FlakyOpener {
    fn open(&self, _settings: &CameraSettings) -> Result<Box<dyn CaptureDevice>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FlakyCamera { good: 1 }))
    }
}

fn manager(cameras: Vec<CameraSettings>) -> (CameraManager, Arc<AtomicUsize>) {
    let opens = Arc::new(AtomicUsize::new(0));
    let manager = CameraManager::new(
        cameras,
        Box::new(CountingOpener {
            opens: opens.clone(),
        }),
    );
    (manager, opens)
}

#[test]
fn initialize_is_idempotent() {
    let (cameras, opens) = manager(vec![stub("a"), stub("b")]);
    assert!(!cameras.is_running(0));

    cameras.initialize(0).unwrap();
    cameras.initialize(0).unwrap();

    assert!(cameras.is_running(0));
    assert!(!cameras.is_running(1));
    assert_eq!(opens.load(Ordering::SeqCst), 1);
    assert!(cameras.initialize(7).is_err());
}

#[test]
fn capture_initializes_lazily() {
    let (cameras, opens) = manager(vec![stub("a"), stub("b")]);

    let frame = cameras.try_capture(1).expect("frame");
    assert_eq!((frame.width(), frame.height()), (64, 36));
    assert!(cameras.is_running(1));
    assert_eq!(opens.load(Ordering::SeqCst), 1);
    assert!(cameras.try_capture(5).is_none());
}

#[test]
fn rotated_slot_is_flipped() {
    let mut rotated = stub("rotated");
    rotated.rotate_180 = true;
    let (cameras, _) = manager(vec![rotated, stub("upright")]);

    let flipped = cameras.try_capture(0).unwrap();
    let upright = cameras.try_capture(1).unwrap();

    // Synthetic frames carry a top-to-bottom red ramp.
    assert_eq!(upright.get_pixel(0, 0)[0], 0);
    assert_eq!(upright.get_pixel(0, 35)[0], 255);
    assert_eq!(flipped.get_pixel(0, 0)[0], 255);
    assert_eq!(flipped.get_pixel(0, 35)[0], 0);
}

#[test]
fn one_camera_failing_does_not_affect_the_other() {
    let (cameras, _) = manager(vec![stub("broken"), stub("ok")]);

    assert_eq!(cameras.initialize_all(), 1);
    assert!(cameras.try_capture(0).is_none());
    assert!(cameras.try_capture(1).is_some());
}

#[test]
fn unavailable_camera_yields_not_available_frame_at_slot_size() {
    let (cameras, _) = manager(vec![stub("broken")]);

    let frame = cameras.capture(0);
    assert_eq!((frame.width(), frame.height()), (64, 36));
    assert_eq!(frame.get_pixel(0, 0), &Rgb([255, 255, 255]));
}

#[test]
fn not_available_frame_carries_caption_glyphs() {
    let mut broken = stub("broken");
    broken.width = 640;
    broken.height = 360;
    let (cameras, _) = manager(vec![broken]);

    let frame = cameras.capture(0);
    let dark: Vec<(u32, u32)> = frame
        .enumerate_pixels()
        .filter(|(_, _, p)| p[0] < 128)
        .map(|(x, y, _)| (x, y))
        .collect();
    assert!(!dark.is_empty());

    let x0 = dark.iter().map(|p| p.0).min().unwrap();
    let x1 = dark.iter().map(|p| p.0).max().unwrap();
    let y0 = dark.iter().map(|p| p.1).min().unwrap();
    let y1 = dark.iter().map(|p| p.1).max().unwrap();
    let area = ((x1 - x0 + 1) * (y1 - y0 + 1)) as usize;
    assert!(x1 - x0 > 100);
    // Letters leave gaps inside their bounding box.
    assert!(dark.len() < area * 6 / 10);
}

#[test]
fn reopen_attempts_are_throttled() {
    let (cameras, opens) = manager(vec![stub("broken")]);
    let cameras = cameras.with_reopen_interval(Duration::from_millis(100));

    assert!(cameras.try_capture(0).is_none());
    assert!(cameras.try_capture(0).is_none());
    assert!(cameras.try_capture(0).is_none());
    assert_eq!(opens.load(Ordering::SeqCst), 1);

    std::thread::sleep(Duration::from_millis(120));
    assert!(cameras.try_capture(0).is_none());
    assert_eq!(opens.load(Ordering::SeqCst), 2);
}

#[test]
fn capture_error_drops_device_for_reinitialization() {
    let opens = Arc::new(AtomicUsize::new(0));
    let cameras = CameraManager::new(
        vec![stub("flaky")],
        Box::new(FlakyOpener {
            opens: opens.clone(),
        }),
    )
    .with_reopen_interval(Duration::ZERO);

    assert!(cameras.try_capture(0).is_some());
    assert!(cameras.try_capture(0).is_none());
    assert!(!cameras.is_running(0));

    assert!(cameras.try_capture(0).is_some());
    assert_eq!(opens.load(Ordering::SeqCst), 2);
}

#[test]
fn shutdown_releases_devices() {
    let (cameras, _) = manager(vec![stub("a"), stub("b")]);
    assert_eq!(cameras.initialize_all(), 2);

    cameras.shutdown();

    assert!(!cameras.is_running(0));
    assert!(!cameras.is_running(1));
}

#[test]
fn status_counts_frames_and_failures_per_slot() {
    let opens = Arc::new(AtomicUsize::new(0));
    let cameras = CameraManager::new(
        vec![stub("flaky"), stub("idle")],
        Box::new(FlakyOpener {
            opens: opens.clone(),
        }),
    )
    .with_reopen_interval(Duration::ZERO);

    assert!(cameras.try_capture(0).is_some());
    assert!(cameras.try_capture(0).is_none());

    let status = cameras.status();
    assert_eq!(
        status[0],
        CameraStatus {
            id: 0,
            device: "stub://flaky".to_string(),
            running: false,
            frames_captured: 1,
            capture_failures: 1,
        }
    );
    assert_eq!(status[1].frames_captured, 0);
    assert!(!status[1].running);

    let json = serde_json::to_value(&status).unwrap();
    assert_eq!(json[0]["capture_failures"], 1);
    assert_eq!(json[1]["device"], "stub://idle");
}

#[test]
fn failed_open_counts_as_capture_failure() {
    let (cameras, _) = manager(vec![stub("broken")]);
    assert!(cameras.try_capture(0).is_none());

    let status = cameras.status();
    assert_eq!(status[0].capture_failures, 1);
    assert_eq!(status[0].frames_captured, 0);
}
