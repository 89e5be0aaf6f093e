//! Synthetic frames shown when no live frame is available.

use ab_glyph::{FontArc, PxScale};
use anyhow::{anyhow, Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_text_mut, text_size};
use std::path::Path;

/// DejaVu Sans, compiled in so captions never depend on system fonts.
static BUNDLED_FONT: &[u8] = include_bytes!("../../assets/fonts/DejaVuSans.ttf");

/// The compiled-in caption font.
pub fn bundled_font() -> Option<FontArc> {
    match FontArc::try_from_slice(BUNDLED_FONT) {
        Ok(font) => Some(font),
        Err(err) => {
            log::error!("bundled placeholder font is unreadable: {}", err);
            None
        }
    }
}

/// Load a TrueType/OpenType font for captions.
pub fn load_font(path: &Path) -> Result<FontArc> {
    let data =
        std::fs::read(path).with_context(|| format!("read font file {}", path.display()))?;
    FontArc::try_from_vec(data).map_err(|_| anyhow!("invalid font file {}", path.display()))
}

/// Load the configured font, falling back to the bundled one.
pub fn load_font_or_default(path: Option<&Path>) -> Option<FontArc> {
    let Some(path) = path else {
        return bundled_font();
    };
    match load_font(path) {
        Ok(font) => Some(font),
        Err(err) => {
            log::warn!("using bundled placeholder font: {:#}", err);
            bundled_font()
        }
    }
}

#[derive(Clone)]
pub struct Placeholder {
    caption: String,
    background: Rgb<u8>,
    foreground: Rgb<u8>,
    font: Option<FontArc>,
}

impl Placeholder {
    pub fn new(caption: impl Into<String>, background: Rgb<u8>, foreground: Rgb<u8>) -> Self {
        Self {
            caption: caption.into(),
            background,
            foreground,
            font: bundled_font(),
        }
    }

    /// White caption on black, shown while a remote stream is unavailable.
    pub fn waiting_for_stream() -> Self {
        Self::new("Waiting for stream...", Rgb([0, 0, 0]), Rgb([255, 255, 255]))
    }

    /// Black caption on white, shown for an absent local camera.
    pub fn camera_not_available() -> Self {
        Self::new("Camera Not Available", Rgb([255, 255, 255]), Rgb([0, 0, 0]))
    }

    /// Replace the caption font. `None` keeps the current one.
    pub fn with_font(mut self, font: Option<FontArc>) -> Self {
        if font.is_some() {
            self.font = font;
        }
        self
    }

    pub fn caption(&self) -> &str {
        &self.caption
    }

    pub fn background(&self) -> Rgb<u8> {
        self.background
    }

    /// Render at `width` x `height` with the caption centred.
    pub fn render(&self, width: u32, height: u32) -> RgbImage {
        let mut canvas = RgbImage::from_pixel(width, height, self.background);
        let Some(font) = &self.font else {
            return canvas;
        };
        if width == 0 || height == 0 {
            return canvas;
        }
        // Shrink the caption until it fits the frame width.
        let mut scale = PxScale::from((height as f32 / 18.0).max(12.0));
        let (mut text_w, mut text_h) = text_size(scale, font, &self.caption);
        while text_w > width && scale.y > 6.0 {
            scale = PxScale::from(scale.y * 0.8);
            (text_w, text_h) = text_size(scale, font, &self.caption);
        }
        let x = (width as i32 - text_w as i32) / 2;
        let y = (height as i32 - text_h as i32) / 2;
        draw_text_mut(&mut canvas, self.foreground, x, y, scale, font, &self.caption);
        canvas
    }
}
