//! `multipart/x-mixed-replace` framing and JPEG encoding.

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;

pub const BOUNDARY: &str = "frame";

/// Value for the response `Content-Type` header.
pub const CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

/// Wrap one JPEG as a multipart part.
pub fn encode_part(jpeg: &[u8]) -> Vec<u8> {
    let header = format!("--{}\r\nContent-Type: image/jpeg\r\n\r\n", BOUNDARY);
    let mut part = Vec::with_capacity(header.len() + jpeg.len() + 2);
    part.extend_from_slice(header.as_bytes());
    part.extend_from_slice(jpeg);
    part.extend_from_slice(b"\r\n");
    part
}

/// Encode an RGB frame as JPEG at `quality` (1-100).
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut jpeg = Vec::with_capacity(64 * 1024);
    JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100))
        .encode_image(image)
        .context("encode jpeg")?;
    Ok(jpeg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_has_boundary_header_and_trailer() {
        let part = encode_part(&[0xFF, 0xD8, 0xFF, 0xD9]);
        let prefix = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";
        assert!(part.starts_with(prefix));
        assert_eq!(&part[prefix.len()..prefix.len() + 4], &[0xFF, 0xD8, 0xFF, 0xD9]);
        assert!(part.ends_with(b"\r\n"));
        assert_eq!(part.len(), prefix.len() + 4 + 2);
    }

    #[test]
    fn encoded_jpeg_decodes_to_same_size() {
        let image = RgbImage::new(40, 30);
        let jpeg = encode_jpeg(&image, 95).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (40, 30));
    }
}
