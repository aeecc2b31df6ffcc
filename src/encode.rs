use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;

use crate::engine::RawImage;
use crate::error::TickError;

/// Encode a raw RGB frame to JPEG wire bytes at the configured quality.
pub fn encode_jpeg(image: &RawImage, quality: u8) -> Result<Bytes, TickError> {
    let mut out = Vec::with_capacity(image.pixels.len() / 8);
    let mut encoder = JpegEncoder::new_with_quality(&mut out, quality);
    encoder.encode(
        &image.pixels,
        image.width,
        image.height,
        ExtendedColorType::Rgb8,
    )?;
    Ok(Bytes::from(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_to_a_jpeg_payload() {
        let image = RawImage {
            width: 8,
            height: 8,
            pixels: vec![200u8; 8 * 8 * 3],
        };
        let bytes = encode_jpeg(&image, 60).expect("encode succeeds");
        assert!(bytes.starts_with(&[0xFF, 0xD8]));
        assert!(bytes.ends_with(&[0xFF, 0xD9]));
    }

    #[test]
    fn rejects_a_truncated_pixel_buffer() {
        let image = RawImage {
            width: 8,
            height: 8,
            pixels: vec![0u8; 8],
        };
        assert!(encode_jpeg(&image, 60).is_err());
    }
}
