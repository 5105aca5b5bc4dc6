//! Image encoding: enhanced page → base64 PNG wrapped in `ImageData`.
//!
//! Vision APIs take images inline as base64 in the JSON request body. PNG
//! over JPEG is non-negotiable here: the readings are handwritten digits a
//! few pixels wide, and JPEG ringing around a "1" is exactly how it becomes
//! a "7". `detail: "high"` asks GPT-4-class models to tile the image at
//! full resolution instead of downsampling to a single overview tile —
//! without it the right-hand reading columns blur together.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode an enhanced page as a base64 PNG attachment for the VLM request.
pub fn encode_page(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded enhanced page → {} bytes base64", b64.len());

    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn encode_produces_png_payload() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(12, 8, Rgb([240, 240, 240])));
        let data = encode_page(&img).expect("encode should succeed");
        assert_eq!(data.mime_type, "image/png");

        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        // PNG signature survives the round trip.
        assert_eq!(&decoded[..4], b"\x89PNG");
    }
}
