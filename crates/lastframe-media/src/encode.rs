//! PNG encoding of captured frames.

use std::io::Cursor;

use image::{ImageOutputFormat, RgbaImage};

use crate::bridge::PixelBuffer;
use crate::error::{MediaError, MediaResult};

/// Serialize an RGBA buffer to PNG bytes.
pub fn encode_png(buffer: PixelBuffer) -> MediaResult<Vec<u8>> {
    if buffer.width == 0 || buffer.height == 0 {
        return Err(MediaError::EmptyFrame {
            width: buffer.width,
            height: buffer.height,
        });
    }

    let expected = buffer.expected_len();
    if buffer.rgba.len() != expected {
        return Err(MediaError::encode(format!(
            "buffer holds {} bytes, {}x{} needs {}",
            buffer.rgba.len(),
            buffer.width,
            buffer.height,
            expected
        )));
    }

    let img = RgbaImage::from_raw(buffer.width, buffer.height, buffer.rgba)
        .ok_or_else(|| MediaError::encode("pixel buffer does not match its dimensions"))?;

    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageOutputFormat::Png)
        .map_err(|e| MediaError::encode(e.to_string()))?;

    Ok(out.into_inner())
}

/// Decode an encoded image (PNG, as produced by a canvas) into RGBA pixels.
pub fn decode_image(bytes: &[u8]) -> MediaResult<PixelBuffer> {
    let img = image::load_from_memory(bytes).map_err(|e| MediaError::decode(e.to_string()))?;
    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    Ok(PixelBuffer::new(width, height, rgba.into_raw()))
}
