use hayro_jpeg2000::{self, ColorSpace};

use super::bitmap::{Bitmap, PixelLayout};
use super::error::{Error, Result};

/// Decodes a JPEG 2000 file or codestream held in memory.
pub fn decode_jp2(input: &[u8]) -> Result<Bitmap> {
    let image = hayro_jpeg2000::Image::new(
        input,
        &hayro_jpeg2000::DecodeSettings {
            resolve_palette_indices: true,
            strict: false,
            target_resolution: None,
        },
    )
    .map_err(|err| Error::Decode(format!("JPEG 2000: {}", err)))?;

    let layout = match image.color_space() {
        ColorSpace::Gray if image.has_alpha() => PixelLayout::GrayAlpha,
        ColorSpace::Gray => PixelLayout::Gray,
        ColorSpace::RGB if image.has_alpha() => PixelLayout::Rgba,
        ColorSpace::RGB => PixelLayout::Rgb,
        ColorSpace::CMYK => {
            return Err(Error::Decode("JPEG 2000 images with CMYK color space \
                                      are not supported"
                .to_string()));
        }
        ColorSpace::Unknown { num_channels } => {
            return Err(Error::Decode(format!("JPEG 2000 images with unknown \
                                              ({num_channels}-channel) color \
                                              space are not supported")));
        }
        ColorSpace::Icc { .. } => {
            return Err(Error::Decode("JPEG 2000 images with ICC profile are \
                                      not supported"
                .to_string()));
        }
    };
    let (width, height) = (image.width(), image.height());
    let samples = image
        .decode()
        .map_err(|err| Error::Decode(format!("JPEG 2000: {}", err)))?;

    let mut bitmap = Bitmap::new(layout, width, height)?;
    let row_length = (width * layout.channels()) as usize;
    if samples.len() != row_length * height as usize {
        let msg = format!("JPEG 2000 decoder returned {} bytes for a {}x{} image",
                          samples.len(),
                          width,
                          height);
        return Err(Error::Decode(msg));
    }
    for (y, row) in samples.chunks_exact(row_length).enumerate() {
        bitmap.row_mut(y as u32)[..row_length].copy_from_slice(row);
    }
    Ok(bitmap)
}
