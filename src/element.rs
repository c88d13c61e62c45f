use log::{debug, warn};

use super::bitmap::{Bitmap, PixelLayout};
use super::error::{Error, Result};
use super::format::Progress;
use super::icontype::{Compression, IconType, OSType};
#[cfg(feature = "jp2io")]
use super::jp2io;
#[cfg(feature = "pngio")]
use super::pngio;
use super::span::ByteSpan;

/// The length of a chunk header (tag plus length), in bytes.
pub const CHUNK_HEADER_LENGTH: usize = 8;

/// One decodable chunk found while walking an ICNS file.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Entry {
    /// The chunk tag.
    pub ostype: OSType,
    /// The icon type the tag maps to.
    pub icon_type: IconType,
    /// Offset of the payload (just past the chunk header) within the file.
    pub offset: usize,
    /// Length of the payload, in bytes.
    pub size: usize,
}

impl Entry {
    /// Creates an entry for the chunk whose header starts at `chunk_start`.
    pub fn new(icon_type: IconType, chunk_start: usize, chunk_length: usize) -> Entry {
        Entry {
            ostype: icon_type.ostype(),
            icon_type,
            offset: chunk_start + CHUNK_HEADER_LENGTH,
            size: chunk_length - CHUNK_HEADER_LENGTH,
        }
    }

    /// Returns the compression kind of the payload.
    pub fn compression(&self) -> Compression {
        self.icon_type.compression()
    }

    /// Returns the bits per pixel of the payload.
    pub fn source_bpp(&self) -> u32 {
        self.icon_type.source_bpp()
    }

    /// Returns the bits per pixel of the decoded buffer.
    pub fn dest_bpp(&self) -> u32 {
        self.icon_type.dest_bpp()
    }

    /// Returns the edge length of the decoded icon, in pixels.
    pub fn edge_size(&self) -> u32 {
        self.icon_type.edge_size()
    }

    /// Decodes the entry's payload out of `file`.  `mask`, when given, is the
    /// 8-bit mask entry used as alpha for 32-bit PackBits icons.
    pub fn decode(&self,
                  file: ByteSpan,
                  mask: Option<&Entry>,
                  progress: &mut Progress)
                  -> Result<Bitmap> {
        let data = file.slice(self.offset, self.size)?;
        debug!("decoding {} ({} compression, {} bytes)",
               self.ostype,
               self.compression(),
               data.len());
        if self.compression() == Compression::PngOrJpeg2000 {
            return decode_embedded(data, self.edge_size(), progress);
        }

        let edge = self.edge_size();
        let layout = match self.dest_bpp() {
            32 => PixelLayout::Rgba,
            24 => PixelLayout::Rgb,
            _ => PixelLayout::Gray,
        };
        let pitch = self.dest_bpp() * edge / 8;
        let mut bitmap = Bitmap::with_pitch(layout, edge, edge, pitch)?;
        bitmap.set_bpp_image(self.source_bpp());
        let channels = layout.channels() as usize;

        if self.compression() == Compression::Pack {
            let alpha = match mask {
                Some(mask) if channels == 4 => {
                    Some(file.slice(mask.offset, mask.size)?)
                }
                _ => None,
            };
            // it32 data may start with four zero bytes.
            let data = if self.icon_type == IconType::RGB24_128x128 && data.starts_with(&[0; 4]) {
                &data[4..]
            } else {
                data
            };
            decode_planar_rgb(data, edge as usize, bitmap.pixels_mut(), channels, alpha)?;
        } else {
            match self.source_bpp() {
                32 => reorder(data, bitmap.pixels_mut(), &[1, 0, 2, 3]),
                24 => reorder(data, bitmap.pixels_mut(), &[1, 0, 2]),
                1 => expand_bits(data, bitmap.pixels_mut(), 1),
                4 => expand_bits(data, bitmap.pixels_mut(), 4),
                _ => {
                    let length = data.len().min(bitmap.pixels().len());
                    if length < data.len() {
                        debug!("{}: ignoring {} trailing byte(s)",
                               self.ostype,
                               data.len() - length);
                    }
                    bitmap.pixels_mut()[..length].copy_from_slice(&data[..length]);
                }
            }
        }
        progress.report(100)?;
        Ok(bitmap)
    }
}

/// Decodes a PNG or JPEG 2000 payload.
#[cfg_attr(not(any(feature = "pngio", feature = "jp2io")), allow(unused_variables))]
fn decode_embedded(data: &[u8], edge: u32, progress: &mut Progress) -> Result<Bitmap> {
    #[cfg(feature = "pngio")]
    {
        if pngio::is_png(data) {
            let bitmap = pngio::decode_png_slice(data, progress)?;
            check_edge(&bitmap, edge);
            return Ok(bitmap);
        }
    }
    if is_jpeg2000(data) {
        #[cfg(feature = "jp2io")]
        {
            let bitmap = jp2io::decode_jp2(data)?;
            check_edge(&bitmap, edge);
            progress.report(100)?;
            return Ok(bitmap);
        }
        #[cfg(not(feature = "jp2io"))]
        return Err(Error::Decode("JPEG 2000 support is disabled".to_string()));
    }
    Err(Error::Decode("embedded image is neither PNG nor JPEG 2000".to_string()))
}

#[cfg_attr(not(any(feature = "pngio", feature = "jp2io")), allow(dead_code))]
fn check_edge(bitmap: &Bitmap, edge: u32) {
    if bitmap.width() != edge || bitmap.height() != edge {
        warn!("embedded image is {}x{} instead of {}x{}",
              bitmap.width(),
              bitmap.height(),
              edge,
              edge);
    }
}

/// JPEG 2000 files start either with a signature box or a bare codestream.
const JP2_SIGNATURE: &[u8] = b"\x00\x00\x00\x0cjP  \r\n\x87\n";
const J2K_CODESTREAM_SIGNATURE: &[u8] = b"\xff\x4f\xff\x51";

/// Returns true if `data` starts like a JPEG 2000 file or codestream.
pub fn is_jpeg2000(data: &[u8]) -> bool {
    data.starts_with(JP2_SIGNATURE) || data.starts_with(J2K_CODESTREAM_SIGNATURE)
}

/// Unpacks PackBits-compressed planar RGB (all red, then green, then blue)
/// into interleaved pixels with `channels` channels.  For four channels the
/// alpha comes from `alpha` when present, otherwise it is opaque.
fn decode_planar_rgb(input: &[u8],
                     edge: usize,
                     output: &mut [u8],
                     channels: usize,
                     alpha: Option<&[u8]>)
                     -> Result<()> {
    let num_pixels = edge * edge;
    let mut planes = vec![0u8; 3 * num_pixels];
    let written = super::rle::unpack_bits(input, &mut planes)?;
    if written != planes.len() {
        let msg = format!("PackBits data holds {} of {} bytes", written, planes.len());
        return Err(Error::Decode(msg));
    }
    for (pixel, out) in output.chunks_exact_mut(channels).take(num_pixels).enumerate() {
        for channel in 0..3 {
            out[channel] = planes[channel * num_pixels + pixel];
        }
        if channels == 4 {
            out[3] = match alpha {
                Some(alpha) => alpha.get(pixel).copied().unwrap_or(u8::MAX),
                None => u8::MAX,
            };
        }
    }
    Ok(())
}

/// Copies whole source pixels of `order.len()` bytes, placing source byte
/// `order[i]` at destination byte `i`.
fn reorder(input: &[u8], output: &mut [u8], order: &[usize]) {
    let size = order.len();
    for (src, dst) in input.chunks_exact(size).zip(output.chunks_exact_mut(size)) {
        for (i, &from) in order.iter().enumerate() {
            dst[i] = src[from];
        }
    }
}

/// Expands 1-bit or 4-bit pixels to 8-bit gray.  Set bits in 1-bit icons are
/// black.
fn expand_bits(input: &[u8], output: &mut [u8], bits: u32) {
    let per_byte = (8 / bits) as usize;
    let mut out = output.iter_mut();
    for &byte in input {
        for index in 0..per_byte {
            let shift = 8 - bits * (index as u32 + 1);
            let value = (byte >> shift) & ((1 << bits) - 1) as u8;
            let gray = match bits {
                1 => if value != 0 { 0 } else { u8::MAX },
                _ => value * 17,
            };
            match out.next() {
                Some(slot) => *slot = gray,
                None => return,
            }
        }
    }
}
