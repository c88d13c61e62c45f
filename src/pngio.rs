use log::{debug, warn};
use std::fs::File;
use std::io::{BufRead, BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use super::bitmap::{Bitmap, PixelLayout};
use super::error::{Error, Result};
use super::format::{ImageFormat, Progress};

/// The eight bytes every PNG stream starts with.
pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

/// Returns true if `data` starts with the PNG signature.
pub fn is_png(data: &[u8]) -> bool {
    data.starts_with(&PNG_SIGNATURE)
}

/// Decodes a PNG stream held in memory.
pub fn decode_png_slice(data: &[u8], progress: &mut Progress) -> Result<Bitmap> {
    if !is_png(data) {
        return Err(Error::mismatch("PNG", "missing PNG signature"));
    }
    decode(Cursor::new(data), progress)
}

/// Decodes a PNG stream from `reader`, whose signature the caller has already
/// read and validated; the reader is positioned just past it.
pub fn decode_png_stream<R: BufRead + Seek>(mut reader: R,
                                            progress: &mut Progress)
                                            -> Result<Bitmap> {
    reader.seek(SeekFrom::Current(-(PNG_SIGNATURE.len() as i64)))?;
    decode(reader, progress)
}

fn decode<R: BufRead + Seek>(input: R, progress: &mut Progress) -> Result<Bitmap> {
    let mut decoder = png::Decoder::new(input);
    decoder.set_transformations(
        png::Transformations::EXPAND | png::Transformations::STRIP_16,
    );
    let info = decoder.read_header_info().map_err(png_error)?;
    let bpp_image = info.bit_depth as u32 * info.color_type.samples() as u32;
    let mut reader = decoder.read_info().map_err(png_error)?;

    let (color_type, bit_depth) = reader.output_color_type();
    if bit_depth != png::BitDepth::Eight {
        let msg = format!("PNG decoder produced {:?} samples", bit_depth);
        return Err(Error::Decode(msg));
    }
    let layout = match color_type {
        png::ColorType::Grayscale => PixelLayout::Gray,
        png::ColorType::GrayscaleAlpha => PixelLayout::GrayAlpha,
        png::ColorType::Rgb => PixelLayout::Rgb,
        png::ColorType::Rgba => PixelLayout::Rgba,
        png::ColorType::Indexed => {
            return Err(Error::Decode("PNG palette was not expanded".to_string()));
        }
    };
    let (width, height) = (reader.info().width, reader.info().height);
    let icc_profile = reader.info().icc_profile.as_ref().map(|profile| profile.to_vec());

    let mut bitmap = Bitmap::new(layout, width, height)?;
    bitmap.set_bpp_image(bpp_image);
    let pitch = bitmap.pitch() as usize;
    if reader.info().interlaced {
        // Adam7 rows arrive pass by pass, so take the assembled frame.
        let frame_size = reader.output_buffer_size()
            .ok_or_else(|| Error::Decode("PNG frame is too large".to_string()))?;
        let mut frame = vec![0u8; frame_size];
        let output = reader.next_frame(&mut frame).map_err(png_error)?;
        let line_size = output.line_size;
        for (y, line) in frame.chunks(line_size).take(height as usize).enumerate() {
            copy_row(&mut bitmap, y as u32, line, pitch);
        }
        progress.report(100)?;
    } else {
        for y in 0..height {
            let row = match reader.next_row().map_err(png_error)? {
                Some(row) => row,
                None => {
                    let msg = format!("PNG stream ends after {} of {} rows", y, height);
                    return Err(Error::Decode(msg));
                }
            };
            copy_row(&mut bitmap, y, row.data(), pitch);
            progress.report_fraction(u64::from(y) + 1, u64::from(height))?;
        }
    }
    if let Err(err) = reader.finish() {
        warn!("ignoring trailing PNG data: {}", err);
    }

    if let Some(ref profile) = icc_profile {
        debug!("PNG carries a {}-byte color profile", profile.len());
    }
    bitmap.set_icc_profile(icc_profile);
    Ok(bitmap)
}

fn copy_row(bitmap: &mut Bitmap, y: u32, line: &[u8], pitch: usize) {
    if line.len() > pitch {
        warn!("source pitch {} is larger than destination pitch {}",
              line.len(),
              pitch);
    }
    let copy = line.len().min(pitch);
    bitmap.row_mut(y)[..copy].copy_from_slice(&line[..copy]);
}

fn png_error(err: png::DecodingError) -> Error {
    Error::Decode(format!("PNG: {}", err))
}

/// Standalone PNG files.
#[derive(Default)]
pub struct PngFormat {
    path: Option<PathBuf>,
}

impl PngFormat {
    /// Creates a format handler with nothing loaded.
    pub fn new() -> PngFormat {
        PngFormat { path: None }
    }
}

impl ImageFormat for PngFormat {
    fn name(&self) -> &'static str {
        "png"
    }

    fn is_supported(&self, header: &[u8], _file_size: u64) -> bool {
        is_png(header)
    }

    fn load(&mut self,
            path: &Path,
            _sub_image: u32,
            progress: &mut Progress)
            -> Result<Bitmap> {
        self.path = None;
        let mut reader = BufReader::new(File::open(path)?);
        let mut signature = [0u8; 8];
        reader.read_exact(&mut signature)?;
        if !is_png(&signature) {
            return Err(Error::mismatch("PNG", "missing PNG signature"));
        }
        let bitmap = decode_png_stream(reader, progress)?;
        self.path = Some(path.to_path_buf());
        Ok(bitmap)
    }

    fn load_sub_image(&mut self, _index: u32, progress: &mut Progress) -> Result<Bitmap> {
        match self.path.clone() {
            Some(path) => self.load(&path, 0, progress),
            None => Err(Error::NotLoaded),
        }
    }

    fn free_memory(&mut self) {
        self.path = None;
    }
}
