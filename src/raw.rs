use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::{debug, warn};
use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use super::bitmap::{Bitmap, PixelLayout};
use super::error::{Error, Result};
use super::format::{ImageFormat, Progress};
use super::rle;

/// The first four bytes of a RAW file:
pub const RAW_MAGIC_LITERAL: &[u8; 4] = b"RAWv";

/// The length of a RAW header, in bytes:
pub const RAW_HEADER_LENGTH: usize = 24;

/// Pixel format of a RAW payload.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RawPixelFormat {
    /// One alpha byte per pixel.
    Alpha,
    /// Red, green, blue.
    Rgb,
    /// Red, green, blue, alpha.
    Rgba,
}

impl RawPixelFormat {
    /// Maps the on-disk format number.
    pub fn from_u32(value: u32) -> Option<RawPixelFormat> {
        match value {
            0 => Some(RawPixelFormat::Alpha),
            1 => Some(RawPixelFormat::Rgb),
            2 => Some(RawPixelFormat::Rgba),
            _ => None,
        }
    }

    /// Returns the on-disk format number.
    pub fn to_u32(self) -> u32 {
        match self {
            RawPixelFormat::Alpha => 0,
            RawPixelFormat::Rgb => 1,
            RawPixelFormat::Rgba => 2,
        }
    }

    /// Returns the layout of decoded pixels.  Alpha-only data is
    /// single-channel.
    pub fn layout(self) -> PixelLayout {
        match self {
            RawPixelFormat::Alpha => PixelLayout::Gray,
            RawPixelFormat::Rgb => PixelLayout::Rgb,
            RawPixelFormat::Rgba => PixelLayout::Rgba,
        }
    }
}

/// Compression of a RAW payload.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RawCompression {
    /// Rows stored back to back, unpadded.
    None,
    /// Byte-oriented PackBits.
    PackBits,
    /// Word-oriented RLE4.
    Rle4,
}

impl RawCompression {
    /// Maps the on-disk compression number.
    pub fn from_u32(value: u32) -> Option<RawCompression> {
        match value {
            0 => Some(RawCompression::None),
            1 => Some(RawCompression::PackBits),
            2 => Some(RawCompression::Rle4),
            _ => None,
        }
    }

    /// Returns the on-disk compression number.
    pub fn to_u32(self) -> u32 {
        match self {
            RawCompression::None => 0,
            RawCompression::PackBits => 1,
            RawCompression::Rle4 => 2,
        }
    }
}

/// The fixed header at the start of every RAW file.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RawHeader {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Pixel format of the payload.
    pub format: RawPixelFormat,
    /// Compression of the payload.
    pub compression: RawCompression,
    /// Length of the payload following the header.
    pub data_size: u32,
}

impl RawHeader {
    /// Reads a header.  Fails with a format mismatch if the magic or one of
    /// the enumerations is not recognized.
    pub fn read<R: Read>(mut reader: R) -> Result<RawHeader> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != RAW_MAGIC_LITERAL {
            return Err(Error::mismatch("RAW", "wrong magic literal"));
        }
        let width = reader.read_u32::<LittleEndian>()?;
        let height = reader.read_u32::<LittleEndian>()?;
        let format = reader.read_u32::<LittleEndian>()?;
        let compression = reader.read_u32::<LittleEndian>()?;
        let data_size = reader.read_u32::<LittleEndian>()?;
        let format = RawPixelFormat::from_u32(format)
            .ok_or_else(|| Error::mismatch("RAW", format!("unknown pixel format {}", format)))?;
        let compression = RawCompression::from_u32(compression)
            .ok_or_else(|| {
                Error::mismatch("RAW", format!("unknown compression {}", compression))
            })?;
        Ok(RawHeader {
            width,
            height,
            format,
            compression,
            data_size,
        })
    }

    /// Writes the header to a RAW file (or other writer).
    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(RAW_MAGIC_LITERAL)?;
        writer.write_u32::<LittleEndian>(self.width)?;
        writer.write_u32::<LittleEndian>(self.height)?;
        writer.write_u32::<LittleEndian>(self.format.to_u32())?;
        writer.write_u32::<LittleEndian>(self.compression.to_u32())?;
        writer.write_u32::<LittleEndian>(self.data_size)?;
        Ok(())
    }

    /// Returns true if the header's payload exactly fills a file of
    /// `file_size` bytes.
    pub fn matches_file_size(&self, file_size: u64) -> bool {
        u64::from(self.data_size) + RAW_HEADER_LENGTH as u64 == file_size
    }

    /// Returns the length of one unpadded pixel row.
    pub fn pitch(&self) -> Result<u32> {
        self.width
            .checked_mul(self.format.layout().channels())
            .ok_or_else(|| Error::Corrupt(format!("width {} is too large", self.width)))
    }
}

/// The viewer's own uncompressed/RLE container.  Always a single image.
#[derive(Default)]
pub struct RawFormat {
    path: Option<PathBuf>,
}

impl RawFormat {
    /// Creates a format handler with nothing loaded.
    pub fn new() -> RawFormat {
        RawFormat { path: None }
    }
}

impl ImageFormat for RawFormat {
    fn name(&self) -> &'static str {
        "raw"
    }

    fn is_supported(&self, header: &[u8], file_size: u64) -> bool {
        if header.len() < RAW_HEADER_LENGTH {
            return false;
        }
        match RawHeader::read(header) {
            Ok(header) => header.matches_file_size(file_size),
            Err(_) => false,
        }
    }

    fn load(&mut self,
            path: &Path,
            _sub_image: u32,
            progress: &mut Progress)
            -> Result<Bitmap> {
        self.path = None;
        let file = File::open(path)?;
        let file_size = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        let header = RawHeader::read(&mut reader)?;
        if !header.matches_file_size(file_size) {
            let msg = format!("payload of {} bytes does not fill a {}-byte file",
                              header.data_size,
                              file_size);
            return Err(Error::mismatch("RAW", msg));
        }
        debug!("RAW {}x{} {:?}, {:?}, {} bytes",
               header.width,
               header.height,
               header.format,
               header.compression,
               header.data_size);
        let bitmap = read_pixels(&mut reader, &header, progress)?;
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

/// Reads the payload following `header` into a bitmap with an unpadded
/// pitch.
pub fn read_pixels<R: Read>(reader: &mut R,
                            header: &RawHeader,
                            progress: &mut Progress)
                            -> Result<Bitmap> {
    let pitch = header.pitch()?;
    let needed = u64::from(pitch) * u64::from(header.height);
    if header.compression == RawCompression::None && u64::from(header.data_size) < needed {
        let msg = format!("{} bytes of pixels, {}x{} image needs {}",
                          header.data_size,
                          header.width,
                          header.height,
                          needed);
        return Err(Error::Corrupt(msg));
    }
    let mut bitmap = Bitmap::with_pitch(header.format.layout(),
                                        header.width,
                                        header.height,
                                        pitch)?;

    if header.compression == RawCompression::None {
        for y in 0..header.height {
            reader.read_exact(&mut bitmap.row_mut(y)[..pitch as usize])?;
            progress.report_fraction(u64::from(y) + 1, u64::from(header.height))?;
        }
        return Ok(bitmap);
    }

    let mut packed = vec![0u8; header.data_size as usize];
    reader.read_exact(&mut packed)?;
    progress.report(50)?;
    let decoded = match header.compression {
        RawCompression::Rle4 => 4 * rle::unpack_words(&packed, bitmap.pixels_mut())?,
        _ => rle::unpack_bits(&packed, bitmap.pixels_mut())?,
    };
    if decoded == 0 {
        return Err(Error::Decode("RLE payload decoded to nothing".to_string()));
    }
    if decoded < bitmap.pixels().len() {
        warn!("RLE payload filled {} of {} bytes", decoded, bitmap.pixels().len());
    }
    progress.report(100)?;
    Ok(bitmap)
}
