//! GIMP XCF files: header, property lists and layer table.
//!
//! Every offset or length read from the file is checked against the file
//! size before it is used; a failed check aborts the whole parse with
//! [`Error::Corrupt`].

use log::{debug, trace, warn};
use std::path::Path;

use super::bitmap::Bitmap;
use super::error::{Error, Result};
use super::format::{clamp_sub_image, ImageFormat, Progress};
use super::span::{self, ByteSpan};
use super::xcftile;

/// Edge length of the square tiles layer pixels are stored in.
pub const TILE_EDGE: u32 = 64;

/// Bytes that must be present for a file to be considered at all: the
/// 14-byte magic plus room for the header fields and a first property.
const MINIMUM_FILE_LENGTH: usize = 14 + 7 * 4;

/// Offset of the canvas width, just past the NUL-terminated magic.
const HEADER_LENGTH: usize = 14;

/// Terminates a property list.
pub const PROP_END: u32 = 0;
/// Palette of an indexed image.
pub const PROP_COLORMAP: u32 = 1;
/// Layer opacity, 0 to 255.
pub const PROP_OPACITY: u32 = 6;
/// Layer blend mode.
pub const PROP_MODE: u32 = 7;
/// Layer visibility flag.
pub const PROP_VISIBLE: u32 = 8;
/// Whether the layer mask is applied.
pub const PROP_APPLY_MASK: u32 = 11;
/// Layer position on the canvas.
pub const PROP_OFFSETS: u32 = 15;
/// Tile compression of the whole image.
pub const PROP_COMPRESSION: u32 = 17;

/// Tile data is stored uncompressed.
pub const COMPRESS_NONE: u8 = 0;
/// Tile data is run-length encoded per channel.
pub const COMPRESS_RLE: u8 = 1;

/// The layer blend mode written by GIMP for "normal" layers.
pub const NORMAL_MODE: u32 = 0;

fn property_name(kind: u32) -> &'static str {
    match kind {
        PROP_END => "end",
        PROP_COLORMAP => "colormap",
        PROP_OPACITY => "opacity",
        PROP_MODE => "mode",
        PROP_VISIBLE => "visible",
        PROP_APPLY_MASK => "apply-mask",
        PROP_OFFSETS => "offsets",
        PROP_COMPRESSION => "compression",
        _ => "unknown",
    }
}

/// Returns the XCF version if `header` starts with one of the recognized
/// magic strings (`gimp xcf file` for version 0, `gimp xcf vNNN` after).
pub fn detect_version(header: &[u8]) -> Option<u32> {
    if header.len() < HEADER_LENGTH || header[13] != 0 {
        return None;
    }
    if &header[..13] == b"gimp xcf file" {
        return Some(0);
    }
    let digits = header[..13].strip_prefix(b"gimp xcf v")?;
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    digits.iter().try_fold(0u32, |version, &digit| {
        version.checked_mul(10)?.checked_add(u32::from(digit - b'0'))
    })
}

/// One property record.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Property {
    /// The property type (`PROP_*`).
    pub kind: u32,
    /// Offset of the record header within the file.
    pub offset: usize,
    /// Offset of the payload.
    pub body: usize,
    /// Payload length actually used to advance past the record.
    pub length: usize,
}

/// Reads the property record at `*cursor` and advances the cursor past it.
///
/// Properties whose payload is interpreted directly must declare at least
/// the length they need.  For colormaps the length field is ignored and
/// `4 + 3 * ncolors` is used instead, because older GIMP versions wrote a
/// wrong value there and readers always trusted the color count.
pub fn next_property(file: ByteSpan, cursor: &mut usize) -> Result<Property> {
    let ptr = *cursor;
    file.require(ptr, 8, "property header")?;
    let kind = file.read_u32_be(ptr)?;
    let mut length = file.read_u32_be(ptr + 4)? as usize;
    let body = ptr + 8;

    let minimum = match kind {
        PROP_COLORMAP => {
            file.require(body, 4, "colormap length")?;
            let colors = file.read_u32_be(body)?;
            if colors > 256 {
                return Err(Error::Corrupt(format!("colormap has {} entries", colors)));
            }
            length = 4 + 3 * colors as usize;
            length
        }
        PROP_COMPRESSION => 1,
        PROP_OPACITY | PROP_MODE | PROP_VISIBLE | PROP_APPLY_MASK => 4,
        PROP_OFFSETS => 8,
        _ => 0,
    };
    if length < minimum {
        let msg = format!("short {} property at {:#x} ({} < {})",
                          property_name(kind),
                          ptr,
                          length,
                          minimum);
        return Err(Error::Corrupt(msg));
    }

    if kind == PROP_END {
        *cursor = body;
        return Ok(Property { kind, offset: ptr, body, length: 0 });
    }
    // The record must be followed by at least another property header.
    let total = length.checked_add(16)
        .ok_or_else(|| Error::Corrupt(format!("overlong property at {:#x}", ptr)))?;
    file.require(ptr, total, "property")?;
    *cursor = body + length;
    trace!("property {} ({}) at {:#x}, {} bytes", kind, property_name(kind), ptr, length);
    Ok(Property { kind, offset: ptr, body, length })
}

/// Reads the 32-bit offset stored at `at` and checks that `space_after` bytes
/// starting at the offset are inside the file.
pub(crate) fn read_offset(file: ByteSpan, at: usize, space_after: usize) -> Result<u32> {
    file.require(at, 4, "offset")?;
    let offset = file.read_u32_be(at)?;
    if !file.contains(offset as usize, space_after) {
        let msg = format!("too large offset ({:#x}) at position {:#x}", offset, at);
        return Err(Error::Corrupt(msg));
    }
    Ok(offset)
}

/// Reads a length-prefixed, NUL-terminated string at `*cursor` and advances
/// the cursor past it.
pub(crate) fn read_string(file: ByteSpan, cursor: &mut usize) -> Result<String> {
    let ptr = *cursor;
    let length = file.read_u32_be(ptr)? as usize;
    file.require(ptr + 4, length, "string")?;
    let bytes = file.slice(ptr + 4, length)?;
    match bytes.split_last() {
        Some((0, text)) => {
            if text.contains(&0) {
                let msg = format!("string at {:#x} has embedded zeroes", ptr);
                return Err(Error::Corrupt(msg));
            }
            *cursor = ptr + 4 + length;
            Ok(String::from_utf8_lossy(text).into_owned())
        }
        _ => Err(Error::Corrupt(format!("string at {:#x} not zero-terminated", ptr))),
    }
}

/// A rectangle on the canvas; `right` and `bottom` are exclusive.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[allow(missing_docs)]
pub struct Rect {
    pub left: i64,
    pub top: i64,
    pub right: i64,
    pub bottom: i64,
}

/// How a layer's pixels divide into tiles.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TileGeometry {
    /// Tiles per row of tiles.
    pub tiles_across: u32,
    /// Rows of tiles.
    pub tiles_down: u32,
    /// Total number of tiles.
    pub tile_count: u32,
}

impl TileGeometry {
    /// Computes the tiling of a `width` x `height` pixel area.
    pub fn new(width: u32, height: u32) -> TileGeometry {
        let tiles_across = width.div_ceil(TILE_EDGE);
        let tiles_down = height.div_ceil(TILE_EDGE);
        TileGeometry {
            tiles_across,
            tiles_down,
            tile_count: tiles_across.saturating_mul(tiles_down),
        }
    }
}

/// The pixel type of a layer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[allow(missing_docs)]
pub enum LayerType {
    Rgb,
    RgbAlpha,
    Gray,
    GrayAlpha,
    Indexed,
    IndexedAlpha,
}

impl LayerType {
    /// Maps the on-disk layer type number.
    pub fn from_u32(value: u32) -> Option<LayerType> {
        match value {
            0 => Some(LayerType::Rgb),
            1 => Some(LayerType::RgbAlpha),
            2 => Some(LayerType::Gray),
            3 => Some(LayerType::GrayAlpha),
            4 => Some(LayerType::Indexed),
            5 => Some(LayerType::IndexedAlpha),
            _ => None,
        }
    }

    /// Returns the number of bytes per pixel in the tile data.
    pub fn channels(self) -> u32 {
        match self {
            LayerType::Rgb => 3,
            LayerType::RgbAlpha => 4,
            LayerType::Gray | LayerType::Indexed => 1,
            LayerType::GrayAlpha | LayerType::IndexedAlpha => 2,
        }
    }

    /// Returns true if the last channel is alpha.
    pub fn has_alpha(self) -> bool {
        matches!(self,
                 LayerType::RgbAlpha | LayerType::GrayAlpha | LayerType::IndexedAlpha)
    }
}

/// One layer of an XCF image.
#[derive(Clone, Debug, PartialEq)]
pub struct Layer {
    /// The layer name, decoded lossily as UTF-8.
    pub name: String,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Raw layer type number; see [`LayerType::from_u32`].
    pub kind: u32,
    /// Horizontal position on the canvas.
    pub left: i32,
    /// Vertical position on the canvas.
    pub top: i32,
    /// Blend mode; zero is normal.
    pub mode: u32,
    /// Layer opacity, clamped to 255.
    pub opacity: u32,
    /// False if the layer is hidden.
    pub visible: bool,
    /// True if the layer mask is applied.
    pub has_mask: bool,
    /// Offset of the pixel tile hierarchy.
    pub pixels: u32,
    /// Offset of the layer mask, or zero.
    pub mask: u32,
}

impl Layer {
    /// Returns the tiling of the layer's pixels.
    pub fn tile_geometry(&self) -> TileGeometry {
        TileGeometry::new(self.width, self.height)
    }

    /// Returns the layer's rectangle on the canvas.
    pub fn bounds(&self) -> Rect {
        Rect {
            left: i64::from(self.left),
            top: i64::from(self.top),
            right: i64::from(self.left) + i64::from(self.width),
            bottom: i64::from(self.top) + i64::from(self.height),
        }
    }

    fn parse(file: ByteSpan, offset: usize) -> Result<Layer> {
        file.require(offset, 12, "layer header")?;
        let mut ptr = offset;
        let width = file.read_u32_be(ptr)?;
        let height = file.read_u32_be(ptr + 4)?;
        let kind = file.read_u32_be(ptr + 8)?;
        ptr += 12;
        let name = read_string(file, &mut ptr)?;
        let mut layer = Layer {
            name,
            width,
            height,
            kind,
            left: 0,
            top: 0,
            mode: NORMAL_MODE,
            opacity: 255,
            visible: true,
            has_mask: false,
            pixels: 0,
            mask: 0,
        };
        loop {
            let prop = next_property(file, &mut ptr)?;
            match prop.kind {
                PROP_END => break,
                PROP_OPACITY => layer.opacity = file.read_u32_be(prop.body)?.min(255),
                PROP_VISIBLE => layer.visible = file.read_u32_be(prop.body)? != 0,
                PROP_APPLY_MASK => layer.has_mask = file.read_u32_be(prop.body)? != 0,
                PROP_OFFSETS => {
                    layer.left = file.read_u32_be(prop.body)? as i32;
                    layer.top = file.read_u32_be(prop.body + 4)? as i32;
                }
                PROP_MODE => layer.mode = file.read_u32_be(prop.body)?,
                _ => {}
            }
        }
        file.require(ptr, 8, &format!("end of layer '{}'", layer.name))?;
        layer.pixels = read_offset(file, ptr, 4 * 4)?;
        layer.mask = read_offset(file, ptr + 4, 4 * 4)?;
        debug!("layer '{}': {}x{} at ({}, {}), {} tile(s)",
               layer.name,
               layer.width,
               layer.height,
               layer.left,
               layer.top,
               layer.tile_geometry().tile_count);
        Ok(layer)
    }
}

/// The metadata of an XCF file: canvas, colormap and layers.
#[derive(Clone, Debug, PartialEq)]
pub struct XcfImage {
    /// File format version, 0 to 3.
    pub version: u32,
    /// Canvas width in pixels.
    pub width: u32,
    /// Canvas height in pixels.
    pub height: u32,
    /// Base image type: 0 RGB, 1 grayscale, 2 indexed.
    pub base_type: u32,
    /// Tile compression (`COMPRESS_*`).
    pub compression: u8,
    /// Palette for indexed layers.
    pub colormap: Option<Vec<[u8; 3]>>,
    /// Layers in processing order, bottom layer first.
    pub layers: Vec<Layer>,
}

impl XcfImage {
    /// Parses the header, property list and layer table of an XCF file.
    pub fn parse(file: ByteSpan) -> Result<XcfImage> {
        let version = match detect_version(file.bytes()) {
            Some(version) => version,
            None => return Err(Error::mismatch("XCF", "magic not recognized")),
        };
        if version > 3 {
            return Err(Error::mismatch("XCF", format!("version {} not supported", version)));
        }
        if version == 3 {
            warn!("XCF version 3 not fully supported (trying anyway...)");
        }
        file.require(0, MINIMUM_FILE_LENGTH, "header")?;

        let mut ptr = HEADER_LENGTH;
        let width = file.read_u32_be(ptr)?;
        let height = file.read_u32_be(ptr + 4)?;
        let base_type = file.read_u32_be(ptr + 8)?;
        ptr += 12;

        let mut compression = COMPRESS_NONE;
        let mut colormap = None;
        loop {
            let prop = next_property(file, &mut ptr)?;
            match prop.kind {
                PROP_END => break,
                PROP_COLORMAP => colormap = Some(read_colormap(file, prop)?),
                PROP_COMPRESSION => compression = file.read_u8(prop.body)?,
                _ => {}
            }
        }

        let layer_table = ptr;
        let mut offsets = Vec::new();
        loop {
            let offset = read_offset(file, ptr, 8 * 4)?;
            if offset == 0 {
                break;
            }
            offsets.push(offset as usize);
            ptr += 4;
        }
        debug!("XCF v{}: {}x{}, {} layer(s) listed at {:#x}",
               version,
               width,
               height,
               offsets.len(),
               layer_table);

        let layers = offsets.iter()
            .rev()
            .map(|&offset| Layer::parse(file, offset))
            .collect::<Result<Vec<Layer>>>()?;
        Ok(XcfImage {
            version,
            width,
            height,
            base_type,
            compression,
            colormap,
            layers,
        })
    }
}

fn read_colormap(file: ByteSpan, prop: Property) -> Result<Vec<[u8; 3]>> {
    let colors = file.read_u32_be(prop.body)? as usize;
    let bytes = file.slice(prop.body + 4, 3 * colors)?;
    Ok(bytes.chunks_exact(3).map(|rgb| [rgb[0], rgb[1], rgb[2]]).collect())
}

struct Loaded {
    data: Vec<u8>,
    image: XcfImage,
}

/// GIMP XCF files.  Every layer is one sub-image.
#[derive(Default)]
pub struct XcfFormat {
    loaded: Option<Loaded>,
}

impl XcfFormat {
    /// Creates a format handler with nothing loaded.
    pub fn new() -> XcfFormat {
        XcfFormat { loaded: None }
    }

    /// Returns the metadata read by the last successful load.
    pub fn image(&self) -> Option<&XcfImage> {
        self.loaded.as_ref().map(|loaded| &loaded.image)
    }

    fn decode(&self, index: u32, progress: &mut Progress) -> Result<Bitmap> {
        let loaded = self.loaded.as_ref().ok_or(Error::NotLoaded)?;
        let count = loaded.image.layers.len() as u32;
        let current = clamp_sub_image(index, count);
        let layer = &loaded.image.layers[current as usize];
        let mut bitmap = xcftile::decode_layer(ByteSpan::new(&loaded.data),
                                               &loaded.image,
                                               layer,
                                               progress)?;
        bitmap.set_sub_image(current, count);
        Ok(bitmap)
    }
}

impl ImageFormat for XcfFormat {
    fn name(&self) -> &'static str {
        "xcf"
    }

    fn is_supported(&self, header: &[u8], file_size: u64) -> bool {
        match detect_version(header) {
            Some(version) => version <= 3 && file_size >= MINIMUM_FILE_LENGTH as u64,
            None => false,
        }
    }

    fn load(&mut self,
            path: &Path,
            sub_image: u32,
            progress: &mut Progress)
            -> Result<Bitmap> {
        self.loaded = None;
        let data = span::read_file(path)?;
        let image = XcfImage::parse(ByteSpan::new(&data))?;
        if image.layers.is_empty() {
            return Err(Error::Corrupt("XCF file has no layers".to_string()));
        }
        self.loaded = Some(Loaded { data, image });
        self.decode(sub_image, progress)
    }

    fn load_sub_image(&mut self, index: u32, progress: &mut Progress) -> Result<Bitmap> {
        self.decode(index, progress)
    }

    fn free_memory(&mut self) {
        self.loaded = None;
    }
}
