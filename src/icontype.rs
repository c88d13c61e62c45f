use std::fmt;
use std::str::FromStr;

/// Types of ICNS chunks that carry a decodable image.
#[allow(non_camel_case_types)]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum IconType {
    /// 32x32 1-bit mono icon (`ICON`).
    Mono1_32x32,
    /// 32x32 1-bit mono icon with 1-bit mask (`ICN#`).
    Mono1Mask_32x32,
    /// 16x12 1-bit mono icon with 1-bit mask (`icm#`).
    Mono1Mask_16x12,
    /// 16x12 4-bit icon (`icm4`).
    Color4_16x12,
    /// 16x12 8-bit icon (`icm8`).
    Color8_16x12,
    /// 16x16 1-bit mono icon with 1-bit mask (`ics#`).
    Mono1Mask_16x16,
    /// 16x16 4-bit icon (`ics4`).
    Color4_16x16,
    /// 16x16 8-bit icon (`ics8`).
    Color8_16x16,
    /// 16x16 24-bit icon (`is32`).
    RGB24_16x16,
    /// 16x16 8-bit alpha mask (`s8mk`).
    Mask8_16x16,
    /// 32x32 4-bit icon (`icl4`).
    Color4_32x32,
    /// 32x32 8-bit icon (`icl8`).
    Color8_32x32,
    /// 32x32 24-bit icon (`il32`).
    RGB24_32x32,
    /// 32x32 8-bit alpha mask (`l8mk`).
    Mask8_32x32,
    /// 48x48 1-bit mono icon with 1-bit mask (`ich#`).
    Mono1Mask_48x48,
    /// 48x48 4-bit icon (`ich4`).
    Color4_48x48,
    /// 48x48 8-bit icon (`ich8`).
    Color8_48x48,
    /// 48x48 24-bit icon (`ih32`).
    RGB24_48x48,
    /// 48x48 8-bit alpha mask (`h8mk`).
    Mask8_48x48,
    /// 128x128 24-bit icon (`it32`).
    RGB24_128x128,
    /// 128x128 8-bit alpha mask (`t8mk`).
    Mask8_128x128,
    /// 16x16 PNG or JPEG 2000 icon (`icp4`).
    RGBA32_16x16,
    /// 32x32 PNG or JPEG 2000 icon (`icp5`).
    RGBA32_32x32,
    /// 64x64 PNG or JPEG 2000 icon (`icp6`).
    RGBA32_64x64,
    /// 128x128 PNG or JPEG 2000 icon (`ic07`).
    RGBA32_128x128,
    /// 256x256 PNG or JPEG 2000 icon (`ic08`).
    RGBA32_256x256,
    /// 512x512 PNG or JPEG 2000 icon (`ic09`).
    RGBA32_512x512,
    /// 1024x1024 (512x512@2x) PNG or JPEG 2000 icon (`ic10`).
    RGBA32_512x512_2x,
    /// 32x32 (16x16@2x) PNG or JPEG 2000 icon (`ic11`).
    RGBA32_16x16_2x,
    /// 64x64 (32x32@2x) PNG or JPEG 2000 icon (`ic12`).
    RGBA32_32x32_2x,
    /// 256x256 (128x128@2x) PNG or JPEG 2000 icon (`ic13`).
    RGBA32_128x128_2x,
    /// 512x512 (256x256@2x) PNG or JPEG 2000 icon (`ic14`).
    RGBA32_256x256_2x,
}

/// What a chunk tag means to the chunk walker.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChunkRole {
    /// The `TOC ` chunk.  Informational only.
    TableOfContents,
    /// Non-image metadata such as `icnV`, `name` or `info`.
    Metadata,
    /// A chunk holding an image.
    Icon(IconType),
}

impl ChunkRole {
    /// Looks up the role of a chunk tag, or `None` for unknown tags.
    pub fn from_ostype(ostype: OSType) -> Option<ChunkRole> {
        match &ostype.0 {
            b"TOC " => Some(ChunkRole::TableOfContents),
            b"icnV" | b"name" | b"info" => Some(ChunkRole::Metadata),
            _ => IconType::from_ostype(ostype).map(ChunkRole::Icon),
        }
    }
}

impl IconType {
    /// Every icon type, in the order of the lookup table.
    pub const ALL: [IconType; 32] = [IconType::Mono1_32x32,
                                     IconType::Mono1Mask_32x32,
                                     IconType::Mono1Mask_16x12,
                                     IconType::Color4_16x12,
                                     IconType::Color8_16x12,
                                     IconType::Mono1Mask_16x16,
                                     IconType::Color4_16x16,
                                     IconType::Color8_16x16,
                                     IconType::RGB24_16x16,
                                     IconType::Mask8_16x16,
                                     IconType::Color4_32x32,
                                     IconType::Color8_32x32,
                                     IconType::RGB24_32x32,
                                     IconType::Mask8_32x32,
                                     IconType::Mono1Mask_48x48,
                                     IconType::Color4_48x48,
                                     IconType::Color8_48x48,
                                     IconType::RGB24_48x48,
                                     IconType::Mask8_48x48,
                                     IconType::RGB24_128x128,
                                     IconType::Mask8_128x128,
                                     IconType::RGBA32_16x16,
                                     IconType::RGBA32_32x32,
                                     IconType::RGBA32_64x64,
                                     IconType::RGBA32_128x128,
                                     IconType::RGBA32_256x256,
                                     IconType::RGBA32_512x512,
                                     IconType::RGBA32_512x512_2x,
                                     IconType::RGBA32_16x16_2x,
                                     IconType::RGBA32_32x32_2x,
                                     IconType::RGBA32_128x128_2x,
                                     IconType::RGBA32_256x256_2x];

    /// Get the icon type associated with the given OSType, if any.
    pub fn from_ostype(ostype: OSType) -> Option<IconType> {
        let OSType(raw_ostype) = ostype;
        match &raw_ostype {
            b"ICON" => Some(IconType::Mono1_32x32),
            b"ICN#" => Some(IconType::Mono1Mask_32x32),
            b"icm#" => Some(IconType::Mono1Mask_16x12),
            b"icm4" => Some(IconType::Color4_16x12),
            b"icm8" => Some(IconType::Color8_16x12),
            b"ics#" => Some(IconType::Mono1Mask_16x16),
            b"ics4" => Some(IconType::Color4_16x16),
            b"ics8" => Some(IconType::Color8_16x16),
            b"is32" => Some(IconType::RGB24_16x16),
            b"s8mk" => Some(IconType::Mask8_16x16),
            b"icl4" => Some(IconType::Color4_32x32),
            b"icl8" => Some(IconType::Color8_32x32),
            b"il32" => Some(IconType::RGB24_32x32),
            b"l8mk" => Some(IconType::Mask8_32x32),
            b"ich#" => Some(IconType::Mono1Mask_48x48),
            b"ich4" => Some(IconType::Color4_48x48),
            b"ich8" => Some(IconType::Color8_48x48),
            b"ih32" => Some(IconType::RGB24_48x48),
            b"h8mk" => Some(IconType::Mask8_48x48),
            b"it32" => Some(IconType::RGB24_128x128),
            b"t8mk" => Some(IconType::Mask8_128x128),
            b"icp4" => Some(IconType::RGBA32_16x16),
            b"icp5" => Some(IconType::RGBA32_32x32),
            b"icp6" => Some(IconType::RGBA32_64x64),
            b"ic07" => Some(IconType::RGBA32_128x128),
            b"ic08" => Some(IconType::RGBA32_256x256),
            b"ic09" => Some(IconType::RGBA32_512x512),
            b"ic10" => Some(IconType::RGBA32_512x512_2x),
            b"ic11" => Some(IconType::RGBA32_16x16_2x),
            b"ic12" => Some(IconType::RGBA32_32x32_2x),
            b"ic13" => Some(IconType::RGBA32_128x128_2x),
            b"ic14" => Some(IconType::RGBA32_256x256_2x),
            _ => None,
        }
    }

    /// Get the OSType that represents this icon type.
    pub fn ostype(self) -> OSType {
        let raw = match self {
            IconType::Mono1_32x32 => b"ICON",
            IconType::Mono1Mask_32x32 => b"ICN#",
            IconType::Mono1Mask_16x12 => b"icm#",
            IconType::Color4_16x12 => b"icm4",
            IconType::Color8_16x12 => b"icm8",
            IconType::Mono1Mask_16x16 => b"ics#",
            IconType::Color4_16x16 => b"ics4",
            IconType::Color8_16x16 => b"ics8",
            IconType::RGB24_16x16 => b"is32",
            IconType::Mask8_16x16 => b"s8mk",
            IconType::Color4_32x32 => b"icl4",
            IconType::Color8_32x32 => b"icl8",
            IconType::RGB24_32x32 => b"il32",
            IconType::Mask8_32x32 => b"l8mk",
            IconType::Mono1Mask_48x48 => b"ich#",
            IconType::Color4_48x48 => b"ich4",
            IconType::Color8_48x48 => b"ich8",
            IconType::RGB24_48x48 => b"ih32",
            IconType::Mask8_48x48 => b"h8mk",
            IconType::RGB24_128x128 => b"it32",
            IconType::Mask8_128x128 => b"t8mk",
            IconType::RGBA32_16x16 => b"icp4",
            IconType::RGBA32_32x32 => b"icp5",
            IconType::RGBA32_64x64 => b"icp6",
            IconType::RGBA32_128x128 => b"ic07",
            IconType::RGBA32_256x256 => b"ic08",
            IconType::RGBA32_512x512 => b"ic09",
            IconType::RGBA32_512x512_2x => b"ic10",
            IconType::RGBA32_16x16_2x => b"ic11",
            IconType::RGBA32_32x32_2x => b"ic12",
            IconType::RGBA32_128x128_2x => b"ic13",
            IconType::RGBA32_256x256_2x => b"ic14",
        };
        OSType(*raw)
    }

    /// Returns how the chunk payload is compressed.
    pub fn compression(self) -> Compression {
        match self {
            IconType::RGB24_16x16 |
            IconType::RGB24_32x32 |
            IconType::RGB24_48x48 |
            IconType::RGB24_128x128 => Compression::Pack,
            IconType::RGBA32_16x16 |
            IconType::RGBA32_32x32 |
            IconType::RGBA32_64x64 |
            IconType::RGBA32_128x128 |
            IconType::RGBA32_256x256 |
            IconType::RGBA32_512x512 |
            IconType::RGBA32_512x512_2x |
            IconType::RGBA32_16x16_2x |
            IconType::RGBA32_32x32_2x |
            IconType::RGBA32_128x128_2x |
            IconType::RGBA32_256x256_2x => Compression::PngOrJpeg2000,
            _ => Compression::None,
        }
    }

    /// Returns the bits per pixel of the payload as stored.
    pub fn source_bpp(self) -> u32 {
        match self {
            IconType::Mono1_32x32 |
            IconType::Mono1Mask_32x32 |
            IconType::Mono1Mask_16x12 |
            IconType::Mono1Mask_16x16 |
            IconType::Mono1Mask_48x48 => 1,
            IconType::Color4_16x12 |
            IconType::Color4_16x16 |
            IconType::Color4_32x32 |
            IconType::Color4_48x48 => 4,
            IconType::Color8_16x12 |
            IconType::Color8_16x16 |
            IconType::Color8_32x32 |
            IconType::Color8_48x48 |
            IconType::Mask8_16x16 |
            IconType::Mask8_32x32 |
            IconType::Mask8_48x48 |
            IconType::Mask8_128x128 => 8,
            IconType::RGB24_16x16 | IconType::RGB24_48x48 => 24,
            _ => 32,
        }
    }

    /// Returns the bits per pixel of the decoded buffer.
    pub fn dest_bpp(self) -> u32 {
        match self.source_bpp() {
            1 | 4 => 8,
            bpp => bpp,
        }
    }

    /// Returns the edge length of the (square) decoded icon, in pixels.
    pub fn edge_size(self) -> u32 {
        match self {
            IconType::Mono1Mask_16x12 |
            IconType::Color4_16x12 |
            IconType::Color8_16x12 |
            IconType::Mono1Mask_16x16 |
            IconType::Color4_16x16 |
            IconType::Color8_16x16 |
            IconType::RGB24_16x16 |
            IconType::Mask8_16x16 |
            IconType::RGBA32_16x16 => 16,
            IconType::Mono1_32x32 |
            IconType::Mono1Mask_32x32 |
            IconType::Color4_32x32 |
            IconType::Color8_32x32 |
            IconType::RGB24_32x32 |
            IconType::Mask8_32x32 |
            IconType::RGBA32_32x32 |
            IconType::RGBA32_16x16_2x => 32,
            IconType::Mono1Mask_48x48 |
            IconType::Color4_48x48 |
            IconType::Color8_48x48 |
            IconType::RGB24_48x48 |
            IconType::Mask8_48x48 => 48,
            IconType::RGBA32_64x64 | IconType::RGBA32_32x32_2x => 64,
            IconType::RGB24_128x128 |
            IconType::Mask8_128x128 |
            IconType::RGBA32_128x128 => 128,
            IconType::RGBA32_256x256 | IconType::RGBA32_128x128_2x => 256,
            IconType::RGBA32_512x512 | IconType::RGBA32_256x256_2x => 512,
            IconType::RGBA32_512x512_2x => 1024,
        }
    }

    /// Returns true if this is an 8-bit alpha mask type.
    pub fn is_mask(self) -> bool {
        self.mask_type() == Some(self)
    }

    /// Returns the 8-bit mask type holding alpha for this edge size, if the
    /// icon type belongs to the PackBits family.
    pub fn mask_type(self) -> Option<IconType> {
        match self {
            IconType::RGB24_16x16 | IconType::Mask8_16x16 => Some(IconType::Mask8_16x16),
            IconType::RGB24_32x32 | IconType::Mask8_32x32 => Some(IconType::Mask8_32x32),
            IconType::RGB24_48x48 | IconType::Mask8_48x48 => Some(IconType::Mask8_48x48),
            IconType::RGB24_128x128 | IconType::Mask8_128x128 => {
                Some(IconType::Mask8_128x128)
            }
            _ => None,
        }
    }
}

/// A Macintosh OSType (also known as a ResType), used in ICNS files to
/// identify the type of each chunk.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct OSType(pub [u8; 4]);

impl fmt::Display for OSType {
    fn fmt(&self, out: &mut fmt::Formatter) -> fmt::Result {
        let &OSType(raw) = self;
        for &byte in &raw {
            write!(out, "{}", char::from(byte))?;
        }
        Ok(())
    }
}

impl FromStr for OSType {
    type Err = String;

    fn from_str(input: &str) -> Result<OSType, String> {
        let bytes = input.as_bytes();
        if bytes.len() != 4 {
            Err(format!("OSType string must be 4 bytes (was {})", bytes.len()))
        } else {
            let mut raw = [0u8; 4];
            raw.clone_from_slice(bytes);
            Ok(OSType(raw))
        }
    }
}

/// Method of encoding an image within an ICNS chunk.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Compression {
    /// Payload is stored uncompressed.
    None,
    /// Payload is PackBits-compressed planar RGB.
    Pack,
    /// Payload is a complete PNG or JPEG 2000 file.
    PngOrJpeg2000,
}

impl fmt::Display for Compression {
    fn fmt(&self, out: &mut fmt::Formatter) -> fmt::Result {
        out.write_str(match self {
            Compression::None => "None",
            Compression::Pack => "Pack",
            Compression::PngOrJpeg2000 => "PngJ",
        })
    }
}
