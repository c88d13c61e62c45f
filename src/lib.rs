//! Library for decoding the image containers of an image viewer: Apple Icon
//! Image (.icns), GIMP (.xcf), the viewer's own RAW container, and PNG.
//!
//! Every container is read into memory (or streamed, for RAW and PNG) and
//! decoded into a [`Bitmap`]: a pixel buffer with its layout, dimensions,
//! row pitch and sub-image position.  Offsets and lengths read from a file
//! are always checked against the file size before use, so malformed input
//! yields an [`Error`] rather than an out-of-bounds read.
//!
//! See https://en.wikipedia.org/wiki/Apple_Icon_Image_format and
//! https://gitlab.gnome.org/GNOME/gimp/-/blob/master/devel-docs/xcf.txt for
//! more information about the ICNS and XCF formats.
//!
//! # Loading a file
//!
//! ```no_run
//! use std::path::Path;
//! use viewfmt::{Progress, Registry};
//!
//! let mut registry = Registry::new();
//! let bitmap = registry.load(Path::new("/path/to/icon.icns"), 0,
//!                            &mut Progress::none()).unwrap();
//! println!("{}x{} ({} of {})", bitmap.width(), bitmap.height(),
//!          bitmap.current() + 1, bitmap.count());
//! // Decode the last sub-image of the same file:
//! let last = registry.load_sub_image(bitmap.count() - 1,
//!                                    &mut Progress::none()).unwrap();
//! ```
//!
//! # Reporting progress
//!
//! Decoders report progress as a percentage; returning `false` from the
//! callback cancels the decode.
//!
//! ```no_run
//! use std::path::Path;
//! use viewfmt::{Progress, Registry};
//!
//! let mut registry = Registry::new();
//! let mut report = |percent: u32| {
//!     println!("{}%", percent);
//!     true
//! };
//! let result = registry.load(Path::new("/path/to/image.xcf"), 0,
//!                            &mut Progress::new(&mut report));
//! ```

#![warn(missing_docs)]

mod bitmap;
pub use self::bitmap::{aligned_pitch, Bitmap, PixelLayout, MAX_BITMAP_BYTES};

mod element;
pub use self::element::{is_jpeg2000, Entry, CHUNK_HEADER_LENGTH};

mod error;
pub use self::error::{Error, Result};

mod family;
pub use self::family::{is_icns, IcnsContainer, IcnsFormat};

mod format;
pub use self::format::{Format, ImageFormat, Progress};

mod icontype;
pub use self::icontype::{ChunkRole, Compression, IconType, OSType};

#[cfg(feature = "jp2io")]
mod jp2io;
#[cfg(feature = "jp2io")]
pub use self::jp2io::decode_jp2;

#[cfg(feature = "pngio")]
mod pngio;
#[cfg(feature = "pngio")]
pub use self::pngio::{decode_png_slice, decode_png_stream, is_png, PngFormat, PNG_SIGNATURE};

mod raw;
pub use self::raw::{read_pixels, RawCompression, RawFormat, RawHeader, RawPixelFormat,
                    RAW_HEADER_LENGTH, RAW_MAGIC_LITERAL};

mod registry;
pub use self::registry::{Registry, HEADER_PEEK_LENGTH};

pub mod rle;

mod span;
pub use self::span::ByteSpan;

mod xcf;
pub use self::xcf::{detect_version, next_property, Layer, LayerType, Property, Rect,
                    TileGeometry, XcfFormat, XcfImage, TILE_EDGE};

mod xcftile;
pub use self::xcftile::decode_layer;
