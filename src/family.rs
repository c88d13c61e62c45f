use log::{debug, trace, warn};
use std::path::Path;

use super::bitmap::Bitmap;
use super::element::{CHUNK_HEADER_LENGTH, Entry};
use super::error::{Error, Result};
use super::format::{clamp_sub_image, ImageFormat, Progress};
use super::icontype::{ChunkRole, IconType, OSType};
use super::span::{self, ByteSpan};

/// The first four bytes of an ICNS file:
const ICNS_MAGIC_LITERAL: &[u8; 4] = b"icns";

/// The length of an icon family header, in bytes:
const ICON_FAMILY_HEADER_LENGTH: usize = 8;

/// Returns true if `header` starts with the ICNS magic and declares a total
/// length equal to `file_size`.
pub fn is_icns(header: &[u8], file_size: u64) -> bool {
    if header.len() < ICON_FAMILY_HEADER_LENGTH || &header[..4] != ICNS_MAGIC_LITERAL {
        return false;
    }
    let span = ByteSpan::new(header);
    match span.read_u32_be(4) {
        Ok(declared) => u64::from(declared) == file_size,
        Err(_) => false,
    }
}

/// The contents of an ICNS file: the file image plus the catalogue of
/// decodable chunks, in the order they appear.
pub struct IcnsContainer {
    data: Vec<u8>,
    entries: Vec<Entry>,
}

impl IcnsContainer {
    /// Walks the chunks of an ICNS file image.  Fails if the header is wrong,
    /// if a chunk points outside the file, or if no decodable chunk exists.
    pub fn parse(data: Vec<u8>) -> Result<IcnsContainer> {
        if !is_icns(&data, data.len() as u64) {
            return Err(Error::mismatch("ICNS",
                                       "wrong magic literal or file length"));
        }
        let entries = scan_chunks(ByteSpan::new(&data), ICON_FAMILY_HEADER_LENGTH)?;
        if entries.is_empty() {
            return Err(Error::Corrupt("ICNS file contains no images".to_string()));
        }
        Ok(IcnsContainer { data, entries })
    }

    /// Returns the decodable chunks, in file order.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Returns the number of decodable chunks.
    pub fn count(&self) -> u32 {
        self.entries.len() as u32
    }

    /// Decodes the entry at `index`, clamped into the valid range.
    pub fn decode(&self, index: u32, progress: &mut Progress) -> Result<Bitmap> {
        let current = clamp_sub_image(index, self.count());
        let entry = &self.entries[current as usize];
        let mask = entry.icon_type.mask_type().and_then(|mask_type| self.find(mask_type));
        let mut bitmap = entry.decode(ByteSpan::new(&self.data), mask, progress)?;
        bitmap.set_sub_image(current, self.count());
        Ok(bitmap)
    }

    /// Returns the first entry of `icon_type`, used to pair an icon with its
    /// alpha mask.
    fn find(&self, icon_type: IconType) -> Option<&Entry> {
        self.entries.iter().find(|entry| entry.icon_type == icon_type)
    }
}

/// Collects an entry for every recognized image chunk from `offset` to the
/// end of the buffer.  Table-of-contents and metadata chunks are skipped
/// whole; unknown tags are skipped by the chunk header length only.
fn scan_chunks(file: ByteSpan, mut offset: usize) -> Result<Vec<Entry>> {
    let mut entries = Vec::new();
    while offset < file.len() {
        file.require(offset, CHUNK_HEADER_LENGTH, "chunk header")?;
        let ostype = OSType(file.read_tag(offset)?);
        let chunk_length = file.read_u32_be(offset + 4)? as usize;
        let role = match ChunkRole::from_ostype(ostype) {
            Some(role) => role,
            None => {
                warn!("unexpected chunk type '{}' at offset {:#x}", ostype, offset);
                offset += CHUNK_HEADER_LENGTH;
                continue;
            }
        };
        if chunk_length < CHUNK_HEADER_LENGTH {
            let msg = format!("chunk '{}' at offset {:#x} has invalid length {}",
                              ostype,
                              offset,
                              chunk_length);
            return Err(Error::Corrupt(msg));
        }
        file.require(offset, chunk_length, "chunk")?;
        match role {
            ChunkRole::TableOfContents => trace!("table of contents at {:#x}", offset),
            ChunkRole::Metadata => trace!("metadata chunk '{}' at {:#x}", ostype, offset),
            ChunkRole::Icon(icon_type) => {
                let entry = Entry::new(icon_type, offset, chunk_length);
                debug!("chunk '{}': {}x{}, {} -> {} bpp, {}, {} bytes at {:#x}",
                       ostype,
                       entry.edge_size(),
                       entry.edge_size(),
                       entry.source_bpp(),
                       entry.dest_bpp(),
                       entry.compression(),
                       entry.size,
                       entry.offset);
                entries.push(entry);
            }
        }
        offset += chunk_length;
    }
    Ok(entries)
}

/// Apple Icon Image files.
#[derive(Default)]
pub struct IcnsFormat {
    container: Option<IcnsContainer>,
}

impl IcnsFormat {
    /// Creates a format handler with nothing loaded.
    pub fn new() -> IcnsFormat {
        IcnsFormat { container: None }
    }

    /// Returns the container read by the last successful load.
    pub fn container(&self) -> Option<&IcnsContainer> {
        self.container.as_ref()
    }
}

impl ImageFormat for IcnsFormat {
    fn name(&self) -> &'static str {
        "icns"
    }

    fn is_supported(&self, header: &[u8], file_size: u64) -> bool {
        is_icns(header, file_size)
    }

    fn load(&mut self,
            path: &Path,
            sub_image: u32,
            progress: &mut Progress)
            -> Result<Bitmap> {
        self.container = None;
        let container = IcnsContainer::parse(span::read_file(path)?)?;
        debug!("{}: {} icon(s)", path.display(), container.count());
        let container = self.container.insert(container);
        container.decode(sub_image, progress)
    }

    fn load_sub_image(&mut self, index: u32, progress: &mut Progress) -> Result<Bitmap> {
        match self.container {
            Some(ref container) => container.decode(index, progress),
            None => Err(Error::NotLoaded),
        }
    }

    fn free_memory(&mut self) {
        self.container = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::icontype::Compression;

    fn chunk(tag: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut out = tag.to_vec();
        out.extend_from_slice(&((payload.len() + 8) as u32).to_be_bytes());
        out.extend_from_slice(payload);
        out
    }

    fn icns(chunks: &[Vec<u8>]) -> Vec<u8> {
        let body: Vec<u8> = chunks.concat();
        let mut out = b"icns".to_vec();
        out.extend_from_slice(&((body.len() + 8) as u32).to_be_bytes());
        out.extend_from_slice(&body);
        out
    }

    fn is32_payload() -> Vec<u8> {
        // Three planes of 256 bytes, each as one 130 run + one 126 run.
        let mut data = Vec::new();
        for value in [1u8, 2, 3] {
            data.extend_from_slice(&[0xff, value, 0x80 + 123, value]);
        }
        data
    }

    #[test]
    fn is_supported_requires_matching_length() {
        assert!(is_icns(b"icns\0\0\0\x08", 8));
        assert!(!is_icns(b"icns\0\0\0\x08", 9));
        assert!(!is_icns(b"icnx\0\0\0\x08", 8));
        assert!(!is_icns(b"icns\0\0", 6));
    }

    #[test]
    fn toc_and_is32_yield_one_entry() {
        let toc = chunk(b"TOC ", b"is32\0\0\0\x14");
        let data = icns(&[toc, chunk(b"is32", &is32_payload())]);
        let container = IcnsContainer::parse(data).expect("parse failed");
        assert_eq!(container.count(), 1);
        let entry = &container.entries()[0];
        assert_eq!(entry.edge_size(), 16);
        assert_eq!(entry.dest_bpp(), 24);
        assert_eq!(entry.compression(), Compression::Pack);
        assert_eq!(entry.offset, 8 + 16 + 8);
        assert_eq!(entry.size, 12);
    }

    #[test]
    fn unknown_chunks_are_skipped_by_header_length() {
        let data = icns(&[chunk(b"quux", b""), chunk(b"s8mk", &[0u8; 256])]);
        let container = IcnsContainer::parse(data).unwrap();
        assert_eq!(container.count(), 1);
        assert_eq!(container.entries()[0].icon_type, IconType::Mask8_16x16);
    }

    #[test]
    fn metadata_chunks_are_not_entries() {
        let data = icns(&[chunk(b"icnV", &[0x42, 0x20, 0, 0]),
                          chunk(b"s8mk", &[0u8; 256])]);
        let container = IcnsContainer::parse(data).unwrap();
        assert_eq!(container.count(), 1);
    }

    #[test]
    fn empty_family_fails() {
        let data = icns(&[]);
        assert!(matches!(IcnsContainer::parse(data), Err(Error::Corrupt(_))));
    }

    #[test]
    fn chunk_running_past_end_is_corrupt() {
        let mut data = icns(&[chunk(b"s8mk", &[0u8; 256])]);
        data[12..16].copy_from_slice(&1000u32.to_be_bytes());
        assert!(matches!(IcnsContainer::parse(data), Err(Error::Corrupt(_))));
    }

    #[test]
    fn chunk_length_below_header_is_corrupt() {
        let mut data = icns(&[chunk(b"s8mk", &[0u8; 256])]);
        data[12..16].copy_from_slice(&4u32.to_be_bytes());
        assert!(matches!(IcnsContainer::parse(data), Err(Error::Corrupt(_))));
    }

    #[test]
    fn truncated_chunk_header_is_corrupt() {
        let mut data = icns(&[chunk(b"s8mk", &[0u8; 256])]);
        data.extend_from_slice(b"ic0");
        let length = data.len() as u32;
        data[4..8].copy_from_slice(&length.to_be_bytes());
        assert!(matches!(IcnsContainer::parse(data), Err(Error::Corrupt(_))));
    }

    #[test]
    fn fuzzed_lengths_never_succeed_out_of_bounds() {
        let pristine = icns(&[chunk(b"TOC ", b"is32\0\0\0\x14"),
                              chunk(b"is32", &is32_payload())]);
        for position in [12usize, 28] {
            for value in [0u32, 7, 9, 23, 0x7fff_ffff, u32::MAX] {
                let mut data = pristine.clone();
                data[position..position + 4].copy_from_slice(&value.to_be_bytes());
                if let Ok(container) = IcnsContainer::parse(data.clone()) {
                    for entry in container.entries() {
                        assert!(entry.offset + entry.size <= data.len());
                    }
                }
            }
        }
    }

    #[test]
    fn sub_image_index_is_clamped() {
        let data = icns(&[chunk(b"s8mk", &[7u8; 256]), chunk(b"is32", &is32_payload())]);
        let container = IcnsContainer::parse(data).unwrap();
        let bitmap = container.decode(9, &mut Progress::none()).unwrap();
        assert_eq!(bitmap.current(), 1);
        assert_eq!(bitmap.count(), 2);
        assert_eq!(&bitmap.pixels()[..3], &[1, 2, 3]);
        let first = container.decode(0, &mut Progress::none()).unwrap();
        assert_eq!(first.current(), 0);
        assert_eq!(first.pixels()[0], 7);
    }

    #[test]
    fn alpha_comes_from_the_mask_of_matching_size() {
        let mut planes = Vec::new();
        for value in [4u8, 5, 6] {
            for _ in 0..7 {
                planes.extend_from_slice(&[0xff, value]);
            }
            planes.extend_from_slice(&[0x80 + 111, value]);
        }
        let data = icns(&[chunk(b"s8mk", &[0x11; 256]),
                          chunk(b"il32", &planes),
                          chunk(b"l8mk", &[0x55; 1024])]);
        let container = IcnsContainer::parse(data).unwrap();
        let bitmap = container.decode(1, &mut Progress::none()).unwrap();
        assert_eq!((bitmap.width(), bitmap.height()), (32, 32));
        assert_eq!(&bitmap.row(0)[..4], &[4, 5, 6, 0x55]);
        assert_eq!(&bitmap.row(31)[124..128], &[4, 5, 6, 0x55]);
    }

    #[test]
    fn load_sub_image_before_load_fails() {
        let mut format = IcnsFormat::new();
        let result = format.load_sub_image(0, &mut Progress::none());
        assert!(matches!(result, Err(Error::NotLoaded)));
        format.free_memory();
        format.free_memory();
    }
}
