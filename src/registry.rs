use log::{debug, info};
use std::path::Path;

use super::bitmap::Bitmap;
use super::error::{Error, Result};
use super::family::IcnsFormat;
use super::format::{Format, ImageFormat, Progress};
#[cfg(feature = "pngio")]
use super::pngio::PngFormat;
use super::raw::RawFormat;
use super::span;
use super::xcf::XcfFormat;

/// How many leading bytes of a file are handed to
/// [`ImageFormat::is_supported`].
pub const HEADER_PEEK_LENGTH: usize = 64;

/// An ordered list of formats.  The first format whose `is_supported` accepts
/// a file's header decodes it.
pub struct Registry {
    formats: Vec<Format>,
    active: Option<usize>,
}

impl Registry {
    /// Creates a registry with every built-in format, in the order ICNS, XCF,
    /// RAW, then PNG.
    pub fn new() -> Registry {
        let mut formats = vec![Format::Icns(IcnsFormat::new()),
                               Format::Xcf(XcfFormat::new()),
                               Format::Raw(RawFormat::new())];
        #[cfg(feature = "pngio")]
        formats.push(Format::Png(PngFormat::new()));
        Registry::with_formats(formats)
    }

    /// Creates a registry trying `formats` in the given order.
    pub fn with_formats(formats: Vec<Format>) -> Registry {
        Registry {
            formats,
            active: None,
        }
    }

    /// Returns the registered formats, in priority order.
    pub fn formats(&self) -> &[Format] {
        &self.formats
    }

    /// Returns the index of the first format accepting `header` for a file of
    /// `file_size` bytes.
    pub fn detect(&self, header: &[u8], file_size: u64) -> Option<usize> {
        self.formats.iter().position(|format| format.is_supported(header, file_size))
    }

    /// Returns the format holding the last loaded file.  A file whose
    /// container was read but whose requested sub-image failed to decode still
    /// counts, so its other sub-images remain reachable.
    pub fn active(&self) -> Option<&Format> {
        self.active.map(|index| &self.formats[index])
    }

    /// Detects the format of the file at `path` and decodes sub-image
    /// `sub_image` with it.  Anything kept from a previous load is released
    /// first.  A format that rejects the file once it reads past the header
    /// hands it on to the next format accepting the header.
    pub fn load(&mut self,
                path: &Path,
                sub_image: u32,
                progress: &mut Progress)
                -> Result<Bitmap> {
        self.free_memory();
        let (header, file_size) = span::peek_header(path, HEADER_PEEK_LENGTH)?;
        let (active, result) = load_first(&mut self.formats,
                                          &header,
                                          file_size,
                                          path,
                                          sub_image,
                                          progress);
        self.active = active;
        result
    }

    /// Decodes another sub-image of the file held by the last
    /// [`load`](#method.load).
    pub fn load_sub_image(&mut self, index: u32, progress: &mut Progress) -> Result<Bitmap> {
        match self.active {
            Some(active) => self.formats[active].load_sub_image(index, progress),
            None => Err(Error::NotLoaded),
        }
    }

    /// Releases everything kept from the last load.
    pub fn free_memory(&mut self) {
        if let Some(active) = self.active.take() {
            self.formats[active].free_memory();
        }
    }
}

/// Tries every format accepting `header`, in order, until one loads the file
/// or fails for a reason other than a format mismatch.  Returns the index of
/// the format left holding the file along with the load result.
fn load_first<F: ImageFormat>(formats: &mut [F],
                              header: &[u8],
                              file_size: u64,
                              path: &Path,
                              sub_image: u32,
                              progress: &mut Progress)
                              -> (Option<usize>, Result<Bitmap>) {
    let mut start = 0;
    while let Some(offset) = formats[start..]
        .iter()
        .position(|format| format.is_supported(header, file_size)) {
        let index = start + offset;
        let format = &mut formats[index];
        debug!("{}: reading as {}", path.display(), format.name());
        match format.load(path, sub_image, progress) {
            Ok(bitmap) => return (Some(index), Ok(bitmap)),
            Err(err) if err.is_format_mismatch() => {
                debug!("{}: {}", path.display(), err);
                start = index + 1;
            }
            Err(err @ Error::Decode(_)) |
            Err(err @ Error::Cancelled) => return (Some(index), Err(err)),
            Err(err) => return (None, Err(err)),
        }
    }
    info!("{}: no format recognizes this file", path.display());
    (None, Err(Error::Unrecognized))
}

impl Default for Registry {
    fn default() -> Registry {
        Registry::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::bitmap::PixelLayout;

    fn names(registry: &Registry) -> Vec<&'static str> {
        registry.formats().iter().map(|format| format.name()).collect()
    }

    #[test]
    fn default_order() {
        let registry = Registry::new();
        let expected = if cfg!(feature = "pngio") {
            vec!["icns", "xcf", "raw", "png"]
        } else {
            vec!["icns", "xcf", "raw"]
        };
        assert_eq!(names(&registry), expected);
    }

    #[test]
    fn detection_picks_first_match() {
        let registry = Registry::new();
        assert_eq!(registry.detect(b"icns\0\0\0\x08", 8), Some(0));
        assert_eq!(registry.detect(b"icns\0\0\0\x08", 9), None);
        let mut xcf = b"gimp xcf v002\0".to_vec();
        xcf.resize(64, 0);
        assert_eq!(registry.detect(&xcf, 1000), Some(1));
        assert_eq!(registry.detect(b"", 0), None);
    }

    #[test]
    fn custom_order_is_respected() {
        let registry = Registry::with_formats(vec![Format::Raw(RawFormat::new()),
                                                   Format::Icns(IcnsFormat::new())]);
        assert_eq!(names(&registry), vec!["raw", "icns"]);
        assert_eq!(registry.detect(b"icns\0\0\0\x08", 8), Some(1));
    }

    /// Accepts every header and fails or succeeds on load as told.
    struct Scripted {
        name: &'static str,
        outcome: fn() -> Result<Bitmap>,
        loaded: bool,
    }

    impl Scripted {
        fn new(name: &'static str, outcome: fn() -> Result<Bitmap>) -> Scripted {
            Scripted { name, outcome, loaded: false }
        }
    }

    impl ImageFormat for Scripted {
        fn name(&self) -> &'static str {
            self.name
        }

        fn is_supported(&self, _header: &[u8], _file_size: u64) -> bool {
            true
        }

        fn load(&mut self,
                _path: &Path,
                _sub_image: u32,
                _progress: &mut Progress)
                -> Result<Bitmap> {
            self.loaded = true;
            (self.outcome)()
        }

        fn load_sub_image(&mut self, _index: u32, _progress: &mut Progress) -> Result<Bitmap> {
            if self.loaded { (self.outcome)() } else { Err(Error::NotLoaded) }
        }

        fn free_memory(&mut self) {
            self.loaded = false;
        }
    }

    fn mismatch() -> Result<Bitmap> {
        Err(Error::mismatch("test", "rejected after the header"))
    }

    fn bad_pixels() -> Result<Bitmap> {
        Err(Error::Decode("bad pixels".to_string()))
    }

    fn corrupt() -> Result<Bitmap> {
        Err(Error::Corrupt("bad offset".to_string()))
    }

    fn pixel() -> Result<Bitmap> {
        Bitmap::new(PixelLayout::Gray, 1, 1)
    }

    fn run(formats: &mut [Scripted]) -> (Option<usize>, Result<Bitmap>) {
        load_first(formats, b"", 0, Path::new("file"), 0, &mut Progress::none())
    }

    #[test]
    fn format_mismatch_falls_through_to_next_candidate() {
        let mut formats = [Scripted::new("first", mismatch), Scripted::new("second", pixel)];
        let (active, result) = run(&mut formats);
        assert_eq!(active, Some(1));
        assert_eq!(result.unwrap().width(), 1);
    }

    #[test]
    fn mismatch_from_every_candidate_is_unrecognized() {
        let mut formats = [Scripted::new("first", mismatch), Scripted::new("second", mismatch)];
        let (active, result) = run(&mut formats);
        assert_eq!(active, None);
        assert!(matches!(result, Err(Error::Unrecognized)));
    }

    #[test]
    fn decode_failure_keeps_the_format_active() {
        let mut formats = [Scripted::new("first", bad_pixels), Scripted::new("second", pixel)];
        let (active, result) = run(&mut formats);
        assert_eq!(active, Some(0));
        assert!(matches!(result, Err(Error::Decode(_))));
    }

    #[test]
    fn corrupt_container_is_not_kept() {
        let mut formats = [Scripted::new("first", corrupt), Scripted::new("second", pixel)];
        let (active, result) = run(&mut formats);
        assert_eq!(active, None);
        assert!(matches!(result, Err(Error::Corrupt(_))));
    }

    #[test]
    fn sub_image_without_load_fails() {
        let mut registry = Registry::new();
        assert!(registry.active().is_none());
        let result = registry.load_sub_image(0, &mut Progress::none());
        assert!(matches!(result, Err(Error::NotLoaded)));
        registry.free_memory();
    }
}
