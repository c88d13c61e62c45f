use std::path::Path;

use super::bitmap::Bitmap;
use super::error::{Error, Result};
use super::family::IcnsFormat;
#[cfg(feature = "pngio")]
use super::pngio::PngFormat;
use super::raw::RawFormat;
use super::xcf::XcfFormat;

/// Reports decode progress to an optional callback.  The callback receives a
/// percentage in `0..=100` and returns `false` to cancel the decode, which
/// then fails with [`Error::Cancelled`].
pub struct Progress<'a> {
    callback: Option<&'a mut dyn FnMut(u32) -> bool>,
}

impl<'a> Progress<'a> {
    /// Progress reporting that goes nowhere and never cancels.
    pub fn none() -> Progress<'static> {
        Progress { callback: None }
    }

    /// Reports progress through the given callback.
    pub fn new(callback: &'a mut dyn FnMut(u32) -> bool) -> Progress<'a> {
        Progress { callback: Some(callback) }
    }

    /// Reports `percent` (clamped to 100).
    pub fn report(&mut self, percent: u32) -> Result<()> {
        if let Some(callback) = self.callback.as_mut() {
            if !callback(percent.min(100)) {
                return Err(Error::Cancelled);
            }
        }
        Ok(())
    }

    /// Reports the completion of step `done` out of `total`.
    pub fn report_fraction(&mut self, done: u64, total: u64) -> Result<()> {
        let percent = if total == 0 { 100 } else { done.min(total) * 100 / total };
        self.report(percent as u32)
    }
}

/// The operations every image container format offers.
pub trait ImageFormat {
    /// Short human-readable name of the format.
    fn name(&self) -> &'static str;

    /// Decides from the leading bytes of a file and its total size whether
    /// this format can read it.
    fn is_supported(&self, header: &[u8], file_size: u64) -> bool;

    /// Reads the file at `path` and decodes sub-image `sub_image`.
    fn load(&mut self,
            path: &Path,
            sub_image: u32,
            progress: &mut Progress)
            -> Result<Bitmap>;

    /// Decodes another sub-image of the file read by the last successful
    /// [`load`](#tymethod.load).
    fn load_sub_image(&mut self, index: u32, progress: &mut Progress) -> Result<Bitmap>;

    /// Releases everything kept from the last load.  Safe to call repeatedly.
    fn free_memory(&mut self);
}

/// The closed set of formats known to the [`Registry`](struct.Registry.html).
pub enum Format {
    /// Apple Icon Image.
    Icns(IcnsFormat),
    /// GIMP XCF.
    Xcf(XcfFormat),
    /// The viewer's own RAW container.
    Raw(RawFormat),
    /// Standalone PNG files.
    #[cfg(feature = "pngio")]
    Png(PngFormat),
}

impl Format {
    fn inner(&self) -> &dyn ImageFormat {
        match self {
            Format::Icns(format) => format,
            Format::Xcf(format) => format,
            Format::Raw(format) => format,
            #[cfg(feature = "pngio")]
            Format::Png(format) => format,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn ImageFormat {
        match self {
            Format::Icns(format) => format,
            Format::Xcf(format) => format,
            Format::Raw(format) => format,
            #[cfg(feature = "pngio")]
            Format::Png(format) => format,
        }
    }
}

impl ImageFormat for Format {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    fn is_supported(&self, header: &[u8], file_size: u64) -> bool {
        self.inner().is_supported(header, file_size)
    }

    fn load(&mut self,
            path: &Path,
            sub_image: u32,
            progress: &mut Progress)
            -> Result<Bitmap> {
        self.inner_mut().load(path, sub_image, progress)
    }

    fn load_sub_image(&mut self, index: u32, progress: &mut Progress) -> Result<Bitmap> {
        self.inner_mut().load_sub_image(index, progress)
    }

    fn free_memory(&mut self) {
        self.inner_mut().free_memory()
    }
}

/// Clamps a requested sub-image index into `0..count`.
pub(crate) fn clamp_sub_image(index: u32, count: u32) -> u32 {
    index.min(count.saturating_sub(1))
}
