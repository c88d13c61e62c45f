use super::error::{Error, Result};

/// Largest pixel buffer any decoder will allocate, in bytes.
pub const MAX_BITMAP_BYTES: usize = 1 << 30;

/// Computes the row pitch for a buffer of the given width and bit depth,
/// rounded up to a multiple of four bytes.
///
/// # Examples
/// ```
/// use viewfmt::aligned_pitch;
/// assert_eq!(aligned_pitch(3, 24), 12);
/// assert_eq!(aligned_pitch(5, 8), 8);
/// assert_eq!(aligned_pitch(16, 32), 64);
/// ```
pub fn aligned_pitch(width: u32, bits_per_pixel: u32) -> u32 {
    let bits = u64::from(width) * u64::from(bits_per_pixel);
    (((bits + 31) / 32) * 4) as u32
}

/// The canonical result of decoding one sub-image of a container.
#[derive(Clone, Debug)]
pub struct Bitmap {
    layout: PixelLayout,
    width: u32,
    height: u32,
    pitch: u32,
    bpp_image: u32,
    current: u32,
    count: u32,
    pixels: Vec<u8>,
    icc_profile: Option<Vec<u8>>,
}

impl Bitmap {
    /// Creates a zeroed bitmap whose pitch follows [`aligned_pitch`].
    pub fn new(layout: PixelLayout, width: u32, height: u32) -> Result<Bitmap> {
        let pitch = aligned_pitch(width, layout.bits_per_pixel());
        Bitmap::with_pitch(layout, width, height, pitch)
    }

    /// Creates a zeroed bitmap with an explicit row pitch, which must be able
    /// to hold one packed row.
    pub fn with_pitch(layout: PixelLayout,
                      width: u32,
                      height: u32,
                      pitch: u32)
                      -> Result<Bitmap> {
        let row_bits = u64::from(width) * u64::from(layout.bits_per_pixel());
        if u64::from(pitch) * 8 < row_bits {
            let msg = format!("pitch {} cannot hold a row of {} {:?} pixels",
                              pitch,
                              width,
                              layout);
            return Err(Error::Decode(msg));
        }
        let size = (pitch as usize).checked_mul(height as usize);
        let size = match size {
            Some(size) if size <= MAX_BITMAP_BYTES => size,
            _ => {
                let msg = format!("a {}x{} bitmap is too large to allocate",
                                  width,
                                  height);
                return Err(Error::Decode(msg));
            }
        };
        Ok(Bitmap {
            layout,
            width,
            height,
            pitch,
            bpp_image: layout.bits_per_pixel(),
            current: 0,
            count: 1,
            pixels: vec![0u8; size],
            icc_profile: None,
        })
    }

    /// Returns the layout of the pixels in the buffer.
    pub fn layout(&self) -> PixelLayout {
        self.layout
    }

    /// Returns the width of the image, in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Returns the height of the image, in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Returns the distance between two rows of the buffer, in bytes.
    pub fn pitch(&self) -> u32 {
        self.pitch
    }

    /// Returns the bits per pixel of the decoded buffer.
    pub fn bpp(&self) -> u32 {
        self.layout.bits_per_pixel()
    }

    /// Returns the bits per pixel the image was stored with in the file.
    pub fn bpp_image(&self) -> u32 {
        self.bpp_image
    }

    /// Returns the index of this sub-image within its container.
    pub fn current(&self) -> u32 {
        self.current
    }

    /// Returns the number of sub-images in the container.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Returns the pixel buffer (`pitch * height` bytes).
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Returns a mutable reference to the pixel buffer.
    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    /// Consumes the bitmap, returning its pixel buffer.
    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }

    /// Returns the embedded color profile, if the source carried one.
    pub fn icc_profile(&self) -> Option<&[u8]> {
        self.icc_profile.as_deref()
    }

    /// Returns the bytes of row `y`, including any padding up to the pitch.
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.pitch as usize;
        &self.pixels[start..start + self.pitch as usize]
    }

    /// Returns the mutable bytes of row `y`.
    pub fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let start = y as usize * self.pitch as usize;
        &mut self.pixels[start..start + self.pitch as usize]
    }

    pub(crate) fn set_bpp_image(&mut self, bpp_image: u32) {
        self.bpp_image = bpp_image;
    }

    pub(crate) fn set_sub_image(&mut self, current: u32, count: u32) {
        debug_assert!(current < count);
        self.current = current;
        self.count = count;
    }

    pub(crate) fn set_icc_profile(&mut self, profile: Option<Vec<u8>>) {
        self.icc_profile = profile.filter(|profile| !profile.is_empty());
    }

    /// Creates a tightly packed RGBA copy of this bitmap.  Gray values are
    /// replicated into the color channels; missing alpha becomes opaque.
    pub fn to_rgba(&self) -> Vec<u8> {
        let channels = self.layout.channels() as usize;
        let width = self.width as usize;
        let mut rgba = Vec::with_capacity(width * self.height as usize * 4);
        for y in 0..self.height {
            let row = &self.row(y)[..width * channels];
            for pixel in row.chunks_exact(channels) {
                match self.layout {
                    PixelLayout::Gray => {
                        rgba.extend_from_slice(&[pixel[0], pixel[0], pixel[0], u8::MAX])
                    }
                    PixelLayout::GrayAlpha => {
                        rgba.extend_from_slice(&[pixel[0], pixel[0], pixel[0], pixel[1]])
                    }
                    PixelLayout::Rgb => {
                        rgba.extend_from_slice(&[pixel[0], pixel[1], pixel[2], u8::MAX])
                    }
                    PixelLayout::Rgba => rgba.extend_from_slice(pixel),
                }
            }
        }
        rgba
    }
}

/// The arrangement of 8-bit channels within a decoded pixel.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum PixelLayout {
    /// One gray (or alpha-only) channel.
    Gray,
    /// Gray followed by alpha.
    GrayAlpha,
    /// Red, green, blue.
    Rgb,
    /// Red, green, blue, alpha.
    Rgba,
}

impl PixelLayout {
    /// Returns the number of 8-bit channels per pixel.
    pub fn channels(self) -> u32 {
        match self {
            PixelLayout::Gray => 1,
            PixelLayout::GrayAlpha => 2,
            PixelLayout::Rgb => 3,
            PixelLayout::Rgba => 4,
        }
    }

    /// Returns the number of bits needed to store a single pixel.
    pub fn bits_per_pixel(self) -> u32 {
        self.channels() * 8
    }

    /// Returns the layout with the given number of 8-bit channels.
    pub fn from_channels(channels: u32) -> Option<PixelLayout> {
        match channels {
            1 => Some(PixelLayout::Gray),
            2 => Some(PixelLayout::GrayAlpha),
            3 => Some(PixelLayout::Rgb),
            4 => Some(PixelLayout::Rgba),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_bitmap_uses_aligned_pitch() {
        let bitmap = Bitmap::new(PixelLayout::Rgb, 5, 3).unwrap();
        assert_eq!(bitmap.pitch(), 16);
        assert_eq!(bitmap.pixels().len(), 48);
        assert_eq!(bitmap.bpp(), 24);
        assert_eq!(bitmap.count(), 1);
        assert_eq!(bitmap.current(), 0);
    }

    #[test]
    fn pitch_too_small_is_rejected() {
        assert!(Bitmap::with_pitch(PixelLayout::Rgba, 4, 4, 15).is_err());
        assert!(Bitmap::with_pitch(PixelLayout::Rgba, 4, 4, 16).is_ok());
    }

    #[test]
    fn huge_bitmap_is_rejected() {
        assert!(matches!(Bitmap::new(PixelLayout::Rgba, 65536, 65536),
                         Err(Error::Decode(_))));
    }

    #[test]
    fn to_rgba_skips_row_padding() {
        let mut bitmap = Bitmap::new(PixelLayout::Gray, 2, 2).unwrap();
        assert_eq!(bitmap.pitch(), 4);
        bitmap.row_mut(0)[..2].copy_from_slice(&[10, 20]);
        bitmap.row_mut(1)[..2].copy_from_slice(&[30, 40]);
        bitmap.row_mut(1)[2] = 99;
        let rgba = bitmap.to_rgba();
        assert_eq!(rgba.len(), 16);
        assert_eq!(&rgba[..4], &[10, 10, 10, 255]);
        assert_eq!(&rgba[12..], &[40, 40, 40, 255]);
    }

    #[test]
    fn empty_profile_is_dropped() {
        let mut bitmap = Bitmap::new(PixelLayout::Rgba, 1, 1).unwrap();
        bitmap.set_icc_profile(Some(Vec::new()));
        assert!(bitmap.icc_profile().is_none());
        bitmap.set_icc_profile(Some(vec![1, 2, 3]));
        assert_eq!(bitmap.icc_profile(), Some(&[1u8, 2, 3][..]));
    }
}
