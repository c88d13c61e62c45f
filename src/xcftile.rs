//! Pixel data of XCF layers.
//!
//! A layer points at a tile hierarchy (width, height, bytes per pixel and a
//! list of levels); only the first, full-resolution level is read.  A level
//! lists one offset per 64x64 tile, row by row, terminated by zero.

use log::{debug, warn};

use super::bitmap::{Bitmap, PixelLayout, MAX_BITMAP_BYTES};
use super::error::{Error, Result};
use super::format::Progress;
use super::rle;
use super::span::ByteSpan;
use super::xcf::{self, Layer, LayerType, TileGeometry, XcfImage};
use super::xcf::{COMPRESS_NONE, COMPRESS_RLE, PROP_END, TILE_EDGE};

/// Decodes `layer` into an RGBA bitmap.  Layer opacity is multiplied into
/// alpha, and so is the layer mask when the layer applies one.
pub fn decode_layer(file: ByteSpan,
                    image: &XcfImage,
                    layer: &Layer,
                    progress: &mut Progress)
                    -> Result<Bitmap> {
    let layer_type = match LayerType::from_u32(layer.kind) {
        Some(layer_type) => layer_type,
        None => {
            let msg = format!("layer '{}' has unknown type {}", layer.name, layer.kind);
            return Err(Error::Decode(msg));
        }
    };
    if image.compression != COMPRESS_NONE && image.compression != COMPRESS_RLE {
        let msg = format!("XCF compression {} not supported", image.compression);
        return Err(Error::Decode(msg));
    }
    let mut bitmap = Bitmap::new(PixelLayout::Rgba, layer.width, layer.height)?;
    let channels = layer_type.channels() as usize;
    let samples = read_hierarchy(file,
                                 layer.pixels as usize,
                                 layer.width,
                                 layer.height,
                                 layer_type.channels(),
                                 image.compression,
                                 progress)?;
    let mask = if layer.has_mask && layer.mask != 0 {
        Some(read_mask(file, image, layer)?)
    } else {
        None
    };

    let colormap = image.colormap.as_deref().unwrap_or(&[]);
    if matches!(layer_type, LayerType::Indexed | LayerType::IndexedAlpha) &&
       colormap.is_empty() {
        warn!("indexed layer '{}' but the image has no colormap", layer.name);
    }
    let width = layer.width as usize;
    for y in 0..layer.height as usize {
        let source = &samples[y * width * channels..(y + 1) * width * channels];
        let row = bitmap.row_mut(y as u32);
        for (x, pixel) in source.chunks_exact(channels).enumerate() {
            let mut rgba = expand(layer_type, pixel, colormap);
            rgba[3] = scale(rgba[3], layer.opacity);
            if let Some(ref mask) = mask {
                rgba[3] = scale(rgba[3], u32::from(mask[y * width + x]));
            }
            row[4 * x..4 * x + 4].copy_from_slice(&rgba);
        }
    }
    Ok(bitmap)
}

fn expand(layer_type: LayerType, pixel: &[u8], colormap: &[[u8; 3]]) -> [u8; 4] {
    let indexed = |index: u8| colormap.get(index as usize).copied().unwrap_or([0, 0, 0]);
    match layer_type {
        LayerType::Rgb => [pixel[0], pixel[1], pixel[2], u8::MAX],
        LayerType::RgbAlpha => [pixel[0], pixel[1], pixel[2], pixel[3]],
        LayerType::Gray => [pixel[0], pixel[0], pixel[0], u8::MAX],
        LayerType::GrayAlpha => [pixel[0], pixel[0], pixel[0], pixel[1]],
        LayerType::Indexed => {
            let [r, g, b] = indexed(pixel[0]);
            [r, g, b, u8::MAX]
        }
        LayerType::IndexedAlpha => {
            let [r, g, b] = indexed(pixel[0]);
            [r, g, b, pixel[1]]
        }
    }
}

/// Multiplies `value` by `factor / 255`, rounding to nearest.
fn scale(value: u8, factor: u32) -> u8 {
    ((u32::from(value) * factor.min(255) + 127) / 255) as u8
}

/// Reads the mask channel of `layer`: its header, name and properties, then
/// a one-byte-per-pixel tile hierarchy of the layer's size.
fn read_mask(file: ByteSpan, image: &XcfImage, layer: &Layer) -> Result<Vec<u8>> {
    let offset = layer.mask as usize;
    file.require(offset, 8, "layer mask")?;
    let width = file.read_u32_be(offset)?;
    let height = file.read_u32_be(offset + 4)?;
    if (width, height) != (layer.width, layer.height) {
        let msg = format!("mask of layer '{}' is {}x{}, layer is {}x{}",
                          layer.name,
                          width,
                          height,
                          layer.width,
                          layer.height);
        return Err(Error::Corrupt(msg));
    }
    let mut ptr = offset + 8;
    let name = xcf::read_string(file, &mut ptr)?;
    while xcf::next_property(file, &mut ptr)?.kind != PROP_END {}
    let hierarchy = xcf::read_offset(file, ptr, 4 * 4)? as usize;
    debug!("mask '{}' of layer '{}' at {:#x}", name, layer.name, hierarchy);
    read_hierarchy(file,
                   hierarchy,
                   width,
                   height,
                   1,
                   image.compression,
                   &mut Progress::none())
}

/// Reads the first level of the tile hierarchy at `offset` into a tightly
/// packed buffer of `width * height * bpp` bytes.
fn read_hierarchy(file: ByteSpan,
                  offset: usize,
                  width: u32,
                  height: u32,
                  bpp: u32,
                  compression: u8,
                  progress: &mut Progress)
                  -> Result<Vec<u8>> {
    file.require(offset, 16, "tile hierarchy")?;
    let stored = (file.read_u32_be(offset)?,
                  file.read_u32_be(offset + 4)?,
                  file.read_u32_be(offset + 8)?);
    if stored != (width, height, bpp) {
        let msg = format!("tile hierarchy at {:#x} holds {}x{}x{}, expected {}x{}x{}",
                          offset,
                          stored.0,
                          stored.1,
                          stored.2,
                          width,
                          height,
                          bpp);
        return Err(Error::Corrupt(msg));
    }
    let level = xcf::read_offset(file, offset + 12, 8)? as usize;
    let level_size = (file.read_u32_be(level)?, file.read_u32_be(level + 4)?);
    if level_size != (width, height) {
        let msg = format!("level at {:#x} is {}x{}, expected {}x{}",
                          level,
                          level_size.0,
                          level_size.1,
                          width,
                          height);
        return Err(Error::Corrupt(msg));
    }

    let channels = bpp as usize;
    let size = (width as usize)
        .checked_mul(height as usize)
        .and_then(|pixels| pixels.checked_mul(channels))
        .filter(|&size| size <= MAX_BITMAP_BYTES)
        .ok_or_else(|| Error::Decode(format!("a {}x{} layer is too large", width, height)))?;
    let mut samples = vec![0u8; size];
    let mut tile = vec![0u8; (TILE_EDGE * TILE_EDGE) as usize * channels];
    let geometry = TileGeometry::new(width, height);
    let stride = width as usize * channels;
    for index in 0..geometry.tile_count {
        let column = index % geometry.tiles_across;
        let line = index / geometry.tiles_across;
        let tile_width = (width - column * TILE_EDGE).min(TILE_EDGE) as usize;
        let tile_height = (height - line * TILE_EDGE).min(TILE_EDGE) as usize;
        let pixels = tile_width * tile_height;
        let length = pixels * channels;

        let pointer = level + 8 + 4 * index as usize;
        let data = xcf::read_offset(file, pointer, 0)? as usize;
        if compression == COMPRESS_RLE {
            rle::unpack_xcf_tile(file.tail(data)?, &mut tile[..length], pixels, channels)?;
        } else {
            tile[..length].copy_from_slice(file.slice(data, length)?);
        }

        let row_length = tile_width * channels;
        let left = (column * TILE_EDGE) as usize * channels;
        let top = (line * TILE_EDGE) as usize;
        for (y, source) in tile[..length].chunks_exact(row_length).enumerate() {
            let start = (top + y) * stride + left;
            samples[start..start + row_length].copy_from_slice(source);
        }
        progress.report_fraction(u64::from(index) + 1, u64::from(geometry.tile_count))?;
    }
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::xcf::{PROP_APPLY_MASK, PROP_COLORMAP, PROP_COMPRESSION, PROP_OPACITY};

    fn push(file: &mut Vec<u8>, value: u32) {
        file.extend_from_slice(&value.to_be_bytes());
    }

    fn patch(file: &mut [u8], at: usize, value: usize) {
        file[at..at + 4].copy_from_slice(&(value as u32).to_be_bytes());
    }

    fn push_prop(file: &mut Vec<u8>, kind: u32, payload: &[u8]) {
        push(file, kind);
        push(file, payload.len() as u32);
        file.extend_from_slice(payload);
    }

    fn push_string(file: &mut Vec<u8>, text: &str) {
        push(file, text.len() as u32 + 1);
        file.extend_from_slice(text.as_bytes());
        file.push(0);
    }

    fn push_hierarchy(file: &mut Vec<u8>,
                      width: u32,
                      height: u32,
                      bpp: u32,
                      tiles: &[Vec<u8>])
                      -> usize {
        let start = file.len();
        push(file, width);
        push(file, height);
        push(file, bpp);
        push(file, (start + 16) as u32);
        push(file, width);
        push(file, height);
        let pointers = file.len();
        file.extend_from_slice(&vec![0u8; 4 * (tiles.len() + 1)]);
        for (index, tile) in tiles.iter().enumerate() {
            let at = file.len();
            patch(file, pointers + 4 * index, at);
            file.extend_from_slice(tile);
        }
        start
    }

    struct Sample<'a> {
        width: u32,
        height: u32,
        kind: u32,
        compression: u8,
        colormap: &'a [[u8; 3]],
        layer_props: Vec<u8>,
        tiles: Vec<Vec<u8>>,
        mask_tiles: Option<Vec<Vec<u8>>>,
    }

    impl<'a> Sample<'a> {
        fn new(width: u32, height: u32, kind: u32, tiles: Vec<Vec<u8>>) -> Sample<'a> {
            Sample {
                width,
                height,
                kind,
                compression: COMPRESS_NONE,
                colormap: &[],
                layer_props: Vec::new(),
                tiles,
                mask_tiles: None,
            }
        }

        fn build(&self) -> Vec<u8> {
            let mut file = b"gimp xcf v001\0".to_vec();
            push(&mut file, self.width);
            push(&mut file, self.height);
            push(&mut file, 0);
            if !self.colormap.is_empty() {
                let mut payload = (self.colormap.len() as u32).to_be_bytes().to_vec();
                for rgb in self.colormap {
                    payload.extend_from_slice(rgb);
                }
                push_prop(&mut file, PROP_COLORMAP, &payload);
            }
            push_prop(&mut file, PROP_COMPRESSION, &[self.compression]);
            push_prop(&mut file, PROP_END, b"");
            let table = file.len();
            file.extend_from_slice(&[0u8; 8]);

            let layer = file.len();
            patch(&mut file, table, layer);
            push(&mut file, self.width);
            push(&mut file, self.height);
            push(&mut file, self.kind);
            push_string(&mut file, "Layer");
            file.extend_from_slice(&self.layer_props);
            push_prop(&mut file, PROP_END, b"");
            let pointers = file.len();
            file.extend_from_slice(&[0u8; 8]);

            let bpp = LayerType::from_u32(self.kind).map_or(1, |t| t.channels());
            let pixels = push_hierarchy(&mut file, self.width, self.height, bpp, &self.tiles);
            patch(&mut file, pointers, pixels);
            if let Some(ref mask_tiles) = self.mask_tiles {
                let channel = file.len();
                patch(&mut file, pointers + 4, channel);
                push(&mut file, self.width);
                push(&mut file, self.height);
                push_string(&mut file, "Mask");
                push_prop(&mut file, PROP_END, b"");
                let hierarchy_pointer = file.len();
                push(&mut file, 0);
                let hierarchy = push_hierarchy(&mut file,
                                               self.width,
                                               self.height,
                                               1,
                                               mask_tiles);
                patch(&mut file, hierarchy_pointer, hierarchy);
            }
            file.extend_from_slice(&[0u8; 64]);
            file
        }
    }

    fn decode(file: &[u8]) -> Result<Bitmap> {
        let span = ByteSpan::new(file);
        let image = XcfImage::parse(span)?;
        decode_layer(span, &image, &image.layers[0], &mut Progress::none())
    }

    #[test]
    fn rgb_layer_with_opacity() {
        let mut sample = Sample::new(2, 2, 0, vec![[10, 20, 30].repeat(4)]);
        sample.layer_props = {
            let mut props = Vec::new();
            push_prop(&mut props, PROP_OPACITY, &128u32.to_be_bytes());
            props
        };
        let bitmap = decode(&sample.build()).unwrap();
        assert_eq!(bitmap.layout(), PixelLayout::Rgba);
        assert_eq!(bitmap.pitch(), 8);
        assert_eq!(&bitmap.row(1)[4..8], &[10, 20, 30, 128]);
    }

    #[test]
    fn rle_gray_alpha_tile() {
        let tile = vec![0x02, 0x40, 253, 10, 20, 30];
        let mut sample = Sample::new(3, 1, 3, vec![tile]);
        sample.compression = COMPRESS_RLE;
        let bitmap = decode(&sample.build()).unwrap();
        assert_eq!(&bitmap.row(0)[..12],
                   &[0x40, 0x40, 0x40, 10, 0x40, 0x40, 0x40, 20, 0x40, 0x40, 0x40, 30]);
    }

    #[test]
    fn indexed_layer_uses_colormap() {
        let mut sample = Sample::new(3, 1, 4, vec![vec![1, 0, 9]]);
        sample.colormap = &[[1, 2, 3], [4, 5, 6]];
        let bitmap = decode(&sample.build()).unwrap();
        assert_eq!(&bitmap.row(0)[..12],
                   &[4, 5, 6, 255, 1, 2, 3, 255, 0, 0, 0, 255]);
    }

    #[test]
    fn mask_is_applied() {
        let mut sample = Sample::new(1, 1, 1, vec![vec![9, 9, 9, 200]]);
        sample.layer_props = {
            let mut props = Vec::new();
            push_prop(&mut props, PROP_APPLY_MASK, &1u32.to_be_bytes());
            props
        };
        sample.mask_tiles = Some(vec![vec![0x80]]);
        let bitmap = decode(&sample.build()).unwrap();
        assert_eq!(&bitmap.row(0)[..4], &[9, 9, 9, 100]);
    }

    #[test]
    fn tiles_are_placed_across_the_layer() {
        let first: Vec<u8> = (0..64).collect();
        let sample = Sample::new(65, 2, 2, vec![[first.clone(), first].concat(), vec![200, 201]]);
        let bitmap = decode(&sample.build()).unwrap();
        assert_eq!(&bitmap.row(0)[4 * 63..4 * 65], &[63, 63, 63, 255, 200, 200, 200, 255]);
        assert_eq!(bitmap.row(1)[4 * 64], 201);
    }

    #[test]
    fn wrong_hierarchy_depth_is_corrupt() {
        let mut file = Sample::new(1, 1, 0, vec![vec![1, 2, 3]]).build();
        let depth = file.windows(12)
            .position(|w| w == [0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0, 3])
            .unwrap() + 8;
        patch(&mut file, depth, 4);
        assert!(matches!(decode(&file), Err(Error::Corrupt(_))));
    }

    #[test]
    fn unknown_compression_is_a_decode_error() {
        let mut sample = Sample::new(1, 1, 2, vec![vec![1]]);
        sample.compression = 2;
        assert!(matches!(decode(&sample.build()), Err(Error::Decode(_))));
    }

    #[test]
    fn rle_run_past_tile_is_a_decode_error() {
        let mut sample = Sample::new(2, 1, 2, vec![vec![0x05, 0x11]]);
        sample.compression = COMPRESS_RLE;
        assert!(matches!(decode(&sample.build()), Err(Error::Decode(_))));
    }

    #[test]
    fn unknown_layer_type_is_a_decode_error() {
        let sample = Sample::new(1, 1, 9, vec![vec![1]]);
        assert!(matches!(decode(&sample.build()), Err(Error::Decode(_))));
    }

    #[test]
    fn fuzzed_files_decode_in_bounds_or_fail_cleanly() {
        let mut masked = Sample::new(3, 1, 3, vec![vec![0x02, 0x40, 253, 10, 20, 30]]);
        masked.compression = COMPRESS_RLE;
        masked.layer_props = {
            let mut props = Vec::new();
            push_prop(&mut props, PROP_APPLY_MASK, &1u32.to_be_bytes());
            props
        };
        masked.mask_tiles = Some(vec![vec![0x02, 0x80]]);
        let first: Vec<u8> = (0..64).collect();
        let tiled = Sample::new(65, 2, 2, vec![[first.clone(), first].concat(), vec![1, 2]]);

        for pristine in [masked.build(), tiled.build()] {
            // Every header, property, hierarchy, level and tile field gets hit.
            for position in 14..pristine.len() - 4 {
                for value in [0u32, 1, 7, 0x40, 0xffff, 0x7fff_ffff, u32::MAX] {
                    let mut file = pristine.clone();
                    file[position..position + 4].copy_from_slice(&value.to_be_bytes());
                    let span = ByteSpan::new(&file);
                    let image = match XcfImage::parse(span) {
                        Ok(image) => image,
                        Err(err) => {
                            assert!(matches!(err, Error::Corrupt(_)), "{:?} at {}", err, position);
                            continue;
                        }
                    };
                    let layer = match image.layers.first() {
                        Some(layer) => layer,
                        None => continue,
                    };
                    match decode_layer(span, &image, layer, &mut Progress::none()) {
                        Ok(bitmap) => {
                            assert_eq!((bitmap.width(), bitmap.height()),
                                       (layer.width, layer.height));
                            assert_eq!(bitmap.pixels().len(),
                                       bitmap.pitch() as usize * bitmap.height() as usize);
                        }
                        Err(err) => {
                            assert!(matches!(err, Error::Corrupt(_) | Error::Decode(_)),
                                    "{:?} at {}",
                                    err,
                                    position);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn cancellation_stops_decoding() {
        let sample = Sample::new(1, 1, 2, vec![vec![1]]);
        let file = sample.build();
        let span = ByteSpan::new(&file);
        let image = XcfImage::parse(span).unwrap();
        let mut stop = |_: u32| false;
        let result = decode_layer(span, &image, &image.layers[0], &mut Progress::new(&mut stop));
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
