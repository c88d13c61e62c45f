//! Run-length codecs shared by the container parsers.

use byteorder::{ByteOrder, LittleEndian};

use super::error::{Error, Result};

/// Decodes a PackBits stream into `output`, returning the number of bytes
/// written.
///
/// A control byte `N` below `0x80` is followed by `N + 1` literal bytes;
/// otherwise the next byte is repeated `N - 0x80 + 3` times.  Decoding stops
/// when the input is exhausted.  A literal or run that would read past the
/// end of `input` or write past the end of `output` is an error.
pub fn unpack_bits(input: &[u8], output: &mut [u8]) -> Result<usize> {
    let mut src = 0;
    let mut dst = 0;
    while src < input.len() {
        let control = input[src] as usize;
        src += 1;
        if control < 0x80 {
            let count = control + 1;
            if src + count > input.len() {
                return Err(rle_error("literal runs past the end of the input"));
            }
            if dst + count > output.len() {
                return Err(rle_error("literal overflows the output"));
            }
            output[dst..dst + count].copy_from_slice(&input[src..src + count]);
            src += count;
            dst += count;
        } else {
            let count = control - 0x80 + 3;
            let value = *input.get(src)
                .ok_or_else(|| rle_error("run is missing its value"))?;
            src += 1;
            if dst + count > output.len() {
                return Err(rle_error("run overflows the output"));
            }
            output[dst..dst + count].fill(value);
            dst += count;
        }
    }
    Ok(dst)
}

/// Decodes the word-oriented RLE4 variant into `output`, returning the number
/// of 4-byte words written.
///
/// Same structure as [`unpack_bits`], but the control value and every unit
/// copied or replicated is a little-endian 32-bit word.  Trailing input bytes
/// that do not make a whole word are ignored.
pub fn unpack_words(input: &[u8], output: &mut [u8]) -> Result<usize> {
    let input_words = input.len() / 4;
    let output_words = output.len() / 4;
    let mut src = 0;
    let mut dst = 0;
    while src < input_words {
        let control = LittleEndian::read_u32(&input[4 * src..]) as usize;
        src += 1;
        if control < 0x80 {
            let count = control + 1;
            if src + count > input_words {
                return Err(rle_error("literal runs past the end of the input"));
            }
            if dst + count > output_words {
                return Err(rle_error("literal overflows the output"));
            }
            output[4 * dst..4 * (dst + count)]
                .copy_from_slice(&input[4 * src..4 * (src + count)]);
            src += count;
            dst += count;
        } else {
            let count = control - 0x80 + 3;
            if src >= input_words {
                return Err(rle_error("run is missing its value"));
            }
            if count > output_words - dst {
                return Err(rle_error("run overflows the output"));
            }
            let word = &input[4 * src..4 * src + 4];
            src += 1;
            for unit in output[4 * dst..4 * (dst + count)].chunks_exact_mut(4) {
                unit.copy_from_slice(word);
            }
            dst += count;
        }
    }
    Ok(dst)
}

/// Decodes one RLE-compressed XCF tile of `pixels` pixels with `channels`
/// interleaved channels into `output`, returning the number of input bytes
/// consumed.
///
/// Each channel is coded separately.  An opcode `n >= 128` introduces
/// `256 - n` literal bytes, any other opcode a run of `n + 1` copies of the
/// next byte; a count of exactly 128 is replaced by a following big-endian
/// `u16`.
pub fn unpack_xcf_tile(input: &[u8],
                       output: &mut [u8],
                       pixels: usize,
                       channels: usize)
                       -> Result<usize> {
    debug_assert!(output.len() >= pixels * channels);
    let mut iter = input.iter();
    for channel in 0..channels {
        let mut pixel = 0;
        while pixel < pixels {
            let opcode = *iter.next().ok_or_else(truncated_tile)? as usize;
            let literal = opcode >= 128;
            let mut count = if literal { 256 - opcode } else { opcode + 1 };
            if count == 128 {
                let high = *iter.next().ok_or_else(truncated_tile)? as usize;
                let low = *iter.next().ok_or_else(truncated_tile)? as usize;
                count = (high << 8) | low;
            }
            if count > pixels - pixel {
                return Err(rle_error("tile run overflows the tile"));
            }
            if literal {
                for _ in 0..count {
                    output[pixel * channels + channel] =
                        *iter.next().ok_or_else(truncated_tile)?;
                    pixel += 1;
                }
            } else {
                let value = *iter.next().ok_or_else(truncated_tile)?;
                for _ in 0..count {
                    output[pixel * channels + channel] = value;
                    pixel += 1;
                }
            }
        }
    }
    Ok(input.len() - iter.as_slice().len())
}

fn truncated_tile() -> Error {
    rle_error("tile data ends in the middle of a run")
}

fn rle_error(what: &str) -> Error {
    Error::Decode(format!("invalid RLE-compressed data: {}", what))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_run() {
        let input = [0x05, 1, 2, 3, 4, 5, 6];
        let mut output = [0u8; 6];
        assert_eq!(unpack_bits(&input, &mut output).unwrap(), 6);
        assert_eq!(output, [1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn repeated_run() {
        let input = [0x83, 0x78];
        let mut output = [0u8; 8];
        assert_eq!(unpack_bits(&input, &mut output).unwrap(), 6);
        assert_eq!(&output[..6], &[0x78; 6]);
        assert_eq!(&output[6..], &[0, 0]);
    }

    #[test]
    fn longest_run_is_130() {
        let input = [0xff, 9];
        let mut output = [0u8; 130];
        assert_eq!(unpack_bits(&input, &mut output).unwrap(), 130);
        let mut short = [0u8; 129];
        assert!(unpack_bits(&input, &mut short).is_err());
    }

    #[test]
    fn output_length_is_sum_of_runs() {
        let input = [0x01, 7, 8, 0x80, 3, 0x00, 4, 0x81, 5];
        let mut output = [0u8; 32];
        let written = unpack_bits(&input, &mut output).unwrap();
        assert_eq!(written, 2 + 3 + 1 + 4);
        assert_eq!(&output[..written], &[7, 8, 3, 3, 3, 4, 5, 5, 5, 5]);
    }

    #[test]
    fn truncated_streams_fail_without_overflow() {
        let valid = [0x05, 1, 2, 3, 4, 5, 6, 0x83, 0x78, 0x02, 9, 9, 9];
        let mut output = [0u8; 15];
        assert_eq!(unpack_bits(&valid, &mut output).unwrap(), 15);
        for cut in 1..valid.len() {
            let result = unpack_bits(&valid[..cut], &mut output);
            match result {
                Ok(written) => assert!(written <= output.len()),
                Err(Error::Decode(_)) => {}
                Err(other) => panic!("unexpected error {:?}", other),
            }
        }
        for capacity in 0..15 {
            let mut small = vec![0u8; capacity];
            assert!(unpack_bits(&valid, &mut small).is_err());
        }
    }

    #[test]
    fn word_literal_and_run() {
        let mut input = Vec::new();
        input.extend_from_slice(&1u32.to_le_bytes());
        input.extend_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        input.extend_from_slice(&0x81u32.to_le_bytes());
        input.extend_from_slice(&[9, 9, 9, 255]);
        let mut output = [0u8; 24];
        assert_eq!(unpack_words(&input, &mut output).unwrap(), 6);
        assert_eq!(&output[..8], &[1, 2, 3, 4, 5, 6, 7, 8]);
        for word in output[8..].chunks(4) {
            assert_eq!(word, &[9, 9, 9, 255]);
        }
    }

    #[test]
    fn word_run_past_capacity_fails() {
        let mut input = Vec::new();
        input.extend_from_slice(&0xffu32.to_le_bytes());
        input.extend_from_slice(&[1, 1, 1, 1]);
        let mut output = [0u8; 16];
        assert!(unpack_words(&input, &mut output).is_err());
        assert!(unpack_words(&input[..4], &mut output).is_err());
        let huge = u32::MAX.to_le_bytes();
        let mut input = huge.to_vec();
        input.extend_from_slice(&[1, 1, 1, 1]);
        assert!(unpack_words(&input, &mut output).is_err());
    }

    #[test]
    fn xcf_tile_two_channels() {
        // Channel 0: run of 4 copies of 7.  Channel 1: 4 literal bytes.
        let input = [3, 7, 252, 1, 2, 3, 4];
        let mut output = [0u8; 8];
        assert_eq!(unpack_xcf_tile(&input, &mut output, 4, 2).unwrap(), 7);
        assert_eq!(output, [7, 1, 7, 2, 7, 3, 7, 4]);
    }

    #[test]
    fn xcf_tile_long_run() {
        let input = [127, 0x01, 0x2c, 42];
        let mut output = vec![0u8; 300];
        assert_eq!(unpack_xcf_tile(&input, &mut output, 300, 1).unwrap(), 4);
        assert!(output.iter().all(|&value| value == 42));
    }

    #[test]
    fn xcf_tile_overflow_fails() {
        let input = [9, 7];
        let mut output = [0u8; 4];
        assert!(unpack_xcf_tile(&input, &mut output, 4, 1).is_err());
        assert!(unpack_xcf_tile(&[3], &mut output, 4, 1).is_err());
    }
}
