//! Row repacking between tight and padded buffer layouts.
//!
//! Backends negotiate RGB-family frames at the padded stride/elevation, but
//! callers hand in tightly packed rows (row length = logical width × bytes
//! per pixel). [`repack`] inserts the padding: each logical row is copied
//! to its strided offset and the remainder zero-filled, then whole zero
//! rows fill the gap up to the elevation.

use crate::error::{Error, Result};
use crate::format::{ColorModel, ImageFormat};

/// Whether a source frame in this format must be repacked before submission.
///
/// Only RGB and RGBA frames are repacked; YUV frames are submitted as-is at
/// their negotiated size.
pub fn needs_repacking(format: &ImageFormat) -> bool {
    matches!(format.color_model(), ColorModel::Rgb | ColorModel::Rgba)
        && (format.stride != format.width || format.elevation != format.height)
}

/// Repack a tightly packed frame into the format's padded layout.
///
/// Reads exactly `width × height × bytes_per_pixel` bytes from `source` and
/// produces `stride × bytes_per_pixel × elevation` bytes, right-padding
/// each row and bottom-padding the frame with zeroes. The produced length
/// is cross-checked against the size table evaluated at the padded
/// dimensions; the two must agree for every format this is used with.
pub fn repack(source: &[u8], format: &ImageFormat) -> Result<Vec<u8>> {
    let pixel_bytes = format.pixel_format.bytes_per_pixel() as usize;
    let source_row = format.width as usize * pixel_bytes;
    let padded_row = format.stride as usize * pixel_bytes;
    let rows = format.height as usize;
    let padded_len = padded_row * format.elevation as usize;

    let table_len = format
        .pixel_format
        .buffer_size(format.stride, format.elevation);
    if padded_len != table_len {
        return Err(Error::LayoutMismatch {
            computed: padded_len,
            expected: table_len,
        });
    }
    if source.len() < source_row * rows {
        return Err(Error::ShortSourceBuffer {
            expected: source_row * rows,
            actual: source.len(),
        });
    }

    let copy = source_row.min(padded_row);
    let mut padded = vec![0u8; padded_len];
    for (dst_row, src_row) in padded
        .chunks_exact_mut(padded_row)
        .zip(source.chunks(source_row))
        .take(rows)
    {
        dst_row[..copy].copy_from_slice(&src_row[..copy]);
    }
    tracing::debug!(
        "repacked {rows} rows of {source_row} bytes into {} rows of {padded_row} bytes",
        format.elevation
    );
    Ok(padded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::PixelFormat;

    fn numbered_frame(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn test_needs_repacking_only_for_padded_rgb() {
        let padded_rgb = ImageFormat::resolve_input(PixelFormat::Rgb888, 170, 99).unwrap();
        assert!(needs_repacking(&padded_rgb));

        let padded_rgba = ImageFormat::resolve_input(PixelFormat::Rgba8888, 170, 99).unwrap();
        assert!(needs_repacking(&padded_rgba));

        let aligned_rgb = ImageFormat::resolve_input(PixelFormat::Rgb888, 100, 76).unwrap();
        assert!(!needs_repacking(&aligned_rgb));

        // YUV frames are never repacked, padded or not.
        let padded_yuv = ImageFormat::resolve_input(PixelFormat::I420, 170, 99).unwrap();
        assert!(!needs_repacking(&padded_yuv));
    }

    #[test]
    fn test_repack_is_identity_when_unpadded() {
        let format = ImageFormat::resolve_input(PixelFormat::Rgb888, 100, 76).unwrap();
        let source = numbered_frame(format.block_size);
        let packed = repack(&source, &format).unwrap();
        assert_eq!(packed, source);
    }

    #[test]
    fn test_repack_round_trips_rows() {
        let format = ImageFormat::resolve_input(PixelFormat::Rgb888, 170, 99).unwrap();
        let source_row = 170 * 3;
        let padded_row = 172 * 3;
        let source = numbered_frame(source_row * 99);

        let packed = repack(&source, &format).unwrap();
        assert_eq!(packed.len(), padded_row * 100);

        for row in 0..99 {
            let original = &source[row * source_row..(row + 1) * source_row];
            let repacked = &packed[row * padded_row..row * padded_row + source_row];
            assert_eq!(repacked, original, "row {row} damaged by repacking");
            // Right padding is zeroed.
            assert!(
                packed[row * padded_row + source_row..(row + 1) * padded_row]
                    .iter()
                    .all(|&b| b == 0)
            );
        }
        // Bottom padding row is zeroed.
        assert!(packed[99 * padded_row..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_repack_rgba_bottom_padding_only() {
        // RGBA keeps its width, so only the bottom row is padding.
        let format = ImageFormat::resolve_input(PixelFormat::Rgba8888, 10, 3).unwrap();
        let source = numbered_frame(10 * 4 * 3);
        let packed = repack(&source, &format).unwrap();
        assert_eq!(packed.len(), 10 * 4 * 4);
        assert_eq!(&packed[..source.len()], &source[..]);
        assert!(packed[source.len()..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_repack_rejects_short_source() {
        let format = ImageFormat::resolve_input(PixelFormat::Rgb888, 170, 99).unwrap();
        let source = vec![0u8; 170 * 3 * 99 - 1];
        assert!(matches!(
            repack(&source, &format),
            Err(Error::ShortSourceBuffer { .. })
        ));
    }

    #[test]
    fn test_repack_ignores_excess_source_bytes() {
        let format = ImageFormat::resolve_input(PixelFormat::Rgba8888, 10, 3).unwrap();
        let mut source = numbered_frame(10 * 4 * 3);
        source.extend_from_slice(&[0xFF; 64]);
        let packed = repack(&source, &format).unwrap();
        assert_eq!(&packed[..10 * 4 * 3], &source[..10 * 4 * 3]);
        assert!(packed[10 * 4 * 3..].iter().all(|&b| b == 0));
    }
}
