//! Horizontal differencing (Predictor = 2).
//!
//! Each sample in a row is stored as the difference from the sample one
//! pixel group to its left. A pixel group is samples-per-pixel wide for
//! chunky data and one sample wide for planar data. The first group of each
//! row is stored as is. Arithmetic wraps at the sample width and samples are
//! in file byte order.

use crate::io::ByteOrder;

/// Undo horizontal differencing in place.
///
/// `row_samples` is the number of samples per row (width times group).
pub fn undo_horizontal(
    data: &mut [u8],
    row_samples: usize,
    group: usize,
    bits_per_sample: u16,
    byte_order: ByteOrder,
) {
    if row_samples == 0 || group == 0 {
        return;
    }
    match bits_per_sample {
        8 => {
            for row in data.chunks_exact_mut(row_samples) {
                for i in group..row_samples {
                    row[i] = row[i].wrapping_add(row[i - group]);
                }
            }
        }
        16 => {
            for row in data.chunks_exact_mut(row_samples * 2) {
                for i in group..row_samples {
                    let prev = byte_order.read_u16(&row[(i - group) * 2..]);
                    let cur = byte_order.read_u16(&row[i * 2..]);
                    row[i * 2..i * 2 + 2]
                        .copy_from_slice(&byte_order.u16_bytes(cur.wrapping_add(prev)));
                }
            }
        }
        _ => {}
    }
}

/// Apply horizontal differencing in place.
pub fn apply_horizontal(
    data: &mut [u8],
    row_samples: usize,
    group: usize,
    bits_per_sample: u16,
    byte_order: ByteOrder,
) {
    if row_samples == 0 || group == 0 {
        return;
    }
    match bits_per_sample {
        8 => {
            for row in data.chunks_exact_mut(row_samples) {
                for i in (group..row_samples).rev() {
                    row[i] = row[i].wrapping_sub(row[i - group]);
                }
            }
        }
        16 => {
            for row in data.chunks_exact_mut(row_samples * 2) {
                for i in (group..row_samples).rev() {
                    let prev = byte_order.read_u16(&row[(i - group) * 2..]);
                    let cur = byte_order.read_u16(&row[i * 2..]);
                    row[i * 2..i * 2 + 2]
                        .copy_from_slice(&byte_order.u16_bytes(cur.wrapping_sub(prev)));
                }
            }
        }
        _ => {}
    }
}
