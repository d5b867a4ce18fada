//! Run-length codec for room block layers.
//!
//! A layer is a grid of 16-bit cells. The low and high bytes of every cell
//! are split into two planes which are compressed independently and stored
//! back to back. Each plane starts with a byte giving the width (1 or 2) of
//! its length fields, followed by records:
//!
//! - length with the top bit set: a run, followed by one value byte which is
//!   repeated `length & !flag` times
//! - length with the top bit clear: that many literal bytes follow
//! - length of zero: end of plane
//!
//! Two-byte length fields are stored high byte first.

use std::iter;

use crate::{PatcherError, Result};

#[derive(Debug, Clone, Copy)]
struct FieldWidth {
    bytes: u8,
    min_run: usize,
    flag: usize,
}

impl FieldWidth {
    const fn max_len(&self) -> usize {
        self.flag - 1
    }

    fn write_len(&self, out: &mut Vec<u8>, len: usize) {
        if self.bytes == 1 {
            out.push(len as u8);
        } else {
            out.push((len >> 8) as u8);
            out.push((len & 0xFF) as u8);
        }
    }
}

const FIELD_WIDTHS: [FieldWidth; 2] = [
    FieldWidth {
        bytes: 1,
        min_run: 3,
        flag: 0x80,
    },
    FieldWidth {
        bytes: 2,
        min_run: 4,
        flag: 0x8000,
    },
];

fn byte_at(src: &[u8], idx: usize, start: usize) -> Result<u8> {
    src.get(idx)
        .copied()
        .ok_or(PatcherError::Truncated { addr: start })
}

/// Decompresses the block starting at `start`.
///
/// Returns the interleaved cell bytes and the number of source bytes the
/// block occupied, which is the space available when writing it back.
pub fn decompress(src: &[u8], start: usize) -> Result<(Vec<u8>, usize)> {
    let mut idx = start;
    let mut planes: [Vec<u8>; 2] = [Vec::new(), Vec::new()];

    for plane in planes.iter_mut() {
        let width = match byte_at(src, idx, start)? {
            1 => FIELD_WIDTHS[0],
            2 => FIELD_WIDTHS[1],
            other => {
                return Err(PatcherError::RleWidth {
                    addr: idx,
                    width: other,
                })
            }
        };
        idx += 1;

        loop {
            let len = if width.bytes == 1 {
                byte_at(src, idx, start)? as usize
            } else {
                (byte_at(src, idx, start)? as usize) << 8 | byte_at(src, idx + 1, start)? as usize
            };
            idx += width.bytes as usize;

            if len == 0 {
                break;
            }

            if len & width.flag != 0 {
                let count = len & width.max_len();
                let value = byte_at(src, idx, start)?;
                idx += 1;
                plane.extend(iter::repeat(value).take(count));
            } else {
                let literal = src
                    .get(idx..idx + len)
                    .ok_or(PatcherError::Truncated { addr: start })?;
                plane.extend_from_slice(literal);
                idx += len;
            }
        }
    }

    let [low, high] = planes;
    if low.len() != high.len() {
        return Err(PatcherError::PlaneMismatch {
            addr: start,
            low: low.len(),
            high: high.len(),
        });
    }

    let cells = low
        .iter()
        .zip(high.iter())
        .flat_map(|(&lo, &hi)| [lo, hi])
        .collect();

    Ok((cells, idx - start))
}

/// Groups consecutive equal values as `(value, count)`.
fn collect_runs(plane: impl Iterator<Item = u8>) -> Vec<(u8, usize)> {
    let mut runs: Vec<(u8, usize)> = Vec::new();
    for value in plane {
        match runs.last_mut() {
            Some((prev, count)) if *prev == value => *count += 1,
            _ => runs.push((value, 1)),
        }
    }
    runs
}

fn flush_literal(out: &mut Vec<u8>, literal: &mut Vec<u8>, width: &FieldWidth) {
    if literal.is_empty() {
        return;
    }
    width.write_len(out, literal.len());
    out.append(literal);
}

fn compress_plane(runs: &[(u8, usize)], width: &FieldWidth) -> Vec<u8> {
    let mut out = vec![width.bytes];
    let mut literal: Vec<u8> = Vec::new();
    let max_len = width.max_len();

    for &(value, count) in runs {
        if count >= width.min_run {
            flush_literal(&mut out, &mut literal, width);
            let mut remaining = count;
            while remaining > 0 {
                let len = remaining.min(max_len);
                width.write_len(&mut out, len | width.flag);
                out.push(value);
                remaining -= len;
            }
        } else {
            if literal.len() + count > max_len {
                flush_literal(&mut out, &mut literal, width);
            }
            literal.extend(iter::repeat(value).take(count));
        }
    }

    flush_literal(&mut out, &mut literal, width);
    width.write_len(&mut out, 0);
    out
}

/// Compresses interleaved cell bytes.
///
/// Both length-field widths are tried for each plane and the shorter
/// encoding wins (the one-byte form on a tie). The result is never longer
/// than what the game's own compressor produced for the same cells.
pub fn compress(cells: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(cells.len() / 2);

    for plane in 0..2 {
        let runs = collect_runs(cells.iter().skip(plane).step_by(2).copied());
        let shortest = FIELD_WIDTHS
            .iter()
            .map(|width| compress_plane(&runs, width))
            .min_by_key(|encoded| encoded.len())
            .unwrap_or_default();
        out.extend_from_slice(&shortest);
    }

    out
}
