//! GBA BIOS LZ77 (type 0x10) compression.
//!
//! A stream is a 4-byte header (`0x10 | size << 8`) followed by groups of one
//! flag byte and up to eight tokens, most significant flag bit first. A set
//! bit marks a two-byte back-reference, a clear bit a literal byte.

use crate::{PatcherError, Result};

const LZ77_TYPE: u8 = 0x10;
const MIN_MATCH: usize = 3;
const MAX_MATCH: usize = 0x12;
const WINDOW: usize = 0x1000;
/// VRAM-safe streams never reference the byte just written.
const MIN_DISP: usize = 2;

/// Decodes the stream at `addr`. Returns the data and the number of stream
/// bytes consumed.
pub fn decompress(buf: &[u8], addr: usize) -> Result<(Vec<u8>, usize)> {
    let header = buf
        .get(addr..addr + 4)
        .ok_or(PatcherError::Truncated { addr })?;
    if header[0] != LZ77_TYPE {
        return Err(PatcherError::Lz77(format!(
            "stream at {:#X} has type {:#04X}",
            addr, header[0]
        )));
    }
    let size = u32::from_le_bytes([header[1], header[2], header[3], 0]) as usize;

    let mut out = Vec::with_capacity(size);
    let mut pos = addr + 4;
    let next = |pos: &mut usize| -> Result<u8> {
        let b = *buf.get(*pos).ok_or(PatcherError::Truncated { addr })?;
        *pos += 1;
        Ok(b)
    };

    while out.len() < size {
        let flags = next(&mut pos)?;
        for bit in (0..8).rev() {
            if out.len() >= size {
                break;
            }
            if flags & (1 << bit) == 0 {
                out.push(next(&mut pos)?);
                continue;
            }
            let b0 = next(&mut pos)?;
            let b1 = next(&mut pos)?;
            let len = (b0 >> 4) as usize + MIN_MATCH;
            let disp = (((b0 & 0xF) as usize) << 8 | b1 as usize) + 1;
            let start = out.len().checked_sub(disp).ok_or_else(|| {
                PatcherError::Lz77(format!(
                    "stream at {:#X} refers {} bytes back after {} bytes",
                    addr,
                    disp,
                    out.len()
                ))
            })?;
            for i in 0..len.min(size - out.len()) {
                out.push(out[start + i]);
            }
        }
    }
    Ok((out, pos - addr))
}

fn longest_match(data: &[u8], pos: usize) -> Option<(usize, usize)> {
    let max_len = MAX_MATCH.min(data.len() - pos);
    if max_len < MIN_MATCH {
        return None;
    }
    let mut best: Option<(usize, usize)> = None;
    for disp in MIN_DISP..=WINDOW.min(pos) {
        let start = pos - disp;
        let len = (0..max_len)
            .take_while(|&i| data[start + i] == data[pos + i])
            .count();
        if len >= MIN_MATCH && best.map_or(true, |(_, best_len)| len > best_len) {
            best = Some((disp, len));
            if len == max_len {
                break;
            }
        }
    }
    best
}

/// Greedy encoder. The output is padded to a multiple of four bytes.
pub fn compress(data: &[u8]) -> Vec<u8> {
    let size = data.len() as u32;
    let mut out = (LZ77_TYPE as u32 | size << 8).to_le_bytes().to_vec();

    let mut pos = 0;
    while pos < data.len() {
        let flag_idx = out.len();
        out.push(0);
        for bit in (0..8).rev() {
            if pos >= data.len() {
                break;
            }
            match longest_match(data, pos) {
                Some((disp, len)) => {
                    out[flag_idx] |= 1 << bit;
                    let d = disp - 1;
                    out.push(((len - MIN_MATCH) << 4 | d >> 8) as u8);
                    out.push((d & 0xFF) as u8);
                    pos += len;
                }
                None => {
                    out.push(data[pos]);
                    pos += 1;
                }
            }
        }
    }

    while out.len() % 4 != 0 {
        out.push(0);
    }
    out
}
