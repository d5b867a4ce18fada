//! In-game message encoding.

use log::debug;
use serde::Deserialize;

use crate::address::{Field, GameData};
use crate::rom::Rom;
use crate::{PatcherError, Result};

pub const NEXT: u16 = 0xFD00;
pub const NEWLINE: u16 = 0xFE00;
pub const END: u16 = 0xFF00;
const COLOR: u16 = 0x8100;

/// Codes at or above this have no entry in the width table.
const WIDTH_TABLE_LEN: usize = 0x4A0;
const DEFAULT_WIDTH: u16 = 10;
const SEED_HASH_LEN: usize = 8;
/// How far into the first file screen line to look for its newline.
const FILE_SCREEN_LINE_MAX: usize = 20;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Deserialize)]
pub enum Language {
    JapaneseKanji,
    JapaneseHiragana,
    English,
    German,
    French,
    Italian,
    Spanish,
}

impl Language {
    pub const ALL: [Language; 7] = [
        Language::JapaneseKanji,
        Language::JapaneseHiragana,
        Language::English,
        Language::German,
        Language::French,
        Language::Italian,
        Language::Spanish,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MessageType {
    /// Wraps onto as many two-line pages as needed.
    Navigation,
    /// Exactly two lines; anything past them is dropped.
    Item,
}

/// Glyph code of a printable character.
pub fn char_code(c: char) -> Option<u16> {
    let code = match c {
        ' ' => 0x40,
        '!'..='9' => 0x41 + (c as u16 - '!' as u16),
        ':' => 0x5A,
        ';' => 0x5B,
        '?' => 0x5F,
        'A'..='Z' => 0x81 + (c as u16 - 'A' as u16),
        'a'..='z' => 0xC1 + (c as u16 - 'a' as u16),
        '\n' => NEWLINE,
        _ => return None,
    };
    Some(code)
}

fn escape_code(expr: &str) -> Result<u16> {
    let code = match expr {
        "NEXT" => NEXT,
        "NEWLINE" => NEWLINE,
        "END" => END,
        "OBJECTIVE" => 0xFB00,
        "/COLOR" => COLOR,
        "TARGET" => 0xE00,
        "GAME_START" => 0xB003,
        _ => {
            let value = expr
                .strip_prefix("COLOR=")
                .and_then(|hex| u16::from_str_radix(hex, 16).ok())
                .filter(|&v| v <= 0xFF);
            return value
                .map(|v| COLOR | v)
                .ok_or_else(|| PatcherError::Config(format!("unknown text expression [{}]", expr)));
        }
    };
    Ok(code)
}

/// Turns message strings into the game's 16-bit character stream.
pub trait TextEncoder {
    /// Encodes `text`, wrapping lines wider than `max_width` pixels and
    /// terminating the result with `END`.
    fn encode(&self, text: &str, kind: MessageType, max_width: u16) -> Result<Vec<u16>>;
}

/// Encoder backed by the glyph table and the ROM's character widths.
pub struct GlyphEncoder {
    widths: Vec<u8>,
}

impl GlyphEncoder {
    pub fn new(rom: &Rom, gd: &GameData) -> Result<Self> {
        let addr = gd.get(Field::CharacterWidths)?;
        Ok(Self {
            widths: rom.read_bytes(addr, WIDTH_TABLE_LEN)?.to_vec(),
        })
    }

    fn width(&self, code: u16) -> u16 {
        self.widths
            .get(code as usize)
            .map_or(DEFAULT_WIDTH, |&w| w as u16)
    }
}

impl TextEncoder for GlyphEncoder {
    fn encode(&self, text: &str, kind: MessageType, max_width: u16) -> Result<Vec<u16>> {
        let mut out = Vec::with_capacity(text.len() + 1);
        let mut line_width = 0u16;
        let mut width_since_break = 0u16;
        let mut line = 0;
        // Index of the last space, which becomes the line break on overflow.
        let mut prev_break: Option<usize> = None;
        let mut chars = text.chars();

        while let Some(c) = chars.next() {
            if c == '[' {
                let mut expr = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == ']' {
                        closed = true;
                        break;
                    }
                    expr.push(c);
                }
                if !closed {
                    return Err(PatcherError::Config(format!("unterminated text expression [{}", expr)));
                }
                out.push(escape_code(&expr)?);
                continue;
            }

            let code = char_code(c)
                .ok_or_else(|| PatcherError::Config(format!("character {:?} cannot be encoded", c)))?;
            let width = self.width(code);
            line_width += width;
            width_since_break += width;
            if c == ' ' {
                prev_break = Some(out.len());
                width_since_break = 0;
            }

            let mut extra = None;
            if line_width > max_width {
                line_width = width_since_break;
                width_since_break = 0;
                line += 1;
                extra = Some(NEWLINE);
            }
            if line > 1 {
                match kind {
                    MessageType::Navigation => {
                        line = 0;
                        extra = Some(NEXT);
                    }
                    MessageType::Item => break,
                }
            }

            if let Some(extra) = extra {
                match prev_break.take() {
                    // The space itself overflowed; it becomes the break. The
                    // pushed break is final, so a later overflow on the same
                    // word inserts a new break instead of moving this one.
                    Some(idx) if idx >= out.len() => {
                        out.push(extra);
                        continue;
                    }
                    Some(idx) => out[idx] = extra,
                    None => out.push(extra),
                }
            }
            out.push(code);
        }

        if kind == MessageType::Item && !out.contains(&NEWLINE) {
            out.push(NEWLINE);
        }
        out.push(END);
        Ok(out)
    }
}

/// Replaces the first file screen line of every language with the seed hash,
/// centered within the line's original length.
pub fn write_seed_hash(rom: &mut Rom, gd: &GameData, seed_hash: &str) -> Result<()> {
    let codes = seed_hash
        .chars()
        .map(|c| {
            if c.is_ascii_digit() || c.is_ascii_uppercase() {
                char_code(c)
            } else {
                None
            }
        })
        .collect::<Option<Vec<u16>>>()
        .filter(|codes| codes.len() == SEED_HASH_LEN)
        .ok_or_else(|| PatcherError::Config(format!("invalid seed hash {:?}", seed_hash)))?;

    let lang_ptrs = gd.get(Field::FileScreenTextPtrs)?;
    for lang in Language::ALL {
        let text_ptrs = rom.read_ptr(lang_ptrs + lang.index() * 4)?;
        let addr = rom.read_ptr(text_ptrs)?;
        let mut line_len = None;
        for i in 0..FILE_SCREEN_LINE_MAX {
            if rom.read_u16(addr + i * 2)? == NEWLINE {
                line_len = Some(i);
                break;
            }
        }
        let line_len = line_len.filter(|&len| len >= SEED_HASH_LEN).ok_or_else(|| {
            PatcherError::Invariant(format!("{:?} file screen text at {:#X} has no usable first line", lang, addr))
        })?;

        let pad_left = (line_len - SEED_HASH_LEN) / 2;
        let space = 0x40;
        let line = (0..line_len).map(|i| match i.checked_sub(pad_left) {
            Some(j) if j < SEED_HASH_LEN => codes[j],
            _ => space,
        });
        for (i, code) in line.enumerate() {
            rom.write_u16(addr + i * 2, code)?;
        }
        debug!("Wrote seed hash for {:?} at {:#X}", lang, addr);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{Fixture, CHARACTER_WIDTHS, FILE_SCREEN_TEXT_PTRS};

    /// Every glyph is 8 pixels wide.
    fn encoder(fx: &mut Fixture) -> GlyphEncoder {
        fx.rom.write_bytes(CHARACTER_WIDTHS, &[8; WIDTH_TABLE_LEN]).unwrap();
        GlyphEncoder::new(&fx.rom, &fx.gd()).unwrap()
    }

    fn decode(codes: &[u16]) -> String {
        codes
            .iter()
            .map(|&code| match code {
                NEWLINE => '|',
                NEXT => '>',
                END => '$',
                _ => (b' '..=b'z')
                    .map(char::from)
                    .find(|&c| char_code(c) == Some(code))
                    .unwrap_or('#'),
            })
            .collect()
    }

    #[test]
    fn glyph_table() {
        assert_eq!(char_code(' '), Some(0x40));
        assert_eq!(char_code('0'), Some(0x50));
        assert_eq!(char_code('9'), Some(0x59));
        assert_eq!(char_code('.'), Some(0x4E));
        assert_eq!(char_code('A'), Some(0x81));
        assert_eq!(char_code('z'), Some(0xDA));
        assert_eq!(char_code('<'), None);
        assert_eq!(char_code('é'), None);
    }

    #[test]
    fn escapes() {
        let mut fx = Fixture::new();
        let enc = encoder(&mut fx);
        let codes = enc
            .encode("[GAME_START]A[COLOR=3]B[/COLOR]", MessageType::Navigation, 224)
            .unwrap();
        assert_eq!(codes, vec![0xB003, 0x81, 0x8103, 0x82, 0x8100, END]);
        assert!(enc.encode("[BOGUS]", MessageType::Navigation, 224).is_err());
        assert!(enc.encode("<", MessageType::Navigation, 224).is_err());
        assert!(enc.encode("A[NEXT", MessageType::Navigation, 224).is_err());
    }

    #[test]
    fn navigation_wraps_at_spaces_and_pages() {
        let mut fx = Fixture::new();
        let enc = encoder(&mut fx);
        // Four glyphs per line.
        let codes = enc.encode("AB CD EF GH", MessageType::Navigation, 32).unwrap();
        assert_eq!(decode(&codes), "AB|CD>EF|GH$");
    }

    #[test]
    fn overflowing_space_becomes_the_break() {
        let mut fx = Fixture::new();
        let enc = encoder(&mut fx);
        let codes = enc.encode("ABCD EF", MessageType::Navigation, 32).unwrap();
        assert_eq!(decode(&codes), "ABCD|EF$");
    }

    #[test]
    fn break_from_overflowing_space_is_not_moved() {
        let mut fx = Fixture::new();
        let enc = encoder(&mut fx);
        let codes = enc.encode("ABCD EFGHIJKL", MessageType::Navigation, 32).unwrap();
        assert_eq!(decode(&codes), "ABCD|EFGH>I|JKL$");
    }

    #[test]
    fn item_messages_have_two_lines() {
        let mut fx = Fixture::new();
        let enc = encoder(&mut fx);
        let short = enc.encode("AB", MessageType::Item, 32).unwrap();
        assert_eq!(decode(&short), "AB|$");
        let long = enc.encode("AB CD EF GH", MessageType::Item, 32).unwrap();
        assert_eq!(decode(&long), "AB|CD E$");
    }

    #[test]
    fn seed_hash_is_centered_in_each_language() {
        let mut fx = Fixture::new();
        for lang in 0..7 {
            let ptrs = fx.alloc(4);
            let text = fx.alloc(40);
            fx.rom.write_ptr(FILE_SCREEN_TEXT_PTRS + lang * 4, ptrs).unwrap();
            fx.rom.write_ptr(ptrs, text).unwrap();
            for i in 0..12 {
                fx.rom.write_u16(text + i * 2, 0x81).unwrap();
            }
            fx.rom.write_u16(text + 24, NEWLINE).unwrap();
        }
        let gd = GameData::new(&fx.table, &fx.rom);
        write_seed_hash(&mut fx.rom, &gd, "AB12CD34").unwrap();

        let ptrs = fx.rom.read_ptr(FILE_SCREEN_TEXT_PTRS + 2 * 4).unwrap();
        let text = fx.rom.read_ptr(ptrs).unwrap();
        let line: Vec<u16> = (0..13).map(|i| fx.rom.read_u16(text + i * 2).unwrap()).collect();
        assert_eq!(decode(&line), "  AB12CD34  |");

        assert!(write_seed_hash(&mut fx.rom, &gd, "ab12cd34").is_err());
        assert!(write_seed_hash(&mut fx.rom, &gd, "AB12").is_err());
    }

    #[test]
    fn seed_hash_needs_a_line_break() {
        let mut fx = Fixture::new();
        let text = fx.alloc(64);
        for lang in 0..7 {
            fx.rom.write_ptr(FILE_SCREEN_TEXT_PTRS + lang * 4, FILE_SCREEN_TEXT_PTRS + 0x100).unwrap();
        }
        fx.rom.write_ptr(FILE_SCREEN_TEXT_PTRS + 0x100, text).unwrap();
        let gd = GameData::new(&fx.table, &fx.rom);
        assert!(matches!(
            write_seed_hash(&mut fx.rom, &gd, "AB12CD34"),
            Err(PatcherError::Invariant(_))
        ));
    }
}
