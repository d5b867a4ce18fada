//! Staff credits roll.

use log::info;
use serde::Deserialize;

use crate::rom::Rom;
use crate::{PatcherError, Result};

const CREDITS_ADDR: usize = 0x74_B0B0;
const CREDITS_LEN: usize = 0x2B98;
const LINE_LEN: usize = 36;
pub const MAX_TEXT_LEN: usize = 34;

const SKIP_1: u8 = 5;
const END: u8 = 6;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
pub enum LineType {
    Blank,
    Blue,
    Red,
    White1,
    White2,
}

impl LineType {
    fn control(self) -> u8 {
        match self {
            LineType::Blank => SKIP_1,
            LineType::Blue => 0,
            LineType::Red => 1,
            LineType::White2 => 2,
            LineType::White1 => 3,
        }
    }

    fn two_rows(self) -> bool {
        self == LineType::White2
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct CreditsLine {
    pub line_type: LineType,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub blank_lines: u8,
    #[serde(default = "default_centered")]
    pub centered: bool,
}

fn default_centered() -> bool {
    true
}

impl CreditsLine {
    /// Checks that every character exists in the line's font.
    pub fn validate(&self) -> Result<()> {
        self.encode().map(|_| ())
    }

    fn encode(&self) -> Result<Vec<u8>> {
        let mut line = vec![self.line_type.control()];
        if self.line_type == LineType::Blank {
            return Ok(line);
        }
        let len = self.text.chars().count();
        if len > MAX_TEXT_LEN {
            return Err(PatcherError::Config(format!(
                "credits line {:?} is longer than {} characters",
                self.text, MAX_TEXT_LEN
            )));
        }
        if self.centered {
            line.resize(1 + (MAX_TEXT_LEN - len) / 2, b' ');
        }
        for c in self.text.chars() {
            line.push(self.char_value(c)?);
        }
        Ok(line)
    }

    fn char_value(&self, c: char) -> Result<u8> {
        let two_rows = self.line_type.two_rows();
        let value = match c {
            ' ' | 'A'..='Z' => Some(c as u8),
            'a'..='z' if two_rows => Some(c as u8),
            ',' => Some(0x2C),
            '.' => Some(0x2E),
            '&' if !two_rows => Some(0x26),
            'í' if two_rows => Some(0x2B),
            '\'' if two_rows => Some(0x2D),
            _ => None,
        };
        value.ok_or_else(|| {
            PatcherError::Config(format!(
                "{:?} credits lines do not support {:?}",
                self.line_type, c
            ))
        })
    }
}

/// Replaces the credits roll with `lines`.
pub fn write_credits(rom: &mut Rom, lines: &[CreditsLine]) -> Result<()> {
    let mut encoded = Vec::new();
    for line in lines {
        encoded.push(line.encode()?);
        for _ in 0..line.blank_lines {
            encoded.push(vec![SKIP_1]);
        }
    }
    encoded.push(vec![END]);

    let capacity = CREDITS_LEN / LINE_LEN;
    if encoded.len() > capacity {
        return Err(PatcherError::CapacityExceeded {
            what: "credits",
            capacity,
        });
    }
    for (i, line) in encoded.iter().enumerate() {
        let mut full = [0u8; LINE_LEN];
        full[..line.len()].copy_from_slice(line);
        rom.write_bytes(CREDITS_ADDR + i * LINE_LEN, &full)?;
    }
    info!("Wrote {} credits lines", encoded.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rom::blank_rom;

    fn line(line_type: LineType, text: &str) -> CreditsLine {
        CreditsLine {
            line_type,
            text: text.to_string(),
            blank_lines: 0,
            centered: false,
        }
    }

    fn row(rom: &Rom, i: usize) -> Vec<u8> {
        rom.read_bytes(CREDITS_ADDR + i * LINE_LEN, LINE_LEN).unwrap().to_vec()
    }

    #[test]
    fn lines_are_padded_and_terminated() {
        let mut rom = blank_rom();
        rom.write_bytes(CREDITS_ADDR, &[0xAA; LINE_LEN * 4]).unwrap();
        let lines: Vec<CreditsLine> = serde_json::from_str(
            r#"[{"LineType": "Blue", "Text": "AB", "Centered": false, "BlankLines": 1},
                {"LineType": "Blank"}]"#,
        )
        .unwrap();
        write_credits(&mut rom, &lines).unwrap();

        let mut first = vec![0u8; LINE_LEN];
        first[..3].copy_from_slice(&[0, b'A', b'B']);
        assert_eq!(row(&rom, 0), first);
        for i in [1, 2] {
            assert_eq!(row(&rom, i)[0], SKIP_1);
            assert!(row(&rom, i)[1..].iter().all(|&b| b == 0));
        }
        assert_eq!(row(&rom, 3)[0], END);
    }

    #[test]
    fn centered_text_is_padded_with_spaces() {
        let mut rom = blank_rom();
        let mut centered = line(LineType::White2, "Ab");
        centered.centered = true;
        write_credits(&mut rom, &[centered]).unwrap();
        let first = row(&rom, 0);
        assert_eq!(first[0], 2);
        assert!(first[1..17].iter().all(|&b| b == b' '));
        assert_eq!(&first[17..19], b"Ab");
    }

    #[test]
    fn fonts_limit_characters() {
        assert!(line(LineType::Blue, "a").validate().is_err());
        assert!(line(LineType::White1, "a").validate().is_err());
        assert!(line(LineType::White2, "&").validate().is_err());
        assert!(line(LineType::Red, "'").validate().is_err());
        line(LineType::Red, "R & D, INC.").validate().unwrap();
        line(LineType::White2, "It's Garcí.").validate().unwrap();
        assert!(line(LineType::Blue, &"A".repeat(35)).validate().is_err());
    }

    #[test]
    fn too_many_lines() {
        let mut rom = blank_rom();
        let mut filler = line(LineType::Blank, "");
        filler.blank_lines = 255;
        let lines = vec![filler.clone(), filler];
        assert!(matches!(
            write_credits(&mut rom, &lines),
            Err(PatcherError::CapacityExceeded { .. })
        ));
    }
}
