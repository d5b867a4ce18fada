//! Navigation terminal hints, ship text and terminal security levels.

use std::collections::BTreeMap;

use log::{debug, info};
use serde::Deserialize;

use crate::address::{Field, GameData};
use crate::reserved::{HINT_SECURITY_LEVELS, HINT_TEXT_END, HINT_TEXT_START};
use crate::rom::Rom;
use crate::text::{Language, MessageType, TextEncoder};
use crate::{PatcherError, Result};

const MAX_LINE_WIDTH: u16 = 224;
const GAME_START: &str = "[GAME_START]";

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Deserialize)]
pub enum NavRoom {
    MainDeckWest,
    MainDeckEast,
    OperationsDeck,
    Sector1Entrance,
    Sector5Entrance,
    Sector2Entrance,
    Sector4Entrance,
    Sector3Entrance,
    Sector6Entrance,
    AuxiliaryPower,
    RestrictedLabs,
}

impl NavRoom {
    pub const ALL: [NavRoom; 11] = [
        NavRoom::MainDeckWest,
        NavRoom::MainDeckEast,
        NavRoom::OperationsDeck,
        NavRoom::Sector1Entrance,
        NavRoom::Sector5Entrance,
        NavRoom::Sector2Entrance,
        NavRoom::Sector4Entrance,
        NavRoom::Sector3Entrance,
        NavRoom::Sector6Entrance,
        NavRoom::AuxiliaryPower,
        NavRoom::RestrictedLabs,
    ];

    /// The terminal's index in the game's tables. Index 0 is the ship.
    pub fn value(self) -> usize {
        self as usize + 1
    }
}

/// Security level needed to use a navigation terminal.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HintLock {
    #[default]
    Open,
    Locked,
    Grey,
    Blue,
    Green,
    Yellow,
    Red,
}

impl HintLock {
    pub const fn value(self) -> u8 {
        match self {
            HintLock::Open => 0xFF,
            HintLock::Locked => 5,
            HintLock::Grey => 0,
            HintLock::Blue => 1,
            HintLock::Green => 2,
            HintLock::Yellow => 3,
            HintLock::Red => 4,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct ShipText {
    pub initial_text: String,
    pub confirm_text: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct LanguageText {
    #[serde(default)]
    pub navigation_terminals: BTreeMap<NavRoom, String>,
    pub ship_text: ShipText,
}

pub type NavigationText = BTreeMap<Language, LanguageText>;

/// Appends encoded messages to the hint text region.
struct HintTextWriter {
    addr: usize,
}

impl HintTextWriter {
    fn write(&mut self, rom: &mut Rom, codes: &[u16]) -> Result<usize> {
        let start = self.addr;
        let end = start + codes.len() * 2;
        if end > HINT_TEXT_END {
            return Err(PatcherError::CapacityExceeded {
                what: "hint text region",
                capacity: HINT_TEXT_END - HINT_TEXT_START,
            });
        }
        for (i, &code) in codes.iter().enumerate() {
            rom.write_u16(start + i * 2, code)?;
        }
        self.addr = end;
        Ok(start)
    }
}

/// Encodes every language's messages into the hint text region and points
/// the language's text table at them. Terminal messages fill both the
/// terminal's pointer pair.
pub fn write_navigation_text(rom: &mut Rom, gd: &GameData, encoder: &dyn TextEncoder, text: &NavigationText) -> Result<()> {
    let table = gd.get(Field::NavigationTextPtrs)?;
    let mut writer = HintTextWriter {
        addr: HINT_TEXT_START,
    };
    let encode = |s: &str| encoder.encode(s, MessageType::Navigation, MAX_LINE_WIDTH);

    for (lang, texts) in text {
        let base = rom.read_ptr(table + lang.index() * 4)?;

        let initial = &texts.ship_text.initial_text;
        let initial = if initial.starts_with(GAME_START) {
            encode(initial)?
        } else {
            encode(&format!("{}{}", GAME_START, initial))?
        };
        let addr = writer.write(rom, &initial)?;
        rom.write_ptr(base, addr)?;
        let addr = writer.write(rom, &encode(&texts.ship_text.confirm_text)?)?;
        rom.write_ptr(base + 4, addr)?;

        for (room, message) in &texts.navigation_terminals {
            let addr = writer.write(rom, &encode(message)?)?;
            let entry = base + room.value() * 8;
            rom.write_ptr(entry, addr)?;
            rom.write_ptr(entry + 4, addr)?;
        }
        debug!("Wrote {:?} navigation text, region cursor {:#X}", lang, writer.addr);
    }
    info!(
        "Navigation text uses {:#X} of {:#X} bytes",
        writer.addr - HINT_TEXT_START,
        HINT_TEXT_END - HINT_TEXT_START
    );
    Ok(())
}

/// Writes every terminal's required security level. Terminals missing from
/// `locks` are open.
pub fn apply_hint_security(rom: &mut Rom, locks: &BTreeMap<NavRoom, HintLock>) -> Result<()> {
    for room in NavRoom::ALL {
        let lock = locks.get(&room).copied().unwrap_or_default();
        rom.write_u8(HINT_SECURITY_LEVELS + room.value(), lock.value())?;
    }
    Ok(())
}
