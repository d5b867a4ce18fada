//! Spawn point and equipment for a new save file.

use log::debug;
use serde::Deserialize;

use crate::address::{Field, GameData};
use crate::door_locks::{for_each_door, DoorEntry};
use crate::reserved;
use crate::rom::Rom;
use crate::room::RoomEntry;
use crate::{PatcherError, Result};

const SAVE_PAD_SPRITE: u8 = 0x1F;
const SPRITESET_MAX_ENTRIES: usize = 15;
const SPRITE_LAYOUT_MAX_ENTRIES: usize = 24;
const BLOCK_SIZE: u16 = 64;

#[derive(Copy, Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct StartingLocation {
    pub area: u8,
    pub room: u8,
    #[serde(default)]
    pub block_x: u8,
    #[serde(default)]
    pub block_y: u8,
}

/// Moves the spawn point. Area 0 room 0 keeps the game's own start.
///
/// A save pad in the room takes precedence over the block coordinates.
pub fn set_starting_location(rom: &mut Rom, gd: &GameData, location: &StartingLocation) -> Result<()> {
    let (area, room) = (location.area, location.room);
    if area == 0 && room == 0 {
        return Ok(());
    }

    let door = find_door_in_room(rom, gd, area, room)?;
    let (x, y) = match find_save_pad_position(rom, gd, area, room)? {
        Some(position) => position,
        None => (
            location.block_x as u16 * BLOCK_SIZE + 31,
            location.block_y as u16 * BLOCK_SIZE + 63,
        ),
    };
    debug!(
        "Starting in area {} room {:#X} via door {:#X} at ({}, {})",
        area, room, door, x, y
    );

    let addr = reserved::STARTING_LOCATION;
    rom.write_u8(addr, area)?;
    rom.write_u8(addr + 1, room)?;
    rom.write_u8(addr + 2, door)?;
    rom.write_u16(addr + 4, x)?;
    rom.write_u16(addr + 6, y)
}

fn find_door_in_room(rom: &Rom, gd: &GameData, area: u8, room: u8) -> Result<u8> {
    let mut found = None;
    for_each_door(rom, gd, |door_area, door, entry: DoorEntry| {
        if found.is_none() && door_area == area && entry.room == room {
            found = Some(door);
        }
        Ok(())
    })?;
    found.ok_or_else(|| {
        PatcherError::Config(format!("no door found for area {} room {:#X}", area, room))
    })
}

/// Pixel position on the room's save pad, if its spriteset has one.
fn find_save_pad_position(rom: &Rom, gd: &GameData, area: u8, room: u8) -> Result<Option<(u16, u16)>> {
    let entry = RoomEntry::new(rom, gd, area, room)?;
    let spriteset = entry.default_spriteset(rom)?;
    let mut addr = rom.read_ptr(gd.get(Field::SpritesetPtrs)? + spriteset as usize * 4)?;

    let mut slot = None;
    for i in 0..SPRITESET_MAX_ENTRIES {
        match rom.read_u8(addr)? {
            0 => break,
            SAVE_PAD_SPRITE => {
                slot = Some(i);
                break;
            }
            _ => addr += 2,
        }
    }
    let Some(slot) = slot else {
        return Ok(None);
    };

    let mut layout = entry.default_sprite_layout_addr(rom)?;
    for _ in 0..SPRITE_LAYOUT_MAX_ENTRIES {
        let record = rom.read_bytes(layout, 3)?;
        let (y, x, prop) = (record[0], record[1], record[2]);
        if x == 0xFF && y == 0xFF && prop == 0xFF {
            break;
        }
        if (prop & 0xF) as usize == slot + 1 {
            return Ok(Some((
                x as u16 * BLOCK_SIZE + 32,
                y as u16 * BLOCK_SIZE + 9,
            )));
        }
        layout += 3;
    }
    Ok(None)
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Deserialize)]
pub enum Ability {
    Missiles,
    MorphBall,
    ChargeBeam,
    Bombs,
    HiJump,
    SpeedBooster,
    SuperMissiles,
    VariaSuit,
    IceMissiles,
    WideBeam,
    PowerBombs,
    SpaceJump,
    PlasmaBeam,
    GravitySuit,
    DiffusionMissiles,
    WaveBeam,
    ScrewAttack,
    IceBeam,
}

/// Which status byte an ability lives in.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum StatusByte {
    Beam,
    MissileBomb,
    SuitMisc,
}

impl Ability {
    const fn flag(self) -> (StatusByte, u8) {
        use StatusByte::*;
        match self {
            Ability::ChargeBeam => (Beam, 0x01),
            Ability::WideBeam => (Beam, 0x02),
            Ability::PlasmaBeam => (Beam, 0x04),
            Ability::WaveBeam => (Beam, 0x08),
            Ability::IceBeam => (Beam, 0x10),
            Ability::Missiles => (MissileBomb, 0x01),
            Ability::SuperMissiles => (MissileBomb, 0x02),
            Ability::IceMissiles => (MissileBomb, 0x04),
            Ability::DiffusionMissiles => (MissileBomb, 0x08),
            Ability::Bombs => (MissileBomb, 0x10),
            Ability::PowerBombs => (MissileBomb, 0x20),
            Ability::HiJump => (SuitMisc, 0x01),
            Ability::SpeedBooster => (SuitMisc, 0x02),
            Ability::SpaceJump => (SuitMisc, 0x04),
            Ability::ScrewAttack => (SuitMisc, 0x08),
            Ability::VariaSuit => (SuitMisc, 0x10),
            Ability::GravitySuit => (SuitMisc, 0x20),
            Ability::MorphBall => (SuitMisc, 0x40),
        }
    }
}

fn status_byte(abilities: &[Ability], which: StatusByte) -> u8 {
    abilities
        .iter()
        .map(|a| a.flag())
        .filter(|&(byte, _)| byte == which)
        .fold(0, |status, (_, bit)| status | bit)
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct StartingItems {
    #[serde(default = "default_energy")]
    pub energy: u16,
    #[serde(default = "default_missiles")]
    pub missiles: u16,
    #[serde(default = "default_power_bombs")]
    pub power_bombs: u8,
    #[serde(default)]
    pub abilities: Vec<Ability>,
    #[serde(default = "default_security_levels")]
    pub security_levels: Vec<u8>,
    #[serde(default = "default_downloaded_maps")]
    pub downloaded_maps: Vec<u8>,
}

fn default_energy() -> u16 {
    99
}

fn default_missiles() -> u16 {
    10
}

fn default_power_bombs() -> u8 {
    10
}

fn default_security_levels() -> Vec<u8> {
    vec![0]
}

fn default_downloaded_maps() -> Vec<u8> {
    (0..7).collect()
}

impl Default for StartingItems {
    fn default() -> Self {
        Self {
            energy: default_energy(),
            missiles: default_missiles(),
            power_bombs: default_power_bombs(),
            abilities: Vec::new(),
            security_levels: default_security_levels(),
            downloaded_maps: default_downloaded_maps(),
        }
    }
}

impl StartingItems {
    pub fn validate(&self) -> Result<()> {
        let range_error = |what: &str, value: u16, min: u16, max: u16| {
            PatcherError::Config(format!(
                "starting {} {} is outside {}..={}",
                what, value, min, max
            ))
        };
        if !(1..=2099).contains(&self.energy) {
            return Err(range_error("energy", self.energy, 1, 2099));
        }
        if self.missiles > 999 {
            return Err(range_error("missiles", self.missiles, 0, 999));
        }
        if self.power_bombs > 99 {
            return Err(range_error("power bombs", self.power_bombs as u16, 0, 99));
        }
        if let Some(&level) = self.security_levels.iter().find(|&&l| l > 4) {
            return Err(range_error("security level", level as u16, 0, 4));
        }
        if let Some(&map) = self.downloaded_maps.iter().find(|&&m| m > 6) {
            return Err(range_error("downloaded map", map as u16, 0, 6));
        }
        Ok(())
    }
}

pub fn set_starting_items(rom: &mut Rom, gd: &GameData, items: &StartingItems) -> Result<()> {
    let levels = items.security_levels.iter().fold(0u8, |acc, &l| acc | 1 << l);
    let maps = items.downloaded_maps.iter().fold(0u8, |acc, &m| acc | 1 << m);

    let addr = gd.get(Field::StartingEquipment)?;
    rom.write_u16(addr, items.energy)?;
    rom.write_u16(addr + 2, items.energy)?;
    rom.write_u16(addr + 4, items.missiles)?;
    rom.write_u16(addr + 6, items.missiles)?;
    rom.write_u8(addr + 8, items.power_bombs)?;
    rom.write_u8(addr + 9, items.power_bombs)?;
    rom.write_u8(addr + 0xA, status_byte(&items.abilities, StatusByte::Beam))?;
    rom.write_u8(addr + 0xB, status_byte(&items.abilities, StatusByte::MissileBomb))?;
    rom.write_u8(addr + 0xC, status_byte(&items.abilities, StatusByte::SuitMisc))?;
    rom.write_u8(addr + 0xD, levels)?;
    rom.write_u8(addr + 0xE, maps)
}
