//! Item placement: the location catalogue, assignments from the patch data
//! and the tank, minor-location and major-location tables they drive.

use std::collections::HashSet;

use log::{debug, info};
use serde::Deserialize;

use crate::address::GameData;
use crate::data::{DataDir, LOCATIONS_FILE};
use crate::reserved;
use crate::rom::Rom;
use crate::room::{LayerKind, RoomEntry, Tileset};
use crate::{PatcherError, Result};

pub const MAJOR_LOCATION_COUNT: usize = 20;
pub const MINOR_LOCATION_COUNT: usize = 100;

const MINOR_LOC_SIZE: usize = 8;
const MAJOR_LOC_SIZE: usize = 2;
const MINOR_ROOMS_PER_AREA: usize = 16;

const TANK_CLIP: [u16; 3] = [0x62, 0x63, 0x68];
const HIDDEN_TANK_CLIP: [u16; 3] = [0x64, 0x65, 0x69];
const TANK_BG1_START: u16 = 0x40;
const TANK_TILE: [u8; 3] = [0x50, 0x54, 0x58];

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Deserialize)]
pub enum ItemType {
    None,
    Level0,
    Missiles,
    MorphBall,
    ChargeBeam,
    Level1,
    Bombs,
    HiJump,
    SpeedBooster,
    Level2,
    SuperMissiles,
    VariaSuit,
    Level3,
    IceMissiles,
    WideBeam,
    PowerBombs,
    SpaceJump,
    PlasmaBeam,
    GravitySuit,
    Level4,
    DiffusionMissiles,
    WaveBeam,
    ScrewAttack,
    IceBeam,
    MissileTank,
    EnergyTank,
    PowerBombTank,
    IceTrap,
    InfantMetroid,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Deserialize)]
pub enum ItemSprite {
    Empty,
    Missiles,
    Level0,
    MorphBall,
    ChargeBeam,
    Level1,
    Bombs,
    HiJump,
    SpeedBooster,
    Level2,
    SuperMissiles,
    VariaSuit,
    Level3,
    IceMissiles,
    WideBeam,
    PowerBombs,
    SpaceJump,
    PlasmaBeam,
    GravitySuit,
    Level4,
    DiffusionMissiles,
    WaveBeam,
    ScrewAttack,
    IceBeam,
    MissileTank,
    EnergyTank,
    PowerBombTank,
    Anonymous,
    ShinyMissileTank,
    ShinyPowerBombTank,
    InfantMetroid,
}

/// Bosses and devices that hand out a major item.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Deserialize)]
pub enum MajorSource {
    MainDeckData,
    Arachnus,
    ChargeCoreX,
    Level1,
    TroData,
    Zazabi,
    Serris,
    Level2,
    PyrData,
    MegaX,
    Level3,
    ArcData1,
    WideCoreX,
    ArcData2,
    Yakuza,
    Nettori,
    Nightmare,
    Level4,
    AqaData,
    WaveCoreX,
    Ridley,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct MajorAssignment {
    pub source: MajorSource,
    pub item: ItemType,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct MinorAssignment {
    pub area: u8,
    pub room: u8,
    pub block_x: u8,
    pub block_y: u8,
    pub item: ItemType,
    pub item_sprite: Option<ItemSprite>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct LocationsConfig {
    pub major_locations: Vec<MajorAssignment>,
    pub minor_locations: Vec<MinorAssignment>,
}

impl LocationsConfig {
    pub fn validate(&self) -> Result<()> {
        if self.major_locations.len() != MAJOR_LOCATION_COUNT {
            return Err(PatcherError::Config(format!(
                "expected {} major locations, found {}",
                MAJOR_LOCATION_COUNT,
                self.major_locations.len()
            )));
        }
        if self.minor_locations.len() != MINOR_LOCATION_COUNT {
            return Err(PatcherError::Config(format!(
                "expected {} minor locations, found {}",
                MINOR_LOCATION_COUNT,
                self.minor_locations.len()
            )));
        }

        let mut sources = HashSet::new();
        for major in &self.major_locations {
            if !sources.insert(major.source) {
                return Err(PatcherError::Config(format!(
                    "major location {:?} is assigned twice",
                    major.source
                )));
            }
        }

        let mut blocks = HashSet::new();
        for minor in &self.minor_locations {
            if minor.area > 6 {
                return Err(PatcherError::Config(format!(
                    "minor location area {} is not 0..=6",
                    minor.area
                )));
            }
            if !blocks.insert((minor.area, minor.room, minor.block_x, minor.block_y)) {
                return Err(PatcherError::Config(format!(
                    "minor location area {} room {:#X} ({}, {}) is assigned twice",
                    minor.area, minor.room, minor.block_x, minor.block_y
                )));
            }
        }
        Ok(())
    }

    pub fn metroid_count(&self) -> usize {
        let majors = self.major_locations.iter().map(|m| m.item);
        let minors = self.minor_locations.iter().map(|m| m.item);
        majors
            .chain(minors)
            .filter(|&item| item == ItemType::InfantMetroid)
            .count()
    }
}

/// A location where a boss or device awards an item.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MajorLocation {
    pub area: u8,
    pub room: u8,
    pub source: MajorSource,
    pub original: ItemType,
    #[serde(skip)]
    pub new_item: Option<ItemType>,
}

/// A tank block placed in a room.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MinorLocation {
    pub area: u8,
    pub room: u8,
    pub block_x: u8,
    pub block_y: u8,
    pub hidden: bool,
    pub original: ItemType,
    #[serde(skip)]
    pub new_item: Option<ItemType>,
    #[serde(skip)]
    pub item_sprite: Option<ItemSprite>,
}

/// The catalogue of item locations with any assignments applied.
///
/// Minor locations sharing a room are listed consecutively; their order
/// decides which tank slot each one uses.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LocationSettings {
    pub major_locations: Vec<MajorLocation>,
    pub minor_locations: Vec<MinorLocation>,
}

impl LocationSettings {
    pub fn load(data_dir: &DataDir) -> Result<Self> {
        let settings: Self = data_dir.read_json(LOCATIONS_FILE)?;
        debug!(
            "Loaded {} major and {} minor locations",
            settings.major_locations.len(),
            settings.minor_locations.len()
        );
        Ok(settings)
    }

    pub fn set_assignments(&mut self, config: &LocationsConfig) -> Result<()> {
        for assignment in &config.major_locations {
            let location = self
                .major_locations
                .iter_mut()
                .find(|m| m.source == assignment.source)
                .ok_or_else(|| {
                    PatcherError::Config(format!(
                        "unknown major location {:?}",
                        assignment.source
                    ))
                })?;
            location.new_item = Some(assignment.item);
        }

        for assignment in &config.minor_locations {
            let location = self
                .minor_locations
                .iter_mut()
                .find(|m| {
                    m.area == assignment.area
                        && m.room == assignment.room
                        && m.block_x == assignment.block_x
                        && m.block_y == assignment.block_y
                })
                .ok_or_else(|| {
                    PatcherError::Config(format!(
                        "invalid minor location: area {}, room {:#X}, X {}, Y {}",
                        assignment.area, assignment.room, assignment.block_x, assignment.block_y
                    ))
                })?;
            location.new_item = Some(assignment.item);
            if let Some(sprite) = assignment.item_sprite {
                location.item_sprite = Some(sprite);
            }
        }
        Ok(())
    }
}

pub struct ItemPatcher<'a> {
    settings: &'a LocationSettings,
}

impl<'a> ItemPatcher<'a> {
    pub fn new(settings: &'a LocationSettings) -> Self {
        Self { settings }
    }

    /// Writes tank blocks, the minor and major item tables and the total
    /// metroid count. Returns that count.
    pub fn write_items(&self, rom: &mut Rom, gd: &GameData) -> Result<u8> {
        let minor_array = rom.read_ptr(reserved::MINOR_LOCS_ARRAY)?;
        let mut prev_room = None;
        let mut room_tanks = 0usize;
        let mut total_metroids = 0u8;

        for location in &self.settings.minor_locations {
            if location.new_item == Some(ItemType::InfantMetroid) {
                total_metroids += 1;
            }

            let key = (location.area, location.room);
            if prev_room == Some(key) {
                room_tanks += 1;
            } else {
                room_tanks = 1;
                prev_room = Some(key);
            }
            write_tank_blocks(rom, gd, location, room_tanks - 1)?;

            let record = find_minor_record(rom, minor_array, location)?;
            if let Some(item) = location.new_item {
                rom.write_u8(record + 5, item as u8)?;
                if let Some(sprite) = location.item_sprite {
                    rom.write_u8(record + 6, sprite as u8)?;
                }
            }
        }

        for location in &self.settings.major_locations {
            let Some(item) = location.new_item else {
                continue;
            };
            if item == ItemType::InfantMetroid {
                total_metroids += 1;
            }
            let addr = reserved::MAJOR_LOCS + location.source as usize * MAJOR_LOC_SIZE;
            rom.write_u8(addr, item as u8)?;
        }

        rom.write_u8(reserved::TOTAL_METROID_COUNT, total_metroids)?;
        info!("Wrote item assignments ({} infant metroids)", total_metroids);
        Ok(total_metroids)
    }
}

/// Points the tank's clip and, unless hidden, BG1 block at `slot`.
fn write_tank_blocks(rom: &mut Rom, gd: &GameData, location: &MinorLocation, slot: usize) -> Result<()> {
    if slot >= TANK_CLIP.len() {
        return Err(PatcherError::Invariant(format!(
            "area {} room {:#X} has more than {} tanks",
            location.area,
            location.room,
            TANK_CLIP.len()
        )));
    }
    let (x, y) = (location.block_x as usize, location.block_y as usize);
    let room = RoomEntry::new(rom, gd, location.area, location.room)?;

    let clip_value = if location.hidden {
        HIDDEN_TANK_CLIP[slot]
    } else {
        TANK_CLIP[slot]
    };
    let mut clip = room.load_layer(rom, LayerKind::Clip)?;
    clip.set(x, y, clip_value)?;
    clip.commit(rom)?;

    if !location.hidden {
        let tileset_id = room.tileset(rom)?;
        let tileset = Tileset::new(gd, tileset_id)?;
        let tiles = tileset.rle_tilemap_addr(rom)? + 2 + TANK_BG1_START as usize * 8;
        let mut index = None;
        for i in 0..16u16 {
            if rom.read_u8(tiles + i as usize * 8)? == TANK_TILE[slot] {
                index = Some(i);
                break;
            }
        }
        let index = index.ok_or_else(|| {
            PatcherError::Invariant(format!(
                "tileset {} has no tank graphic for slot {}",
                tileset_id, slot
            ))
        })?;
        let mut bg1 = room.load_layer(rom, LayerKind::Bg1)?;
        bg1.set(x, y, TANK_BG1_START + index)?;
        bg1.commit(rom)?;
    }
    Ok(())
}

/// Finds `room` in an area's sorted list of rooms holding minor items.
fn search_room_list(rom: &Rom, list: usize, room: u8) -> Result<Option<usize>> {
    let (mut low, mut high) = (0, MINOR_ROOMS_PER_AREA);
    while low < high {
        let middle = (low + high) / 2;
        let value = rom.read_u8(list + middle)?;
        if value < room {
            low = middle + 1;
        } else if value > room {
            high = middle;
        } else {
            return Ok(Some(list + middle));
        }
    }
    Ok(None)
}

/// Returns the address of the minor-location record for `location`.
fn find_minor_record(rom: &Rom, minor_array: usize, location: &MinorLocation) -> Result<usize> {
    let list = rom.read_ptr(reserved::MINOR_LOCS_TABLE + location.area as usize * 4)?;
    let entry = search_room_list(rom, list, location.room)?.ok_or_else(|| {
        PatcherError::Invariant(format!(
            "area {} room {:#X} is not in the minor location index",
            location.area, location.room
        ))
    })?;
    let mut index = rom.read_u8(entry + MINOR_ROOMS_PER_AREA)? as usize;

    loop {
        let addr = minor_array + index * MINOR_LOC_SIZE;
        let record = rom.read_bytes(addr, 5)?;
        if record[0] != location.area || record[1] != location.room {
            return Err(PatcherError::Invariant(format!(
                "minor location record at {:#X} is for area {} room {:#X}, expected area {} room {:#X} ({}, {})",
                addr, record[0], record[1], location.area, location.room, location.block_x, location.block_y
            )));
        }
        if record[3] == location.block_x && record[4] == location.block_y {
            return Ok(addr);
        }
        index += 1;
    }
}

pub fn set_required_metroid_count(rom: &mut Rom, count: u8) -> Result<()> {
    rom.write_u8(reserved::REQUIRED_METROID_COUNT, count)
}

#[derive(Copy, Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct TankIncrements {
    #[serde(default = "default_missile_tank")]
    pub missile_tank: i16,
    #[serde(default = "default_energy_tank")]
    pub energy_tank: i16,
    #[serde(default = "default_power_bomb_tank")]
    pub power_bomb_tank: i16,
}

fn default_missile_tank() -> i16 {
    5
}

fn default_energy_tank() -> i16 {
    100
}

fn default_power_bomb_tank() -> i16 {
    2
}

impl TankIncrements {
    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("MissileTank", self.missile_tank, 1000),
            ("EnergyTank", self.energy_tank, 2100),
            ("PowerBombTank", self.power_bomb_tank, 100),
        ];
        for (name, value, limit) in checks {
            if value.unsigned_abs() > limit {
                return Err(PatcherError::Config(format!(
                    "{} increment {} is outside -{}..={}",
                    name, value, limit, limit
                )));
            }
        }
        Ok(())
    }
}

/// Stores the increments as two's complement halfwords.
pub fn set_tank_increments(rom: &mut Rom, increments: &TankIncrements) -> Result<()> {
    rom.write_u16(reserved::TANK_INC, increments.missile_tank as u16)?;
    rom.write_u16(reserved::TANK_INC + 2, increments.energy_tank as u16)?;
    rom.write_u16(reserved::TANK_INC + 4, increments.power_bomb_tank as u16)
}
