//! Elevator and sector shortcut rewiring.
//!
//! A transition is two edits: the source door's destination byte, and the
//! area connection table entry telling the game which area that door leads
//! to. Elevators between the hub and the sectors already have table entries;
//! other links are appended into spare capacity.

use std::collections::BTreeMap;

use log::{debug, info};
use serde::Deserialize;

use crate::address::{Field, GameData};
use crate::door_locks::DOOR_ENTRY_SIZE;
use crate::rom::Rom;
use crate::room::{BlockLayer, LayerKind, RoomEntry};
use crate::{PatcherError, Result};

const CONNECTION_SIZE: usize = 3;
/// Extra table entries reserved when the table is moved.
pub const CONNECTION_SPARE: usize = 8;

const DOOR_TYPE_AREA_CONN: u8 = 1;
const DOOR_TYPE_NO_HATCH: u8 = 2;

const SHORTCUT_LEFT_DOORS: [u8; 6] = [0x6B, 0x7F, 0x59, 0x6C, 0x02, 0x51];
const SHORTCUT_RIGHT_DOORS: [u8; 6] = [0x68, 0x82, 0x56, 0x6A, 0x53, 0x54];
const SHORTCUT_LEFT_NUM_COORD: (usize, usize) = (6, 3);
const SHORTCUT_RIGHT_NUM_COORD: (usize, usize) = (9, 3);
const SHORTCUT_NUM_X_OFFSET: usize = 3;
const SHORTCUT_NUM_BLOCKS: [u16; 6] = [0x101, 0x104, 0xE5, 0xE6, 0xE7, 0xE8];
/// Numerals are two blocks tall; the lower half is one tile row further on.
const NUM_LOWER_HALF: u16 = 0x10;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ElevatorEndpoint {
    pub area: u8,
    pub door: u8,
    /// Whether the door already has an area connection table entry.
    pub in_list: bool,
}

const fn endpoint(area: u8, door: u8, in_list: bool) -> ElevatorEndpoint {
    ElevatorEndpoint {
        area,
        door,
        in_list,
    }
}

pub const ELEVATOR_TOPS: [(&str, ElevatorEndpoint); 10] = [
    ("OperationsDeckTop", endpoint(0, 0x1A, false)),
    ("MainHubToSector1", endpoint(0, 0x43, true)),
    ("MainHubToSector2", endpoint(0, 0x44, true)),
    ("MainHubToSector3", endpoint(0, 0x45, true)),
    ("MainHubToSector4", endpoint(0, 0x46, true)),
    ("MainHubToSector5", endpoint(0, 0x47, true)),
    ("MainHubToSector6", endpoint(0, 0x48, true)),
    ("MainHubTop", endpoint(0, 0x5E, false)),
    ("HabitationDeckTop", endpoint(0, 0xB2, false)),
    ("Sector1ToRestrictedLab", endpoint(1, 0x41, true)),
];

pub const ELEVATOR_BOTTOMS: [(&str, ElevatorEndpoint); 10] = [
    ("OperationsDeckBottom", endpoint(0, 0x19, false)),
    ("MainHubBottom", endpoint(0, 0x32, false)),
    ("RestrictedLabToSector1", endpoint(0, 0x9A, true)),
    ("HabitationDeckBottom", endpoint(0, 0xB1, false)),
    ("Sector1ToMainHub", endpoint(1, 0x00, true)),
    ("Sector2ToMainHub", endpoint(2, 0x00, true)),
    ("Sector3ToMainHub", endpoint(3, 0x00, true)),
    ("Sector4ToMainHub", endpoint(4, 0x00, true)),
    ("Sector5ToMainHub", endpoint(5, 0x00, true)),
    ("Sector6ToMainHub", endpoint(6, 0x00, true)),
];

fn lookup(table: &[(&str, ElevatorEndpoint)], name: &str) -> Result<ElevatorEndpoint> {
    table
        .iter()
        .find(|(n, _)| *n == name)
        .map(|&(_, e)| e)
        .ok_or_else(|| PatcherError::Config(format!("unknown elevator {:?}", name)))
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct ElevatorConnections {
    /// Top elevator name to the bottom elevator it leads to.
    pub elevator_tops: BTreeMap<String, String>,
    /// Bottom elevator name to the top elevator it leads to.
    pub elevator_bottoms: BTreeMap<String, String>,
}

impl ElevatorConnections {
    pub fn validate(&self) -> Result<()> {
        let sides = [
            ("ElevatorTops", &self.elevator_tops, &ELEVATOR_TOPS, &ELEVATOR_BOTTOMS),
            ("ElevatorBottoms", &self.elevator_bottoms, &ELEVATOR_BOTTOMS, &ELEVATOR_TOPS),
        ];
        for (key, pairs, src, dst) in sides {
            if pairs.len() < src.len() {
                return Err(PatcherError::Config(format!(
                    "{} needs {} entries, found {}",
                    key,
                    src.len(),
                    pairs.len()
                )));
            }
            for (from, to) in pairs {
                lookup(src, from)?;
                lookup(dst, to)?;
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct SectorShortcuts {
    /// Destination sector of each sector's left shortcut, for sectors 1 to 6.
    pub left_areas: Vec<u8>,
    pub right_areas: Vec<u8>,
}

impl SectorShortcuts {
    pub fn validate(&self) -> Result<()> {
        for (key, areas) in [("LeftAreas", &self.left_areas), ("RightAreas", &self.right_areas)] {
            if areas.len() != SHORTCUT_LEFT_DOORS.len() {
                return Err(PatcherError::Config(format!(
                    "{} needs {} entries, found {}",
                    key,
                    SHORTCUT_LEFT_DOORS.len(),
                    areas.len()
                )));
            }
            if let Some(area) = areas.iter().find(|&&a| !(1..=6).contains(&a)) {
                return Err(PatcherError::Config(format!(
                    "{} contains area {}, expected 1..=6",
                    key, area
                )));
            }
        }
        Ok(())
    }
}

/// Where the hub repaint draws its numerals. Loaded from the data directory.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct MainHubLayout {
    pub gfx_addr: usize,
    pub tilemap_addr: usize,
    pub center_room: u8,
    /// Small numeral positions in the center room, one entry per elevator.
    pub center_small_num_coords: Vec<Vec<Option<(u8, u8)>>>,
    pub elevator_doors: Vec<u8>,
    pub elevator_rooms: Vec<u8>,
    pub elevator_room_small_num_coords: Vec<Vec<Option<(u8, u8)>>>,
    pub elevator_room_large_num_coord: (u8, u8),
    /// Large numeral block per area.
    pub large_num_blocks: Vec<u16>,
    pub small_num_block: u16,
}

impl MainHubLayout {
    pub fn validate(&self) -> Result<()> {
        let elevators = self.elevator_doors.len();
        let coord_sets = self
            .center_small_num_coords
            .iter()
            .chain(&self.elevator_room_small_num_coords);
        let consistent = self.elevator_rooms.len() == elevators
            && self.elevator_room_small_num_coords.len() == elevators
            && self.large_num_blocks.len() == 7
            && coord_sets.into_iter().all(|set| set.len() == elevators);
        if consistent {
            Ok(())
        } else {
            Err(PatcherError::Config(
                "main hub layout lists do not match the elevator count".to_string(),
            ))
        }
    }
}

#[derive(Clone, Debug)]
pub struct MainHub {
    pub layout: MainHubLayout,
    pub gfx: Vec<u8>,
    pub tilemap: Vec<u8>,
}

pub struct Connections<'a> {
    gd: GameData<'a>,
    doors_ptrs: usize,
    table_addr: usize,
    count: usize,
    capacity: usize,
    relocated: bool,
}

impl<'a> Connections<'a> {
    /// Follows the game code's pointer to the connection table.
    pub fn new(rom: &Rom, gd: GameData<'a>) -> Result<Self> {
        let count = gd.get(Field::AreaConnectionsCount)?;
        Ok(Self {
            gd,
            doors_ptrs: gd.get(Field::AreaDoorsPtrs)?,
            table_addr: rom.read_ptr(gd.get(Field::AreaConnectionsOwner)?)?,
            count,
            capacity: count,
            relocated: false,
        })
    }

    pub fn table_addr(&self) -> usize {
        self.table_addr
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn door_addr(&self, rom: &Rom, area: u8, door: u8) -> Result<usize> {
        let base = rom.read_ptr(self.doors_ptrs + area as usize * 4)?;
        Ok(base + door as usize * DOOR_ENTRY_SIZE)
    }

    /// Moves the table to free space with room for `CONNECTION_SPARE` more
    /// entries and points the game code at the copy. Unused entries are
    /// filled with 0xFF, which also terminates the table.
    fn relocate(&mut self, rom: &mut Rom) -> Result<()> {
        let size = self.count * CONNECTION_SIZE;
        let spare = (CONNECTION_SPARE + 1) * CONNECTION_SIZE;
        let addr = rom.reserve_free_space(size + spare, 1)?;
        rom.copy_bytes(self.table_addr, addr, size)?;
        rom.write_bytes(addr + size, &vec![0xFF; spare])?;
        rom.write_ptr(self.gd.get(Field::AreaConnectionsOwner)?, addr)?;
        debug!(
            "Moved area connections from {:#X} to {:#X}",
            self.table_addr, addr
        );
        self.table_addr = addr;
        self.capacity = self.count + CONNECTION_SPARE;
        self.relocated = true;
        Ok(())
    }

    fn find_connection(&self, rom: &Rom, area: u8, door: u8) -> Result<Option<usize>> {
        for i in 0..self.count {
            let addr = self.table_addr + i * CONNECTION_SIZE;
            if rom.read_u8(addr)? == area && rom.read_u8(addr + 1)? == door {
                return Ok(Some(addr));
            }
        }
        Ok(None)
    }

    /// Points a door at `dst_door` and retypes it as an area transition or
    /// a plain same-area door.
    pub fn connect_doors(&self, rom: &mut Rom, src_area: u8, src_door: u8, dst_area: u8, dst_door: u8) -> Result<()> {
        let addr = self.door_addr(rom, src_area, src_door)?;
        let props = rom.read_u8(addr)?;
        let door_type = if src_area != dst_area {
            DOOR_TYPE_AREA_CONN
        } else {
            DOOR_TYPE_NO_HATCH
        };
        rom.write_u8(addr, (props & 0xF0) | door_type)?;
        rom.write_u8(addr + 6, dst_door)
    }

    /// Records that `src_door` leads to `dst_area`.
    ///
    /// Listed doors must already have an entry, which is retargeted, or
    /// blanked for a same-area link. Other doors update an existing entry if
    /// there is one and are appended otherwise; same-area links are never
    /// appended.
    pub fn connect_areas(&mut self, rom: &mut Rom, src_area: u8, src_door: u8, dst_area: u8, in_list: bool) -> Result<()> {
        let same_area = src_area == dst_area;
        if let Some(addr) = self.find_connection(rom, src_area, src_door)? {
            if same_area {
                rom.write_bytes(addr, &[0, 0, 0])?;
            } else {
                rom.write_u8(addr + 2, dst_area)?;
            }
            return Ok(());
        }
        if in_list {
            return Err(PatcherError::Invariant(format!(
                "no area connection for area {} door {:#04X}",
                src_area, src_door
            )));
        }
        if same_area {
            return Ok(());
        }

        if self.count == self.capacity {
            if self.relocated {
                return Err(PatcherError::CapacityExceeded {
                    what: "area connection table",
                    capacity: self.capacity,
                });
            }
            self.relocate(rom)?;
        }
        let addr = self.table_addr + self.count * CONNECTION_SIZE;
        rom.write_bytes(addr, &[src_area, src_door, dst_area])?;
        self.count += 1;
        Ok(())
    }

    pub fn set_elevator_connections(&mut self, rom: &mut Rom, elevators: &ElevatorConnections, hub: &MainHub) -> Result<()> {
        let sides = [
            (&elevators.elevator_tops, &ELEVATOR_TOPS, &ELEVATOR_BOTTOMS),
            (&elevators.elevator_bottoms, &ELEVATOR_BOTTOMS, &ELEVATOR_TOPS),
        ];
        for (pairs, src_table, dst_table) in sides {
            for (src_name, dst_name) in pairs {
                let src = lookup(src_table, src_name)?;
                let dst = lookup(dst_table, dst_name)?;
                self.connect_doors(rom, src.area, src.door, dst.area, dst.door)?;
                self.connect_areas(rom, src.area, src.door, dst.area, src.in_list)?;
            }
        }
        info!("Connected {} elevators", elevators.elevator_tops.len() + elevators.elevator_bottoms.len());
        self.fix_main_hub_tiles(rom, hub)
    }

    pub fn set_shortcut_connections(&mut self, rom: &mut Rom, shortcuts: &SectorShortcuts) -> Result<()> {
        for (i, &dst_area) in shortcuts.left_areas.iter().enumerate() {
            self.connect_shortcut(rom, i as u8 + 1, dst_area, true)?;
        }
        for (i, &dst_area) in shortcuts.right_areas.iter().enumerate() {
            self.connect_shortcut(rom, i as u8 + 1, dst_area, false)?;
        }
        Ok(())
    }

    /// Links sector `area`'s left or right shortcut to the opposite side of
    /// `dst_area` and redraws the sector numerals above the doorway.
    fn connect_shortcut(&mut self, rom: &mut Rom, area: u8, dst_area: u8, left: bool) -> Result<()> {
        let index = |a: u8| {
            (a as usize)
                .checked_sub(1)
                .filter(|&i| i < SHORTCUT_NUM_BLOCKS.len())
                .ok_or_else(|| PatcherError::Config(format!("sector {} has no shortcut", a)))
        };
        let (src_doors, dst_doors, (x, y), left_area, right_area) = if left {
            (SHORTCUT_LEFT_DOORS, SHORTCUT_RIGHT_DOORS, SHORTCUT_LEFT_NUM_COORD, dst_area, area)
        } else {
            (SHORTCUT_RIGHT_DOORS, SHORTCUT_LEFT_DOORS, SHORTCUT_RIGHT_NUM_COORD, area, dst_area)
        };
        let door = src_doors[index(area)?];
        let dst_door = dst_doors[index(dst_area)?];
        self.connect_doors(rom, area, door, dst_area, dst_door)?;
        self.connect_areas(rom, area, door, dst_area, false)?;

        let room = rom.read_u8(self.door_addr(rom, area, door)? + 1)?;
        let entry = RoomEntry::new(rom, &self.gd, area, room)?;
        let mut bg1 = entry.load_layer(rom, LayerKind::Bg1)?;
        let left_block = SHORTCUT_NUM_BLOCKS[index(left_area)?];
        let right_block = SHORTCUT_NUM_BLOCKS[index(right_area)?];
        draw_numeral(&mut bg1, x, y, left_block)?;
        draw_numeral(&mut bg1, x + SHORTCUT_NUM_X_OFFSET, y, right_block)?;
        bg1.commit(rom)
    }

    /// Destination area of each door, read from the connection table.
    /// Doors without an entry report area 0.
    pub fn destination_areas(&self, rom: &Rom, area: u8, doors: &[u8]) -> Result<Vec<u8>> {
        let mut areas = vec![0; doors.len()];
        for i in 0..self.count {
            let record = rom.read_bytes(self.table_addr + i * CONNECTION_SIZE, CONNECTION_SIZE)?;
            if record[0] != area {
                continue;
            }
            if let Some(j) = doors.iter().position(|&d| d == record[1]) {
                areas[j] = record[2];
            }
        }
        Ok(areas)
    }

    /// Repaints the hub's elevator numerals to match the current table.
    pub fn fix_main_hub_tiles(&self, rom: &mut Rom, hub: &MainHub) -> Result<()> {
        let layout = &hub.layout;
        let ele_areas = self.destination_areas(rom, 0, &layout.elevator_doors)?;
        debug!("Main hub elevators lead to areas {:?}", ele_areas);

        rom.write_bytes(layout.gfx_addr, &hub.gfx)?;
        rom.write_bytes(layout.tilemap_addr + 2, &hub.tilemap)?;

        let center = RoomEntry::new(rom, &self.gd, 0, layout.center_room)?;
        let mut bg2 = center.load_layer(rom, LayerKind::Bg2)?;
        for coords in &layout.center_small_num_coords {
            draw_small_numerals(&mut bg2, coords, &ele_areas, layout.small_num_block)?;
        }
        bg2.commit(rom)?;

        let (large_x, large_y) = layout.elevator_room_large_num_coord;
        for (i, &room) in layout.elevator_rooms.iter().enumerate() {
            let entry = RoomEntry::new(rom, &self.gd, 0, room)?;
            let mut bg2 = entry.load_layer(rom, LayerKind::Bg2)?;
            let coords = &layout.elevator_room_small_num_coords[i];
            draw_small_numerals(&mut bg2, coords, &ele_areas, layout.small_num_block)?;
            let block = *layout
                .large_num_blocks
                .get(ele_areas[i] as usize)
                .ok_or_else(|| PatcherError::Invariant(format!("elevator leads to area {}", ele_areas[i])))?;
            draw_numeral(&mut bg2, large_x as usize, large_y as usize, block)?;
            bg2.commit(rom)?;
        }
        Ok(())
    }
}

fn draw_numeral(layer: &mut BlockLayer, x: usize, y: usize, block: u16) -> Result<()> {
    layer.set(x, y, block)?;
    layer.set(x, y + 1, block + NUM_LOWER_HALF)
}

/// Small numerals are two blocks wide; even elevators use the right-aligned
/// variant.
fn draw_small_numerals(layer: &mut BlockLayer, coords: &[Option<(u8, u8)>], ele_areas: &[u8], base: u16) -> Result<()> {
    for (i, coord) in coords.iter().enumerate() {
        let Some((x, y)) = *coord else {
            continue;
        };
        let mut block = base + ele_areas[i] as u16 * 0x10;
        if i % 2 == 0 {
            block += 2;
        }
        let (x, y) = (x as usize, y as usize);
        layer.set(x, y, block)?;
        layer.set(x + 1, y, block + 1)?;
    }
    Ok(())
}
