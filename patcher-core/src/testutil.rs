//! In-memory ROM fixtures shared by the unit tests.

use std::collections::HashMap;

use crate::address::{AddressTable, Field, GameData, PaletteGroup};
use crate::rle;
use crate::rom::{blank_rom, Game, Region, Rom};
use crate::room::{BlockLayer, LayerKind, RoomEntry};
use crate::{PatcherError, Result};

pub(crate) const ROOM_PTRS: usize = 0x10_0000;
pub(crate) const DOOR_PTRS: usize = 0x12_0000;
pub(crate) const TILESET_ENTRIES: usize = 0x13_0000;
pub(crate) const SPRITESET_PTRS: usize = 0x13_8000;
pub(crate) const HATCH_EVENTS: usize = 0x14_0000;
pub(crate) const AREA_CONNS: usize = 0x15_0000;
pub(crate) const AREA_CONNS_OWNER: usize = 0x15_F000;
pub(crate) const STARTING_EQUIPMENT: usize = 0x16_0000;
pub(crate) const CHARACTER_WIDTHS: usize = 0x16_1000;
pub(crate) const FILE_SCREEN_TEXT_PTRS: usize = 0x16_2000;
pub(crate) const NAVIGATION_TEXT_PTRS: usize = 0x16_3000;
pub(crate) const MINIMAP_PTRS: usize = 0x16_4000;
pub(crate) const ANIM_PALETTES: usize = 0x16_5000;
pub(crate) const SPRITE_PALETTE_PTRS: usize = 0x16_6000;
pub(crate) const SPRITE_VRAM_SIZES: usize = 0x16_7000;
const ROOM_ENTRIES: usize = 0x10_1000;
const DOORS: usize = 0x12_1000;
const BLOBS: usize = 0x20_0000;

#[derive(Default)]
pub(crate) struct TestTable {
    fields: HashMap<Field, u32>,
    palettes: HashMap<PaletteGroup, Vec<(u32, u8)>>,
}

impl TestTable {
    pub(crate) fn set(&mut self, field: Field, value: usize) {
        self.fields.insert(field, value as u32);
    }

    pub(crate) fn set_palettes(&mut self, group: PaletteGroup, blocks: Vec<(u32, u8)>) {
        self.palettes.insert(group, blocks);
    }
}

impl AddressTable for TestTable {
    fn lookup(&self, game: Game, region: Region, field: Field) -> Result<u32> {
        self.fields
            .get(&field)
            .copied()
            .ok_or_else(|| PatcherError::MissingAddress {
                game,
                region,
                field: format!("{:?}", field),
            })
    }

    fn palette_blocks(
        &self,
        game: Game,
        region: Region,
        group: PaletteGroup,
    ) -> Result<Vec<(u32, u8)>> {
        self.palettes
            .get(&group)
            .cloned()
            .ok_or_else(|| PatcherError::MissingAddress {
                game,
                region,
                field: format!("{:?}", group),
            })
    }
}

/// Writes a layer header and its compressed cells; returns the end address.
pub(crate) fn write_layer(rom: &mut Rom, addr: usize, width: u8, height: u8, cells: &[u16]) -> usize {
    let bytes: Vec<u8> = cells.iter().flat_map(|c| c.to_le_bytes()).collect();
    let encoded = rle::compress(&bytes);
    rom.write_u8(addr, width).unwrap();
    rom.write_u8(addr + 1, height).unwrap();
    rom.write_bytes(addr + 2, &encoded).unwrap();
    addr + 2 + encoded.len()
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct TestDoor {
    pub door_type: u8,
    pub room: u8,
    pub x: u8,
    pub y: u8,
    pub dest: u8,
    pub x_exit: u8,
}

/// A blank image with the room, door and text tables laid out at fixed
/// addresses and registered in a `TestTable`.
pub(crate) struct Fixture {
    pub rom: Rom,
    pub table: TestTable,
    next: usize,
}

impl Fixture {
    pub(crate) fn new() -> Self {
        let mut rom = blank_rom();
        let mut table = TestTable::default();
        table.set(Field::AreaRoomEntryPtrs, ROOM_PTRS);
        table.set(Field::AreaDoorsPtrs, DOOR_PTRS);
        table.set(Field::TilesetEntries, TILESET_ENTRIES);
        table.set(Field::SpritesetPtrs, SPRITESET_PTRS);
        table.set(Field::HatchLockEvents, HATCH_EVENTS);
        table.set(Field::HatchLockEventCount, 0);
        table.set(Field::AreaConnectionsCount, 0);
        table.set(Field::AreaConnectionsOwner, AREA_CONNS_OWNER);
        table.set(Field::StartingEquipment, STARTING_EQUIPMENT);
        table.set(Field::CharacterWidths, CHARACTER_WIDTHS);
        table.set(Field::FileScreenTextPtrs, FILE_SCREEN_TEXT_PTRS);
        table.set(Field::NavigationTextPtrs, NAVIGATION_TEXT_PTRS);
        table.set(Field::MinimapPtrs, MINIMAP_PTRS);
        table.set(Field::MinimapCount, 11);
        table.set(Field::AnimPaletteEntries, ANIM_PALETTES);
        table.set(Field::AnimPaletteCount, 0);
        table.set(Field::SpritePalettePtrs, SPRITE_PALETTE_PTRS);
        table.set(Field::SpriteVramSizes, SPRITE_VRAM_SIZES);
        table.set(Field::SpriteCount, 0x10);
        table.set(Field::TilesetCount, 0);

        for area in 0..7 {
            rom.write_ptr(ROOM_PTRS + area * 4, ROOM_ENTRIES + area * 0x4000)
                .unwrap();
            rom.write_ptr(DOOR_PTRS + area * 4, DOORS + area * 0xC00)
                .unwrap();
        }
        rom.write_ptr(AREA_CONNS_OWNER, AREA_CONNS).unwrap();

        Self {
            rom,
            table,
            next: BLOBS,
        }
    }

    pub(crate) fn gd(&self) -> GameData<'_> {
        GameData::new(&self.table, &self.rom)
    }

    /// Hands out a 4-aligned block of otherwise unused test space.
    pub(crate) fn alloc(&mut self, size: usize) -> usize {
        let addr = self.next;
        self.next = (addr + size + 3) & !3;
        addr
    }

    pub(crate) fn room_entry_addr(area: u8, room: u8) -> usize {
        ROOM_ENTRIES + area as usize * 0x4000 + room as usize * 0x3C
    }

    pub(crate) fn door_addr(area: u8, door: u8) -> usize {
        DOORS + area as usize * 0xC00 + door as usize * 0xC
    }

    /// Adds a room with the given BG1 and clip cells and an empty BG2.
    pub(crate) fn add_room(
        &mut self,
        area: u8,
        room: u8,
        width: u8,
        height: u8,
        bg1: &[u16],
        clip: &[u16],
    ) {
        let entry = Self::room_entry_addr(area, room);
        let blank = vec![0u16; width as usize * height as usize];
        for (offset, cells) in [(0xC, bg1), (0x10, blank.as_slice()), (0x14, clip)] {
            let size = 2 + cells.len() * 3 + 8;
            let addr = self.alloc(size);
            write_layer(&mut self.rom, addr, width, height, cells);
            self.rom.write_ptr(entry + offset, addr).unwrap();
        }
    }

    pub(crate) fn add_door(&mut self, area: u8, index: u8, door: TestDoor) {
        let addr = Self::door_addr(area, index);
        let bytes = [
            door.door_type,
            door.room,
            door.x,
            0,
            door.y,
            0,
            door.dest,
            door.x_exit,
            0,
            0,
            0,
            0,
        ];
        self.rom.write_bytes(addr, &bytes).unwrap();
    }

    pub(crate) fn layer(&self, area: u8, room: u8, kind: LayerKind) -> BlockLayer {
        let gd = self.gd();
        RoomEntry::new(&self.rom, &gd, area, room)
            .unwrap()
            .load_layer(&self.rom, kind)
            .unwrap()
    }
}
