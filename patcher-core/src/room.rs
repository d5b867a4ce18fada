//! Room headers, tilesets and the editable block layers they point to.

use log::debug;

use crate::address::{Field, GameData};
use crate::rle;
use crate::rom::Rom;
use crate::{PatcherError, Result};

const ROOM_ENTRY_SIZE: usize = 0x3C;
const TILESET_ENTRY_SIZE: usize = 0x14;

/// A decompressed room layer.
///
/// The layer remembers which pointer it was loaded through so `commit` can
/// redirect that pointer if the recompressed data no longer fits.
#[derive(Debug, Clone)]
pub struct BlockLayer {
    pointer_addr: usize,
    width: u8,
    height: u8,
    cells: Vec<u8>,
    reserved: usize,
}

impl BlockLayer {
    /// Loads the layer whose header address is stored at `pointer_addr`.
    pub fn open(rom: &Rom, pointer_addr: usize) -> Result<Self> {
        let addr = rom.read_ptr(pointer_addr)?;
        let width = rom.read_u8(addr)?;
        let height = rom.read_u8(addr + 1)?;
        let (cells, reserved) = rle::decompress(rom.data(), addr + 2)?;

        let expected = width as usize * height as usize * 2;
        if cells.len() != expected {
            return Err(PatcherError::LayerSize {
                addr,
                width,
                height,
                expected,
                actual: cells.len(),
            });
        }

        Ok(Self {
            pointer_addr,
            width,
            height,
            cells,
            reserved,
        })
    }

    pub fn width(&self) -> u8 {
        self.width
    }

    pub fn height(&self) -> u8 {
        self.height
    }

    pub fn pointer_addr(&self) -> usize {
        self.pointer_addr
    }

    /// Compressed bytes available at the current location.
    pub fn reserved(&self) -> usize {
        self.reserved
    }

    fn index(&self, x: usize, y: usize) -> Result<usize> {
        let (width, height) = (self.width as usize, self.height as usize);
        if x >= width || y >= height {
            return Err(PatcherError::BlockOutOfBounds {
                x,
                y,
                width,
                height,
            });
        }
        Ok((y * width + x) * 2)
    }

    pub fn get(&self, x: usize, y: usize) -> Result<u16> {
        let idx = self.index(x, y)?;
        Ok(u16::from_le_bytes([self.cells[idx], self.cells[idx + 1]]))
    }

    pub fn set(&mut self, x: usize, y: usize, value: u16) -> Result<()> {
        let idx = self.index(x, y)?;
        self.cells[idx..idx + 2].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    /// Recompresses the cells and writes them back.
    ///
    /// Data that still fits is overwritten in place; otherwise it moves to
    /// free space and the owning pointer is updated.
    pub fn commit(&mut self, rom: &mut Rom) -> Result<()> {
        let encoded = rle::compress(&self.cells);
        let addr = if encoded.len() > self.reserved {
            let addr = rom.reserve_free_space(encoded.len() + 2, 1)?;
            rom.write_ptr(self.pointer_addr, addr)?;
            debug!(
                "Relocated layer at pointer {:#X} to {:#X} ({} > {} bytes)",
                self.pointer_addr,
                addr,
                encoded.len(),
                self.reserved
            );
            addr
        } else {
            rom.read_ptr(self.pointer_addr)?
        };

        rom.write_u8(addr, self.width)?;
        rom.write_u8(addr + 1, self.height)?;
        rom.write_bytes(addr + 2, &encoded)?;
        self.reserved = encoded.len();
        Ok(())
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum LayerKind {
    Bg1,
    Bg2,
    Clip,
}

impl LayerKind {
    const fn pointer_offset(self) -> usize {
        match self {
            LayerKind::Bg1 => 0xC,
            LayerKind::Bg2 => 0x10,
            LayerKind::Clip => 0x14,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RoomEntry {
    area: u8,
    room: u8,
    addr: usize,
}

impl RoomEntry {
    pub fn new(rom: &Rom, gd: &GameData, area: u8, room: u8) -> Result<Self> {
        let table = gd.get(Field::AreaRoomEntryPtrs)?;
        let addr = rom.read_ptr(table + area as usize * 4)? + room as usize * ROOM_ENTRY_SIZE;
        Ok(Self { area, room, addr })
    }

    pub fn area(&self) -> u8 {
        self.area
    }

    pub fn room(&self) -> u8 {
        self.room
    }

    pub fn addr(&self) -> usize {
        self.addr
    }

    pub fn layer_pointer(&self, kind: LayerKind) -> usize {
        self.addr + kind.pointer_offset()
    }

    pub fn load_layer(&self, rom: &Rom, kind: LayerKind) -> Result<BlockLayer> {
        BlockLayer::open(rom, self.layer_pointer(kind))
    }

    pub fn tileset(&self, rom: &Rom) -> Result<u8> {
        rom.read_u8(self.addr)
    }

    pub fn default_sprite_layout_addr(&self, rom: &Rom) -> Result<usize> {
        rom.read_ptr(self.addr + 0x20)
    }

    pub fn default_spriteset(&self, rom: &Rom) -> Result<u8> {
        rom.read_u8(self.addr + 0x24)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Tileset {
    addr: usize,
}

impl Tileset {
    pub fn new(gd: &GameData, id: u8) -> Result<Self> {
        let addr = gd.get(Field::TilesetEntries)? + id as usize * TILESET_ENTRY_SIZE;
        Ok(Self { addr })
    }

    pub fn palette_pointer(&self) -> usize {
        self.addr + 4
    }

    pub fn rle_tilemap_addr(&self, rom: &Rom) -> Result<usize> {
        rom.read_ptr(self.addr + 0xC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rom::{blank_rom, ROM_OFFSET};
    use crate::testutil::{write_layer, Fixture};

    const PTR: usize = 0x1000;
    const LAYER: usize = 0x2000;

    fn grid(width: u8, height: u8) -> Vec<u16> {
        (0..width as u16 * height as u16).map(|i| i % 3).collect()
    }

    #[test]
    fn reads_cells_by_coordinate() {
        let mut rom = blank_rom();
        let cells = grid(4, 3);
        write_layer(&mut rom, LAYER, 4, 3, &cells);
        rom.write_ptr(PTR, LAYER).unwrap();

        let layer = BlockLayer::open(&rom, PTR).unwrap();
        assert_eq!((layer.width(), layer.height()), (4, 3));
        assert_eq!(layer.get(1, 2).unwrap(), cells[2 * 4 + 1]);
        assert_eq!(layer.get(3, 0).unwrap(), cells[3]);
    }

    #[test]
    fn coordinates_do_not_wrap() {
        let mut rom = blank_rom();
        write_layer(&mut rom, LAYER, 4, 3, &grid(4, 3));
        rom.write_ptr(PTR, LAYER).unwrap();

        let mut layer = BlockLayer::open(&rom, PTR).unwrap();
        assert!(matches!(
            layer.set(4, 0, 1),
            Err(PatcherError::BlockOutOfBounds { x: 4, y: 0, .. })
        ));
        assert!(layer.get(0, 3).is_err());
        assert!(layer.set(3, 2, 0x1FF).is_ok());
    }

    #[test]
    fn header_and_body_must_agree() {
        let mut rom = blank_rom();
        write_layer(&mut rom, LAYER, 4, 3, &grid(4, 3));
        rom.write_u8(LAYER + 1, 4).unwrap();
        rom.write_ptr(PTR, LAYER).unwrap();
        assert!(matches!(
            BlockLayer::open(&rom, PTR),
            Err(PatcherError::LayerSize { expected: 32, actual: 24, .. })
        ));
    }

    #[test]
    fn commit_in_place_keeps_pointer() {
        let mut rom = blank_rom();
        let cells = vec![7u16; 16 * 16];
        write_layer(&mut rom, LAYER, 16, 16, &cells);
        rom.write_ptr(PTR, LAYER).unwrap();

        let mut layer = BlockLayer::open(&rom, PTR).unwrap();
        let reserved = layer.reserved();
        layer.set(0, 0, 7).unwrap();
        layer.commit(&mut rom).unwrap();
        assert_eq!(rom.read_ptr(PTR).unwrap(), LAYER);
        assert_eq!(layer.reserved(), reserved);
        assert_eq!(rom.free_space().cursor(), 0x7E_0000);
    }

    #[test]
    fn commit_relocates_when_data_grows() {
        let mut rom = blank_rom();
        write_layer(&mut rom, LAYER, 16, 16, &vec![0u16; 16 * 16]);
        rom.write_ptr(PTR, LAYER).unwrap();

        let mut layer = BlockLayer::open(&rom, PTR).unwrap();
        let mut expected = vec![0u16; 16 * 16];
        for y in 0..16 {
            for x in (0..16).step_by(2) {
                let value = (x * 3 + y) as u16 | 0x100;
                layer.set(x, y, value).unwrap();
                expected[y * 16 + x] = value;
            }
        }
        layer.commit(&mut rom).unwrap();

        let moved = rom.read_ptr(PTR).unwrap();
        assert_eq!(moved, 0x7E_0000);
        assert_eq!(rom.read_u32(PTR).unwrap(), moved as u32 + ROM_OFFSET);

        let reopened = BlockLayer::open(&rom, PTR).unwrap();
        for y in 0..16 {
            for x in 0..16 {
                assert_eq!(reopened.get(x, y).unwrap(), expected[y * 16 + x]);
            }
        }

        // A second commit of the same cells fits where the first one went.
        layer.commit(&mut rom).unwrap();
        assert_eq!(rom.read_ptr(PTR).unwrap(), moved);
    }

    #[test]
    fn room_entry_points_at_its_layers() {
        let mut fx = Fixture::new();
        fx.add_room(2, 5, 6, 4, &[1; 24], &[0; 24]);
        let gd = fx.gd();
        let entry = RoomEntry::new(&fx.rom, &gd, 2, 5).unwrap();
        assert_eq!(entry.area(), 2);
        assert_eq!(entry.layer_pointer(LayerKind::Clip), entry.addr() + 0x14);

        let bg1 = entry.load_layer(&fx.rom, LayerKind::Bg1).unwrap();
        assert_eq!(bg1.get(5, 3).unwrap(), 1);
        let bg2 = entry.load_layer(&fx.rom, LayerKind::Bg2).unwrap();
        assert_eq!((bg2.width(), bg2.height()), (6, 4));
    }
}
