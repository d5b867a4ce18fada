//! Area minimap tile edits.

use std::collections::BTreeMap;

use log::debug;
use serde::Deserialize;

use crate::address::{Field, GameData};
use crate::lz77;
use crate::rom::Rom;
use crate::{PatcherError, Result};

pub const MINIMAP_WIDTH: usize = 32;
const MAX_TILE: u16 = 0x3FF;
const MAX_PALETTE: u8 = 0xF;

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct MinimapEdit {
    pub x: u8,
    pub y: u8,
    pub tile: u16,
    pub palette: u8,
    #[serde(default)]
    pub h_flip: bool,
    #[serde(default)]
    pub v_flip: bool,
}

impl MinimapEdit {
    pub fn validate(&self) -> Result<()> {
        let max = MINIMAP_WIDTH as u8 - 1;
        if self.x > max || self.y > max || self.tile > MAX_TILE || self.palette > MAX_PALETTE {
            return Err(PatcherError::Config(format!("minimap edit {:?} is out of range", self)));
        }
        Ok(())
    }

    /// Screen-entry value: tile in bits 0-9, flips in 10-11, palette on top.
    pub fn value(&self) -> u16 {
        let mut value = self.tile | (self.palette as u16) << 12;
        if self.h_flip {
            value |= 1 << 10;
        }
        if self.v_flip {
            value |= 1 << 11;
        }
        value
    }
}

/// Edits keyed by minimap id.
pub type MinimapEdits = BTreeMap<u8, Vec<MinimapEdit>>;

/// A decompressed minimap tilemap.
pub struct Minimap {
    pointer: usize,
    tiles: Vec<u8>,
    reserved: usize,
}

impl Minimap {
    pub fn open(rom: &Rom, gd: &GameData, id: u8) -> Result<Self> {
        let count = gd.get(Field::MinimapCount)?;
        if id as usize >= count {
            return Err(PatcherError::Config(format!("minimap {} does not exist", id)));
        }
        let pointer = gd.get(Field::MinimapPtrs)? + id as usize * 4;
        let (tiles, consumed) = lz77::decompress(rom.data(), rom.read_ptr(pointer)?)?;
        // Streams are stored word aligned, so the padding is ours too.
        Ok(Self {
            pointer,
            tiles,
            reserved: (consumed + 3) & !3,
        })
    }

    fn index(&self, x: usize, y: usize) -> Result<usize> {
        let idx = (y * MINIMAP_WIDTH + x) * 2;
        if x >= MINIMAP_WIDTH || idx + 2 > self.tiles.len() {
            return Err(PatcherError::BlockOutOfBounds {
                x,
                y,
                width: MINIMAP_WIDTH,
                height: self.tiles.len() / (MINIMAP_WIDTH * 2),
            });
        }
        Ok(idx)
    }

    pub fn get(&self, x: usize, y: usize) -> Result<u16> {
        let idx = self.index(x, y)?;
        Ok(u16::from_le_bytes([self.tiles[idx], self.tiles[idx + 1]]))
    }

    pub fn set(&mut self, x: usize, y: usize, value: u16) -> Result<()> {
        let idx = self.index(x, y)?;
        self.tiles[idx..idx + 2].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    /// Recompresses the tilemap, in place when it still fits.
    pub fn commit(&mut self, rom: &mut Rom) -> Result<()> {
        let packed = lz77::compress(&self.tiles);
        let addr = if packed.len() > self.reserved {
            let addr = rom.reserve_free_space(packed.len(), 4)?;
            rom.write_ptr(self.pointer, addr)?;
            debug!("Relocated minimap at pointer {:#X} to {:#X}", self.pointer, addr);
            addr
        } else {
            rom.read_ptr(self.pointer)?
        };
        rom.write_bytes(addr, &packed)?;
        self.reserved = packed.len();
        Ok(())
    }
}

pub fn apply_minimap_edits(rom: &mut Rom, gd: &GameData, edits: &MinimapEdits) -> Result<()> {
    for (&id, changes) in edits {
        let mut minimap = Minimap::open(rom, gd, id)?;
        for change in changes {
            minimap.set(change.x as usize, change.y as usize, change.value())?;
        }
        minimap.commit(rom)?;
        debug!("Applied {} edits to minimap {}", changes.len(), id);
    }
    Ok(())
}
