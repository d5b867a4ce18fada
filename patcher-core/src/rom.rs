use std::fs;
use std::path::Path;

use log::debug;

use crate::{PatcherError, Result};

pub const ROM_SIZE: usize = 0x80_0000;
/// Bias added to image offsets to form the addresses stored in pointers.
pub const ROM_OFFSET: u32 = 0x0800_0000;

const TITLE_ADDR: usize = 0xA0;
const TITLE_LEN: usize = 0x10;
const FUSION_FREE_SPACE_ADDR: usize = 0x7E_0000;
/// The hint text region and reserved constants follow the arena.
const FUSION_FREE_SPACE_END: usize = 0x7F_0000;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Game {
    Fusion,
    ZeroMission,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Region {
    U,
    E,
    J,
    C,
}

impl Region {
    pub(crate) fn index(self) -> usize {
        match self {
            Region::U => 0,
            Region::E => 1,
            Region::J => 2,
            Region::C => 3,
        }
    }

    pub(crate) fn dir_name(self) -> &'static str {
        match self {
            Region::U => "u",
            Region::E => "e",
            Region::J => "j",
            Region::C => "c",
        }
    }
}

const KNOWN_TITLES: [(&[u8; TITLE_LEN], Game, Region); 8] = [
    (b"METROID4USA\0AMTE", Game::Fusion, Region::U),
    (b"METROID4EUR\0AMTP", Game::Fusion, Region::E),
    (b"METROID4JPN\0AMTJ", Game::Fusion, Region::J),
    (b"METFUSIONCHNAMTC", Game::Fusion, Region::C),
    (b"ZEROMISSIONEBMXE", Game::ZeroMission, Region::U),
    (b"ZEROMISSIONPBMXP", Game::ZeroMission, Region::E),
    (b"ZEROMISSIONJBMXJ", Game::ZeroMission, Region::J),
    (b"ZEROMISSIONCBMXC", Game::ZeroMission, Region::C),
];

/// Bump allocator over the spare bytes at the end of the image.
///
/// Space is never handed back; the cursor only moves forward for the
/// lifetime of one patch run.
#[derive(Debug, Clone)]
pub struct FreeSpace {
    cursor: usize,
    limit: usize,
}

impl FreeSpace {
    pub fn new(start: usize, limit: usize) -> Self {
        Self {
            cursor: start,
            limit,
        }
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn reserve(&mut self, size: usize, align: usize) -> Result<usize> {
        let align = align.max(1);
        let remain = self.cursor % align;
        let start = if remain == 0 {
            self.cursor
        } else {
            self.cursor + (align - remain)
        };

        let end = start
            .checked_add(size)
            .filter(|&end| end <= self.limit)
            .ok_or(PatcherError::CapacityExceeded {
                what: "free space",
                capacity: self.limit,
            })?;

        self.cursor = end;
        Ok(start)
    }
}

pub struct Rom {
    data: Vec<u8>,
    game: Game,
    region: Region,
    free_space: FreeSpace,
}

impl Rom {
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read(path)?;
        Self::from_bytes(data)
    }

    /// Identifies the image by its header title and rejects anything other
    /// than the North American release of Fusion.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        if data.len() != ROM_SIZE {
            return Err(PatcherError::UnknownRom(format!(
                "ROM should be 8MB but is {} bytes",
                data.len()
            )));
        }

        let title = &data[TITLE_ADDR..TITLE_ADDR + TITLE_LEN];
        let (game, region) = KNOWN_TITLES
            .iter()
            .find(|(known, _, _)| known.as_slice() == title)
            .map(|&(_, game, region)| (game, region))
            .ok_or_else(|| {
                PatcherError::UnknownRom(format!(
                    "not a valid GBA Metroid ROM (title {:?})",
                    String::from_utf8_lossy(title)
                ))
            })?;

        if game != Game::Fusion || region != Region::U {
            return Err(PatcherError::UnsupportedRom { game, region });
        }

        debug!("Detected {:?} ({:?})", game, region);

        Ok(Self {
            data,
            game,
            region,
            free_space: FreeSpace::new(FUSION_FREE_SPACE_ADDR, FUSION_FREE_SPACE_END),
        })
    }

    pub fn game(&self) -> Game {
        self.game
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn free_space(&self) -> &FreeSpace {
        &self.free_space
    }

    fn check(&self, addr: usize, width: usize) -> Result<()> {
        match addr.checked_add(width) {
            Some(end) if end <= self.data.len() => Ok(()),
            _ => Err(PatcherError::OutOfRange {
                addr,
                width,
                len: self.data.len(),
            }),
        }
    }

    pub fn read_u8(&self, addr: usize) -> Result<u8> {
        self.check(addr, 1)?;
        Ok(self.data[addr])
    }

    pub fn read_u16(&self, addr: usize) -> Result<u16> {
        self.check(addr, 2)?;
        Ok(u16::from_le_bytes([self.data[addr], self.data[addr + 1]]))
    }

    pub fn read_u32(&self, addr: usize) -> Result<u32> {
        self.check(addr, 4)?;
        Ok(u32::from_le_bytes([
            self.data[addr],
            self.data[addr + 1],
            self.data[addr + 2],
            self.data[addr + 3],
        ]))
    }

    /// Reads a stored pointer and returns the image offset it refers to.
    pub fn read_ptr(&self, addr: usize) -> Result<usize> {
        let value = self.read_u32(addr)?;
        if value < ROM_OFFSET {
            return Err(PatcherError::InvalidPointer { addr, value });
        }
        Ok((value - ROM_OFFSET) as usize)
    }

    pub fn read_bytes(&self, addr: usize, size: usize) -> Result<&[u8]> {
        self.check(addr, size)?;
        Ok(&self.data[addr..addr + size])
    }

    pub fn write_u8(&mut self, addr: usize, value: u8) -> Result<()> {
        self.check(addr, 1)?;
        self.data[addr] = value;
        Ok(())
    }

    pub fn write_u16(&mut self, addr: usize, value: u16) -> Result<()> {
        self.check(addr, 2)?;
        self.data[addr..addr + 2].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    pub fn write_u32(&mut self, addr: usize, value: u32) -> Result<()> {
        self.check(addr, 4)?;
        self.data[addr..addr + 4].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    pub fn write_ptr(&mut self, addr: usize, offset: usize) -> Result<()> {
        let value = u32::try_from(offset)
            .ok()
            .filter(|&v| v < ROM_OFFSET)
            .ok_or(PatcherError::PointerOverflow { offset })?;
        self.write_u32(addr, value + ROM_OFFSET)
    }

    pub fn write_bytes(&mut self, addr: usize, bytes: &[u8]) -> Result<()> {
        self.check(addr, bytes.len())?;
        self.data[addr..addr + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Copies `size` bytes within the image; overlapping ranges are handled
    /// like `memmove`.
    pub fn copy_bytes(&mut self, src: usize, dst: usize, size: usize) -> Result<()> {
        self.check(src, size)?;
        self.check(dst, size)?;
        self.data.copy_within(src..src + size, dst);
        Ok(())
    }

    pub fn reserve_free_space(&mut self, size: usize, align: usize) -> Result<usize> {
        let addr = self.free_space.reserve(size, align)?;
        debug!("Reserved {:#X} bytes of free space at {:#X}", size, addr);
        Ok(addr)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, &self.data)?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn blank_rom() -> Rom {
    let mut data = vec![0u8; ROM_SIZE];
    data[TITLE_ADDR..TITLE_ADDR + TITLE_LEN].copy_from_slice(KNOWN_TITLES[0].0);
    Rom::from_bytes(data).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_fusion_u() {
        let rom = blank_rom();
        assert_eq!(rom.game(), Game::Fusion);
        assert_eq!(rom.region(), Region::U);
        assert_eq!(rom.free_space().cursor(), FUSION_FREE_SPACE_ADDR);
    }

    #[test]
    fn rejects_other_releases() {
        let mut data = vec![0u8; ROM_SIZE];
        data[TITLE_ADDR..TITLE_ADDR + TITLE_LEN].copy_from_slice(b"ZEROMISSIONEBMXE");
        match Rom::from_bytes(data) {
            Err(PatcherError::UnsupportedRom { game, region }) => {
                assert_eq!(game, Game::ZeroMission);
                assert_eq!(region, Region::U);
            }
            other => panic!("unexpected result: {:?}", other.err()),
        }

        let data = vec![0u8; ROM_SIZE];
        assert!(matches!(
            Rom::from_bytes(data),
            Err(PatcherError::UnknownRom(_))
        ));
        assert!(matches!(
            Rom::from_bytes(vec![0u8; 16]),
            Err(PatcherError::UnknownRom(_))
        ));
    }

    #[test]
    fn little_endian_access() {
        let mut rom = blank_rom();
        rom.write_u32(0x1000, 0x1122_3344).unwrap();
        assert_eq!(rom.read_u8(0x1000).unwrap(), 0x44);
        assert_eq!(rom.read_u16(0x1002).unwrap(), 0x1122);
        rom.write_u16(0x1000, 0xBEEF).unwrap();
        assert_eq!(rom.read_u32(0x1000).unwrap(), 0x1122_BEEF);
    }

    #[test]
    fn out_of_range_access_fails() {
        let mut rom = blank_rom();
        assert!(rom.read_u32(ROM_SIZE - 2).is_err());
        assert!(rom.write_u16(ROM_SIZE - 1, 0).is_err());
        assert!(rom.read_u8(ROM_SIZE).is_err());
        assert!(rom.read_u8(ROM_SIZE - 1).is_ok());
        assert!(rom.read_bytes(usize::MAX, 2).is_err());
    }

    #[test]
    fn pointer_bias() {
        let mut rom = blank_rom();
        rom.write_ptr(0x200, 0x12345).unwrap();
        assert_eq!(rom.read_u32(0x200).unwrap(), 0x12345 + ROM_OFFSET);
        assert_eq!(rom.read_ptr(0x200).unwrap(), 0x12345);

        rom.write_u32(0x204, 0x0012_3456).unwrap();
        assert!(matches!(
            rom.read_ptr(0x204),
            Err(PatcherError::InvalidPointer { addr: 0x204, .. })
        ));
        assert!(matches!(
            rom.write_ptr(0x208, ROM_OFFSET as usize),
            Err(PatcherError::PointerOverflow { .. })
        ));
    }

    #[test]
    fn overlapping_copy_behaves_like_memmove() {
        let mut rom = blank_rom();
        rom.write_bytes(0x300, &[1, 2, 3, 4, 5]).unwrap();
        rom.copy_bytes(0x300, 0x302, 5).unwrap();
        assert_eq!(rom.read_bytes(0x300, 7).unwrap(), &[1, 2, 1, 2, 3, 4, 5]);
        rom.copy_bytes(0x302, 0x300, 5).unwrap();
        assert_eq!(rom.read_bytes(0x300, 5).unwrap(), &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn free_space_is_monotonic_and_aligned() {
        let mut rom = blank_rom();
        let a = rom.reserve_free_space(3, 1).unwrap();
        assert_eq!(a, FUSION_FREE_SPACE_ADDR);
        let b = rom.reserve_free_space(8, 4).unwrap();
        assert_eq!(b, FUSION_FREE_SPACE_ADDR + 4);
        let c = rom.reserve_free_space(1, 1).unwrap();
        assert_eq!(c, b + 8);
    }

    #[test]
    fn free_space_cannot_run_past_the_image() {
        let mut arena = FreeSpace::new(ROM_SIZE - 4, ROM_SIZE);
        assert!(arena.reserve(4, 1).is_ok());
        assert!(matches!(
            arena.reserve(1, 1),
            Err(PatcherError::CapacityExceeded { .. })
        ));
    }
}
