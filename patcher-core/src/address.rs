//! Per-release locations of the game's data tables.

use crate::rom::{Game, Region, Rom};
use crate::{PatcherError, Result};

/// A table or constant whose location differs between releases.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Field {
    AreaRoomEntryPtrs,
    TilesetEntries,
    TilesetCount,
    AreaDoorsPtrs,
    AreaConnectionsCount,
    /// Code location holding the pointer to the area connection table.
    AreaConnectionsOwner,
    HatchLockEvents,
    HatchLockEventCount,
    StartingEquipment,
    AnimPaletteEntries,
    AnimPaletteCount,
    SpriteVramSizes,
    SpritePalettePtrs,
    SpriteCount,
    SpritesetPtrs,
    FileScreenTextPtrs,
    CharacterWidths,
    NavigationTextPtrs,
    MinimapPtrs,
    MinimapCount,
}

/// Groups of fixed palettes, each given as `(address, rows)` blocks.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum PaletteGroup {
    Samus,
    HelmetCursor,
    SaX,
    Beams,
    MinimapDoors,
}

pub trait AddressTable {
    fn lookup(&self, game: Game, region: Region, field: Field) -> Result<u32>;

    fn palette_blocks(&self, game: Game, region: Region, group: PaletteGroup)
        -> Result<Vec<(u32, u8)>>;
}

type PerRegion = [Option<u32>; 4];

const fn all(u: u32, e: u32, j: u32, c: u32) -> PerRegion {
    [Some(u), Some(e), Some(j), Some(c)]
}

const fn same(value: u32) -> PerRegion {
    [Some(value); 4]
}

fn fusion_field(field: Field) -> PerRegion {
    match field {
        Field::AreaRoomEntryPtrs => all(0x79B8BC, 0x79C0F0, 0x7EDF6C, 0x77D5C0),
        Field::TilesetEntries => all(0x3BF888, 0x3BFEE4, 0x3C1E50, 0x3C1E94),
        Field::TilesetCount => same(0x62),
        Field::AreaDoorsPtrs => all(0x79B894, 0x79C0C8, 0x7EDF44, 0x77D598),
        Field::AreaConnectionsCount => same(0x22),
        Field::AreaConnectionsOwner => [Some(0x6945C), None, None, None],
        Field::HatchLockEvents => all(0x3C8A5C, 0x3C90B8, 0x3CB024, 0x3CB068),
        Field::HatchLockEventCount => same(0x4B),
        Field::StartingEquipment => all(0x28D2AC, 0x28D908, 0x28F5B4, 0x28F5F8),
        Field::AnimPaletteEntries => all(0x3E3764, 0x3E3DC0, 0x3E5D38, 0x3E5D7C),
        Field::AnimPaletteCount => all(0x21, 0x21, 0x22, 0x22),
        Field::SpriteVramSizes => all(0x2E4A50, 0x2E50AC, 0x2E6D58, 0x2E6D9C),
        Field::SpritePalettePtrs => all(0x79A8D4, 0x79B108, 0x7ECF84, 0x77C5D8),
        Field::SpriteCount => same(0xCF),
        Field::SpritesetPtrs => all(0x79ADD8, 0x79B60C, 0x7ED488, 0x77CADC),
        Field::FileScreenTextPtrs => [Some(0x79EC68), Some(0x79F4C4), Some(0x7F13FC), None],
        Field::CharacterWidths => all(0x576234, 0x576890, 0x578934, 0x57D21C),
        Field::NavigationTextPtrs => all(0x79C0F0, 0x79C924, 0x7EE7A0, 0x77DDF4),
        Field::MinimapPtrs => all(0x79BE5C, 0x79C690, 0x7EE50C, 0x77DB60),
        Field::MinimapCount => same(11),
    }
}

fn fusion_palettes(group: PaletteGroup, region: Region) -> Option<&'static [(u32, u8)]> {
    const SAMUS: [&[(u32, u8)]; 4] = [
        &[(0x28DD7C, 0x5E), (0x28EAFC, 0x70)],
        &[(0x28E3D8, 0x5E), (0x28F158, 0x70)],
        &[(0x290084, 0x5E), (0x290E04, 0x70)],
        &[(0x2900C8, 0x5E), (0x290E48, 0x70)],
    ];
    const HELMET_CURSOR: [&[(u32, u8)]; 4] = [
        &[(0x740E08, 1), (0x740EA8, 2), (0x73C544, 1), (0x73C584, 2)],
        &[(0x741618, 1), (0x7416B8, 2), (0x73CD54, 1), (0x73CD94, 2)],
        &[(0x73FCDC, 1), (0x73FD7C, 2), (0x73C030, 1), (0x73C070, 2)],
        &[(0x6CE360, 1), (0x6CE400, 2), (0x6CA8F8, 1), (0x6CA938, 2)],
    ];
    const SAX: [&[(u32, u8)]; 4] = [
        &[(0x2E7D60, 2), (0x2E91D8, 2), (0x38CFB4, 8), (0x2B4368, 5)],
        &[(0x2E83BC, 2), (0x2E9834, 2), (0x38D610, 8), (0x2B49C4, 5)],
        &[(0x2EA068, 2), (0x2EB4E0, 2), (0x38F2BC, 8), (0x2B6670, 5)],
        &[(0x2EA0AC, 2), (0x2EB524, 2), (0x38F300, 8), (0x2B66B4, 5)],
    ];
    const BEAMS: [&[(u32, u8)]; 4] = [
        &[(0x58B464, 6)],
        &[(0x58BAC0, 6)],
        &[(0x58BBF4, 6)],
        &[(0x592578, 6)],
    ];
    const MINIMAP_DOORS: &[(u32, u8)] = &[(0x5657A8, 1), (0x5657C8, 1), (0x5657E8, 1)];

    let idx = region.index();
    match group {
        PaletteGroup::Samus => Some(SAMUS[idx]),
        PaletteGroup::HelmetCursor => Some(HELMET_CURSOR[idx]),
        PaletteGroup::SaX => Some(SAX[idx]),
        PaletteGroup::Beams => Some(BEAMS[idx]),
        PaletteGroup::MinimapDoors => (region == Region::U).then_some(MINIMAP_DOORS),
    }
}

/// Address data compiled into the patcher. Only Fusion is described.
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticAddressTable;

impl AddressTable for StaticAddressTable {
    fn lookup(&self, game: Game, region: Region, field: Field) -> Result<u32> {
        let value = match game {
            Game::Fusion => fusion_field(field)[region.index()],
            Game::ZeroMission => None,
        };
        value.ok_or_else(|| PatcherError::MissingAddress {
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
        let blocks = match game {
            Game::Fusion => fusion_palettes(group, region),
            Game::ZeroMission => None,
        };
        blocks
            .map(<[(u32, u8)]>::to_vec)
            .ok_or_else(|| PatcherError::MissingAddress {
                game,
                region,
                field: format!("{:?} palettes", group),
            })
    }
}

/// An address table bound to the release of one loaded ROM.
#[derive(Clone, Copy)]
pub struct GameData<'a> {
    table: &'a dyn AddressTable,
    game: Game,
    region: Region,
}

impl<'a> GameData<'a> {
    pub fn new(table: &'a dyn AddressTable, rom: &Rom) -> Self {
        Self {
            table,
            game: rom.game(),
            region: rom.region(),
        }
    }

    pub fn game(&self) -> Game {
        self.game
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn get(&self, field: Field) -> Result<usize> {
        self.table
            .lookup(self.game, self.region, field)
            .map(|value| value as usize)
    }

    pub fn palettes(&self, group: PaletteGroup) -> Result<Vec<(usize, usize)>> {
        let blocks = self.table.palette_blocks(self.game, self.region, group)?;
        Ok(blocks
            .into_iter()
            .map(|(addr, rows)| (addr as usize, rows as usize))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fusion_u_fields_resolve() {
        let table = StaticAddressTable;
        assert_eq!(
            table
                .lookup(Game::Fusion, Region::U, Field::AreaDoorsPtrs)
                .unwrap(),
            0x79B894
        );
        assert_eq!(
            table
                .lookup(Game::Fusion, Region::J, Field::AnimPaletteCount)
                .unwrap(),
            0x22
        );
    }

    #[test]
    fn missing_combinations_fail() {
        let table = StaticAddressTable;
        assert!(matches!(
            table.lookup(Game::Fusion, Region::C, Field::FileScreenTextPtrs),
            Err(PatcherError::MissingAddress { .. })
        ));
        assert!(table
            .lookup(Game::ZeroMission, Region::U, Field::TilesetEntries)
            .is_err());
        assert!(table
            .palette_blocks(Game::Fusion, Region::E, PaletteGroup::MinimapDoors)
            .is_err());
    }

    #[test]
    fn game_data_binds_release() {
        let rom = crate::rom::blank_rom();
        let table = StaticAddressTable;
        let gd = GameData::new(&table, &rom);
        assert_eq!(gd.get(Field::AreaConnectionsOwner).unwrap(), 0x6945C);
        let samus = gd.palettes(PaletteGroup::Samus).unwrap();
        assert_eq!(samus, vec![(0x28DD7C, 0x5E), (0x28EAFC, 0x70)]);
    }
}
