//! Raw block edits to room layers, applied after everything else.

use std::collections::BTreeMap;

use log::debug;
use serde::Deserialize;

use crate::address::GameData;
use crate::room::{LayerKind, RoomEntry};
use crate::rom::Rom;
use crate::{PatcherError, Result};

const MAX_BLOCK_VALUE: u16 = 0x3FF;

#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct BlockEdit {
    pub x: u8,
    pub y: u8,
    pub value: u16,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoomEdits {
    #[serde(rename = "BG1", default)]
    pub bg1: Vec<BlockEdit>,
    #[serde(rename = "BG2", default)]
    pub bg2: Vec<BlockEdit>,
    #[serde(rename = "Clipdata", default)]
    pub clip: Vec<BlockEdit>,
}

impl RoomEdits {
    fn layers(&self) -> [(LayerKind, &[BlockEdit]); 3] {
        [
            (LayerKind::Bg1, self.bg1.as_slice()),
            (LayerKind::Bg2, self.bg2.as_slice()),
            (LayerKind::Clip, self.clip.as_slice()),
        ]
    }

    pub fn validate(&self) -> Result<()> {
        for (kind, edits) in self.layers() {
            if let Some(edit) = edits.iter().find(|e| e.value > MAX_BLOCK_VALUE) {
                return Err(PatcherError::Config(format!(
                    "{:?} edit at ({}, {}) has value {:#X}",
                    kind, edit.x, edit.y, edit.value
                )));
            }
            for (i, edit) in edits.iter().enumerate() {
                if edits[..i].contains(edit) {
                    return Err(PatcherError::Config(format!("duplicate {:?} edit {:?}", kind, edit)));
                }
            }
        }
        Ok(())
    }
}

/// Area id to room id to edits.
pub type LevelEdits = BTreeMap<u8, BTreeMap<u8, RoomEdits>>;

pub fn apply_level_edits(rom: &mut Rom, gd: &GameData, edits: &LevelEdits) -> Result<()> {
    for (&area, rooms) in edits {
        for (&room, room_edits) in rooms {
            let entry = RoomEntry::new(rom, gd, area, room)?;
            for (kind, blocks) in room_edits.layers() {
                if blocks.is_empty() {
                    continue;
                }
                let mut layer = entry.load_layer(rom, kind)?;
                for block in blocks {
                    layer.set(block.x as usize, block.y as usize, block.value)?;
                }
                layer.commit(rom)?;
            }
            debug!("Applied level edits to area {} room {:#04X}", area, room);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::Fixture;

    #[test]
    fn edits_each_listed_layer() {
        let mut fx = Fixture::new();
        fx.add_room(3, 0x12, 4, 4, &[1; 16], &[0; 16]);
        let edits: LevelEdits = serde_json::from_str(
            r#"{"3": {"18": {
                "BG1": [{"X": 1, "Y": 2, "Value": 77}],
                "Clipdata": [{"X": 3, "Y": 3, "Value": 16}, {"X": 0, "Y": 0, "Value": 1023}]
            }}}"#,
        )
        .unwrap();
        for rooms in edits.values() {
            for room in rooms.values() {
                room.validate().unwrap();
            }
        }
        let gd = GameData::new(&fx.table, &fx.rom);
        apply_level_edits(&mut fx.rom, &gd, &edits).unwrap();

        let bg1 = fx.layer(3, 0x12, LayerKind::Bg1);
        assert_eq!(bg1.get(1, 2).unwrap(), 77);
        assert_eq!(bg1.get(0, 0).unwrap(), 1);
        let clip = fx.layer(3, 0x12, LayerKind::Clip);
        assert_eq!(clip.get(3, 3).unwrap(), 16);
        assert_eq!(clip.get(0, 0).unwrap(), 1023);
        assert_eq!(fx.layer(3, 0x12, LayerKind::Bg2).get(0, 0).unwrap(), 0);
    }

    #[test]
    fn out_of_bounds_edit_fails() {
        let mut fx = Fixture::new();
        fx.add_room(0, 1, 4, 4, &[0; 16], &[0; 16]);
        let edits: LevelEdits =
            serde_json::from_str(r#"{"0": {"1": {"BG2": [{"X": 4, "Y": 0, "Value": 1}]}}}"#).unwrap();
        let gd = GameData::new(&fx.table, &fx.rom);
        assert!(matches!(
            apply_level_edits(&mut fx.rom, &gd, &edits),
            Err(PatcherError::BlockOutOfBounds { .. })
        ));
    }

    #[test]
    fn validation() {
        let big: RoomEdits = serde_json::from_str(r#"{"BG1": [{"X": 0, "Y": 0, "Value": 1024}]}"#).unwrap();
        assert!(big.validate().is_err());
        let dup: RoomEdits = serde_json::from_str(
            r#"{"BG2": [{"X": 0, "Y": 0, "Value": 1}, {"X": 0, "Y": 0, "Value": 1}]}"#,
        )
        .unwrap();
        assert!(dup.validate().is_err());
    }
}
