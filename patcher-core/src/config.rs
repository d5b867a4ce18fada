//! The patch data file: everything one run should change.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use log::{debug, warn};
use serde::Deserialize;

use crate::connections::{ElevatorConnections, SectorShortcuts};
use crate::credits::CreditsLine;
use crate::door_locks::DoorLock;
use crate::items::{LocationsConfig, TankIncrements};
use crate::level_edits::LevelEdits;
use crate::minimap::MinimapEdits;
use crate::navigation::{HintLock, NavRoom, NavigationText};
use crate::palettes::PaletteSettings;
use crate::starting::{StartingItems, StartingLocation};
use crate::{PatcherError, Result};

pub const SEED_HASH_LEN: usize = 8;
pub const MAX_REQUIRED_METROIDS: u8 = 20;
const AREA_COUNT: u8 = 7;

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct PatchData {
    pub seed_hash: String,
    pub locations: LocationsConfig,
    pub required_metroid_count: u8,
    pub starting_location: Option<StartingLocation>,
    pub starting_items: Option<StartingItems>,
    pub tank_increments: Option<TankIncrements>,
    pub elevator_connections: Option<ElevatorConnections>,
    pub sector_shortcuts: Option<SectorShortcuts>,
    pub door_locks: Option<Vec<DoorLock>>,
    pub palettes: Option<PaletteSettings>,
    pub navigation_text: Option<NavigationText>,
    pub credits_text: Option<Vec<CreditsLine>>,
    pub nav_station_locks: Option<BTreeMap<NavRoom, HintLock>>,
    #[serde(default)]
    pub disable_demos: bool,
    #[serde(default)]
    pub skip_door_transitions: bool,
    #[serde(default = "default_stereo")]
    pub stereo_default: bool,
    #[serde(default)]
    pub disable_music: bool,
    #[serde(default)]
    pub disable_sound_effects: bool,
    pub missile_limit: Option<u8>,
    #[serde(default)]
    pub unexplored_map: bool,
    #[serde(default)]
    pub power_bombs_without_bombs: bool,
    #[serde(default)]
    pub anti_softlock_room_edits: bool,
    pub level_edits: Option<LevelEdits>,
    pub minimap_edits: Option<MinimapEdits>,
    #[serde(default)]
    pub hide_doors_on_minimap: bool,
}

fn default_stereo() -> bool {
    true
}

impl PatchData {
    /// Reads and validates a patch data file.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        Self::from_slice(&bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let data: PatchData = serde_json::from_slice(bytes)?;
        data.validate()?;
        debug!("Loaded patch data for seed {}", data.seed_hash);
        Ok(data)
    }

    /// Checks every range and list length the subsystems rely on.
    pub fn validate(&self) -> Result<()> {
        let hash_ok = self.seed_hash.len() == SEED_HASH_LEN
            && self
                .seed_hash
                .chars()
                .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase());
        if !hash_ok {
            return Err(PatcherError::Config(format!(
                "SeedHash {:?} must be {} characters of 0-9 or A-Z",
                self.seed_hash, SEED_HASH_LEN
            )));
        }

        self.locations.validate()?;
        if self.required_metroid_count > MAX_REQUIRED_METROIDS {
            return Err(PatcherError::Config(format!(
                "RequiredMetroidCount {} is above {}",
                self.required_metroid_count, MAX_REQUIRED_METROIDS
            )));
        }
        let placed = self.locations.metroid_count();
        if self.required_metroid_count as usize > placed {
            warn!(
                "{} metroids are required but only {} are placed",
                self.required_metroid_count, placed
            );
        }

        if let Some(location) = &self.starting_location {
            if location.area >= AREA_COUNT {
                return Err(PatcherError::Config(format!(
                    "starting area {} does not exist",
                    location.area
                )));
            }
        }
        if let Some(items) = &self.starting_items {
            items.validate()?;
        }
        if let Some(increments) = &self.tank_increments {
            increments.validate()?;
        }
        if let Some(elevators) = &self.elevator_connections {
            elevators.validate()?;
        }
        if let Some(shortcuts) = &self.sector_shortcuts {
            shortcuts.validate()?;
        }
        if let Some(locks) = &self.door_locks {
            if let Some(lock) = locks.iter().find(|l| l.area >= AREA_COUNT) {
                return Err(PatcherError::Config(format!(
                    "door lock area {} does not exist",
                    lock.area
                )));
            }
        }
        if let Some(palettes) = &self.palettes {
            palettes.validate()?;
        }
        if let Some(credits) = &self.credits_text {
            for line in credits {
                line.validate()?;
            }
        }
        if let Some(edits) = &self.level_edits {
            for (&area, rooms) in edits {
                if area >= AREA_COUNT {
                    return Err(PatcherError::Config(format!("level edit area {} does not exist", area)));
                }
                for room in rooms.values() {
                    room.validate()?;
                }
            }
        }
        if let Some(edits) = &self.minimap_edits {
            for (&id, changes) in edits {
                if id > 10 {
                    return Err(PatcherError::Config(format!("minimap {} does not exist", id)));
                }
                for change in changes {
                    change.validate()?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn minimal() -> Value {
        let majors: Vec<Value> = [
            "MainDeckData",
            "Arachnus",
            "ChargeCoreX",
            "Level1",
            "TroData",
            "Zazabi",
            "Serris",
            "Level2",
            "PyrData",
            "MegaX",
            "Level3",
            "ArcData1",
            "WideCoreX",
            "ArcData2",
            "Yakuza",
            "Nettori",
            "Nightmare",
            "Level4",
            "AqaData",
            "WaveCoreX",
        ]
        .iter()
        .map(|source| json!({"Source": source, "Item": "Missiles"}))
        .collect();
        let minors: Vec<Value> = (0..100)
            .map(|i| {
                json!({"Area": i % 7, "Room": i, "BlockX": 1, "BlockY": 2, "Item": "InfantMetroid"})
            })
            .collect();
        json!({
            "SeedHash": "AB12CD34",
            "RequiredMetroidCount": 20,
            "Locations": {"MajorLocations": majors, "MinorLocations": minors}
        })
    }

    fn parse(value: Value) -> Result<PatchData> {
        PatchData::from_slice(value.to_string().as_bytes())
    }

    #[test]
    fn minimal_file_gets_defaults() {
        let data = parse(minimal()).unwrap();
        assert!(data.stereo_default);
        assert!(!data.disable_music);
        assert!(data.missile_limit.is_none());
        assert!(data.elevator_connections.is_none());
        assert_eq!(data.locations.metroid_count(), 100);
    }

    #[test]
    fn seed_hash_format() {
        for hash in ["ab12cd34", "AB12CD3", "AB12CD34X", "AB12-D34"] {
            let mut value = minimal();
            value["SeedHash"] = json!(hash);
            assert!(matches!(parse(value), Err(PatcherError::Config(_))), "{}", hash);
        }
    }

    #[test]
    fn metroid_count_limit() {
        let mut value = minimal();
        value["RequiredMetroidCount"] = json!(21);
        assert!(parse(value).is_err());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let mut value = minimal();
        value["Bogus"] = json!(true);
        assert!(matches!(parse(value), Err(PatcherError::Json(_))));
    }

    #[test]
    fn nested_sections_are_checked() {
        let mut value = minimal();
        value["SectorShortcuts"] = json!({"LeftAreas": [1, 2, 3], "RightAreas": [1, 2, 3, 4, 5, 6]});
        assert!(parse(value).is_err());

        let mut value = minimal();
        value["MinimapEdits"] = json!({"11": []});
        assert!(parse(value).is_err());

        let mut value = minimal();
        value["CreditsText"] = json!([{"LineType": "Blue", "Text": "lower"}]);
        assert!(parse(value).is_err());

        let mut value = minimal();
        value["Palettes"] = json!({"Randomize": {"Samus": {"HueMin": 200, "HueMax": 100}}});
        assert!(parse(value).is_err());
    }

    #[test]
    fn optional_sections_parse() {
        let mut value = minimal();
        value["NavStationLocks"] = json!({"MainDeckWest": "GREEN"});
        value["NavigationText"] = json!({"English": {
            "NavigationTerminals": {"AuxiliaryPower": "HELLO"},
            "ShipText": {"InitialText": "A", "ConfirmText": "B"}
        }});
        value["LevelEdits"] = json!({"2": {"31": {"BG1": [{"X": 1, "Y": 1, "Value": 5}]}}});
        value["MissileLimit"] = json!(4);
        value["StereoDefault"] = json!(false);
        let data = parse(value).unwrap();
        assert_eq!(
            data.nav_station_locks.unwrap().get(&NavRoom::MainDeckWest),
            Some(&HintLock::Green)
        );
        assert_eq!(data.missile_limit, Some(4));
        assert!(!data.stereo_default);
        assert!(data.level_edits.unwrap()[&2].contains_key(&31));
    }
}
