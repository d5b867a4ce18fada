//! Auxiliary files shipped next to the patcher.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use serde::de::DeserializeOwned;

use crate::connections::{MainHub, MainHubLayout};
use crate::rom::{Game, Region};
use crate::Result;

pub const LOCATIONS_FILE: &str = "locations.json";
pub const MAIN_HUB_LAYOUT_FILE: &str = "main_hub.json";
pub const MAIN_HUB_GFX_FILE: &str = "main_hub.gfx.lz";
pub const MAIN_HUB_TILEMAP_FILE: &str = "main_hub_tilemap.bin";

#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn read(&self, relative: &Path) -> Result<Vec<u8>> {
        let path = self.root.join(relative);
        debug!("Reading {}", path.display());
        Ok(fs::read(path)?)
    }

    pub fn read_json<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let bytes = self.read(Path::new(name))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn main_hub(&self) -> Result<MainHub> {
        let layout: MainHubLayout = self.read_json(MAIN_HUB_LAYOUT_FILE)?;
        layout.validate()?;
        Ok(MainHub {
            layout,
            gfx: self.read(Path::new(MAIN_HUB_GFX_FILE))?,
            tilemap: self.read(Path::new(MAIN_HUB_TILEMAP_FILE))?,
        })
    }

    /// Reads `patches/<game>_<region>/<name>.ips`.
    pub fn patch_file(&self, game: Game, region: Region, name: &str) -> Result<Vec<u8>> {
        let game = match game {
            Game::Fusion => "fusion",
            Game::ZeroMission => "zm",
        };
        let dir = format!("{}_{}", game, region.dir_name());
        self.read(&Path::new("patches").join(dir).join(format!("{}.ips", name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("mars-patcher-{}-{}", name, std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn patch_files_are_found_per_release() {
        let root = temp_dir("patches");
        let dir = root.join("patches").join("fusion_u");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("disable_demos.ips"), b"PATCHEOF").unwrap();

        let data = DataDir::new(&root);
        let bytes = data.patch_file(Game::Fusion, Region::U, "disable_demos").unwrap();
        assert_eq!(bytes, b"PATCHEOF");
        assert!(data.patch_file(Game::Fusion, Region::E, "disable_demos").is_err());

        fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn missing_files_are_io_errors() {
        let data = DataDir::new(Path::new("/nonexistent/mars-patcher"));
        assert!(matches!(
            data.read_json::<serde_json::Value>(LOCATIONS_FILE),
            Err(crate::PatcherError::Io(_))
        ));
    }
}
