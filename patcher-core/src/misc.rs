//! Small optional tweaks: bundled IPS patches and single-value writes.

use log::info;

use crate::data::DataDir;
use crate::reserved::MISSILE_LIMIT;
use crate::rom::Rom;
use crate::{PatcherError, Result};

/// Applies IPS patch data to an image.
pub trait IpsPatchApplier {
    fn apply(&self, rom: &mut Rom, patch: &[u8]) -> Result<()>;
}

/// `IpsPatchApplier` backed by the `ips` crate's parser.
#[derive(Debug, Default, Clone, Copy)]
pub struct IpsCrateApplier;

impl IpsPatchApplier for IpsCrateApplier {
    fn apply(&self, rom: &mut Rom, patch: &[u8]) -> Result<()> {
        let patch = ips::Patch::parse(patch).map_err(|e| PatcherError::Ips(format!("{:?}", e)))?;
        for hunk in patch.hunks() {
            rom.write_bytes(hunk.offset(), hunk.payload())?;
        }
        Ok(())
    }
}

/// Patches shipped in the data directory under `patches/<game>_<region>/`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MiscPatch {
    StereoDefault,
    DisableDemos,
    DisableMusic,
    DisableSoundEffects,
    PowerBombsWithoutBombs,
    UnexploredMap,
    AntiSoftlock,
}

impl MiscPatch {
    pub fn file_name(self) -> &'static str {
        match self {
            MiscPatch::StereoDefault => "stereo_default",
            MiscPatch::DisableDemos => "disable_demos",
            MiscPatch::DisableMusic => "disable_music",
            MiscPatch::DisableSoundEffects => "disable_sound_effects",
            MiscPatch::PowerBombsWithoutBombs => "pbs_without_bombs",
            MiscPatch::UnexploredMap => "unexplored_map",
            MiscPatch::AntiSoftlock => "anti_softlock",
        }
    }
}

pub fn apply_patch_file(rom: &mut Rom, data_dir: &DataDir, applier: &dyn IpsPatchApplier, patch: MiscPatch) -> Result<()> {
    let bytes = data_dir.patch_file(rom.game(), rom.region(), patch.file_name())?;
    applier.apply(rom, &bytes)?;
    info!("Applied {}.ips", patch.file_name());
    Ok(())
}

pub fn skip_door_transitions(rom: &mut Rom) -> Result<()> {
    rom.write_u32(0x69500, 0x300_0BDE)?;
    rom.write_u8(0x694E2, 0xC)
}

pub fn change_missile_limit(rom: &mut Rom, limit: u8) -> Result<()> {
    rom.write_u8(MISSILE_LIMIT, limit)
}
