use std::path::PathBuf;

use thiserror::Error;

pub mod address;
pub mod color;
pub mod config;
pub mod connections;
pub mod credits;
pub mod data;
pub mod door_locks;
pub mod items;
pub mod level_edits;
pub mod lz77;
pub mod minimap;
pub mod misc;
pub mod navigation;
pub mod palettes;
mod reserved;
pub mod rle;
pub mod rom;
pub mod room;
pub mod starting;
pub mod text;

#[cfg(test)]
mod testutil;

use address::{GameData, StaticAddressTable};
use config::PatchData;
use connections::Connections;
use data::DataDir;
use items::{ItemPatcher, LocationSettings};
use misc::{IpsCrateApplier, MiscPatch};
use palettes::PaletteRandomizer;
use rom::{Game, Region, Rom};
use text::GlyphEncoder;

#[derive(Debug, Error)]
pub enum PatcherError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("access of {width} bytes at {addr:#X} is outside the {len:#X} byte image")]
    OutOfRange { addr: usize, width: usize, len: usize },
    #[error("value {value:#010X} at {addr:#X} is not a valid pointer")]
    InvalidPointer { addr: usize, value: u32 },
    #[error("offset {offset:#X} cannot be stored as a pointer")]
    PointerOverflow { offset: usize },
    #[error("RLE block at {addr:#X} has unequal planes ({low} and {high} bytes)")]
    PlaneMismatch { addr: usize, low: usize, high: usize },
    #[error("RLE block at {addr:#X} has invalid length field width {width}")]
    RleWidth { addr: usize, width: u8 },
    #[error("compressed data at {addr:#X} is truncated")]
    Truncated { addr: usize },
    #[error("layer at {addr:#X} decodes to {actual} bytes but its {width}x{height} header needs {expected}")]
    LayerSize {
        addr: usize,
        width: u8,
        height: u8,
        expected: usize,
        actual: usize,
    },
    #[error("block ({x}, {y}) is out of bounds for a {width}x{height} layer")]
    BlockOutOfBounds {
        x: usize,
        y: usize,
        width: usize,
        height: usize,
    },
    #[error("LZ77 error: {0}")]
    Lz77(String),
    #[error("ROM data invariant violated: {0}")]
    Invariant(String),

    #[error("configuration error: {0}")]
    Config(String),
    #[error("unrecognised ROM: {0}")]
    UnknownRom(String),
    #[error("{game:?} ({region:?}) is not supported")]
    UnsupportedRom { game: Game, region: Region },
    #[error("no address for {field} in {game:?} ({region:?})")]
    MissingAddress {
        game: Game,
        region: Region,
        field: String,
    },

    #[error("{what} is full (capacity {capacity})")]
    CapacityExceeded { what: &'static str, capacity: usize },
    #[error("IPS error: {0}")]
    Ips(String),
}

pub type Result<T> = std::result::Result<T, PatcherError>;

/// Paths for one patch run.
#[derive(Debug, Clone)]
pub struct PatchOptions {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub patch_data_path: PathBuf,
    /// Directory holding `locations.json`, the main hub assets and the
    /// per-release `patches/` folders.
    pub data_dir: PathBuf,
}

/// Applies a patch data file to a ROM and writes the result.
///
/// Nothing is written unless every step succeeds.
pub fn patch(options: &PatchOptions, status: &mut dyn FnMut(&str)) -> Result<()> {
    let mut rom = Rom::load(&options.input_path)?;
    let patch_data = PatchData::load(&options.patch_data_path)?;
    let data_dir = DataDir::new(&options.data_dir);

    apply(&mut rom, &patch_data, &data_dir, status)?;

    rom.save(&options.output_path)?;
    status(&format!("Output written to {}", options.output_path.display()));
    Ok(())
}

/// Runs every enabled subsystem against an already loaded ROM.
pub fn apply(
    rom: &mut Rom,
    patch_data: &PatchData,
    data_dir: &DataDir,
    status: &mut dyn FnMut(&str),
) -> Result<()> {
    let table = StaticAddressTable;
    let gd = GameData::new(&table, rom);

    // Palettes go first in case later steps copy tileset data.
    if let Some(settings) = &patch_data.palettes {
        status("Randomizing palettes...");
        PaletteRandomizer::new(settings)?.randomize(rom, &gd)?;
    }

    status("Writing item assignments...");
    let mut locations = LocationSettings::load(data_dir)?;
    locations.set_assignments(&patch_data.locations)?;
    ItemPatcher::new(&locations).write_items(rom, &gd)?;
    items::set_required_metroid_count(rom, patch_data.required_metroid_count)?;

    if let Some(location) = &patch_data.starting_location {
        status("Writing starting location...");
        starting::set_starting_location(rom, &gd, location)?;
    }

    if let Some(start) = &patch_data.starting_items {
        status("Writing starting items...");
        starting::set_starting_items(rom, &gd, start)?;
    }

    if let Some(increments) = &patch_data.tank_increments {
        status("Writing tank increments...");
        items::set_tank_increments(rom, increments)?;
    }

    let mut connections: Option<Connections> = None;
    if let Some(elevators) = &patch_data.elevator_connections {
        status("Writing elevator connections...");
        let hub = data_dir.main_hub()?;
        let conns = connections.insert(Connections::new(rom, gd)?);
        conns.set_elevator_connections(rom, elevators, &hub)?;
    }

    if let Some(shortcuts) = &patch_data.sector_shortcuts {
        status("Writing sector shortcuts...");
        let mut conns = match connections.take() {
            Some(conns) => conns,
            None => Connections::new(rom, gd)?,
        };
        conns.set_shortcut_connections(rom, shortcuts)?;
    }

    if let Some(locks) = &patch_data.door_locks {
        status("Writing door locks...");
        door_locks::set_door_locks(rom, &gd, locks)?;
    }

    if let Some(nav_text) = &patch_data.navigation_text {
        status("Writing navigation text...");
        let encoder = GlyphEncoder::new(rom, &gd)?;
        navigation::write_navigation_text(rom, &gd, &encoder, nav_text)?;
    }

    if let Some(nav_locks) = &patch_data.nav_station_locks {
        status("Writing navigation station locks...");
        navigation::apply_hint_security(rom, nav_locks)?;
    }

    if let Some(credits) = &patch_data.credits_text {
        status("Writing credits text...");
        credits::write_credits(rom, credits)?;
    }

    status("Applying misc patches...");
    let applier = IpsCrateApplier;
    if patch_data.disable_demos {
        misc::apply_patch_file(rom, data_dir, &applier, MiscPatch::DisableDemos)?;
    }
    if patch_data.skip_door_transitions {
        misc::skip_door_transitions(rom)?;
    }
    if patch_data.stereo_default {
        misc::apply_patch_file(rom, data_dir, &applier, MiscPatch::StereoDefault)?;
    }
    if patch_data.disable_music {
        misc::apply_patch_file(rom, data_dir, &applier, MiscPatch::DisableMusic)?;
    }
    if patch_data.disable_sound_effects {
        misc::apply_patch_file(rom, data_dir, &applier, MiscPatch::DisableSoundEffects)?;
    }
    if let Some(limit) = patch_data.missile_limit {
        misc::change_missile_limit(rom, limit)?;
    }
    if patch_data.power_bombs_without_bombs {
        misc::apply_patch_file(rom, data_dir, &applier, MiscPatch::PowerBombsWithoutBombs)?;
    }
    if patch_data.unexplored_map {
        misc::apply_patch_file(rom, data_dir, &applier, MiscPatch::UnexploredMap)?;
    }
    if patch_data.anti_softlock_room_edits {
        misc::apply_patch_file(rom, data_dir, &applier, MiscPatch::AntiSoftlock)?;
    }

    status("Writing seed hash...");
    text::write_seed_hash(rom, &gd, &patch_data.seed_hash)?;

    if patch_data.door_locks.is_some() || patch_data.hide_doors_on_minimap {
        door_locks::remove_door_palette_on_minimap(rom, &gd)?;
    }

    if let Some(edits) = &patch_data.level_edits {
        status("Applying level edits...");
        level_edits::apply_level_edits(rom, &gd, edits)?;
    }

    if let Some(edits) = &patch_data.minimap_edits {
        status("Applying minimap edits...");
        minimap::apply_minimap_edits(rom, &gd, edits)?;
    }

    Ok(())
}
