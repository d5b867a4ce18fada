//! Palette storage and seeded hue randomization.

use std::collections::{BTreeMap, HashSet};

use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;

use crate::address::{Field, GameData, PaletteGroup};
use crate::color::{ColorSpace, PaletteMath, Rgb};
use crate::rom::Rom;
use crate::room::Tileset;
use crate::{PatcherError, Result};

pub const COLORS_PER_ROW: usize = 16;
const TILESET_PALETTE_ROWS: usize = 13;
const ANIM_PALETTE_ENTRY_SIZE: usize = 8;
const FIRST_ENEMY_SPRITE: usize = 0x10;
/// Sprites whose palettes are one row despite their VRAM size.
const SINGLE_ROW_SPRITES: [usize; 2] = [0x4D, 0xBE];
const MAX_SEED: u32 = i32::MAX as u32;

/// A run of 15-bit colours, sixteen per row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    colors: Vec<u16>,
}

impl Palette {
    pub fn read(rom: &Rom, addr: usize, rows: usize) -> Result<Self> {
        if rows == 0 {
            return Err(PatcherError::Invariant(format!(
                "palette at {:#X} has no rows",
                addr
            )));
        }
        let colors = rom
            .read_bytes(addr, rows * COLORS_PER_ROW * 2)?
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Ok(Self { colors })
    }

    pub fn rows(&self) -> usize {
        self.colors.len() / COLORS_PER_ROW
    }

    pub fn color(&self, index: usize) -> u16 {
        self.colors[index]
    }

    pub fn set_color(&mut self, index: usize, value: u16) {
        self.colors[index] = value;
    }

    pub fn write(&self, rom: &mut Rom, addr: usize) -> Result<()> {
        let bytes: Vec<u8> = self.colors.iter().flat_map(|c| c.to_le_bytes()).collect();
        rom.write_bytes(addr, &bytes)
    }

    /// Applies `change` to every colour outside `excluded_rows`.
    pub fn apply(&mut self, change: &ColorChange, math: &dyn PaletteMath, excluded_rows: &[usize]) {
        for (row, colors) in self.colors.chunks_mut(COLORS_PER_ROW).enumerate() {
            if excluded_rows.contains(&row) {
                continue;
            }
            for (i, color) in colors.iter_mut().enumerate() {
                let rgb = Rgb::from_rgb15(*color);
                let adjusted = math.adjust(rgb, change.hue_shift_at(i), change.lightness_at(i));
                *color = adjusted.to_rgb15();
            }
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum VariationType {
    Add,
    Multiply,
}

/// A linear ramp of sixteen values, one per palette column.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PaletteVariation {
    start: f64,
    step: f64,
}

impl PaletteVariation {
    pub fn new(start: f64, step: f64) -> Self {
        Self { start, step }
    }

    pub fn at(&self, index: usize) -> f64 {
        self.start + index as f64 * self.step
    }

    /// Picks a ramp spanning between a quarter of `max_range` and all of it,
    /// either rising or falling.
    pub fn generate<R: Rng>(rng: &mut R, max_range: f64, kind: VariationType) -> Self {
        let range = rng.gen_range(max_range / 4.0..=max_range);
        let mut start = match kind {
            VariationType::Add => rng.gen_range(-range..=0.0),
            VariationType::Multiply => rng.gen_range(1.0 - range..=1.0),
        };
        let mut step = range / COLORS_PER_ROW as f64;
        if rng.gen_bool(0.5) {
            start += 15.0 * step;
            step = -step;
        }
        Self { start, step }
    }
}

/// One hue rotation, optionally varied per column, shared by a group of
/// palettes.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ColorChange {
    pub hue_shift: f64,
    pub hue_var: Option<PaletteVariation>,
    pub lightness_var: Option<PaletteVariation>,
}

impl ColorChange {
    pub fn hue_shift_at(&self, index: usize) -> f64 {
        self.hue_shift + self.hue_var.map_or(0.0, |v| v.at(index))
    }

    pub fn lightness_at(&self, index: usize) -> f64 {
        self.lightness_var.map_or(1.0, |v| v.at(index))
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Deserialize)]
pub enum PaletteKind {
    Tilesets,
    Enemies,
    Samus,
    Beams,
}

#[derive(Copy, Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct HueRange {
    pub hue_min: Option<u16>,
    pub hue_max: Option<u16>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct PaletteSettings {
    pub seed: Option<u32>,
    pub randomize: BTreeMap<PaletteKind, HueRange>,
    #[serde(default)]
    pub color_space: ColorSpace,
    #[serde(default = "default_symmetric")]
    pub symmetric: bool,
}

fn default_symmetric() -> bool {
    true
}

impl PaletteSettings {
    pub fn validate(&self) -> Result<()> {
        if let Some(seed) = self.seed {
            if seed > MAX_SEED {
                return Err(PatcherError::Config(format!(
                    "palette seed {} is larger than {}",
                    seed, MAX_SEED
                )));
            }
        }
        for (kind, range) in &self.randomize {
            for hue in [range.hue_min, range.hue_max].into_iter().flatten() {
                if hue > 360 {
                    return Err(PatcherError::Config(format!(
                        "{:?} hue {} is outside 0..=360",
                        kind, hue
                    )));
                }
            }
            if let (Some(min), Some(max)) = (range.hue_min, range.hue_max) {
                if min > max {
                    return Err(PatcherError::Config(format!(
                        "{:?} HueMin {} is greater than HueMax {}",
                        kind, min, max
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Fills in missing range bounds at random.
fn resolve_hue_range<R: Rng>(rng: &mut R, kind: PaletteKind, range: HueRange) -> Result<(u16, u16)> {
    let (min, max) = match (range.hue_min, range.hue_max) {
        (Some(min), Some(max)) => (min, max),
        (None, Some(max)) => (rng.gen_range(0..=max), max),
        (Some(min), None) => (min, rng.gen_range(min..=360)),
        (None, None) => {
            let min = rng.gen_range(0..=360);
            (min, rng.gen_range(min..=360))
        }
    };
    if min > max {
        return Err(PatcherError::Config(format!(
            "{:?} HueMin {} is greater than HueMax {}",
            kind, min, max
        )));
    }
    Ok((min, max))
}

pub struct PaletteRandomizer {
    rng: StdRng,
    seed: u32,
    ranges: BTreeMap<PaletteKind, (u16, u16)>,
    math: &'static dyn PaletteMath,
    symmetric: bool,
    randomized: HashSet<usize>,
}

impl PaletteRandomizer {
    pub fn new(settings: &PaletteSettings) -> Result<Self> {
        settings.validate()?;
        let seed = settings
            .seed
            .unwrap_or_else(|| rand::thread_rng().gen_range(0..=MAX_SEED));
        let mut rng = StdRng::seed_from_u64(seed as u64);

        let mut ranges = BTreeMap::new();
        for (&kind, &range) in &settings.randomize {
            ranges.insert(kind, resolve_hue_range(&mut rng, kind, range)?);
        }

        Ok(Self {
            rng,
            seed,
            ranges,
            math: settings.color_space.math(),
            symmetric: settings.symmetric,
            randomized: HashSet::new(),
        })
    }

    pub fn seed(&self) -> u32 {
        self.seed
    }

    /// Rotates a random hue within `range`, with columns varying by up to
    /// half the range and lightness by up to a fifth.
    pub fn generate_change(&mut self, (min, max): (u16, u16)) -> ColorChange {
        let mut hue_shift = self.rng.gen_range(min..=max) as f64;
        if self.symmetric && self.rng.gen_bool(0.5) {
            hue_shift = 360.0 - hue_shift;
        }
        let var_range = (max - min) as f64 / 2.0;
        let hue_var = PaletteVariation::generate(&mut self.rng, var_range, VariationType::Add);
        let lightness_var = PaletteVariation::generate(&mut self.rng, 0.2, VariationType::Multiply);
        ColorChange {
            hue_shift,
            hue_var: Some(hue_var),
            lightness_var: Some(lightness_var),
        }
    }

    pub fn randomize(&mut self, rom: &mut Rom, gd: &GameData) -> Result<()> {
        info!("Randomizing palettes with seed {}", self.seed);
        let ranges = self.ranges.clone();
        for (kind, range) in ranges {
            match kind {
                PaletteKind::Tilesets => self.randomize_tilesets(rom, gd, range)?,
                PaletteKind::Enemies => self.randomize_enemies(rom, gd, range)?,
                PaletteKind::Samus => {
                    let change = self.generate_change(range);
                    for group in [PaletteGroup::Samus, PaletteGroup::HelmetCursor, PaletteGroup::SaX] {
                        self.change_blocks(rom, &gd.palettes(group)?, &change)?;
                    }
                }
                PaletteKind::Beams => {
                    let change = self.generate_change(range);
                    self.change_blocks(rom, &gd.palettes(PaletteGroup::Beams)?, &change)?;
                }
            }
        }
        Ok(())
    }

    /// Rewrites one palette unless an earlier step already did.
    fn change_palette(
        &mut self,
        rom: &mut Rom,
        addr: usize,
        rows: usize,
        change: &ColorChange,
    ) -> Result<bool> {
        if !self.randomized.insert(addr) {
            return Ok(false);
        }
        let mut palette = Palette::read(rom, addr, rows)?;
        palette.apply(change, self.math, &[]);
        palette.write(rom, addr)?;
        Ok(true)
    }

    fn change_blocks(&mut self, rom: &mut Rom, blocks: &[(usize, usize)], change: &ColorChange) -> Result<()> {
        for &(addr, rows) in blocks {
            self.change_palette(rom, addr, rows, change)?;
        }
        Ok(())
    }

    fn randomize_tilesets(&mut self, rom: &mut Rom, gd: &GameData, range: (u16, u16)) -> Result<()> {
        let mut count = 0;
        for id in 0..gd.get(Field::TilesetCount)? {
            let tileset = Tileset::new(gd, id as u8)?;
            let addr = rom.read_ptr(tileset.palette_pointer())?;
            if self.randomized.contains(&addr) {
                continue;
            }
            let change = self.generate_change(range);
            if self.change_palette(rom, addr, TILESET_PALETTE_ROWS, &change)? {
                count += 1;
            }
        }

        let entries = gd.get(Field::AnimPaletteEntries)?;
        for id in 0..gd.get(Field::AnimPaletteCount)? {
            let entry = entries + id * ANIM_PALETTE_ENTRY_SIZE;
            let rows = rom.read_u8(entry + 2)? as usize;
            let addr = rom.read_ptr(entry + 4)?;
            if rows == 0 || self.randomized.contains(&addr) {
                continue;
            }
            let change = self.generate_change(range);
            if self.change_palette(rom, addr, rows, &change)? {
                count += 1;
            }
        }
        debug!("Changed {} tileset palettes", count);
        Ok(())
    }

    fn randomize_enemies(&mut self, rom: &mut Rom, gd: &GameData, range: (u16, u16)) -> Result<()> {
        let palette_ptrs = gd.get(Field::SpritePalettePtrs)?;
        let vram_sizes = gd.get(Field::SpriteVramSizes)?;
        for sprite in FIRST_ENEMY_SPRITE..gd.get(Field::SpriteCount)? {
            let gfx = sprite - FIRST_ENEMY_SPRITE;
            let addr = rom.read_ptr(palette_ptrs + gfx * 4)?;
            if self.randomized.contains(&addr) {
                continue;
            }
            let rows = if SINGLE_ROW_SPRITES.contains(&sprite) {
                1
            } else {
                rom.read_u32(vram_sizes + gfx * 4)? as usize / 0x800
            };
            if rows == 0 {
                debug!("Sprite {:#X} has no palette rows", sprite);
                continue;
            }
            let change = self.generate_change(range);
            self.change_palette(rom, addr, rows, &change)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::HsvMath;
    use crate::testutil::{Fixture, ANIM_PALETTES, SPRITE_PALETTE_PTRS, SPRITE_VRAM_SIZES, TILESET_ENTRIES};

    fn settings(json: &str) -> PaletteSettings {
        serde_json::from_str(json).unwrap()
    }

    fn fill(rom: &mut Rom, addr: usize, rows: usize, value: u16) {
        for i in 0..rows * COLORS_PER_ROW {
            rom.write_u16(addr + i * 2, value).unwrap();
        }
    }

    #[test]
    fn variation_spans_its_range() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let var = PaletteVariation::generate(&mut rng, 40.0, VariationType::Add);
            let (first, last) = (var.at(0), var.at(15));
            let span = (first - last).abs();
            assert!(span >= 10.0 * 15.0 / 16.0 - 1e-9 && span <= 40.0 * 15.0 / 16.0 + 1e-9);
            assert!(first.min(last) >= -40.0 - 1e-9);
            assert!(first.max(last) <= 40.0 * 15.0 / 16.0 + 1e-9);
        }
        let var = PaletteVariation::generate(&mut rng, 0.0, VariationType::Multiply);
        assert_eq!(var.at(0), 1.0);
        assert_eq!(var.at(15), 1.0);
    }

    #[test]
    fn excluded_rows_are_untouched() {
        let mut rom = crate::rom::blank_rom();
        fill(&mut rom, 0x1000, 2, 0x001F);
        let mut palette = Palette::read(&rom, 0x1000, 2).unwrap();
        let change = ColorChange {
            hue_shift: 120.0,
            hue_var: None,
            lightness_var: None,
        };
        palette.apply(&change, &HsvMath, &[1]);
        assert_eq!(palette.color(0), 16 << 5);
        assert_eq!(palette.color(16), 0x001F);
        palette.write(&mut rom, 0x1000).unwrap();
        assert_eq!(rom.read_u16(0x1000).unwrap(), 16 << 5);
    }

    #[test]
    fn empty_palettes_are_rejected() {
        let rom = crate::rom::blank_rom();
        assert!(Palette::read(&rom, 0x1000, 0).is_err());
    }

    #[test]
    fn hue_bounds_are_checked() {
        let bad = settings(r#"{"Randomize": {"Samus": {"HueMin": 200, "HueMax": 100}}}"#);
        assert!(matches!(PaletteRandomizer::new(&bad), Err(PatcherError::Config(_))));
        let bad = settings(r#"{"Randomize": {"Beams": {"HueMax": 400}}}"#);
        assert!(bad.validate().is_err());
        let bad = settings(r#"{"Seed": 4294967295, "Randomize": {}}"#);
        assert!(bad.validate().is_err());
    }

    #[test]
    fn missing_bounds_are_filled_in_order() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..100 {
            let (min, max) = resolve_hue_range(&mut rng, PaletteKind::Samus, HueRange::default()).unwrap();
            assert!(min <= max && max <= 360);
            let only_max = HueRange {
                hue_min: None,
                hue_max: Some(90),
            };
            let (min, max) = resolve_hue_range(&mut rng, PaletteKind::Samus, only_max).unwrap();
            assert!(min <= 90 && max == 90);
            let only_min = HueRange {
                hue_min: Some(300),
                hue_max: None,
            };
            let (min, max) = resolve_hue_range(&mut rng, PaletteKind::Samus, only_min).unwrap();
            assert!(min == 300 && max >= 300);
        }
    }

    #[test]
    fn defaults() {
        let s = settings(r#"{"Randomize": {"Tilesets": {}}}"#);
        assert_eq!(s.color_space, ColorSpace::Oklab);
        assert!(s.symmetric);
        assert!(s.seed.is_none());
    }

    fn palette_fixture() -> Fixture {
        let mut fx = Fixture::new();
        fx.table.set(Field::TilesetCount, 3);
        fx.table.set(Field::AnimPaletteCount, 1);
        fx.table.set(Field::SpriteCount, 0x12);
        // Tilesets 0 and 2 share a palette.
        let shared = fx.alloc(TILESET_PALETTE_ROWS * 32);
        let own = fx.alloc(TILESET_PALETTE_ROWS * 32);
        for (id, addr) in [(0, shared), (1, own), (2, shared)] {
            fx.rom.write_ptr(TILESET_ENTRIES + id * 0x14 + 4, addr).unwrap();
            fill(&mut fx.rom, addr, TILESET_PALETTE_ROWS, 0x0210);
        }
        let anim = fx.alloc(32);
        fill(&mut fx.rom, anim, 1, 0x0210);
        fx.rom.write_u8(ANIM_PALETTES + 2, 1).unwrap();
        fx.rom.write_ptr(ANIM_PALETTES + 4, anim).unwrap();
        for gfx in 0..2 {
            let addr = fx.alloc(64);
            fill(&mut fx.rom, addr, 2, 0x0210);
            fx.rom.write_ptr(SPRITE_PALETTE_PTRS + gfx * 4, addr).unwrap();
            fx.rom.write_u32(SPRITE_VRAM_SIZES + gfx * 4, 0x1000).unwrap();
        }
        fx
    }

    fn run(json: &str) -> (Fixture, u32) {
        let mut fx = palette_fixture();
        let mut randomizer = PaletteRandomizer::new(&settings(json)).unwrap();
        let gd = GameData::new(&fx.table, &fx.rom);
        randomizer.randomize(&mut fx.rom, &gd).unwrap();
        let changed = (0x20_0000..0x20_1000)
            .step_by(2)
            .filter(|&addr| fx.rom.read_u16(addr).unwrap() != 0x0210)
            .count() as u32;
        (fx, changed)
    }

    #[test]
    fn same_seed_same_output() {
        let json = r#"{"Seed": 1234, "Randomize": {"Tilesets": {"HueMin": 60, "HueMax": 300}, "Enemies": {}}}"#;
        let (a, changed) = run(json);
        let (b, _) = run(json);
        assert!(changed > 0);
        assert_eq!(a.rom.data(), b.rom.data());
    }

    #[test]
    fn shared_palettes_change_once() {
        let json = r#"{"Seed": 99, "Randomize": {"Tilesets": {"HueMin": 180, "HueMax": 180}}, "ColorSpace": "HSV", "Symmetric": false}"#;
        let (fx, _) = run(json);
        let shared = fx.rom.read_ptr(TILESET_ENTRIES + 4).unwrap();
        // Yellow rotated by 180 degrees once is blue; twice it would be
        // yellow again.
        let once = Rgb::from_rgb15(fx.rom.read_u16(shared).unwrap());
        assert!(once.b > once.r && once.b > once.g);
        // Enemy palettes were not requested.
        let enemy = fx.rom.read_ptr(SPRITE_PALETTE_PTRS).unwrap();
        assert_eq!(fx.rom.read_u16(enemy).unwrap(), 0x0210);
    }
}
