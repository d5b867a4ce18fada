//! Hatch lock randomisation.
//!
//! Every room has six hatch slots. Hatches drawn with a cover take slots
//! counting up from 0 and uncovered hatches take slots counting down from 5,
//! in door table order. Changing which hatches have covers renumbers the
//! slots, so the per-room hatch flags in the event table are remapped to
//! follow their hatches.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap, HashSet};

use log::{debug, info};
use serde::Deserialize;

use crate::address::{Field, GameData, PaletteGroup};
use crate::palettes::Palette;
use crate::rom::Rom;
use crate::room::{BlockLayer, LayerKind, RoomEntry};
use crate::{PatcherError, Result};

pub const AREA_COUNT: u8 = 7;
pub const MAX_DOORS_PER_AREA: usize = 256;
pub const DOOR_ENTRY_SIZE: usize = 0xC;

const HATCH_SLOT_COUNT: u8 = 6;
const HATCH_FLAGS_MASK: u8 = (1 << HATCH_SLOT_COUNT) - 1;
const HATCH_HEIGHT: usize = 4;
const BG1_ROW_STRIDE: u16 = 0x10;
const DELETED_ROOM: u8 = 0xFF;
const LOCKABLE_HATCH: u8 = 4;
const HATCH_EVENT_SIZE: usize = 4;

/// Doors that keep their lock no matter what.
const EXCLUDED_DOORS: [(u8, u8); 1] = [
    (0, 0xB4), // restricted lab escape
];

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Deserialize)]
pub enum HatchLock {
    Open,
    Level0,
    Level1,
    Level2,
    Level3,
    Level4,
    Locked,
}

impl HatchLock {
    pub const ALL: [HatchLock; 7] = [
        HatchLock::Open,
        HatchLock::Level0,
        HatchLock::Level1,
        HatchLock::Level2,
        HatchLock::Level3,
        HatchLock::Level4,
        HatchLock::Locked,
    ];

    /// BG1 block for the top of a left-facing hatch.
    pub const fn bg1_value(self) -> u16 {
        match self {
            HatchLock::Open => 0x4,
            HatchLock::Level0 => 0x6,
            HatchLock::Level1 => 0x8,
            HatchLock::Level2 => 0xA,
            HatchLock::Level3 => 0xC,
            HatchLock::Level4 => 0xE,
            HatchLock::Locked => 0x819A,
        }
    }

    /// Clip values indexed by hatch slot.
    pub const fn clip_values(self) -> [u16; 6] {
        match self {
            HatchLock::Open => [0x00; 6],
            HatchLock::Level0 => [0x30, 0x31, 0x32, 0x33, 0x34, 0x35],
            HatchLock::Level1 => [0x36, 0x37, 0x38, 0x39, 0x3A, 0x3B],
            HatchLock::Level2 => [0x40, 0x41, 0x42, 0x43, 0x44, 0x45],
            HatchLock::Level3 => [0x46, 0x47, 0x48, 0x49, 0x4A, 0x4B],
            HatchLock::Level4 => [0x3C, 0x3D, 0x3E, 0x4C, 0x4D, 0x4E],
            HatchLock::Locked => [0x10; 6],
        }
    }

    pub fn clip_value(self, slot: u8) -> u16 {
        self.clip_values()[slot as usize % HATCH_SLOT_COUNT as usize]
    }

    /// The covered lock drawn with this clip value. Uncovered hatches
    /// (clip 0) have no recoverable lock.
    pub fn from_clip_value(value: u16) -> Option<Self> {
        if value == 0 {
            return None;
        }
        Self::ALL
            .into_iter()
            .find(|lock| lock.clip_values().contains(&value))
    }

    pub fn is_capped(self) -> bool {
        self != HatchLock::Open
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct DoorLock {
    pub area: u8,
    pub door: u8,
    pub lock_type: HatchLock,
}

/// Slot counters for one room.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct HatchSlots {
    capped: u8,
    capless: u8,
    assigned: u8,
}

impl Default for HatchSlots {
    fn default() -> Self {
        Self::new()
    }
}

impl HatchSlots {
    pub const fn new() -> Self {
        Self {
            capped: 0,
            capless: HATCH_SLOT_COUNT - 1,
            assigned: 0,
        }
    }

    /// Takes the next slot for a covered or uncovered hatch.
    pub fn assign(&mut self, capped: bool) -> Result<u8> {
        if self.assigned >= HATCH_SLOT_COUNT {
            return Err(PatcherError::CapacityExceeded {
                what: "room hatch slots",
                capacity: HATCH_SLOT_COUNT as usize,
            });
        }
        let slot = if capped {
            self.capped += 1;
            self.capped - 1
        } else {
            // The last free slot may be 0; the counter is never read again.
            let slot = self.capless;
            self.capless = slot.saturating_sub(1);
            slot
        };
        self.assigned += 1;
        Ok(slot)
    }
}

/// Moves each remapped slot's flag to its new position. Flags at positions
/// no remapping writes to keep their original value.
pub fn remap_hatch_flags(flags: u8, changes: &BTreeMap<u8, u8>) -> u8 {
    let mut moved = 0;
    let mut remain = HATCH_FLAGS_MASK;
    for (&prev_slot, &new_slot) in changes {
        if flags & (1 << prev_slot) != 0 {
            moved |= 1 << new_slot;
        }
        remain &= !(1 << new_slot);
    }
    moved | (flags & remain)
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct DoorEntry {
    pub addr: usize,
    pub door_type: u8,
    pub room: u8,
    pub x: u8,
    pub y: u8,
    pub x_exit: u8,
}

impl DoorEntry {
    pub(crate) fn read(rom: &Rom, addr: usize) -> Result<Self> {
        Ok(Self {
            addr,
            door_type: rom.read_u8(addr)?,
            room: rom.read_u8(addr + 1)?,
            x: rom.read_u8(addr + 2)?,
            y: rom.read_u8(addr + 4)?,
            x_exit: rom.read_u8(addr + 7)?,
        })
    }

    pub(crate) fn is_deleted(&self) -> bool {
        self.room == DELETED_ROOM
    }

    fn is_lockable_hatch(&self) -> bool {
        self.door_type & 0xF == LOCKABLE_HATCH
    }

    fn facing_right(&self) -> bool {
        self.x_exit < 0x80
    }

    /// Column holding the hatch graphic, next to the door's transition block.
    fn hatch_x(&self) -> Result<usize> {
        let x = self.x as usize;
        if self.facing_right() {
            Ok(x + 1)
        } else {
            x.checked_sub(1).ok_or_else(|| {
                PatcherError::Invariant(format!(
                    "door at {:#X} faces left from column 0",
                    self.addr
                ))
            })
        }
    }
}

/// Calls `f` for every door in table order until an area's terminator.
pub(crate) fn for_each_door(
    rom: &Rom,
    gd: &GameData,
    mut f: impl FnMut(u8, u8, DoorEntry) -> Result<()>,
) -> Result<()> {
    let doors_ptrs = gd.get(Field::AreaDoorsPtrs)?;
    for area in 0..AREA_COUNT {
        let area_addr = rom.read_ptr(doors_ptrs + area as usize * 4)?;
        for door in 0..MAX_DOORS_PER_AREA {
            let entry = DoorEntry::read(rom, area_addr + door * DOOR_ENTRY_SIZE)?;
            if entry.door_type == 0 {
                break;
            }
            f(area, door as u8, entry)?;
        }
    }
    Ok(())
}

struct RoomHatches {
    bg1: BlockLayer,
    clip: BlockLayer,
    orig: HatchSlots,
    new: HatchSlots,
    changes: BTreeMap<u8, u8>,
    new_slots: Vec<u8>,
    dirty: bool,
}

impl RoomHatches {
    fn load(rom: &Rom, gd: &GameData, area: u8, room: u8) -> Result<Self> {
        let entry = RoomEntry::new(rom, gd, area, room)?;
        Ok(Self {
            bg1: entry.load_layer(rom, LayerKind::Bg1)?,
            clip: entry.load_layer(rom, LayerKind::Clip)?,
            orig: HatchSlots::new(),
            new: HatchSlots::new(),
            changes: BTreeMap::new(),
            new_slots: Vec::new(),
            dirty: false,
        })
    }

    fn process(&mut self, door: &DoorEntry, lock: Option<HatchLock>) -> Result<()> {
        let facing_right = door.facing_right();
        let hatch_x = door.hatch_x()?;
        let hatch_y = door.y as usize;

        let orig_clip = self.clip.get(hatch_x, hatch_y)?;
        let orig_capped = orig_clip != 0;
        let orig_slot = self.orig.assign(orig_capped)?;

        let new_capped = match lock {
            Some(lock) => lock.is_capped(),
            None => orig_capped,
        };
        let new_slot = self.new.assign(new_capped)?;
        self.new_slots.push(new_slot);
        if new_slot != orig_slot {
            self.changes.insert(orig_slot, new_slot);
        }

        let Some(lock) = lock.or_else(|| HatchLock::from_clip_value(orig_clip)) else {
            return Ok(());
        };

        let mut bg1_value = lock.bg1_value();
        if facing_right {
            bg1_value += 1;
        }
        let clip_value = lock.clip_value(new_slot);
        for row in 0..HATCH_HEIGHT {
            self.bg1.set(hatch_x, hatch_y + row, bg1_value)?;
            self.clip.set(hatch_x, hatch_y + row, clip_value)?;
            bg1_value = bg1_value.wrapping_add(BG1_ROW_STRIDE);
        }
        self.dirty = true;
        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct DoorLockReport {
    /// Original slot to new slot, per (area, room), for slots that moved.
    pub slot_changes: BTreeMap<(u8, u8), BTreeMap<u8, u8>>,
    /// New slots in door table order, per (area, room).
    pub new_slots: BTreeMap<(u8, u8), Vec<u8>>,
    pub rooms_written: usize,
}

fn index_locks(locks: &[DoorLock]) -> Result<HashMap<(u8, u8), HatchLock>> {
    let mut by_door = HashMap::with_capacity(locks.len());
    for lock in locks {
        if by_door
            .insert((lock.area, lock.door), lock.lock_type)
            .is_some()
        {
            return Err(PatcherError::Config(format!(
                "area {} door {:#X} has more than one lock",
                lock.area, lock.door
            )));
        }
    }
    Ok(by_door)
}

/// Applies hatch locks. Doors without an entry keep their current lock,
/// although their slot may still move.
pub fn set_door_locks(rom: &mut Rom, gd: &GameData, locks: &[DoorLock]) -> Result<DoorLockReport> {
    let overrides = index_locks(locks)?;
    let mut used = HashSet::new();
    let mut rooms: BTreeMap<(u8, u8), RoomHatches> = BTreeMap::new();

    let image: &Rom = rom;
    for_each_door(image, gd, |area, door, entry| {
        if entry.is_deleted() {
            return Ok(());
        }
        let lock = overrides.get(&(area, door)).copied();
        if EXCLUDED_DOORS.contains(&(area, door)) || !entry.is_lockable_hatch() {
            if lock.is_some() {
                return Err(PatcherError::Config(format!(
                    "area {} door {:#X} cannot have its lock changed",
                    area, door
                )));
            }
            return Ok(());
        }
        if lock.is_some() {
            used.insert((area, door));
        }

        let key = (area, entry.room);
        let hatches = match rooms.entry(key) {
            Entry::Occupied(slot) => slot.into_mut(),
            Entry::Vacant(slot) => {
                slot.insert(RoomHatches::load(image, gd, area, entry.room)?)
            }
        };
        hatches.process(&entry, lock)
    })?;

    if let Some((area, door)) = overrides.keys().find(|key| !used.contains(*key)) {
        return Err(PatcherError::Config(format!(
            "area {} door {:#X} is not a lockable hatch",
            area, door
        )));
    }

    let mut report = DoorLockReport::default();
    for (key, mut hatches) in rooms {
        if hatches.dirty {
            hatches.bg1.commit(rom)?;
            hatches.clip.commit(rom)?;
            report.rooms_written += 1;
        }
        if !hatches.changes.is_empty() {
            debug!("Area {} room {:#X} hatch slots moved: {:?}", key.0, key.1, hatches.changes);
            report.slot_changes.insert(key, hatches.changes);
        }
        report.new_slots.insert(key, hatches.new_slots);
    }

    fix_hatch_lock_events(rom, gd, &report.slot_changes)?;
    info!(
        "Applied {} door locks across {} rooms",
        locks.len(),
        report.rooms_written
    );
    Ok(report)
}

/// Rewrites the hatch flags of every hatch lock event whose room had
/// slots renumbered.
pub fn fix_hatch_lock_events(
    rom: &mut Rom,
    gd: &GameData,
    slot_changes: &BTreeMap<(u8, u8), BTreeMap<u8, u8>>,
) -> Result<()> {
    let base = gd.get(Field::HatchLockEvents)?;
    let count = gd.get(Field::HatchLockEventCount)?;
    for i in 0..count {
        let addr = base + i * HATCH_EVENT_SIZE;
        let area = rom.read_u8(addr + 1)?;
        // Rooms are stored one-based.
        let Some(room) = rom.read_u8(addr + 2)?.checked_sub(1) else {
            continue;
        };
        let Some(changes) = slot_changes.get(&(area, room)) else {
            continue;
        };
        let flags = rom.read_u8(addr + 3)?;
        rom.write_u8(addr + 3, remap_hatch_flags(flags, changes))?;
    }
    Ok(())
}

/// Paints the door colours of the minimap palettes with the wall colour so
/// lock colours are not given away.
pub fn remove_door_palette_on_minimap(rom: &mut Rom, gd: &GameData) -> Result<()> {
    for (addr, rows) in gd.palettes(PaletteGroup::MinimapDoors)? {
        let mut palette = Palette::read(rom, addr, rows)?;
        let wall = palette.color(2);
        for index in 8..16 {
            palette.set_color(index, wall);
        }
        let background = palette.color(1);
        palette.set_color(10, background);
        palette.write(rom, addr)?;
    }
    Ok(())
}
