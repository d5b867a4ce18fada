//! Fixed addresses inside the block that the bundled assembly patches set
//! aside for patcher-written values.

pub(crate) const MINOR_LOCS_TABLE: usize = 0x7F_F000;
pub(crate) const MAJOR_LOCS: usize = 0x7F_F01C;
pub(crate) const TANK_INC: usize = 0x7F_F046;
pub(crate) const TOTAL_METROID_COUNT: usize = 0x7F_F04C;
pub(crate) const REQUIRED_METROID_COUNT: usize = 0x7F_F04D;
pub(crate) const STARTING_LOCATION: usize = 0x7F_F04E;
pub(crate) const HINT_SECURITY_LEVELS: usize = 0x7F_F059;
pub(crate) const MISSILE_LIMIT: usize = 0x7F_F06A;
pub(crate) const MINOR_LOCS_ARRAY: usize = 0x7F_F06C;

/// Region the navigation and ship text is written into.
pub(crate) const HINT_TEXT_START: usize = 0x7F_0000;
pub(crate) const HINT_TEXT_END: usize = 0x7F_F000;
