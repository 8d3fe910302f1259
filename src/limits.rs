/// Cadence occurrences offered ahead of today.
pub const CADENCE_LOOKAHEAD: usize = 8;

pub const MAX_ID_LEN: usize = 128;
pub const MAX_NAME_LEN: usize = 256;
pub const MAX_GAME_LABEL_LEN: usize = 120;

pub const MIN_PLAYER_COUNT: u32 = 1;
pub const MAX_PLAYER_COUNT: u32 = 16;

pub const MAX_SCHEDULE_EXCEPTIONS: usize = 4096;
pub const MAX_TABLES: usize = 1024;
pub const MAX_TERRAIN_BOXES: usize = 1024;
pub const MAX_GAME_SYSTEMS: usize = 1024;
