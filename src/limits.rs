// Hard caps on input sizes. Requests exceeding them fail with `LimitExceeded`.

pub const MAX_ROOMS: usize = 10_000;
pub const MAX_CLIENTS: usize = 1_000_000;
pub const MAX_EMPLOYEES: usize = 10_000;

pub const MAX_NAME_LEN: usize = 64;
pub const MAX_PASSPORT_LEN: usize = 32;
pub const MAX_CITY_LEN: usize = 128;
pub const MAX_CONTACT_LEN: usize = 254;
pub const MAX_NOTES_LEN: usize = 4096;
pub const MAX_PHONE_NUMBER_LEN: usize = 16;
pub const MAX_DESCRIPTION_LEN: usize = 4096;

pub const MAX_FLOOR: u16 = 200;
pub const MAX_CAPACITY: u32 = 32;

/// 200 floors × 7 weekdays.
pub const MAX_SCHEDULE_SLOTS: usize = 1_400;

/// Longest accepted history / co-residency window, in days.
pub const MAX_QUERY_WINDOW_DAYS: i64 = 3_660;

pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const MAX_PAGE_SIZE: usize = 1_000;

/// Calendar years accepted for stay and employment dates and for reports.
pub const MIN_YEAR: i32 = 1900;
pub const MAX_YEAR: i32 = 9999;
