// Field length limits, in characters.
pub const MAX_CITY_NAME_LEN: usize = 100;
pub const MAX_HOTEL_NAME_LEN: usize = 150;
pub const MAX_GARAGE_NAME_LEN: usize = 100;
pub const MAX_BRAND_LEN: usize = 50;
pub const MAX_LICENSE_PLATE_LEN: usize = 20;
pub const MAX_OWNER_NAME_LEN: usize = 100;

/// Upper bound on a single garage's capacity.
pub const MAX_GARAGE_CAPACITY: i64 = 100_000;

/// Upper bound on rows per table.
pub const MAX_ROWS_PER_TABLE: usize = 1_000_000;

/// Longest SQL statement the front-end will parse.
pub const MAX_SQL_LEN: usize = 64 * 1024;
