use crate::limits::*;

use super::EngineError;

/// Trimmed, non-empty, at most `max` characters.
pub(super) fn required_text(field: &'static str, value: &str, max: usize) -> Result<(), EngineError> {
    if value.trim().is_empty() {
        return Err(EngineError::validation(field, "is required"));
    }
    max_chars(field, value, max)
}

/// May be empty, at most `max` characters.
pub(super) fn optional_text(field: &'static str, value: &str, max: usize) -> Result<(), EngineError> {
    max_chars(field, value, max)
}

fn max_chars(field: &'static str, value: &str, max: usize) -> Result<(), EngineError> {
    let len = value.chars().count();
    if len > max {
        return Err(EngineError::validation(
            field,
            format!("must be at most {max} characters, got {len}"),
        ));
    }
    Ok(())
}

pub(super) fn population(value: i64) -> Result<(), EngineError> {
    if value < 0 {
        return Err(EngineError::validation("population", "must not be negative"));
    }
    Ok(())
}

pub(super) fn capacity(value: i64) -> Result<(), EngineError> {
    if !(0..=MAX_GARAGE_CAPACITY).contains(&value) {
        return Err(EngineError::validation(
            "capacity",
            format!("must be between 0 and {MAX_GARAGE_CAPACITY}"),
        ));
    }
    Ok(())
}

pub(super) fn city_name(value: &str) -> Result<(), EngineError> {
    required_text("name", value, MAX_CITY_NAME_LEN)
}

pub(super) fn hotel_name(value: &str) -> Result<(), EngineError> {
    required_text("name", value, MAX_HOTEL_NAME_LEN)
}

pub(super) fn garage_name(value: &str) -> Result<(), EngineError> {
    required_text("name", value, MAX_GARAGE_NAME_LEN)
}

pub(super) fn brand(value: &str) -> Result<(), EngineError> {
    required_text("brand", value, MAX_BRAND_LEN)
}

pub(super) fn license_plate(value: &str) -> Result<(), EngineError> {
    required_text("license_plate", value, MAX_LICENSE_PLATE_LEN)
}

pub(super) fn owner_name(value: &str) -> Result<(), EngineError> {
    optional_text("owner_name", value, MAX_OWNER_NAME_LEN)
}
