//! Tick Field Codes
//!
//! Numeric tick codes used by the platform, mapped to quote field names.
//! Codes outside these tables are not errors; callers drop them.

use crate::domain::quote::fields;

/// Price tick code → field name.
pub const PRICE_FIELDS: [(i32, &str); 6] = [
    (1, fields::BID),
    (2, fields::ASK),
    (4, fields::LAST),
    (6, fields::HIGH),
    (7, fields::LOW),
    (9, fields::CLOSE),
];

/// Option computation tick code → leg name.
pub const OPTION_FIELDS: [(i32, &str); 4] = [
    (10, fields::BID),
    (11, fields::ASK),
    (12, fields::LAST),
    (13, fields::MODEL),
];

/// Field name for a price tick code.
#[must_use]
pub fn price_field_name(code: i32) -> Option<&'static str> {
    lookup(&PRICE_FIELDS, code)
}

/// Leg name for an option computation tick code.
#[must_use]
pub fn option_field_name(code: i32) -> Option<&'static str> {
    lookup(&OPTION_FIELDS, code)
}

fn lookup(table: &[(i32, &'static str)], code: i32) -> Option<&'static str> {
    table
        .iter()
        .find_map(|&(c, name)| (c == code).then_some(name))
}
