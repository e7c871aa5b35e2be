#![forbid(unsafe_code)]

use time::Date;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

use crate::error::BoardError;

const DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// Parses a calendar date in `YYYY-MM-DD` form.
pub fn parse(input: &str) -> Result<Date, BoardError> {
    Date::parse(input.trim(), DATE_FORMAT).map_err(|_| BoardError::InvalidDate(input.to_owned()))
}

#[must_use]
pub fn format(date: Date) -> String {
    date.format(DATE_FORMAT)
        .unwrap_or_else(|_| date.to_string())
}

/// Serde adapter for `Option<Date>` fields stored as `YYYY-MM-DD`.
pub mod option {
    use serde::{Deserialize as _, Deserializer, Serializer};
    use time::Date;

    pub fn serialize<S: Serializer>(value: &Option<Date>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(date) => serializer.serialize_str(&super::format(*date)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Date>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        raw.filter(|s| !s.trim().is_empty())
            .map(|s| super::parse(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
