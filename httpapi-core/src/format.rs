//! Format options and naming helpers.

use std::fmt::Write as _;

use std::borrow::Cow;

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::ApiError;

/// Local date-time layout (`2010-10-10 08:30:00`), the default.
pub const LOCAL_DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// ISO 8601 layout with milliseconds and offset. Needs an offset-aware value.
pub const ISO8601_DATE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f%:z";

/// Options consumed by the key-value engine and by every textual rendering
/// of a simple value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FormatOptions {
    /// Rename object members with [`camel_case`] when serializing.
    pub use_camel_case: bool,
    /// Skip object members whose value is null.
    pub ignore_null_property: bool,
    /// chrono strftime layout used for date-time values.
    pub date_time_format: String,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            use_camel_case: false,
            ignore_null_property: false,
            date_time_format: LOCAL_DATE_TIME_FORMAT.to_string(),
        }
    }
}

impl FormatOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn use_camel_case(mut self, enabled: bool) -> Self {
        self.use_camel_case = enabled;
        self
    }

    pub fn ignore_null_property(mut self, enabled: bool) -> Self {
        self.ignore_null_property = enabled;
        self
    }

    /// Returns a copy using `format` for date-time values.
    ///
    /// Returns `self` unchanged (as a clone) when the format is empty or equal
    /// to the current one.
    pub fn with_date_time_format(&self, format: &str) -> Self {
        if format.is_empty() || self.date_time_format == format {
            return self.clone();
        }
        Self {
            date_time_format: format.to_string(),
            ..self.clone()
        }
    }

    /// Apply the camelCase rule to `name` if enabled.
    pub fn member_name(&self, name: &str) -> String {
        if self.use_camel_case {
            camel_case(name)
        } else {
            name.to_string()
        }
    }

    /// Render a date-time without offset.
    ///
    /// A layout that shows seconds but no fraction gains `%.f` when the
    /// value has sub-second digits.
    pub fn format_naive(&self, value: &NaiveDateTime) -> Result<String, ApiError> {
        let layout = naive_layout(&self.date_time_format, value.nanosecond() != 0);
        let mut out = String::new();
        write!(out, "{}", value.format(&layout)).map_err(|_| {
            ApiError::encode(format!(
                "invalid date-time format `{}` for a value without offset",
                self.date_time_format
            ))
        })?;
        Ok(out)
    }

    /// Render a date-time with offset.
    ///
    /// A layout without an offset specifier gains `%:z`, and the fraction
    /// rule of [`format_naive`](Self::format_naive) applies.
    pub fn format_offset(&self, value: &DateTime<FixedOffset>) -> Result<String, ApiError> {
        let layout = offset_layout(&self.date_time_format, value.nanosecond() != 0);
        let mut out = String::new();
        write!(out, "{}", value.format(&layout)).map_err(|_| {
            ApiError::encode(format!("invalid date-time format `{}`", self.date_time_format))
        })?;
        Ok(out)
    }

    /// Parse text rendered by [`format_naive`](Self::format_naive).
    pub fn parse_naive(&self, text: &str) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(text, &naive_layout(&self.date_time_format, true)).ok()
    }

    /// Parse text rendered by [`format_offset`](Self::format_offset).
    ///
    /// Text without an offset is read as UTC.
    pub fn parse_offset(&self, text: &str) -> Option<DateTime<FixedOffset>> {
        DateTime::parse_from_str(text, &offset_layout(&self.date_time_format, true))
            .ok()
            .or_else(|| {
                self.parse_naive(text)
                    .map(|naive| Utc.from_utc_datetime(&naive).fixed_offset())
            })
    }
}

fn has_seconds(layout: &str) -> bool {
    layout.contains("%S") || layout.contains("%T")
}

fn has_fraction(layout: &str) -> bool {
    ["f", "3f", "6f", "9f"]
        .iter()
        .any(|spec| layout.contains(&format!("%{}", spec)) || layout.contains(&format!("%.{}", spec)))
        || layout.contains("%+")
}

fn has_offset(layout: &str) -> bool {
    ["%z", "%:z", "%::z", "%#z", "%+"]
        .iter()
        .any(|spec| layout.contains(spec))
}

/// `%.f` reads nothing when the text has no fraction, so parsing always
/// asks for it.
fn naive_layout(layout: &str, fraction: bool) -> Cow<'_, str> {
    if fraction && has_seconds(layout) && !has_fraction(layout) {
        Cow::Owned(
            layout
                .replacen("%S", "%S%.f", 1)
                .replacen("%T", "%T%.f", 1),
        )
    } else {
        Cow::Borrowed(layout)
    }
}

fn offset_layout(layout: &str, fraction: bool) -> Cow<'_, str> {
    let adjusted = naive_layout(layout, fraction);
    if has_offset(&adjusted) {
        adjusted
    } else {
        Cow::Owned(format!("{}%:z", adjusted))
    }
}

/// Convert a member name to camelCase.
///
/// Names starting with a lowercase character are returned unchanged.
/// Otherwise leading uppercase characters are lowered up to, but not
/// including, the last capital before a non-capital, so acronyms stay
/// together: `ID` → `id`, `IDCard` → `idCard`, `UserName` → `userName`.
pub fn camel_case(name: &str) -> String {
    let mut chars: Vec<char> = name.chars().collect();
    match chars.first() {
        Some(first) if first.is_uppercase() => {}
        _ => return name.to_string(),
    }

    for i in 0..chars.len() {
        if i == 1 && !chars[i].is_uppercase() {
            break;
        }
        match chars.get(i + 1).copied() {
            Some(next) if i > 0 && !next.is_uppercase() => {
                if next.is_whitespace() {
                    chars[i] = lower(chars[i]);
                }
                break;
            }
            _ => {}
        }
        chars[i] = lower(chars[i]);
    }
    chars.into_iter().collect()
}

/// Convert a member name to an HTTP header name (`User_Agent` → `User-Agent`).
pub fn to_header_name(name: &str) -> String {
    name.replace('_', "-")
}

fn lower(c: char) -> char {
    let mut lowered = c.to_lowercase();
    match (lowered.next(), lowered.next()) {
        (Some(single), None) => single,
        _ => c,
    }
}
