//! Scalar conversions from the all-strings wire format.
//!
//! Every conversion is total on absent input: `Null` and the empty string
//! yield `None`, never an error. Numeric casts keep the provider's loose
//! semantics, reading the leading numeric prefix of a string and falling
//! back to zero when there is none (`"abc"` converts to `0`); rejecting
//! such strings would change which payloads decode, so the quirk stays.
//! Date parsing is the one conversion that can fail.

use crate::{Error, Value};
use rust_decimal::Decimal;
use std::str::FromStr;
use time::format_description::well_known::Rfc3339;
use time::format_description::FormatItem;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};

/// The provider date/time profile, tried before any fallback
const DATETIME_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

const DATE_FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// Convert to an integer, loose-cast style
#[must_use]
pub fn to_int(value: &Value) -> Option<i64> {
    if value.is_blank() {
        return None;
    }
    match value {
        Value::Int(n) => Some(*n),
        Value::Float(f) => Some(*f as i64),
        // only `true` gets past the blank check
        Value::Bool(..) => Some(1),
        Value::String(s) => Some(i64::from_str(numeric_prefix(s, false)).unwrap_or(0)),
        Value::Null | Value::List(..) => None,
    }
}

/// Convert to a decimal amount, loose-cast style
#[must_use]
pub fn to_decimal(value: &Value) -> Option<Decimal> {
    if value.is_blank() {
        return None;
    }
    match value {
        Value::Int(n) => Some(Decimal::from(*n)),
        Value::Float(f) => Some(Decimal::from_f64_retain(*f).unwrap_or(Decimal::ZERO)),
        Value::Bool(..) => Some(Decimal::ONE),
        Value::String(s) => {
            Some(Decimal::from_str(numeric_prefix(s, true)).unwrap_or(Decimal::ZERO))
        }
        Value::Null | Value::List(..) => None,
    }
}

/// Convert to a boolean.
///
/// Truthy spellings are `1`, `y`, `yes`, `t` and `true`; falsy spellings
/// are `0`, `n`, `no`, `f` and `false`, letters case-insensitive. Anything
/// else is ambiguous and yields `None`.
#[must_use]
pub fn to_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Int(1) => Some(true),
        Value::Int(0) => Some(false),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "y" | "yes" | "t" | "true" => Some(true),
            "0" | "n" | "no" | "f" | "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Convert to a date/time.
///
/// The provider profile `YYYY-MM-DD HH:MM:SS` is tried first, then a bare
/// date (taken as midnight), then RFC 3339 (normalized to UTC).
///
/// # Errors
///
/// Returns an error when the value matches none of the accepted profiles
pub fn to_datetime(value: &Value) -> Result<Option<PrimitiveDateTime>, Error> {
    if value.is_blank() {
        return Ok(None);
    }
    let wire = value.as_wire();
    let text = wire.trim();
    if let Ok(parsed) = PrimitiveDateTime::parse(text, DATETIME_FORMAT) {
        return Ok(Some(parsed));
    }
    if let Ok(date) = Date::parse(text, DATE_FORMAT) {
        return Ok(Some(PrimitiveDateTime::new(date, Time::MIDNIGHT)));
    }
    if let Ok(stamped) = OffsetDateTime::parse(text, &Rfc3339) {
        let utc = stamped.to_offset(UtcOffset::UTC);
        return Ok(Some(PrimitiveDateTime::new(utc.date(), utc.time())));
    }
    Err(Error::InvalidDateTime(text.to_owned()))
}

/// Convert to an ordered tag list.
///
/// Strings are split on commas; an already-split list passes through.
/// Either way the elements are trimmed, empties are dropped and an empty
/// result collapses to `None`.
#[must_use]
pub fn to_tags(value: &Value) -> Option<Vec<String>> {
    let tags: Vec<String> = match value {
        Value::Null => return None,
        Value::List(list) => list
            .iter()
            .map(|tag| tag.trim())
            .filter(|tag| !tag.is_empty())
            .map(str::to_owned)
            .collect(),
        other => {
            let wire = other.as_wire();
            wire.split(',')
                .map(str::trim)
                .filter(|tag| !tag.is_empty())
                .map(str::to_owned)
                .collect()
        }
    };
    if tags.is_empty() {
        None
    } else {
        Some(tags)
    }
}

/// Convert to a plain string, blanks collapsing to `None`
#[must_use]
pub fn to_string(value: &Value) -> Option<String> {
    if value.is_blank() {
        return None;
    }
    Some(value.as_wire().into_owned())
}

/// The leading numeric prefix of `s`, after leading whitespace: an
/// optional sign, digits, and at most one fraction part when asked for.
fn numeric_prefix(s: &str, fraction: bool) -> &str {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let mut end = usize::from(matches!(bytes.first(), Some(&(b'+' | b'-'))));
    let mut seen_dot = false;
    while let Some(byte) = bytes.get(end).copied() {
        match byte {
            b'0'..=b'9' => end += 1,
            b'.' if fraction && !seen_dot => {
                seen_dot = true;
                end += 1;
            }
            _ => break,
        }
    }
    // a trailing dot is not part of the number
    if end > 0 && bytes[end - 1] == b'.' {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn absent_scalars_convert_to_none() {
        for value in [Value::Null, Value::from("")] {
            assert_eq!(to_int(&value), None);
            assert_eq!(to_decimal(&value), None);
            assert_eq!(to_bool(&value), None);
            assert_eq!(to_tags(&value), None);
            assert_eq!(to_string(&value), None);
            assert_eq!(to_datetime(&value).unwrap(), None);
        }
    }

    #[test]
    fn loose_numeric_casts() {
        assert_eq!(to_int(&"42".into()), Some(42));
        assert_eq!(to_int(&"-7".into()), Some(-7));
        assert_eq!(to_int(&"42abc".into()), Some(42));
        assert_eq!(to_int(&"abc".into()), Some(0));
        assert_eq!(to_int(&Value::Int(9)), Some(9));

        assert_eq!(to_decimal(&"99.99".into()), Some("99.99".parse().unwrap()));
        assert_eq!(to_decimal(&"7.5 EUR".into()), Some("7.5".parse().unwrap()));
        assert_eq!(to_decimal(&"7.".into()), Some(Decimal::from(7)));
        assert_eq!(to_decimal(&"abc".into()), Some(Decimal::ZERO));
        assert_eq!(to_decimal(&Value::Int(3)), Some(Decimal::from(3)));
    }

    #[test]
    fn boolean_table() {
        for truthy in ["1", "y", "yes", "YES", "t", "true", "TRUE", " True "] {
            assert_eq!(to_bool(&truthy.into()), Some(true), "{truthy}");
        }
        for falsy in ["0", "n", "no", "NO", "f", "false", "FALSE", " False "] {
            assert_eq!(to_bool(&falsy.into()), Some(false), "{falsy}");
        }
        assert_eq!(to_bool(&Value::Int(1)), Some(true));
        assert_eq!(to_bool(&Value::Int(0)), Some(false));
        assert_eq!(to_bool(&Value::Bool(true)), Some(true));
        assert_eq!(to_bool(&"maybe".into()), None);
        assert_eq!(to_bool(&Value::Int(2)), None);
    }

    #[test]
    fn tags_are_trimmed_and_filtered() {
        assert_eq!(
            to_tags(&" a, b ,,c ".into()),
            Some(vec!["a".to_owned(), "b".to_owned(), "c".to_owned()])
        );
        assert_eq!(to_tags(&",,".into()), None);
        let presplit = Value::List(vec![" vip ".to_owned(), String::new(), "premium".to_owned()]);
        assert_eq!(
            to_tags(&presplit),
            Some(vec!["vip".to_owned(), "premium".to_owned()])
        );
    }

    #[test]
    fn date_profiles() {
        assert_eq!(
            to_datetime(&"2023-01-15 12:34:56".into()).unwrap(),
            Some(datetime!(2023-01-15 12:34:56))
        );
        assert_eq!(
            to_datetime(&"2023-01-15".into()).unwrap(),
            Some(datetime!(2023-01-15 00:00:00))
        );
        assert_eq!(
            to_datetime(&"2023-01-15T12:34:56+02:00".into()).unwrap(),
            Some(datetime!(2023-01-15 10:34:56))
        );
        assert!(matches!(
            to_datetime(&"15th of January".into()),
            Err(Error::InvalidDateTime(..))
        ));
    }
}
