//! Field validator: pure checks from a raw field to a typed value.
//!
//! Every validator returns `Ok(None)` for an explicit null. Schemas that do
//! not allow clearing a field use the `require_*` variants instead.

use crate::error::ValidationError;
use crate::record::{FieldKind, FieldValue, RecordField};
use chrono::{DateTime, Utc};

pub type Result<T> = std::result::Result<T, ValidationError>;

fn wrong_type(field: &RecordField, expected: FieldKind) -> ValidationError {
    ValidationError::WrongType {
        field: field.name.clone(),
        expected,
        found: field.value.kind(),
    }
}

fn null(field: &RecordField) -> ValidationError {
    ValidationError::Null {
        field: field.name.clone(),
    }
}

/// Text no longer than `max_len` characters.
pub fn validate_text(field: &RecordField, max_len: usize) -> Result<Option<String>> {
    let FieldValue::Text(value) = &field.value else {
        return Err(wrong_type(field, FieldKind::Text));
    };
    match value {
        None => Ok(None),
        Some(text) => {
            let len = text.chars().count();
            if len > max_len {
                return Err(ValidationError::TooLong {
                    field: field.name.clone(),
                    max: max_len,
                    len,
                });
            }
            Ok(Some(text.clone()))
        }
    }
}

pub fn require_text(field: &RecordField, max_len: usize) -> Result<String> {
    validate_text(field, max_len)?.ok_or_else(|| null(field))
}

pub fn validate_integer(field: &RecordField) -> Result<Option<i64>> {
    match &field.value {
        FieldValue::Integer(value) => Ok(*value),
        _ => Err(wrong_type(field, FieldKind::Integer)),
    }
}

/// Decimal in plain notation: optional sign, digits, optional fraction.
pub fn validate_decimal(field: &RecordField) -> Result<Option<String>> {
    let FieldValue::Decimal(value) = &field.value else {
        return Err(wrong_type(field, FieldKind::Decimal));
    };
    match value {
        None => Ok(None),
        Some(text) if is_decimal(text) => Ok(Some(text.clone())),
        Some(text) => Err(ValidationError::InvalidDecimal {
            field: field.name.clone(),
            value: text.clone(),
        }),
    }
}

/// An instant, carried either as an RFC 3339 timestamp or as decimal epoch
/// seconds.
pub fn validate_timestamp(field: &RecordField) -> Result<Option<DateTime<Utc>>> {
    let parsed = match &field.value {
        FieldValue::TimeStamp(None) | FieldValue::Decimal(None) => return Ok(None),
        FieldValue::TimeStamp(Some(text)) => DateTime::parse_from_rfc3339(text)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or(text),
        FieldValue::Decimal(Some(text)) => parse_epoch_seconds(text).ok_or(text),
        _ => return Err(wrong_type(field, FieldKind::TimeStamp)),
    };
    parsed
        .map(Some)
        .map_err(|text| ValidationError::InvalidTimestamp {
            field: field.name.clone(),
            value: text.clone(),
        })
}

pub fn require_timestamp(field: &RecordField) -> Result<DateTime<Utc>> {
    validate_timestamp(field)?.ok_or_else(|| null(field))
}

/// Large text. The bytes must be valid UTF-8.
pub fn validate_clob(field: &RecordField) -> Result<Option<String>> {
    let FieldValue::Clob(value) = &field.value else {
        return Err(wrong_type(field, FieldKind::Clob));
    };
    match value {
        None => Ok(None),
        Some(bytes) => String::from_utf8(bytes.clone())
            .map(Some)
            .map_err(|_| ValidationError::InvalidClob {
                field: field.name.clone(),
            }),
    }
}

pub fn validate_blob(field: &RecordField) -> Result<Option<Vec<u8>>> {
    match &field.value {
        FieldValue::Blob(value) => Ok(value.clone()),
        _ => Err(wrong_type(field, FieldKind::Blob)),
    }
}

pub(crate) fn is_decimal(text: &str) -> bool {
    let unsigned = text.strip_prefix(['-', '+']).unwrap_or(text);
    let (whole, fraction) = match unsigned.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (unsigned, None),
    };
    let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    digits(whole) && fraction.is_none_or(digits)
}

/// Parse decimal epoch seconds such as `1178053319` or `1178053319.25`.
pub fn parse_epoch_seconds(text: &str) -> Option<DateTime<Utc>> {
    if !is_decimal(text) {
        return None;
    }
    let negative = text.starts_with('-');
    let unsigned = text.trim_start_matches(['-', '+']);
    let (whole, fraction) = unsigned.split_once('.').unwrap_or((unsigned, ""));

    let secs: i64 = whole.parse().ok()?;
    let mut nanos: i64 = 0;
    if !fraction.is_empty() {
        let padded: String = fraction.chars().chain(std::iter::repeat('0')).take(9).collect();
        nanos = padded.parse().ok()?;
    }

    let (secs, nanos) = if negative {
        if nanos == 0 {
            (-secs, 0)
        } else {
            (-secs - 1, 1_000_000_000 - nanos)
        }
    } else {
        (secs, nanos)
    };
    DateTime::from_timestamp(secs, u32::try_from(nanos).ok()?)
}
