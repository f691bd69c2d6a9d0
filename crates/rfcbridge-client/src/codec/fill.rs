//! Host value to container.

use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveTime};

use rfcbridge_common::{ErrorInfo, Result, RfcError, RfcType, TypeDescription, Value};

use super::{fill_structure, CodecOptions, FieldSpec};
use crate::backend::Container;

const DATE_WIDTH: usize = 8;
const TIME_WIDTH: usize = 6;

/// Writes `value` into the field `spec` of `container`.
///
/// # Errors
///
/// Returns `RfcError::Marshal` when the value has the wrong shape or
/// content for the field type, and the backend's error when the container
/// rejects it.
pub fn fill_value(
    container: &mut dyn Container,
    spec: FieldSpec<'_>,
    value: &Value,
    options: CodecOptions,
) -> Result<()> {
    let name = spec.name;
    match spec.rfc_type {
        RfcType::Structure => {
            let record = value
                .as_record()
                .ok_or_else(|| RfcError::marshal("a STRUCTURE field requires a mapping", value))?;
            let line = line_type(&spec)?;
            let inner = container.structure_mut(name)?;
            fill_structure(inner, line, record, options)
        }
        RfcType::Table => {
            let rows = value
                .as_table()
                .ok_or_else(|| RfcError::marshal("a TABLE field requires a sequence", value))?;
            let line = line_type(&spec)?;
            let table = container.table_mut(name)?;
            for row in rows {
                let target = table.append_row()?;
                match row {
                    Value::Structure(record) => fill_structure(target, line, record, options)?,
                    scalar => fill_scalar_row(target, line, scalar, options)?,
                }
            }
            Ok(())
        }
        RfcType::Char => Ok(container.set_chars(name, text(value, "CHAR")?)?),
        RfcType::String => Ok(container.set_string(name, text(value, "STRING")?)?),
        RfcType::Num => {
            let digits = text(value, "NUM")?;
            if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
                return Err(RfcError::marshal(
                    "a NUM field requires a non-empty string of digits",
                    value,
                ));
            }
            Ok(container.set_num(name, digits)?)
        }
        RfcType::Byte => Ok(container.set_bytes(name, bytes(value, "BYTE")?)?),
        RfcType::Xstring => Ok(container.set_xstring(name, bytes(value, "XSTRING")?)?),
        RfcType::Bcd | RfcType::Float | RfcType::Decf16 | RfcType::Decf34 => {
            let text = decimal_text(value, spec.rfc_type, options.decimal_separator)?;
            Ok(container.set_decimal_text(name, &text)?)
        }
        RfcType::Int | RfcType::Int1 | RfcType::Int2 => {
            let int = integer(value, spec.rfc_type)?;
            let int = i32::try_from(int).map_err(|_| {
                RfcError::marshal(
                    format!("an {} field requires a 32-bit integer", spec.rfc_type),
                    value,
                )
            })?;
            Ok(container.set_int(name, int)?)
        }
        RfcType::Int8 => Ok(container.set_int8(name, integer(value, RfcType::Int8)?)?),
        RfcType::Date => {
            if value.is_falsy() {
                return Ok(());
            }
            let text = date_text(value)?;
            Ok(container.set_date(name, &text)?)
        }
        RfcType::Time => {
            if value.is_falsy() {
                return Ok(());
            }
            let text = time_text(value)?;
            Ok(container.set_time(name, &text)?)
        }
    }
}

fn line_type<'a>(spec: &FieldSpec<'a>) -> Result<&'a TypeDescription> {
    match spec.type_description {
        Some(line) => Ok(line.as_ref()),
        None => Err(RfcError::Internal(format!(
            "{} field {} has no type description",
            spec.rfc_type, spec.name
        ))),
    }
}

/// A non-mapping row fills the single unnamed field of a scalar line type.
fn fill_scalar_row(
    row: &mut dyn Container,
    line: &TypeDescription,
    value: &Value,
    options: CodecOptions,
) -> Result<()> {
    match line.fields() {
        [field] if field.name.is_empty() => fill_value(row, FieldSpec::from(field), value, options),
        _ => Err(ErrorInfo::field_not_found("").into()),
    }
}

fn text<'v>(value: &'v Value, type_name: &str) -> Result<&'v str> {
    value.as_str().ok_or_else(|| {
        RfcError::marshal(format!("a {} field requires a string", type_name), value)
    })
}

fn bytes<'v>(value: &'v Value, type_name: &str) -> Result<&'v [u8]> {
    value.as_bytes().ok_or_else(|| {
        RfcError::marshal(format!("a {} field requires bytes", type_name), value)
    })
}

fn integer(value: &Value, rfc_type: RfcType) -> Result<i64> {
    value.as_i64().ok_or_else(|| {
        RfcError::marshal(format!("an {} field requires an integer", rfc_type), value)
    })
}

/// Decimal text in the session's radix convention.
///
/// Numbers and decimals are rendered from their exact textual form, so no
/// binary rounding leaks into the wire value. Strings are passed through
/// after checking they parse once the radix is normalised to `.`.
fn decimal_text(value: &Value, rfc_type: RfcType, separator: char) -> Result<String> {
    let localize = |text: String| {
        if separator == '.' {
            text
        } else {
            text.replace('.', &separator.to_string())
        }
    };
    match value {
        Value::Int(i) => Ok(i.to_string()),
        Value::Float(f) if f.is_finite() => Ok(localize(f.to_string())),
        Value::Decimal(d) => Ok(localize(d.to_string())),
        Value::String(s) => {
            let normalized = s.trim().replace(separator, ".");
            BigDecimal::from_str(&normalized).map_err(|_| {
                RfcError::marshal(
                    format!("a {} field requires a decimal string", rfc_type),
                    value,
                )
            })?;
            Ok(s.clone())
        }
        _ => Err(RfcError::marshal(
            format!(
                "a {} field requires a number, a decimal or a decimal string",
                rfc_type
            ),
            value,
        )),
    }
}

fn date_text(value: &Value) -> Result<String> {
    let invalid = || RfcError::marshal("a DATE field requires a date or a YYYYMMDD string", value);
    match value {
        Value::Date(date) => Ok(date.format("%Y%m%d").to_string()),
        Value::String(s) if s.len() == DATE_WIDTH && s.trim().is_empty() => Ok(s.clone()),
        Value::String(s) => {
            let digits = parse_digits(s, &[4, 2, 2]).ok_or_else(invalid)?;
            NaiveDate::from_ymd_opt(digits[0] as i32, digits[1], digits[2])
                .ok_or_else(invalid)?;
            Ok(s.clone())
        }
        _ => Err(invalid()),
    }
}

fn time_text(value: &Value) -> Result<String> {
    let invalid = || RfcError::marshal("a TIME field requires a time or an HHMMSS string", value);
    match value {
        Value::Time(time) => Ok(time.format("%H%M%S").to_string()),
        Value::String(s) if s.len() == TIME_WIDTH && s.trim().is_empty() => Ok(s.clone()),
        Value::String(s) => {
            let digits = parse_digits(s, &[2, 2, 2]).ok_or_else(invalid)?;
            NaiveTime::from_hms_opt(digits[0], digits[1], digits[2])
                .ok_or_else(invalid)?;
            Ok(s.clone())
        }
        _ => Err(invalid()),
    }
}

/// Splits an all-digit string into groups of the given widths.
pub(crate) fn parse_digits(text: &str, widths: &[usize]) -> Option<Vec<u32>> {
    if !text.bytes().all(|b| b.is_ascii_digit()) || text.len() != widths.iter().sum::<usize>() {
        return None;
    }
    let mut groups = Vec::with_capacity(widths.len());
    let mut start = 0;
    for width in widths {
        groups.push(text[start..start + width].parse().ok()?);
        start += width;
    }
    Some(groups)
}
