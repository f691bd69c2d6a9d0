//! Container to host value.

use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveTime};

use rfcbridge_common::{ErrorInfo, Result, ReturnCode, RfcError, RfcType, TypeDescription, Value};

use super::buffer::ReadBuffer;
use super::fill::parse_digits;
use super::{wrap_structure, CodecOptions, FieldSpec};
use crate::backend::Container;

const DATE_INITIAL: &str = "00000000";

/// Reads the field `spec` of `container` as a host value.
///
/// Table rows are consumed: each row is deleted from the container once it
/// has been read.
pub fn wrap_value(
    container: &mut dyn Container,
    spec: FieldSpec<'_>,
    options: CodecOptions,
) -> Result<Value> {
    let name = spec.name;
    let policy = options.policy;
    match spec.rfc_type {
        RfcType::Structure => {
            let line = line_type(&spec)?;
            let inner = container.structure_mut(name)?;
            wrap_structure(inner, line, options)
        }
        RfcType::Table => {
            let line = line_type(&spec)?;
            let table = container.table_mut(name)?;
            let count = table.row_count();
            let mut rows = Vec::with_capacity(count);
            // Back to front, so deleting a row never shifts an unread one.
            for index in (0..count).rev() {
                let row = table.row_mut(index)?;
                rows.push(wrap_structure(row, line, options)?);
                table.delete_row(index)?;
            }
            rows.reverse();
            Ok(Value::Table(rows))
        }
        RfcType::Char => {
            let text = container.chars(name)?;
            Ok(Value::String(fixed_text(text, policy.rstrip())))
        }
        RfcType::Num => {
            let text = container.num(name)?;
            Ok(Value::String(fixed_text(text, policy.rstrip())))
        }
        RfcType::String => {
            let len = container.string_length(name)?;
            let mut buffer = ReadBuffer::with_capacity(len);
            let bytes = buffer.read(name, |buf| container.read_string(name, buf))?;
            Ok(Value::String(utf8(name, bytes)?))
        }
        RfcType::Byte => {
            let mut buffer = ReadBuffer::with_capacity(spec.narrow_length);
            let bytes = buffer.read(name, |buf| container.read_bytes(name, buf))?;
            Ok(Value::Bytes(bytes.to_vec()))
        }
        RfcType::Xstring => {
            let len = container.xstring_length(name)?;
            let mut buffer = ReadBuffer::with_capacity(len);
            let bytes = buffer.read(name, |buf| container.read_xstring(name, buf))?;
            Ok(Value::Bytes(bytes.to_vec()))
        }
        RfcType::Bcd | RfcType::Decf16 | RfcType::Decf34 => {
            let mut buffer = ReadBuffer::with_capacity(decimal_capacity(&spec));
            let bytes = buffer.read(name, |buf| container.read_decimal_text(name, buf))?;
            let text = utf8(name, bytes)?;
            let normalized = text.trim().replace(',', ".");
            BigDecimal::from_str(&normalized)
                .map(Value::Decimal)
                .map_err(|_| RfcError::marshal("cannot parse decimal text", text))
        }
        RfcType::Float => Ok(Value::Float(container.float(name)?)),
        RfcType::Int => Ok(Value::Int(container.int(name)?.into())),
        RfcType::Int1 => Ok(Value::Int(container.int1(name)?.into())),
        RfcType::Int2 => Ok(Value::Int(container.int2(name)?.into())),
        RfcType::Int8 => Ok(Value::Int(container.int8(name)?)),
        RfcType::Date => {
            let text = container.date(name)?;
            if text == DATE_INITIAL || text.trim().is_empty() {
                return Ok(initial_date_time(policy.dtime()));
            }
            if !policy.dtime() {
                return Ok(Value::String(text));
            }
            parse_digits(&text, &[4, 2, 2])
                .and_then(|d| NaiveDate::from_ymd_opt(d[0] as i32, d[1], d[2]))
                .map(Value::Date)
                .ok_or_else(|| RfcError::marshal("invalid DATE value", text))
        }
        RfcType::Time => {
            let text = container.time(name)?;
            if text.trim().is_empty() {
                return Ok(initial_date_time(policy.dtime()));
            }
            if !policy.dtime() {
                return Ok(Value::String(text));
            }
            parse_digits(&text, &[2, 2, 2])
                .and_then(|d| NaiveTime::from_hms_opt(d[0], d[1], d[2]))
                .map(Value::Time)
                .ok_or_else(|| RfcError::marshal("invalid TIME value", text))
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

fn fixed_text(text: String, rstrip: bool) -> String {
    if rstrip {
        text.trim_end().to_string()
    } else {
        text
    }
}

/// Unset dates and times: `None` with `dtime`, empty text otherwise.
fn initial_date_time(dtime: bool) -> Value {
    if dtime {
        Value::Null
    } else {
        Value::String(String::new())
    }
}

/// Room for every digit in both encodings plus sign, radix and exponent.
fn decimal_capacity(spec: &FieldSpec<'_>) -> usize {
    spec.narrow_length.max(spec.wide_length) * 2 + 8
}

fn utf8(field: &str, bytes: &[u8]) -> Result<String> {
    String::from_utf8(bytes.to_vec()).map_err(|_| {
        ErrorInfo::new(
            ReturnCode::CodepageConversionFailure,
            format!("field '{}' does not hold valid UTF-8", field),
        )
        .into()
    })
}
