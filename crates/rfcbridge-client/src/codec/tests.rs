//! Tests for the codec module
//!
//! These tests drive fill and wrap through the in-memory containers.

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::backend::{Container, MemoryContainer, MemoryTable, ReadStatus, Table};
    use bigdecimal::BigDecimal;
    use chrono::{NaiveDate, NaiveTime};
    use rfcbridge_common::{record, ReturnCode, RfcError};
    use std::str::FromStr;

    fn line() -> Arc<TypeDescription> {
        TypeDescription::builder("ZLINE")
            .field("NAME", RfcType::Char, 10, 20)
            .field("COUNT", RfcType::Num, 4, 8)
            .decimal_field("AMOUNT", RfcType::Bcd, 7, 7, 2)
            .field("DAY", RfcType::Date, 8, 16)
            .field("AT", RfcType::Time, 6, 12)
            .field("RATIO", RfcType::Float, 8, 8)
            .field("SMALL", RfcType::Int2, 2, 2)
            .field("BIG", RfcType::Int8, 8, 8)
            .build()
            .unwrap()
    }

    fn scalar_line() -> Arc<TypeDescription> {
        TypeDescription::builder("ZWORDS")
            .field("", RfcType::Char, 8, 16)
            .build()
            .unwrap()
    }

    fn id_line() -> Arc<TypeDescription> {
        TypeDescription::builder("ZID")
            .field("ID", RfcType::Char, 4, 8)
            .build()
            .unwrap()
    }

    /// One field of every RFC type.
    fn every_type() -> Arc<TypeDescription> {
        TypeDescription::builder("ZEVERY")
            .field("CHAR", RfcType::Char, 10, 20)
            .field("DATE", RfcType::Date, 8, 16)
            .decimal_field("BCD", RfcType::Bcd, 7, 7, 2)
            .field("TIME", RfcType::Time, 6, 12)
            .field("BYTE", RfcType::Byte, 4, 4)
            .nested("TABLE", RfcType::Table, scalar_line())
            .field("NUM", RfcType::Num, 6, 12)
            .field("FLOAT", RfcType::Float, 8, 8)
            .field("INT", RfcType::Int, 4, 4)
            .field("INT2", RfcType::Int2, 2, 2)
            .field("INT1", RfcType::Int1, 1, 1)
            .nested("STRUCTURE", RfcType::Structure, id_line())
            .field("DECF16", RfcType::Decf16, 8, 8)
            .field("DECF34", RfcType::Decf34, 16, 16)
            .field("STRING", RfcType::String, 8, 8)
            .field("XSTRING", RfcType::Xstring, 8, 8)
            .field("INT8", RfcType::Int8, 8, 8)
            .build()
            .unwrap()
    }

    fn function() -> FunctionDescription {
        let parameters = [
            ParameterDescriptor::new("TEXT", RfcType::Char, Direction::Import, 10, 20),
            ParameterDescriptor::new("NOTE", RfcType::String, Direction::Export, 0, 0),
            ParameterDescriptor::new("RAW", RfcType::Xstring, Direction::Changing, 0, 0),
            ParameterDescriptor::nested("HEADER", RfcType::Structure, Direction::Import, line()),
            ParameterDescriptor::nested("LINES", RfcType::Table, Direction::Table, line()),
            ParameterDescriptor::nested("WORDS", RfcType::Table, Direction::Table, scalar_line()),
        ];
        let mut desc = FunctionDescription::new("Z_CODEC").unwrap();
        for parameter in parameters {
            desc.add_parameter(parameter).unwrap();
        }
        desc
    }

    fn field_spec<'a>(line: &'a TypeDescription, name: &str) -> FieldSpec<'a> {
        FieldSpec::from(line.field(name).unwrap())
    }

    fn parameter_spec<'a>(desc: &'a FunctionDescription, name: &str) -> FieldSpec<'a> {
        FieldSpec::from(desc.parameter(name).unwrap())
    }

    fn fill(row: &mut MemoryContainer, spec: FieldSpec<'_>, value: &Value) -> Result<()> {
        fill_value(row, spec, value, CodecOptions::default())
    }

    fn wrap(row: &mut MemoryContainer, spec: FieldSpec<'_>) -> Result<Value> {
        wrap_value(row, spec, CodecOptions::default())
    }

    fn dec(text: &str) -> Value {
        Value::Decimal(BigDecimal::from_str(text).unwrap())
    }

    fn dtime() -> CodecOptions {
        CodecOptions::from(&ConnectionConfig::new().with_dtime(true))
    }

    // ---- every type ----

    #[test]
    fn test_roundtrip_every_type() {
        let line = every_type();
        let options = dtime();
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        let time = NaiveTime::from_hms_opt(23, 59, 59).unwrap();
        let words = Value::Table(vec![Value::from("alpha"), Value::from("beta")]);
        let cases = vec![
            ("CHAR", Value::from("abc")),
            ("DATE", Value::from(date)),
            ("BCD", dec("-12345.67")),
            ("TIME", Value::from(time)),
            ("BYTE", Value::from(vec![0xca_u8, 0xfe, 0xba, 0xbe])),
            ("TABLE", words),
            ("NUM", Value::from("004711")),
            ("FLOAT", Value::from(-1.25e10)),
            ("INT", Value::from(i32::MIN)),
            ("INT", Value::from(i32::MAX)),
            ("INT2", Value::from(i16::MIN)),
            ("INT2", Value::from(i16::MAX)),
            ("INT1", Value::from(u8::MIN)),
            ("INT1", Value::from(u8::MAX)),
            ("STRUCTURE", Value::from(record! { "ID" => "ab" })),
            ("DECF16", dec("-9.999999999999999E+384")),
            ("DECF16", dec("9.999999999999999E+384")),
            ("DECF16", dec("1E-383")),
            ("DECF34", dec("9.999999999999999999999999999999999E+6144")),
            ("DECF34", dec("-1E-6143")),
            ("STRING", Value::from("grüße")),
            ("XSTRING", Value::from(vec![0_u8, 1, 2, 0xff])),
            ("INT8", Value::from(i64::MIN)),
            ("INT8", Value::from(i64::MAX)),
        ];

        for (name, value) in cases {
            let spec = field_spec(&line, name);
            let mut row = MemoryContainer::for_type(&line);
            fill_value(&mut row, spec, &value, options).unwrap();
            let wrapped = wrap_value(&mut row, spec, options).unwrap();
            assert_eq!(wrapped, value, "{} round trip", name);
        }
    }

    #[test]
    fn test_small_integer_bounds() {
        let line = every_type();
        let int1 = field_spec(&line, "INT1");
        let int2 = field_spec(&line, "INT2");
        let mut row = MemoryContainer::for_type(&line);

        for value in [-1, 256] {
            let err = fill(&mut row, int1, &Value::from(value)).unwrap_err();
            assert_eq!(err.info().unwrap().code, ReturnCode::ConversionFailure);
        }
        for value in [-32769, 32768] {
            let err = fill(&mut row, int2, &Value::from(value)).unwrap_err();
            assert_eq!(err.info().unwrap().code, ReturnCode::ConversionFailure);
        }
        assert_eq!(wrap(&mut row, int1).unwrap(), Value::Int(0));
        assert_eq!(wrap(&mut row, int2).unwrap(), Value::Int(0));
    }

    // ---- scalars ----

    #[test]
    fn test_char_rstrip_policy() {
        let line = line();
        let name = field_spec(&line, "NAME");
        let mut row = MemoryContainer::for_type(&line);
        fill(&mut row, name, &Value::from("abc")).unwrap();

        assert_eq!(wrap(&mut row, name).unwrap(), Value::from("abc"));

        let raw = CodecOptions::from(&ConnectionConfig::new().with_rstrip(false));
        let padded = wrap_value(&mut row, name, raw).unwrap();
        assert_eq!(padded, Value::from("abc       "));
    }

    #[test]
    fn test_num_rejects_non_digits() {
        let line = line();
        let count = field_spec(&line, "COUNT");
        let mut row = MemoryContainer::for_type(&line);
        for value in [Value::from("12a"), Value::from(""), Value::from(12)] {
            let err = fill(&mut row, count, &value).unwrap_err();
            assert!(err.is_marshal());
        }

        fill(&mut row, count, &Value::from("12")).unwrap();
        assert_eq!(wrap(&mut row, count).unwrap(), Value::from("0012"));
    }

    #[test]
    fn test_integer_ranges() {
        let line = line();
        let small = field_spec(&line, "SMALL");
        let big = field_spec(&line, "BIG");
        let mut row = MemoryContainer::for_type(&line);

        fill(&mut row, small, &Value::from(-300)).unwrap();
        assert_eq!(wrap(&mut row, small).unwrap(), Value::Int(-300));

        let err = fill(&mut row, small, &Value::Int(1 << 40)).unwrap_err();
        assert!(err.is_marshal());

        let err = fill(&mut row, small, &Value::from(70000)).unwrap_err();
        assert_eq!(err.info().unwrap().code, ReturnCode::ConversionFailure);

        fill(&mut row, big, &Value::Int(1 << 40)).unwrap();
        assert_eq!(wrap(&mut row, big).unwrap(), Value::Int(1 << 40));
    }

    #[test]
    fn test_float_accepts_numbers() {
        let line = line();
        let ratio = field_spec(&line, "RATIO");
        let mut row = MemoryContainer::for_type(&line);
        fill(&mut row, ratio, &Value::from(1.5)).unwrap();
        assert_eq!(wrap(&mut row, ratio).unwrap(), Value::Float(1.5));

        fill(&mut row, ratio, &Value::from("2.25")).unwrap();
        assert_eq!(wrap(&mut row, ratio).unwrap(), Value::Float(2.25));

        let err = fill(&mut row, ratio, &Value::from(true)).unwrap_err();
        assert!(err.is_marshal());
    }

    // ---- decimals ----

    #[test]
    fn test_decimal_with_comma_separator() {
        let line = line();
        let amount = field_spec(&line, "AMOUNT");
        let mut row = MemoryContainer::for_type(&line);
        let options = CodecOptions::from(&ConnectionConfig::new().with_decimal_separator(','));

        fill_value(&mut row, amount, &dec("1234.5"), options).unwrap();
        let wrapped = wrap_value(&mut row, amount, options).unwrap();
        assert_eq!(wrapped, dec("1234.5"));

        fill_value(&mut row, amount, &Value::from("-0,25"), options).unwrap();
        let wrapped = wrap_value(&mut row, amount, options).unwrap();
        assert_eq!(wrapped, dec("-0.25"));
    }

    #[test]
    fn test_decimal_rejects_text() {
        let line = line();
        let amount = field_spec(&line, "AMOUNT");
        let mut row = MemoryContainer::for_type(&line);
        let err = fill(&mut row, amount, &Value::from("12 EUR")).unwrap_err();
        assert!(err.is_marshal());
        assert!(err.to_string().contains("BCD"));

        let err = fill(&mut row, amount, &Value::Float(f64::NAN)).unwrap_err();
        assert!(err.is_marshal());
    }

    #[test]
    fn test_decf34_keeps_precision() {
        let line = every_type();
        let decf34 = field_spec(&line, "DECF34");
        let mut row = MemoryContainer::for_type(&line);
        let text = "1234567890123456789012345678.901234";
        fill(&mut row, decf34, &Value::from(text)).unwrap();
        assert_eq!(wrap(&mut row, decf34).unwrap(), dec(text));
    }

    // ---- dates and times ----

    #[test]
    fn test_date_validation() {
        let line = line();
        let day = field_spec(&line, "DAY");
        let mut row = MemoryContainer::for_type(&line);

        for text in ["20240230", "2024-01-15", "   "] {
            let err = fill(&mut row, day, &Value::from(text)).unwrap_err();
            assert!(err.is_marshal());
        }

        fill(&mut row, day, &Value::from("20240115")).unwrap();
        assert_eq!(row.date("DAY").unwrap(), "20240115");
    }

    #[test]
    fn test_falsy_date_is_noop() {
        let line = line();
        let day = field_spec(&line, "DAY");
        let mut row = MemoryContainer::for_type(&line);
        fill(&mut row, day, &Value::Null).unwrap();
        fill(&mut row, day, &Value::from("")).unwrap();
        assert_eq!(row.date("DAY").unwrap(), "00000000");
    }

    #[test]
    fn test_blank_date_and_time_need_full_width() {
        let line = line();
        let day = field_spec(&line, "DAY");
        let at = field_spec(&line, "AT");
        let mut row = MemoryContainer::for_type(&line);

        fill(&mut row, day, &Value::from(" ".repeat(8))).unwrap();
        fill(&mut row, at, &Value::from(" ".repeat(6))).unwrap();
        assert_eq!(wrap(&mut row, day).unwrap(), Value::from(""));
        assert_eq!(wrap(&mut row, at).unwrap(), Value::from(""));

        let err = fill(&mut row, at, &Value::from(" ".repeat(8))).unwrap_err();
        assert!(err.is_marshal());
        let err = fill(&mut row, day, &Value::from(" ".repeat(6))).unwrap_err();
        assert!(err.is_marshal());
    }

    #[test]
    fn test_dtime_policy() {
        let line = line();
        let day = field_spec(&line, "DAY");
        let at = field_spec(&line, "AT");
        let mut row = MemoryContainer::for_type(&line);

        assert_eq!(wrap_value(&mut row, day, dtime()).unwrap(), Value::Null);
        assert_eq!(wrap(&mut row, day).unwrap(), Value::from(""));

        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let time = NaiveTime::from_hms_opt(13, 5, 9).unwrap();
        fill(&mut row, day, &Value::from(date)).unwrap();
        fill(&mut row, at, &Value::from(time)).unwrap();

        let dated = wrap_value(&mut row, day, dtime()).unwrap();
        let timed = wrap_value(&mut row, at, dtime()).unwrap();
        assert_eq!(dated, Value::Date(date));
        assert_eq!(timed, Value::Time(time));
        assert_eq!(wrap(&mut row, day).unwrap(), Value::from("20240115"));
        assert_eq!(wrap(&mut row, at).unwrap(), Value::from("130509"));
    }

    #[test]
    fn test_invalid_time() {
        let line = line();
        let at = field_spec(&line, "AT");
        let mut row = MemoryContainer::for_type(&line);
        let err = fill(&mut row, at, &Value::from("256000")).unwrap_err();
        assert!(err.is_marshal());
    }

    // ---- structures and tables ----

    #[test]
    fn test_table_keeps_row_order() {
        let desc = function();
        let lines = parameter_spec(&desc, "LINES");
        let mut params = MemoryContainer::for_function(&desc);
        let rows = Value::from(vec![
            record! { "NAME" => "first", "COUNT" => "1" },
            record! { "NAME" => "second", "COUNT" => "2" },
            record! { "NAME" => "third", "COUNT" => "3" },
        ]);
        fill(&mut params, lines, &rows).unwrap();
        assert_eq!(params.rows("LINES").unwrap().len(), 3);

        let wrapped = wrap(&mut params, lines).unwrap();
        let table = wrapped.as_table().unwrap();
        let names: Vec<_> = table
            .iter()
            .map(|row| row.get("NAME").and_then(Value::as_str).unwrap())
            .collect();
        assert_eq!(names, ["first", "second", "third"]);
        assert_eq!(table[1].get("COUNT"), Some(&Value::from("0002")));
        assert!(params.rows("LINES").unwrap().is_empty());
    }

    #[test]
    fn test_empty_table() {
        let desc = function();
        let lines = parameter_spec(&desc, "LINES");
        let mut params = MemoryContainer::for_function(&desc);
        let empty = Value::Table(Vec::new());
        fill(&mut params, lines, &empty).unwrap();
        assert_eq!(wrap(&mut params, lines).unwrap(), empty);
    }

    #[test]
    fn test_table_requires_sequence() {
        let desc = function();
        let lines = parameter_spec(&desc, "LINES");
        let mut params = MemoryContainer::for_function(&desc);
        let row = Value::from(record! { "NAME" => "x" });
        let err = fill(&mut params, lines, &row).unwrap_err();
        assert!(err.is_marshal());
    }

    #[test]
    fn test_scalar_wrapper_collapses() {
        let desc = function();
        let words = parameter_spec(&desc, "WORDS");
        let mut params = MemoryContainer::for_function(&desc);
        let rows = Value::Table(vec![Value::from("alpha"), Value::from("beta")]);
        fill(&mut params, words, &rows).unwrap();
        assert_eq!(wrap(&mut params, words).unwrap(), rows);
    }

    #[test]
    fn test_scalar_row_needs_unnamed_field() {
        let desc = function();
        let lines = parameter_spec(&desc, "LINES");
        let mut params = MemoryContainer::for_function(&desc);
        let rows = Value::Table(vec![Value::from("alpha")]);
        let err = fill(&mut params, lines, &rows).unwrap_err();
        assert_eq!(err.info().unwrap().code, ReturnCode::InvalidParameter);
    }

    #[test]
    fn test_structure_roundtrip() {
        let desc = function();
        let header = parameter_spec(&desc, "HEADER");
        let mut params = MemoryContainer::for_function(&desc);
        let value = Value::from(record! { "NAME" => "head", "SMALL" => 7 });
        fill(&mut params, header, &value).unwrap();
        let wrapped = wrap(&mut params, header).unwrap();
        assert_eq!(wrapped.get("NAME"), Some(&Value::from("head")));
        assert_eq!(wrapped.get("SMALL"), Some(&Value::Int(7)));
        assert_eq!(wrapped.get("DAY"), Some(&Value::from("")));
        assert_eq!(wrapped.as_record().unwrap().len(), line().fields().len());
    }

    // ---- parameters ----

    #[test]
    fn test_field_path_on_nested_error() {
        let desc = function();
        let mut params = MemoryContainer::for_function(&desc);
        let call = record! {
            "LINES" => vec![
                record! { "COUNT" => "1" },
                record! { "COUNT" => "x1" },
            ],
        };
        let err = fill_parameters(&mut params, &desc, &call, CodecOptions::default())
            .unwrap_err();
        assert_eq!(err.field_path(), ["LINES", "COUNT"]);
        assert!(err.is_marshal());
    }

    #[test]
    fn test_unknown_parameter() {
        let desc = function();
        let mut params = MemoryContainer::for_function(&desc);
        let call = record! { "MISSING" => "x" };
        let err = fill_parameters(&mut params, &desc, &call, CodecOptions::default())
            .unwrap_err();
        let info = err.info().unwrap();
        assert_eq!(info.code, ReturnCode::InvalidParameter);
        assert_eq!(info.message, "field 'MISSING' not found");
    }

    #[test]
    fn test_unknown_structure_field() {
        let desc = function();
        let mut params = MemoryContainer::for_function(&desc);
        let call = record! { "HEADER" => record! { "NOPE" => 1 } };
        let err = fill_parameters(&mut params, &desc, &call, CodecOptions::default())
            .unwrap_err();
        assert_eq!(err.field_path(), ["HEADER"]);
        assert_eq!(err.info().unwrap().message, "field 'NOPE' not found");
    }

    #[test]
    fn test_wrap_result_skips_imports() {
        let desc = function();
        let mut params = MemoryContainer::for_function(&desc);
        let call = record! { "TEXT" => "in", "RAW" => vec![0xde_u8, 0xad] };
        fill_parameters(&mut params, &desc, &call, CodecOptions::default())
            .unwrap();

        let result = wrap_result(&mut params, &desc, CodecOptions::default())
            .unwrap();
        assert!(!result.contains_key("TEXT"));
        assert!(!result.contains_key("HEADER"));
        assert_eq!(result.get("RAW"), Some(&Value::Bytes(vec![0xde, 0xad])));
        assert_eq!(result.get("NOTE"), Some(&Value::from("")));

        let options = CodecOptions::from(&ConnectionConfig::new().with_return_import_params(true));
        let result = wrap_result(&mut params, &desc, options).unwrap();
        assert_eq!(result.get("TEXT"), Some(&Value::from("in")));
    }

    // ---- buffers ----

    #[test]
    fn test_long_string_roundtrip() {
        let desc = function();
        let note = parameter_spec(&desc, "NOTE");
        let mut params = MemoryContainer::for_function(&desc);
        let long = Value::from("x".repeat(4096));
        fill(&mut params, note, &long).unwrap();
        assert_eq!(wrap(&mut params, note).unwrap(), long);
    }

    #[test]
    fn test_long_decimal_grows_buffer() {
        let line = line();
        let amount = field_spec(&line, "AMOUNT");
        let mut row = MemoryContainer::for_type(&line);
        // 30 characters against a first read buffer of 22 bytes.
        let text = "123456789012345678901234567.50";
        fill(&mut row, amount, &Value::from(text)).unwrap();

        let mut first = vec![0_u8; 22];
        let status = row.read_decimal_text("AMOUNT", &mut first).unwrap();
        assert_eq!(status, ReadStatus::BufferTooSmall { required: 30 });
        assert_eq!(wrap(&mut row, amount).unwrap(), dec(text));
    }

    #[test]
    fn test_table_row_error_keeps_rows() {
        let mut table = MemoryTable::new(Some(line()));
        let row = table.append_row().unwrap();
        row.set_chars("NAME", "kept").unwrap();
        assert_eq!(table.row_count(), 1);
        let err = RfcError::from(table.delete_row(3).unwrap_err());
        assert_eq!(err.info().unwrap().code, ReturnCode::TableMoveEof);
        assert_eq!(table.row_count(), 1);
    }
}
