//! JSON Canonicalization Scheme (JCS) implementation
//!
//! RFC 8785 canonical form is what gets signed and what the fingerprint
//! reads its character codes from. The same logical JSON value always
//! produces the same bytes regardless of how the map was built.

use serde_json::Value;
use std::fmt::Write;

use crate::errors::{RecordError, RecordResult};
use crate::record::UnsignedRecord;

/// Canonicalize a JSON value according to RFC 8785 (JCS)
pub fn canonicalize_json(value: &Value) -> RecordResult<String> {
    let mut output = String::new();
    serialize_value(value, &mut output)?;
    Ok(output)
}

/// Canonical bytes of an unsigned record, the exact input handed to a signer
pub fn canonicalize_unsigned(record: &UnsignedRecord) -> RecordResult<String> {
    let value = serde_json::to_value(record)
        .map_err(|e| RecordError::serialization("unsigned record", e))?;
    canonicalize_json(&value)
}

fn serialize_value(value: &Value, output: &mut String) -> RecordResult<()> {
    match value {
        Value::Object(map) => serialize_object(map, output),
        Value::Array(arr) => serialize_array(arr, output),
        Value::String(s) => serialize_string(s, output),
        Value::Number(n) => serialize_number(n, output),
        Value::Bool(b) => {
            output.push_str(if *b { "true" } else { "false" });
            Ok(())
        }
        Value::Null => {
            output.push_str("null");
            Ok(())
        }
    }
}

/// Keys are sorted lexicographically
fn serialize_object(map: &serde_json::Map<String, Value>, output: &mut String) -> RecordResult<()> {
    output.push('{');

    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();

    for (i, key) in keys.iter().enumerate() {
        if i > 0 {
            output.push(',');
        }
        serialize_string(key, output)?;
        output.push(':');
        serialize_value(&map[*key], output)?;
    }

    output.push('}');
    Ok(())
}

fn serialize_array(arr: &[Value], output: &mut String) -> RecordResult<()> {
    output.push('[');
    for (i, item) in arr.iter().enumerate() {
        if i > 0 {
            output.push(',');
        }
        serialize_value(item, output)?;
    }
    output.push(']');
    Ok(())
}

fn serialize_string(s: &str, output: &mut String) -> RecordResult<()> {
    output.push('"');

    for ch in s.chars() {
        match ch {
            '"' => output.push_str("\\\""),
            '\\' => output.push_str("\\\\"),
            '\u{08}' => output.push_str("\\b"),
            '\u{0C}' => output.push_str("\\f"),
            '\n' => output.push_str("\\n"),
            '\r' => output.push_str("\\r"),
            '\t' => output.push_str("\\t"),
            ch if ch.is_control() => {
                write!(output, "\\u{:04x}", ch as u32).map_err(format_error)?;
            }
            ch => output.push(ch),
        }
    }

    output.push('"');
    Ok(())
}

/// ECMAScript number formatting per RFC 8785
fn serialize_number(num: &serde_json::Number, output: &mut String) -> RecordResult<()> {
    if let Some(i) = num.as_i64() {
        write!(output, "{i}").map_err(format_error)?;
    } else if let Some(u) = num.as_u64() {
        write!(output, "{u}").map_err(format_error)?;
    } else if let Some(f) = num.as_f64() {
        serialize_f64(f, output)?;
    } else {
        return Err(RecordError::invalid_input("number", "unrepresentable number"));
    }
    Ok(())
}

/// `Number.prototype.toString` for a finite double: shortest round-trip
/// digits, plain notation for exponents in [-7, 21), otherwise `d.ddde±n`.
fn serialize_f64(f: f64, output: &mut String) -> RecordResult<()> {
    if !f.is_finite() {
        return Err(RecordError::invalid_input(
            "number",
            "non-finite numbers are not representable in JSON",
        ));
    }
    // covers -0 as well
    if f == 0.0 {
        output.push('0');
        return Ok(());
    }
    if f < 0.0 {
        output.push('-');
    }

    // `{:e}` yields the shortest round-trip digits, e.g. "1.2345e-7"
    let scientific = format!("{:e}", f.abs());
    let (mantissa, exponent) = scientific
        .split_once('e')
        .ok_or_else(|| RecordError::invalid_input("number", "unexpected float format"))?;
    let exponent: i32 = exponent
        .parse()
        .map_err(|_| RecordError::invalid_input("number", "unexpected float exponent"))?;
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();

    let k = digits.len() as i32;
    let n = exponent + 1;
    if k <= n && n <= 21 {
        output.push_str(&digits);
        output.extend(std::iter::repeat('0').take((n - k) as usize));
    } else if 0 < n && n <= 21 {
        let (int_part, frac_part) = digits.split_at(n as usize);
        output.push_str(int_part);
        output.push('.');
        output.push_str(frac_part);
    } else if -6 < n && n <= 0 {
        output.push_str("0.");
        output.extend(std::iter::repeat('0').take((-n) as usize));
        output.push_str(&digits);
    } else {
        let (first, rest) = digits.split_at(1);
        output.push_str(first);
        if !rest.is_empty() {
            output.push('.');
            output.push_str(rest);
        }
        let sign = if n - 1 >= 0 { '+' } else { '-' };
        write!(output, "e{sign}{}", (n - 1).abs()).map_err(format_error)?;
    }
    Ok(())
}

fn format_error(e: std::fmt::Error) -> RecordError {
    RecordError::invalid_input("canonical_json", e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_object_key_sorting() {
        let input = json!({"z": 1, "a": 2, "m": 3});
        assert_eq!(canonicalize_json(&input).unwrap(), r#"{"a":2,"m":3,"z":1}"#);
    }

    #[test]
    fn test_nested_objects() {
        let input = json!({
            "outer": {"z": 1, "a": {"c": 3, "b": 2}},
            "first": 1
        });
        assert_eq!(
            canonicalize_json(&input).unwrap(),
            r#"{"first":1,"outer":{"a":{"b":2,"c":3},"z":1}}"#
        );
    }

    #[test]
    fn test_arrays_preserve_order() {
        let input = json!({"array": [3, 1, 2], "another": ["z", "a", "m"]});
        assert_eq!(
            canonicalize_json(&input).unwrap(),
            r#"{"another":["z","a","m"],"array":[3,1,2]}"#
        );
    }

    #[test]
    fn test_number_canonicalization() {
        let input = json!({"int": 42, "float": 3.14, "zero": 0.0, "whole": 5.0});
        assert_eq!(
            canonicalize_json(&input).unwrap(),
            r#"{"float":3.14,"int":42,"whole":5,"zero":0}"#
        );
    }

    #[test]
    fn test_float_formatting_follows_ecmascript() {
        let cases = [
            (1e21, "1e+21"),
            (1e20, "100000000000000000000"),
            (1.5e300, "1.5e+300"),
            (1e-7, "1e-7"),
            (1.25e-7, "1.25e-7"),
            (0.000001, "0.000001"),
            (0.1, "0.1"),
            (-2.5, "-2.5"),
            (123.456, "123.456"),
            (-0.0, "0"),
        ];
        for (value, expected) in cases {
            let mut out = String::new();
            serialize_f64(value, &mut out).unwrap();
            assert_eq!(out, expected, "formatting {value:e}");
        }
    }

    #[test]
    fn test_non_finite_float_rejected() {
        let mut out = String::new();
        assert!(serialize_f64(f64::NAN, &mut out).is_err());
        assert!(serialize_f64(f64::INFINITY, &mut out).is_err());
    }

    #[test]
    fn test_string_escaping() {
        let input = json!({"quotes": "He said \"Hello\"", "newline": "line1\nline2"});
        assert_eq!(
            canonicalize_json(&input).unwrap(),
            r#"{"newline":"line1\nline2","quotes":"He said \"Hello\""}"#
        );
    }

    #[test]
    fn test_unsigned_record_is_stable() {
        let record = UnsignedRecord {
            id: "rec_1_abc".to_string(),
            payload: json!({"b": 1, "a": 2}),
            context: Default::default(),
            fingerprint: vec![0.5, 1.0],
            timestamp: chrono::DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
                .unwrap()
                .with_timezone(&chrono::Utc),
            version: "1.0.0".to_string(),
        };

        let first = canonicalize_unsigned(&record).unwrap();
        let second = canonicalize_unsigned(&record.clone()).unwrap();
        assert_eq!(first, second);
        assert!(first.starts_with(r#"{"context":{"field1":1.618"#));
        assert!(first.contains(r#""payload":{"a":2,"b":1}"#));
    }
}
