//! Deterministic record fingerprint
//!
//! Sixteen values in `[0, 1]` derived from the record context and the
//! canonical serialization of the payload. Identical inputs always produce
//! identical output. Used as a similarity hint only, never for trust.

use std::f64::consts::PI;

use serde_json::Value;

use crate::canonicalize::canonicalize_json;
use crate::errors::RecordResult;
use crate::record::RecordContext;

pub const FINGERPRINT_LEN: usize = 16;

/// Fingerprint of a payload under the given context
pub fn compute(payload: &Value, context: &RecordContext) -> RecordResult<Vec<f64>> {
    let serialized = canonicalize_json(payload)?;
    Ok(from_serialized(&serialized, context))
}

/// Fingerprint over an already serialized payload.
///
/// Character codes are UTF-16 code units; an empty serialization contributes
/// no data influence.
pub fn from_serialized(serialized: &str, context: &RecordContext) -> Vec<f64> {
    let units: Vec<u16> = serialized.encode_utf16().collect();

    (0..FINGERPRINT_LEN)
        .map(|i| {
            let angle = i as f64 * context.field1 * PI / 8.0;
            let value = angle.sin() * context.field2 + angle.cos() * context.field3;
            let data_influence = if units.is_empty() {
                0.0
            } else {
                f64::from(units[i % units.len()]) / 255.0 * 0.1
            };
            clamp_unit(value + data_influence)
        })
        .collect()
}

// NaN from a degenerate context collapses to 0
fn clamp_unit(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn in_bounds(fp: &[f64]) -> bool {
        fp.iter().all(|v| (0.0..=1.0).contains(v))
    }

    #[test]
    fn test_deterministic() {
        let payload = json!({"msg": "hello", "n": 3});
        let ctx = RecordContext::default();
        let a = compute(&payload, &ctx).unwrap();
        let b = compute(&payload, &ctx).unwrap();
        assert_eq!(a.len(), FINGERPRINT_LEN);
        assert_eq!(a, b);
    }

    #[test]
    fn test_key_order_does_not_matter() {
        let ctx = RecordContext::default();
        let a: Value = serde_json::from_str(r#"{"a":1,"b":2}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"b":2,"a":1}"#).unwrap();
        assert_eq!(compute(&a, &ctx).unwrap(), compute(&b, &ctx).unwrap());
    }

    #[test]
    fn test_first_element_matches_formula() {
        // angle 0: sin = 0, cos = 1
        let ctx = RecordContext::default();
        let fp = from_serialized("{", &ctx);
        let expected = 0.5 + f64::from(b'{') / 255.0 * 0.1;
        assert!((fp[0] - expected).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate_inputs_stay_bounded() {
        let ctx = RecordContext::default();
        assert!(in_bounds(&from_serialized("", &ctx)));
        assert!(in_bounds(&from_serialized("x", &ctx)));
        assert!(in_bounds(&from_serialized("日本語", &ctx)));

        let extreme = RecordContext {
            field1: 1e9,
            field2: 1e6,
            field3: -1e6,
        };
        assert!(in_bounds(&from_serialized("{\"a\":1}", &extreme)));

        let nan = RecordContext {
            field1: f64::NAN,
            field2: 0.5,
            field3: 0.5,
        };
        assert!(in_bounds(&from_serialized("{}", &nan)));
    }

    #[test]
    fn test_context_changes_fingerprint() {
        let payload = json!({"msg": "hello"});
        let a = compute(&payload, &RecordContext::default()).unwrap();
        let b = compute(
            &payload,
            &RecordContext {
                field1: 1.0,
                field2: 0.1,
                field3: 0.9,
            },
        )
        .unwrap();
        assert_ne!(a, b);
    }
}
