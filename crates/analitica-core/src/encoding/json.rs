//! JSON Lines encoding of scanned items.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bigdecimal::{BigDecimal, ToPrimitive};
use bytes::Bytes;
use serde_json::{Map, Number, Value};

use super::{EncodingError, JSONL_CONTENT_TYPE};
use crate::item::{AttrValue, Item};

/// JSON Lines encoding - one compact object per line, no trailing newline.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonLines;

impl JsonLines {
    pub const fn content_type(&self) -> &'static str {
        JSONL_CONTENT_TYPE
    }

    /// Encode all items into a single body. Zero items give an empty body.
    pub fn encode(&self, items: &[Item]) -> Result<Bytes, EncodingError> {
        let mut buf = Vec::with_capacity(items.len() * 128);
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                buf.push(b'\n');
            }
            serde_json::to_writer(&mut buf, &item_to_json(item))?;
        }
        Ok(Bytes::from(buf))
    }
}

/// Convert one item to a JSON object with sorted keys.
pub fn item_to_json(item: &Item) -> Value {
    let map: Map<String, Value> = item
        .iter()
        .map(|(k, v)| (k.clone(), attr_to_json(v)))
        .collect();
    Value::Object(map)
}

/// Integer when integral, `f64` otherwise.
pub fn normalize_number(n: &BigDecimal) -> Value {
    if n.with_scale(0) == *n {
        if let Some(i) = n.to_i64() {
            return Value::from(i);
        }
        if let Some(u) = n.to_u64() {
            return Value::from(u);
        }
    }
    // parse the canonical text so the float is correctly rounded;
    // non-finite results have no JSON form
    n.to_string()
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

fn attr_to_json(v: &AttrValue) -> Value {
    match v {
        AttrValue::String(s) => Value::String(s.clone()),
        AttrValue::Number(n) => normalize_number(n),
        AttrValue::Binary(b) => Value::String(STANDARD.encode(b)),
        AttrValue::Bool(b) => Value::Bool(*b),
        AttrValue::Null => Value::Null,
        AttrValue::List(items) => {
            Value::Array(items.iter().map(attr_to_json).collect())
        }
        AttrValue::Map(m) => item_to_json(m),
        // sets are unordered at the source; sort so output is stable
        AttrValue::StringSet(set) => {
            let mut sorted: Vec<&String> = set.iter().collect();
            sorted.sort();
            Value::Array(
                sorted.into_iter().map(|s| Value::String(s.clone())).collect(),
            )
        }
        AttrValue::NumberSet(set) => {
            let mut sorted: Vec<&BigDecimal> = set.iter().collect();
            sorted.sort();
            Value::Array(sorted.into_iter().map(normalize_number).collect())
        }
        AttrValue::BinarySet(set) => {
            let mut sorted: Vec<&Vec<u8>> = set.iter().collect();
            sorted.sort();
            Value::Array(
                sorted
                    .into_iter()
                    .map(|b| Value::String(STANDARD.encode(b)))
                    .collect(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::item;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::str::FromStr;

    fn dec(raw: &str) -> BigDecimal {
        BigDecimal::from_str(raw).unwrap()
    }

    #[test]
    fn integral_decimals_become_integers() {
        for (raw, expected) in [
            ("42", "42"),
            ("-7", "-7"),
            ("5.000", "5"),
            ("1E+3", "1000"),
            ("0", "0"),
            ("18446744073709551615", "18446744073709551615"),
        ] {
            let v = normalize_number(&dec(raw));
            assert!(v.is_i64() || v.is_u64(), "{raw} -> {v}");
            assert_eq!(v.to_string(), expected);
        }
    }

    #[test]
    fn fractional_decimals_become_floats() {
        for raw in ["0.5", "-12.25", "3.14159", "1E-7"] {
            let v = normalize_number(&dec(raw));
            assert!(v.is_f64(), "{raw} -> {v}");
        }
    }

    #[test]
    fn floats_round_trip_within_f64_precision() {
        for raw in ["0.1", "2.5", "-1234.5678", "99.99"] {
            let v = normalize_number(&dec(raw));
            let reparsed: f64 = v.to_string().parse().unwrap();
            assert_eq!(reparsed, raw.parse::<f64>().unwrap());
        }
    }

    #[test]
    fn integers_past_u64_fall_back_to_float() {
        let v = normalize_number(&dec("123456789012345678901234567890"));
        assert!(v.is_f64());
    }

    #[test]
    fn encodes_nested_values() {
        let it = item([
            ("id", AttrValue::from("inc-1")),
            ("piso", AttrValue::number("3").unwrap()),
            ("lat", AttrValue::number("-12.0845").unwrap()),
            ("urgente", AttrValue::from(true)),
            ("asignado", AttrValue::Null),
            (
                "historial",
                AttrValue::List(vec![AttrValue::Map(item([(
                    "estado",
                    AttrValue::from("reportado"),
                )]))]),
            ),
            ("raw", AttrValue::Binary(b"hi".to_vec())),
            (
                "tags",
                AttrValue::StringSet(vec!["b".into(), "a".into()]),
            ),
            (
                "pisos",
                AttrValue::NumberSet(vec![dec("10"), dec("2.5")]),
            ),
        ]);

        assert_eq!(
            item_to_json(&it),
            json!({
                "asignado": null,
                "historial": [{"estado": "reportado"}],
                "id": "inc-1",
                "lat": -12.0845,
                "piso": 3,
                "pisos": [2.5, 10],
                "raw": "aGk=",
                "tags": ["a", "b"],
                "urgente": true
            })
        );
    }

    #[test]
    fn jsonl_has_one_line_per_item_without_trailing_newline() {
        let items: Vec<Item> = (0..3)
            .map(|i| item([("n", AttrValue::from(i as i64))]))
            .collect();

        let body = JsonLines.encode(&items).unwrap();
        let text = std::str::from_utf8(&body).unwrap();

        assert_eq!(text, "{\"n\":0}\n{\"n\":1}\n{\"n\":2}");
    }

    #[test]
    fn empty_table_encodes_to_empty_body() {
        assert!(JsonLines.encode(&[]).unwrap().is_empty());
    }

    #[test]
    fn non_ascii_text_is_kept_verbatim() {
        let it = item([("descripcion", AttrValue::from("Fuga de agua en baño"))]);
        let body = JsonLines.encode(&[it]).unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("baño"), "{text}");
    }

    #[test]
    fn encoding_is_deterministic() {
        let it = item([
            ("b", AttrValue::StringSet(vec!["y".into(), "x".into()])),
            ("a", AttrValue::number("1.5").unwrap()),
        ]);
        let first = JsonLines.encode(std::slice::from_ref(&it)).unwrap();
        let second = JsonLines.encode(&[it]).unwrap();
        assert_eq!(first, second);
        assert_eq!(&first[..], br#"{"a":1.5,"b":["x","y"]}"#);
    }
}
