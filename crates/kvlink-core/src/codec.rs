//! Value codec.
//!
//! The backend only stores strings. Structure is imposed here, at the
//! adapter boundary:
//!
//! - `encode` turns any value into the string that gets stored
//! - `decode` turns a stored string back into a value, falling back to the
//!   raw text when it is not JSON
//!
//! Neither direction fails. A string that happens to look like JSON (`"5"`,
//! `"true"`, `"[1]"`) comes back as the parsed value; the store keeps no
//! schema that could tell the two apart.

use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Encode a value into the string form held by the store.
pub fn encode(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => encode_with(other),
    }
}

/// Serialize anything to JSON, falling back to its `Display` form.
pub fn encode_with<T>(value: &T) -> String
where
    T: Serialize + fmt::Display + ?Sized,
{
    serde_json::to_string(value).unwrap_or_else(|_| value.to_string())
}

/// Decode a stored string. Anything that isn't JSON is returned as text.
pub fn decode(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Scalars pass through; everything else is replaced by its encoded string.
pub fn normalize(value: &Value) -> Value {
    if is_scalar(value) {
        value.clone()
    } else {
        Value::String(encode(value))
    }
}

fn is_scalar(value: &Value) -> bool {
    matches!(value, Value::String(_) | Value::Number(_) | Value::Bool(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalars_encode_as_text() {
        assert_eq!(encode(&json!("hello")), "hello");
        assert_eq!(encode(&json!(42)), "42");
        assert_eq!(encode(&json!(-1.5)), "-1.5");
        assert_eq!(encode(&json!(true)), "true");
    }

    #[test]
    fn structures_encode_as_json() {
        assert_eq!(encode(&json!({"a": 1})), r#"{"a":1}"#);
        assert_eq!(encode(&json!([1, "two", null])), r#"[1,"two",null]"#);
        assert_eq!(encode(&Value::Null), "null");
    }

    #[test]
    fn structured_values_survive_the_store() {
        let values = [
            json!({"a": 1, "nested": {"list": [1, 2, 3]}}),
            json!([true, false, {"k": "v"}]),
            json!(17),
            json!(2.25),
            json!(false),
        ];
        for v in values {
            assert_eq!(decode(&encode(&v)), v);
        }
    }

    #[test]
    fn plain_strings_are_opaque() {
        for s in ["hello", "hello world", "{not json", "a,b,c", ""] {
            assert_eq!(decode(&encode(&json!(s))), json!(s));
        }
    }

    #[test]
    fn json_looking_strings_do_not_round_trip() {
        assert_eq!(decode(&encode(&json!("5"))), json!(5));
        assert_eq!(decode(&encode(&json!("true"))), json!(true));
    }

    #[test]
    fn encode_with_falls_back_to_display() {
        struct Stubborn;

        impl Serialize for Stubborn {
            fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
                Err(serde::ser::Error::custom("cannot serialize"))
            }
        }

        impl fmt::Display for Stubborn {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("<stubborn>")
            }
        }

        assert_eq!(encode_with(&Stubborn), "<stubborn>");
    }

    #[test]
    fn normalize_stringifies_structures_only() {
        assert_eq!(normalize(&json!("x")), json!("x"));
        assert_eq!(normalize(&json!(3)), json!(3));
        assert_eq!(normalize(&json!({"a": 1})), json!(r#"{"a":1}"#));
        assert_eq!(normalize(&Value::Null), json!("null"));
    }
}
