//! Return-value encoding and argument decoding.
//!
//! Everything a keyword hands back goes through [`encode_return`] before it
//! reaches the transport. Text containing control characters that the wire
//! format cannot carry is re-encoded as a tagged binary blob.

use indexmap::IndexMap;

use crate::value::{Value, WireValue};

/// A value that cannot be made wire-safe. Aborts construction of the response.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EncodingError {
    #[error("Cannot represent {0:?} as binary.")]
    NotRepresentable(String),

    #[error("Cannot represent non-finite float {0} on the wire.")]
    NonFiniteFloat(f64),

    #[error("Mapping key {0:?} cannot be represented as text.")]
    InvalidKey(String),
}

/// True for 0x00-0x08, 0x0B, 0x0C and 0x0E-0x1F.
pub fn is_control_byte(byte: u8) -> bool {
    matches!(byte, 0x00..=0x08 | 0x0B | 0x0C | 0x0E..=0x1F)
}

pub fn contains_control_bytes(bytes: &[u8]) -> bool {
    bytes.iter().copied().any(is_control_byte)
}

/// Binary-safety check for text.
///
/// Text with control bytes becomes a binary blob, which requires every
/// character to fit in a single byte.
pub fn binary_safe_text(text: &str) -> Result<WireValue, EncodingError> {
    if !contains_control_bytes(text.as_bytes()) {
        return Ok(WireValue::Str(text.to_string()));
    }
    if !text.is_ascii() {
        return Err(EncodingError::NotRepresentable(text.to_string()));
    }
    Ok(WireValue::Binary(text.as_bytes().to_vec()))
}

/// Binary-safety check for raw bytes. Never fails: bytes without control
/// characters are decoded lossily.
pub fn binary_safe_bytes(bytes: &[u8]) -> WireValue {
    if contains_control_bytes(bytes) {
        WireValue::Binary(bytes.to_vec())
    } else {
        WireValue::Str(String::from_utf8_lossy(bytes).into_owned())
    }
}

/// String coercion: `None` is empty text, anything else uses its display form.
pub fn to_wire_string(value: &Value) -> Result<WireValue, EncodingError> {
    match value {
        Value::None => Ok(WireValue::empty()),
        Value::Str(text) => binary_safe_text(text),
        Value::Bytes(bytes) => Ok(binary_safe_bytes(bytes)),
        other => binary_safe_text(&other.to_string()),
    }
}

/// Recursively encode a keyword's return value.
pub fn encode_return(value: &Value) -> Result<WireValue, EncodingError> {
    match value {
        Value::Str(text) => binary_safe_text(text),
        Value::Bytes(bytes) => Ok(binary_safe_bytes(bytes)),
        Value::Bool(b) => Ok(WireValue::Bool(*b)),
        Value::Int(i) => Ok(WireValue::Int(*i)),
        Value::Float(x) if x.is_finite() => Ok(WireValue::Float(*x)),
        Value::Float(x) => Err(EncodingError::NonFiniteFloat(*x)),
        Value::Map(entries) => {
            let mut encoded = IndexMap::with_capacity(entries.len());
            for (key, item) in entries {
                encoded.insert(wire_key(key)?, encode_return(item)?);
            }
            Ok(WireValue::Map(encoded))
        }
        Value::List(items) => items
            .iter()
            .map(encode_return)
            .collect::<Result<_, _>>()
            .map(WireValue::List),
        Value::None | Value::Object(_) => to_wire_string(value),
    }
}

fn wire_key(key: &Value) -> Result<String, EncodingError> {
    match to_wire_string(key)? {
        WireValue::Str(text) => Ok(text),
        _ => Err(EncodingError::InvalidKey(key.to_string())),
    }
}

/// Inbound decoding: binary blobs become raw bytes, nothing else changes.
pub fn decode_argument(value: WireValue) -> Value {
    match value {
        WireValue::Binary(bytes) => Value::Bytes(bytes),
        WireValue::Str(s) => Value::Str(s),
        WireValue::Int(i) => Value::Int(i),
        WireValue::Float(x) => Value::Float(x),
        WireValue::Bool(b) => Value::Bool(b),
        WireValue::List(items) => Value::List(items.into_iter().map(decode_argument).collect()),
        WireValue::Map(entries) => Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (Value::Str(k), decode_argument(v)))
                .collect(),
        ),
    }
}

pub fn decode_arguments(
    args: Vec<WireValue>,
    kwargs: IndexMap<String, WireValue>,
) -> (Vec<Value>, IndexMap<String, Value>) {
    let args = args.into_iter().map(decode_argument).collect();
    let kwargs = kwargs
        .into_iter()
        .map(|(k, v)| (k, decode_argument(v)))
        .collect();
    (args, kwargs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_byte_ranges() {
        for byte in [0x00, 0x08, 0x0B, 0x0C, 0x0E, 0x1F] {
            assert!(is_control_byte(byte), "{byte:#04x}");
        }
        for byte in [b'\t', b'\n', b'\r', b' ', b'a', 0x7F, 0xFF] {
            assert!(!is_control_byte(byte), "{byte:#04x}");
        }
    }

    #[test]
    fn plain_text_stays_text() {
        assert_eq!(
            binary_safe_text("tab\tnewline\n").unwrap(),
            WireValue::from("tab\tnewline\n")
        );
        assert_eq!(binary_safe_text("hyvä").unwrap(), WireValue::from("hyvä"));
    }

    #[test]
    fn text_with_control_bytes_becomes_binary() {
        assert_eq!(
            binary_safe_text("a\x01b").unwrap(),
            WireValue::Binary(vec![b'a', 1, b'b'])
        );
    }

    #[test]
    fn non_ascii_text_with_control_bytes_fails() {
        let err = binary_safe_text("ä\x00").unwrap_err();
        assert_eq!(err, EncodingError::NotRepresentable("ä\x00".to_string()));
        assert!(err.to_string().starts_with("Cannot represent"));
    }

    #[test]
    fn invalid_utf8_bytes_decode_lossily() {
        assert_eq!(
            binary_safe_bytes(&[b'o', 0xFF, b'k']),
            WireValue::from("o\u{FFFD}k")
        );
    }

    #[test]
    fn binary_bytes_round_trip() {
        let original = vec![0x00, 0x01, 0xFF, b'x'];
        let encoded = encode_return(&Value::bytes(original.clone())).unwrap();
        assert!(encoded.is_binary());
        assert_eq!(decode_argument(encoded), Value::Bytes(original));
    }

    #[test]
    fn numbers_pass_through() {
        assert_eq!(encode_return(&Value::Int(-3)).unwrap(), WireValue::Int(-3));
        assert_eq!(encode_return(&Value::Float(1.5)).unwrap(), WireValue::Float(1.5));
        assert_eq!(encode_return(&Value::Bool(true)).unwrap(), WireValue::Bool(true));
    }

    #[test]
    fn non_finite_floats_fail() {
        assert!(matches!(
            encode_return(&Value::Float(f64::NAN)),
            Err(EncodingError::NonFiniteFloat(_))
        ));
        assert!(encode_return(&Value::List(vec![Value::Float(f64::INFINITY)])).is_err());
    }

    #[test]
    fn none_and_objects_become_text() {
        assert_eq!(encode_return(&Value::None).unwrap(), WireValue::empty());
        assert_eq!(
            encode_return(&Value::object("custom repr")).unwrap(),
            WireValue::from("custom repr")
        );
    }

    #[test]
    fn mappings_coerce_keys_and_recurse() {
        let value = Value::Map(vec![
            (Value::Int(1), Value::from("one")),
            (Value::None, Value::List(vec![Value::None, Value::bytes(*b"\x02")])),
        ]);
        let encoded = encode_return(&value).unwrap();

        let WireValue::Map(entries) = encoded else {
            panic!("expected a map");
        };
        assert_eq!(entries.get("1"), Some(&WireValue::from("one")));
        assert_eq!(
            entries.get(""),
            Some(&WireValue::List(vec![
                WireValue::empty(),
                WireValue::Binary(vec![2]),
            ]))
        );
    }

    #[test]
    fn binary_mapping_keys_fail() {
        let value = Value::Map(vec![(Value::from("\x01"), Value::Int(1))]);
        assert!(matches!(
            encode_return(&value),
            Err(EncodingError::InvalidKey(_))
        ));
    }

    #[test]
    fn decode_only_unwraps_binary() {
        let mut kwargs = IndexMap::new();
        kwargs.insert("blob".to_string(), WireValue::Binary(vec![7]));
        kwargs.insert("text".to_string(), WireValue::from("x"));

        let (args, kwargs) = decode_arguments(
            vec![WireValue::Int(1), WireValue::Binary(vec![0, 1])],
            kwargs,
        );

        assert_eq!(args, vec![Value::Int(1), Value::bytes(vec![0, 1])]);
        assert_eq!(kwargs["blob"], Value::bytes(vec![7]));
        assert_eq!(kwargs["text"], Value::from("x"));
    }
}
