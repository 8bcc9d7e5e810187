//! Flat argument codec for JavaScript call arguments.
//!
//! Each value is a one-byte tag followed by its body:
//!
//! | Tag | Value    | Body                        |
//! |-----|----------|-----------------------------|
//! | 0   | `null`   | none                        |
//! | 1   | `false`  | none                        |
//! | 2   | `true`   | none                        |
//! | 3   | number   | 8 bytes, f64 native-endian  |
//! | 4   | string   | UTF-8 bytes, then NUL       |
//!
//! Lists are plain concatenations. There is no nesting.

use crate::error::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Stack-allocated for up to 8 arguments (typical JS call).
pub type ArgumentList = SmallVec<[Argument; 8]>;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Null = 0,
    False = 1,
    True = 2,
    Number = 3,
    String = 4,
}

impl Tag {
    fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Tag::Null),
            1 => Some(Tag::False),
            2 => Some(Tag::True),
            3 => Some(Tag::Number),
            4 => Some(Tag::String),
            _ => None,
        }
    }
}

/// One JavaScript-compatible value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Argument {
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
}

impl Argument {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Argument::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Argument::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Argument::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// JSON form, as seen by page scripts.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Argument::Null => serde_json::Value::Null,
            Argument::Boolean(b) => serde_json::Value::Bool(*b),
            Argument::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Argument::String(s) => serde_json::Value::String(s.clone()),
        }
    }

    /// Append the wire encoding of this value to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) -> Result<()> {
        match self {
            Argument::Null => out.push(Tag::Null as u8),
            Argument::Boolean(false) => out.push(Tag::False as u8),
            Argument::Boolean(true) => out.push(Tag::True as u8),
            Argument::Number(n) => {
                out.push(Tag::Number as u8);
                out.extend_from_slice(&n.to_ne_bytes());
            }
            Argument::String(s) => {
                if let Some(pos) = s.bytes().position(|b| b == 0) {
                    return Err(BridgeError::malformed(
                        out.len() + 1 + pos,
                        "string argument contains NUL",
                    ));
                }
                out.push(Tag::String as u8);
                out.extend_from_slice(s.as_bytes());
                out.push(0);
            }
        }
        Ok(())
    }

    /// Decode one value starting at `*cursor`, advancing it past the value.
    pub fn decode(bytes: &[u8], cursor: &mut usize) -> Result<Self> {
        let start = *cursor;
        let tag_byte = *bytes
            .get(start)
            .ok_or_else(|| BridgeError::malformed(start, "missing tag byte"))?;
        let tag = Tag::from_u8(tag_byte)
            .ok_or_else(|| BridgeError::malformed(start, format!("unknown tag {tag_byte}")))?;
        let body = start + 1;

        let (value, end) = match tag {
            Tag::Null => (Argument::Null, body),
            Tag::False => (Argument::Boolean(false), body),
            Tag::True => (Argument::Boolean(true), body),
            Tag::Number => {
                let raw: [u8; 8] = bytes
                    .get(body..body + 8)
                    .and_then(|s| s.try_into().ok())
                    .ok_or_else(|| BridgeError::malformed(start, "number overruns buffer"))?;
                (Argument::Number(f64::from_ne_bytes(raw)), body + 8)
            }
            Tag::String => {
                let mut at = body;
                let s = take_cstr(bytes, &mut at)?;
                (Argument::String(s.to_owned()), at)
            }
        };

        *cursor = end;
        Ok(value)
    }
}

impl From<bool> for Argument {
    fn from(value: bool) -> Self {
        Argument::Boolean(value)
    }
}

impl From<f64> for Argument {
    fn from(value: f64) -> Self {
        Argument::Number(value)
    }
}

impl From<&str> for Argument {
    fn from(value: &str) -> Self {
        Argument::String(value.to_owned())
    }
}

impl From<String> for Argument {
    fn from(value: String) -> Self {
        Argument::String(value)
    }
}

/// Nested arrays and objects have no wire form; they travel as JSON text.
impl From<serde_json::Value> for Argument {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Argument::Null,
            serde_json::Value::Bool(b) => Argument::Boolean(b),
            serde_json::Value::Number(n) => Argument::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Argument::String(s),
            nested => Argument::String(nested.to_string()),
        }
    }
}

/// Concatenated encoding of every argument.
pub fn encode_all(args: &[Argument]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(args.len() * 9);
    for arg in args {
        arg.encode(&mut out)?;
    }
    Ok(out)
}

/// Decode values until the buffer is consumed exactly.
pub fn decode_all(bytes: &[u8]) -> Result<ArgumentList> {
    let mut cursor = 0;
    let mut args = ArgumentList::new();
    while cursor < bytes.len() {
        args.push(Argument::decode(bytes, &mut cursor)?);
    }
    Ok(args)
}

/// JSON array literal of `args`.
pub fn to_json_array(args: &[Argument]) -> String {
    serde_json::Value::Array(args.iter().map(Argument::to_json).collect()).to_string()
}

/// Read a NUL-terminated UTF-8 string at `*cursor`, leaving the cursor after the NUL.
pub(crate) fn take_cstr<'a>(bytes: &'a [u8], cursor: &mut usize) -> Result<&'a str> {
    let start = *cursor;
    let rest = bytes
        .get(start..)
        .ok_or_else(|| BridgeError::malformed(start, "string starts past end of buffer"))?;
    let len = rest
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| BridgeError::malformed(start, "unterminated string"))?;
    let s = std::str::from_utf8(&rest[..len])
        .map_err(|e| BridgeError::malformed(start + e.valid_up_to(), "invalid UTF-8"))?;
    *cursor = start + len + 1;
    Ok(s)
}

/// Append `s` plus a trailing NUL.
pub(crate) fn put_cstr(s: &str, out: &mut Vec<u8>) -> Result<()> {
    if let Some(pos) = s.bytes().position(|b| b == 0) {
        return Err(BridgeError::malformed(
            out.len() + pos,
            "string contains NUL",
        ));
    }
    out.extend_from_slice(s.as_bytes());
    out.push(0);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    #[test]
    fn test_mixed_list_roundtrip() {
        let args: ArgumentList = smallvec![
            Argument::Number(3.5),
            Argument::from("hi"),
            Argument::Boolean(true),
            Argument::Null,
        ];
        let bytes = encode_all(&args).unwrap();
        // 9 + 4 + 1 + 1
        assert_eq!(bytes.len(), 15);

        let decoded = decode_all(&bytes).unwrap();
        assert_eq!(decoded.len(), 4);
        assert_eq!(decoded[0], Argument::Number(3.5));
        assert_eq!(decoded[1].as_str(), Some("hi"));
        assert_eq!(decoded[2].as_bool(), Some(true));
        assert_eq!(decoded[3], Argument::Null);
    }

    #[test]
    fn test_booleans_use_distinct_tags() {
        let mut out = Vec::new();
        Argument::Boolean(false).encode(&mut out).unwrap();
        Argument::Boolean(true).encode(&mut out).unwrap();
        assert_eq!(out, vec![1, 2]);
    }

    #[test]
    fn test_decode_advances_cursor() {
        let bytes = encode_all(&[Argument::from("ab"), Argument::Number(-1.0)]).unwrap();
        let mut cursor = 0;
        Argument::decode(&bytes, &mut cursor).unwrap();
        assert_eq!(cursor, 4);
        Argument::decode(&bytes, &mut cursor).unwrap();
        assert_eq!(cursor, bytes.len());
    }

    #[test]
    fn test_empty_buffer_is_empty_list() {
        assert!(decode_all(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_truncated_number_is_malformed() {
        let mut bytes = encode_all(&[Argument::Number(1.25)]).unwrap();
        bytes.truncate(5);
        let err = decode_all(&bytes).unwrap_err();
        assert!(
            matches!(err, BridgeError::MalformedArgumentStream { offset: 0, .. }),
            "Expected MalformedArgumentStream, got {:?}",
            err
        );
    }

    #[test]
    fn test_unterminated_string_is_malformed() {
        let bytes = [4u8, b'a', b'b'];
        assert!(matches!(
            decode_all(&bytes),
            Err(BridgeError::MalformedArgumentStream { .. })
        ));
    }

    #[test]
    fn test_unknown_tag_is_malformed() {
        let bytes = [0u8, 7u8];
        match decode_all(&bytes) {
            Err(BridgeError::MalformedArgumentStream { offset, reason }) => {
                assert_eq!(offset, 1);
                assert!(reason.contains("unknown tag 7"));
            }
            other => panic!("Expected MalformedArgumentStream, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_utf8_is_malformed() {
        let bytes = [4u8, 0xff, 0xfe, 0];
        assert!(matches!(
            decode_all(&bytes),
            Err(BridgeError::MalformedArgumentStream { .. })
        ));
    }

    #[test]
    fn test_embedded_nul_rejected_on_encode() {
        let err = encode_all(&[Argument::from("a\0b")]).unwrap_err();
        assert!(matches!(err, BridgeError::MalformedArgumentStream { .. }));
    }

    #[test]
    fn test_special_floats_survive() {
        let bytes = encode_all(&[
            Argument::Number(f64::INFINITY),
            Argument::Number(-0.0),
        ])
        .unwrap();
        let decoded = decode_all(&bytes).unwrap();
        assert_eq!(decoded[0].as_f64(), Some(f64::INFINITY));
        assert!(decoded[1].as_f64().unwrap().is_sign_negative());
    }

    #[test]
    fn test_json_conversion() {
        let args = [
            Argument::Null,
            Argument::Boolean(false),
            Argument::Number(2.0),
            Argument::from("x\"y"),
        ];
        assert_eq!(to_json_array(&args), r#"[null,false,2.0,"x\"y"]"#);
    }

    #[test]
    fn test_nested_json_becomes_string() {
        let value: serde_json::Value = serde_json::json!({"a": [1, 2]});
        let arg = Argument::from(value);
        assert_eq!(arg.as_str(), Some(r#"{"a":[1,2]}"#));
    }

    #[test]
    fn test_take_cstr() {
        let bytes = b"console_log\0rest";
        let mut cursor = 0;
        assert_eq!(take_cstr(bytes, &mut cursor).unwrap(), "console_log");
        assert_eq!(cursor, 12);
    }
}
