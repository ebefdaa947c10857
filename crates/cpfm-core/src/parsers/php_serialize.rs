//! Decoder for PHP `serialize()` output
//!
//! Older senders stored `server_info` / `extra_details` as PHP-serialized
//! arrays. The decoder maps them onto `serde_json::Value` so the typed
//! projection in [`super::payload`] handles both encodings the same way.
//!
//! Supported tokens:
//! - `N;` null, `b:0;` bool, `i:42;` int, `d:1.5;` float
//! - `s:5:"hello";` string (length in bytes)
//! - `a:2:{...}` array, `O:8:"stdClass":2:{...}` object
//! - `r:1;` / `R:1;` back-references (decoded as null)
//!
//! Arrays whose keys are exactly `0..n` become JSON lists; anything else
//! becomes an object with stringified keys.

use crate::error::{CoreError, Result};
use serde_json::{Map, Number, Value};

/// Nesting limit; real payloads are three levels deep at most
const MAX_DEPTH: usize = 32;

/// Decode a complete PHP-serialized value
pub fn unserialize(input: &str) -> Result<Value> {
    let mut reader = Reader {
        bytes: input.trim().as_bytes(),
        pos: 0,
    };
    let value = reader.value(0)?;
    if reader.pos != reader.bytes.len() {
        return Err(reader.error("trailing data after value"));
    }
    Ok(value)
}

/// Cheap check used before attempting a full decode
pub fn looks_serialized(input: &str) -> bool {
    let trimmed = input.trim_start();
    if trimmed == "N;" {
        return true;
    }
    let mut chars = trimmed.chars();
    matches!(
        (chars.next(), chars.next()),
        (Some('a' | 'O' | 's' | 'i' | 'd' | 'b'), Some(':'))
    )
}

enum Key {
    Int(i64),
    Str(String),
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn error(&self, message: impl Into<String>) -> CoreError {
        CoreError::PayloadParse {
            offset: self.pos,
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn next(&mut self) -> Result<u8> {
        let byte = self
            .peek()
            .ok_or_else(|| self.error("unexpected end of input"))?;
        self.pos += 1;
        Ok(byte)
    }

    fn expect(&mut self, expected: u8) -> Result<()> {
        let found = self.next()?;
        if found != expected {
            self.pos -= 1;
            return Err(self.error(format!(
                "expected '{}', found '{}'",
                expected as char, found as char
            )));
        }
        Ok(())
    }

    /// Raw text up to (not including) `terminator`, which is consumed
    fn until(&mut self, terminator: u8) -> Result<&'a str> {
        let start = self.pos;
        let rel = self.bytes[start..]
            .iter()
            .position(|b| *b == terminator)
            .ok_or_else(|| self.error(format!("missing '{}'", terminator as char)))?;
        self.pos = start + rel + 1;
        std::str::from_utf8(&self.bytes[start..start + rel])
            .map_err(|_| self.error("invalid utf-8 in token"))
    }

    fn int_until(&mut self, terminator: u8) -> Result<i64> {
        let text = self.until(terminator)?;
        text.parse::<i64>()
            .map_err(|_| self.error(format!("invalid integer '{}'", text)))
    }

    fn len_until(&mut self, terminator: u8) -> Result<usize> {
        let n = self.int_until(terminator)?;
        usize::try_from(n).map_err(|_| self.error("negative length"))
    }

    /// `"<len bytes>"`
    fn quoted(&mut self, len: usize) -> Result<String> {
        self.expect(b'"')?;
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| self.error("string length exceeds input"))?;
        let text = String::from_utf8_lossy(&self.bytes[self.pos..end]).into_owned();
        self.pos = end;
        self.expect(b'"')?;
        Ok(text)
    }

    fn value(&mut self, depth: usize) -> Result<Value> {
        if depth > MAX_DEPTH {
            return Err(self.error("nesting too deep"));
        }

        match self.next()? {
            b'N' => {
                self.expect(b';')?;
                Ok(Value::Null)
            }
            b'b' => {
                self.expect(b':')?;
                Ok(Value::Bool(self.int_until(b';')? != 0))
            }
            b'i' => {
                self.expect(b':')?;
                Ok(Value::Number(self.int_until(b';')?.into()))
            }
            b'd' => {
                self.expect(b':')?;
                let text = self.until(b';')?;
                let parsed = text
                    .parse::<f64>()
                    .map_err(|_| self.error(format!("invalid float '{}'", text)))?;
                Ok(Number::from_f64(parsed)
                    .map(Value::Number)
                    .unwrap_or(Value::Null))
            }
            b's' => {
                self.expect(b':')?;
                let len = self.len_until(b':')?;
                let text = self.quoted(len)?;
                self.expect(b';')?;
                Ok(Value::String(text))
            }
            b'a' => {
                self.expect(b':')?;
                let count = self.len_until(b':')?;
                self.entries(count, depth)
            }
            b'O' => {
                self.expect(b':')?;
                let name_len = self.len_until(b':')?;
                let _class = self.quoted(name_len)?;
                self.expect(b':')?;
                let count = self.len_until(b':')?;
                match self.entries(count, depth)? {
                    Value::Array(items) => Ok(Value::Object(
                        items
                            .into_iter()
                            .enumerate()
                            .map(|(i, v)| (i.to_string(), v))
                            .collect(),
                    )),
                    other => Ok(other),
                }
            }
            b'r' | b'R' => {
                self.expect(b':')?;
                self.int_until(b';')?;
                Ok(Value::Null)
            }
            other => {
                self.pos -= 1;
                Err(self.error(format!("unknown type tag '{}'", other as char)))
            }
        }
    }

    /// `{key;value...}` with `count` pairs
    fn entries(&mut self, count: usize, depth: usize) -> Result<Value> {
        self.expect(b'{')?;
        let mut pairs = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            let key = match self.value(depth + 1)? {
                Value::Number(n) => match n.as_i64() {
                    Some(i) => Key::Int(i),
                    None => return Err(self.error("non-integer numeric key")),
                },
                Value::String(s) => Key::Str(s),
                _ => return Err(self.error("array key must be int or string")),
            };
            let value = self.value(depth + 1)?;
            pairs.push((key, value));
        }
        self.expect(b'}')?;

        let is_list = pairs
            .iter()
            .enumerate()
            .all(|(i, (key, _))| matches!(key, Key::Int(k) if *k == i as i64));

        if is_list {
            return Ok(Value::Array(pairs.into_iter().map(|(_, v)| v).collect()));
        }

        let mut map = Map::with_capacity(pairs.len());
        for (key, value) in pairs {
            let key = match key {
                Key::Int(i) => i.to_string(),
                Key::Str(s) => s,
            };
            map.insert(key, value);
        }
        Ok(Value::Object(map))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalars() {
        assert_eq!(unserialize("N;").unwrap(), Value::Null);
        assert_eq!(unserialize("b:1;").unwrap(), json!(true));
        assert_eq!(unserialize("i:-42;").unwrap(), json!(-42));
        assert_eq!(unserialize("d:8.1;").unwrap(), json!(8.1));
        assert_eq!(unserialize(r#"s:5:"hello";"#).unwrap(), json!("hello"));
    }

    #[test]
    fn test_string_length_is_bytes() {
        // "café" is 5 bytes in UTF-8
        assert_eq!(unserialize(r#"s:5:"café";"#).unwrap(), json!("café"));
        // embedded quotes and semicolons are fine inside the declared length
        assert_eq!(unserialize(r#"s:4:"a";b";"#).unwrap(), json!("a\";b"));
    }

    #[test]
    fn test_assoc_array_becomes_object() {
        let input = r#"a:2:{s:10:"wp_version";s:5:"6.4.2";s:11:"php_version";s:3:"8.1";}"#;
        assert_eq!(
            unserialize(input).unwrap(),
            json!({"wp_version": "6.4.2", "php_version": "8.1"})
        );
    }

    #[test]
    fn test_sequential_array_becomes_list() {
        let input = r#"a:2:{i:0;s:1:"a";i:1;s:1:"b";}"#;
        assert_eq!(unserialize(input).unwrap(), json!(["a", "b"]));
    }

    #[test]
    fn test_sparse_int_keys_become_object() {
        let input = r#"a:2:{i:0;s:1:"a";i:5;s:1:"b";}"#;
        assert_eq!(unserialize(input).unwrap(), json!({"0": "a", "5": "b"}));
    }

    #[test]
    fn test_nested_active_plugins() {
        let input = concat!(
            r#"a:1:{s:14:"active_plugins";a:1:{i:0;a:2:{"#,
            r#"s:4:"name";s:9:"Elementor";s:7:"version";s:6:"3.18.0";}}}"#
        );
        let value = unserialize(input).unwrap();
        assert_eq!(value["active_plugins"][0]["name"], json!("Elementor"));
    }

    #[test]
    fn test_object_token() {
        let input = r#"O:8:"stdClass":1:{s:4:"name";s:5:"Astra";}"#;
        assert_eq!(unserialize(input).unwrap(), json!({"name": "Astra"}));
    }

    #[test]
    fn test_truncated_input_is_error() {
        let err = unserialize(r#"a:2:{s:10:"wp_version";s:5:"6.4"#).unwrap_err();
        assert!(matches!(err, CoreError::PayloadParse { .. }));
        assert!(unserialize(r#"s:50:"short";"#).is_err());
        assert!(unserialize("i:1;garbage").is_err());
    }

    #[test]
    fn test_looks_serialized() {
        assert!(looks_serialized("a:1:{}"));
        assert!(looks_serialized("  s:0:\"\";"));
        assert!(looks_serialized("N;"));
        assert!(!looks_serialized("{\"a\":1}"));
        assert!(!looks_serialized("hello"));
    }
}
