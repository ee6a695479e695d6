//! Key layout.
//!
//! ```text
//! doc   \0 <coll> \0 <seq:u64be>                     -> JSON document
//! idx   \0 <coll> \0 <field> \0 <value> <seq:u64be>  -> ()
//! seq   \0 <coll>                                    -> next seq (u64be)
//! count \0 <coll>                                    -> document count (u64be)
//! index \0 <coll> \0 <field>                         -> () declared index
//! tmp   \0 <scratch:u64be> \0 <value>                -> JSON group key
//! ```
//!
//! `<value>` is an order-preserving encoding: null (or missing) sorts
//! before numbers, numbers before strings, strings before everything else.

use serde_json::Value;

const SEP: u8 = 0x00;

const TAG_NULL: u8 = 0x05;
const TAG_NUMBER: u8 = 0x10;
const TAG_STRING: u8 = 0x20;
const TAG_OTHER: u8 = 0x30;

fn with_parts(parts: &[&[u8]]) -> Vec<u8> {
    let mut key = Vec::new();
    for part in parts {
        key.extend_from_slice(part);
        key.push(SEP);
    }
    key
}

pub fn doc_prefix(collection: &str) -> Vec<u8> {
    with_parts(&[b"doc", collection.as_bytes()])
}

pub fn doc_key(collection: &str, seq: u64) -> Vec<u8> {
    let mut key = doc_prefix(collection);
    key.extend_from_slice(&seq.to_be_bytes());
    key
}

pub fn index_prefix(collection: &str, field: &str) -> Vec<u8> {
    with_parts(&[b"idx", collection.as_bytes(), field.as_bytes()])
}

pub fn index_value_prefix(collection: &str, field: &str, value: Option<&Value>) -> Vec<u8> {
    let mut key = index_prefix(collection, field);
    encode_value(value, &mut key);
    key
}

pub fn index_key(collection: &str, field: &str, value: Option<&Value>, seq: u64) -> Vec<u8> {
    let mut key = index_value_prefix(collection, field, value);
    key.extend_from_slice(&seq.to_be_bytes());
    key
}

pub fn seq_key(collection: &str) -> Vec<u8> {
    with_parts(&[b"seq", collection.as_bytes()])
}

pub fn count_key(collection: &str) -> Vec<u8> {
    with_parts(&[b"count", collection.as_bytes()])
}

pub fn declared_index_prefix() -> Vec<u8> {
    with_parts(&[b"index"])
}

pub fn declared_index_key(collection: &str, field: &str) -> Vec<u8> {
    with_parts(&[b"index", collection.as_bytes(), field.as_bytes()])
}

/// Split a declared index key back into collection and field.
pub fn parse_declared_index_key(key: &[u8]) -> Option<(String, String)> {
    let mut parts = key.split(|b| *b == SEP);
    if parts.next()? != b"index" {
        return None;
    }
    let collection = String::from_utf8(parts.next()?.to_vec()).ok()?;
    let field = String::from_utf8(parts.next()?.to_vec()).ok()?;
    Some((collection, field))
}

pub fn scratch_root() -> Vec<u8> {
    with_parts(&[b"tmp"])
}

pub fn scratch_prefix(scratch: u64) -> Vec<u8> {
    let mut key = scratch_root();
    key.extend_from_slice(&scratch.to_be_bytes());
    key.push(SEP);
    key
}

pub fn scratch_key(scratch: u64, value: Option<&Value>) -> Vec<u8> {
    let mut key = scratch_prefix(scratch);
    encode_value(value, &mut key);
    key
}

/// Smallest key greater than every key starting with `prefix`.
pub fn prefix_end(prefix: &[u8]) -> Vec<u8> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < u8::MAX {
            end.push(last + 1);
            return end;
        }
    }
    vec![u8::MAX; prefix.len() + 1]
}

pub fn decode_seq(bytes: &[u8]) -> Option<u64> {
    let tail: [u8; 8] = bytes.get(bytes.len().checked_sub(8)?..)?.try_into().ok()?;
    Some(u64::from_be_bytes(tail))
}

/// Numeric reading of a value, including extended JSON number wrappers.
fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Object(wrapper) if wrapper.len() == 1 => {
            let (key, inner) = wrapper.iter().next()?;
            match key.as_str() {
                "$numberInt" | "$numberLong" | "$numberDouble" => inner.as_str()?.parse().ok(),
                _ => None,
            }
        }
        _ => None,
    }
}

fn encode_f64(x: f64, out: &mut Vec<u8>) {
    let bits = x.to_bits();
    let ordered = if bits >> 63 == 1 { !bits } else { bits ^ (1 << 63) };
    out.extend_from_slice(&ordered.to_be_bytes());
}

fn encode_bytes(bytes: &[u8], out: &mut Vec<u8>) {
    for b in bytes {
        out.push(*b);
        if *b == SEP {
            out.push(0xFF);
        }
    }
    out.extend_from_slice(&[SEP, 0x01]);
}

/// Append the order-preserving encoding of `value`; `None` encodes like null.
pub fn encode_value(value: Option<&Value>, out: &mut Vec<u8>) {
    match value {
        None | Some(Value::Null) => out.push(TAG_NULL),
        Some(value) => {
            if let Some(x) = numeric(value) {
                out.push(TAG_NUMBER);
                encode_f64(x, out);
            } else if let Value::String(s) = value {
                out.push(TAG_STRING);
                encode_bytes(s.as_bytes(), out);
            } else {
                out.push(TAG_OTHER);
                encode_bytes(value.to_string().as_bytes(), out);
            }
        }
    }
}

pub fn encoded(value: Option<&Value>) -> Vec<u8> {
    let mut out = Vec::new();
    encode_value(value, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_value_order() {
        let ordered = [
            None,
            Some(json!(-5)),
            Some(json!(0)),
            Some(json!({"$numberInt": "3"})),
            Some(json!(4)),
            Some(json!({"$numberLong": "1000"})),
            Some(json!(70000000000u64)),
            Some(json!("")),
            Some(json!("a")),
            Some(json!("a\u{0}")),
            Some(json!("ab")),
            Some(json!({"x": 1})),
        ];
        for pair in ordered.windows(2) {
            assert!(
                encoded(pair[0].as_ref()) < encoded(pair[1].as_ref()),
                "{:?} < {:?}",
                pair[0],
                pair[1]
            );
        }
        assert_eq!(encoded(None), encoded(Some(&Value::Null)));
    }

    #[test]
    fn test_keys_do_not_collide_across_collections() {
        assert!(!doc_key("ab", 1).starts_with(&doc_prefix("a")));
        assert!(!index_key("a", "b", None, 1).starts_with(&index_prefix("a", "")));
    }

    #[test]
    fn test_declared_index_roundtrip_and_seq() {
        let key = declared_index_key("stateColl", "address");
        assert_eq!(
            parse_declared_index_key(&key),
            Some(("stateColl".to_string(), "address".to_string()))
        );
        assert_eq!(decode_seq(&doc_key("c", 42)), Some(42));
        assert_eq!(prefix_end(&[1, 2, 0xFF]), vec![1, 3]);
    }
}
