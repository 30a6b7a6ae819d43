//! AMF0 boundary.
//!
//! `amf0::Value` is treated as a black box: callers only need to know how
//! many bytes a value occupies (to split a payload that may carry several
//! concatenated values, e.g. an Invoke's args) and how to decode a run of
//! them.

use amf::amf0::{self, Value};
use amf::Pair;

pub use amf::amf0::Value as Amf0Value;

/// Number of bytes `v` occupies when encoded, without re-encoding it.
pub fn byte_len(v: &Value) -> usize {
    match v {
        Value::Number(_) => 9,
        Value::Boolean(_) => 2,
        Value::String(s) => s.len() + 3,
        Value::Object { entries, .. } => {
            let mut len = 4;
            for en in entries {
                len += en.key.len() + 2;
                len += byte_len(&en.value);
            }
            len
        }
        Value::Null => 1,
        Value::Undefined => 1,
        // This server neither sends nor expects to receive these; kept
        // unimplemented the way `packet.rs::calc_amf_byte_len` left them.
        Value::EcmaArray { .. } => unimplemented!(),
        Value::Array { .. } => unimplemented!(),
        Value::Date { .. } => unimplemented!(),
        Value::XmlDocument(_) => unimplemented!(),
        Value::AvmPlus(_) => unimplemented!(),
    }
}

/// Decode every value packed back-to-back in `bytes` (an Invoke body is a
/// method name, a request id, then zero or more argument values).
pub fn read_all(bytes: &[u8]) -> anyhow::Result<Vec<Value>> {
    let mut read = 0;
    let mut values = Vec::new();
    if bytes.is_empty() {
        return Ok(values);
    }
    loop {
        let v = amf0::Value::read_from(&mut &bytes[read..])
            .map_err(|e| anyhow::anyhow!("AMF decode failed at offset {}: {}", read, e))?;
        read += byte_len(&v);
        values.push(v);
        if read >= bytes.len() {
            break;
        }
    }
    Ok(values)
}

/// Encode a run of values back-to-back, e.g. an Invoke's name/id/args.
pub fn write_all(values: &[Value]) -> Vec<u8> {
    let mut out = Vec::new();
    for v in values {
        v.write_to(&mut out).expect("writing to a Vec never fails");
    }
    out
}

/// Build the AMF0 object a `Status` reply serializes as: a fixed `code`,
/// `level` and `description`, plus any extra key/value pairs the caller
/// supplied.
pub fn status_object(level: &str, code: &str, description: &str, extra: &[(String, Value)]) -> Value {
    let mut entries = vec![
        Pair {
            key: "level".to_string(),
            value: Value::String(level.to_string()),
        },
        Pair {
            key: "code".to_string(),
            value: Value::String(code.to_string()),
        },
        Pair {
            key: "description".to_string(),
            value: Value::String(description.to_string()),
        },
    ];
    for (k, v) in extra {
        entries.push(Pair {
            key: k.clone(),
            value: v.clone(),
        });
    }
    Value::Object {
        class_name: None,
        entries,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_len_matches_write_to_len_for_simple_values() {
        let mut buf = Vec::new();
        let v = Value::Number(42.0);
        v.write_to(&mut buf).unwrap();
        assert_eq!(byte_len(&v), buf.len());
    }

    #[test]
    fn read_all_splits_concatenated_values() {
        let values = vec![
            Value::String("connect".to_string()),
            Value::Number(1.0),
        ];
        let bytes = write_all(&values);
        let decoded = read_all(&bytes).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0], Value::String("connect".to_string()));
        assert_eq!(decoded[1], Value::Number(1.0));
    }

    #[test]
    fn status_object_carries_extra_fields() {
        let obj = status_object(
            "status",
            "NetConnection.Connect.Success",
            "Connect OK",
            &[("application".to_string(), Value::String("hall".to_string()))],
        );
        match obj {
            Value::Object { entries, .. } => assert_eq!(entries.len(), 4),
            _ => panic!("expected object"),
        }
    }
}
