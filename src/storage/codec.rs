//! Value Codec
//!
//! Serializes a [`Value`] to bytes for engines that can only store a
//! fixed column type or a byte string (Redis, memcached, SQL tables).
//!
//! The encoding is JSON with an adjacent `type`/`value` tag on every
//! node, so the exact variant survives the round trip:
//!
//! ```text
//! Value::Map({"uid": I64(7)})
//!   => {"type":"map","value":{"uid":{"type":"i64","value":7}}}
//! ```

use crate::error::Result;
use crate::storage::Value;

/// Encodes a value to bytes.
pub fn encode(value: &Value) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

/// Decodes bytes produced by [`encode`].
pub fn decode(data: &[u8]) -> Result<Value> {
    Ok(serde_json::from_slice(data)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use bytes::Bytes;

    #[test]
    fn test_encoding_is_tagged_json() {
        let encoded = encode(&Value::map([("uid", 7i64)])).unwrap();
        assert_eq!(
            std::str::from_utf8(&encoded).unwrap(),
            r#"{"type":"map","value":{"uid":{"type":"i64","value":7}}}"#
        );
    }

    #[test]
    fn test_variants_survive() {
        let original = Value::Seq(vec![
            Value::Nil,
            Value::U8(255),
            Value::I16(-12),
            Value::F32(0.5),
            Value::Bytes(Bytes::from_static(b"\x00\xffdoe")),
            Value::Str("john".to_string()),
        ]);

        let decoded = decode(&encode(&original).unwrap()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_non_finite_floats_survive() {
        let encoded = encode(&Value::F64(f64::NEG_INFINITY)).unwrap();
        assert_eq!(
            std::str::from_utf8(&encoded).unwrap(),
            r#"{"type":"f64","value":"-inf"}"#
        );
        assert_eq!(decode(&encoded).unwrap(), Value::F64(f64::NEG_INFINITY));

        let inf = decode(&encode(&Value::F32(f32::INFINITY)).unwrap()).unwrap();
        assert_eq!(inf, Value::F32(f32::INFINITY));

        match decode(&encode(&Value::F64(f64::NAN)).unwrap()).unwrap() {
            Value::F64(n) => assert!(n.is_nan()),
            other => panic!("unexpected {:?}", other),
        }
        match decode(&encode(&Value::F32(f32::NAN)).unwrap()).unwrap() {
            Value::F32(n) => assert!(n.is_nan()),
            other => panic!("unexpected {:?}", other),
        }

        assert!(decode(br#"{"type":"f64","value":"lots"}"#).is_err());
    }

    #[test]
    fn test_decode_garbage() {
        let err = decode(b"not json").unwrap_err();
        assert!(matches!(err, StorageError::Serialization(_)));
    }
}
