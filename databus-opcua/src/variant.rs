//! Payload and `Variant` conversion.
//!
//! OPC-UA nodes carry text: `Text` is written as a string, `Json` as its
//! serialized text. Raw bytes are not marshalled.

use opcua::types::{UAString, Variant};

use databus_common::{DataType, Error, Payload, Result};

/// Payload types this transport can write.
pub const ACCEPTED: &[DataType] = &[DataType::String, DataType::Json];

pub fn to_variant(payload: &Payload) -> Result<Variant> {
    let text = match payload {
        Payload::Text(s) => s.clone(),
        Payload::Json(v) => serde_json::to_string(v)?,
        Payload::Bytes(_) => {
            return Err(Error::TypeMismatch {
                transport: "opcua",
                actual: payload.type_name(),
            });
        }
    };
    Ok(Variant::String(UAString::from(text)))
}

/// Wire bytes of a received value, or `None` for values with no text form.
pub fn to_bytes(variant: &Variant) -> Option<Vec<u8>> {
    let text = match variant {
        Variant::String(s) => s.as_ref().to_string(),
        Variant::ByteString(b) => return b.value.clone(),
        Variant::Boolean(v) => v.to_string(),
        Variant::SByte(v) => v.to_string(),
        Variant::Byte(v) => v.to_string(),
        Variant::Int16(v) => v.to_string(),
        Variant::UInt16(v) => v.to_string(),
        Variant::Int32(v) => v.to_string(),
        Variant::UInt32(v) => v.to_string(),
        Variant::Int64(v) => v.to_string(),
        Variant::UInt64(v) => v.to_string(),
        Variant::Float(v) => v.to_string(),
        Variant::Double(v) => v.to_string(),
        _ => return None,
    };
    Some(text.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_and_json_become_strings() {
        assert_eq!(
            to_variant(&Payload::from("hello")).unwrap(),
            Variant::String(UAString::from("hello"))
        );
        assert_eq!(
            to_variant(&Payload::Json(serde_json::json!({"a": 1}))).unwrap(),
            Variant::String(UAString::from(r#"{"a":1}"#))
        );
    }

    #[test]
    fn test_bytes_rejected() {
        let err = to_variant(&Payload::from(vec![1u8, 2, 3])).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { transport: "opcua", .. }));
    }

    #[test]
    fn test_received_values() {
        assert_eq!(
            to_bytes(&Variant::String(UAString::from("hello"))),
            Some(b"hello".to_vec())
        );
        assert_eq!(to_bytes(&Variant::Int32(-7)), Some(b"-7".to_vec()));
        assert_eq!(to_bytes(&Variant::Boolean(true)), Some(b"true".to_vec()));
        assert_eq!(to_bytes(&Variant::Empty), None);
    }
}
