//! Payloads carried across the bus.

use serde::Serialize;

use crate::descriptor::DataType;
use crate::error::Result;
use crate::serialization::{Format, decode, encode};

/// A value handed to `publish` or delivered to a receive handler.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// UTF-8 text.
    Text(String),

    /// Opaque bytes.
    Bytes(Vec<u8>),

    /// Structured value; encoded with the bus [`Format`] on the wire.
    Json(serde_json::Value),
}

impl Payload {
    /// Build a JSON payload from any serializable value.
    pub fn json<T: Serialize>(value: &T) -> Result<Self> {
        Ok(Payload::Json(serde_json::to_value(value)?))
    }

    /// The data type this payload naturally carries.
    pub fn data_type(&self) -> DataType {
        match self {
            Payload::Text(_) => DataType::String,
            Payload::Bytes(_) => DataType::Bytes,
            Payload::Json(_) => DataType::Json,
        }
    }

    /// Short type name for diagnostics.
    pub fn type_name(&self) -> &'static str {
        self.data_type().as_str()
    }

    /// Encode for the wire.
    pub fn to_wire(&self, format: Format) -> Result<Vec<u8>> {
        match self {
            Payload::Text(s) => Ok(s.as_bytes().to_vec()),
            Payload::Bytes(b) => Ok(b.clone()),
            Payload::Json(v) => encode(v, format),
        }
    }

    /// Rebuild a payload from wire bytes according to the topic's declared type.
    ///
    /// `format` must be the format the sender encoded `Json` payloads with;
    /// it is never guessed from the data. The declared type is advisory:
    /// bytes that do not fit it are returned as [`Payload::Bytes`] rather
    /// than rejected.
    pub fn from_wire(data: &[u8], declared: DataType, format: Format) -> Self {
        match declared {
            DataType::Bytes => Payload::Bytes(data.to_vec()),
            DataType::String => match std::str::from_utf8(data) {
                Ok(s) => Payload::Text(s.to_string()),
                Err(e) => {
                    tracing::warn!(error = %e, "Text topic carried non UTF-8 data");
                    Payload::Bytes(data.to_vec())
                }
            },
            DataType::Json => match decode::<serde_json::Value>(data, format) {
                Ok(v) => Payload::Json(v),
                Err(e) => {
                    tracing::warn!(error = %e, format = ?format, "JSON topic carried undecodable data");
                    Payload::Bytes(data.to_vec())
                }
            },
        }
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Payload::Text(s)
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Payload::Text(s.to_string())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(b: Vec<u8>) -> Self {
        Payload::Bytes(b)
    }
}

impl From<&[u8]> for Payload {
    fn from(b: &[u8]) -> Self {
        Payload::Bytes(b.to_vec())
    }
}

impl From<serde_json::Value> for Payload {
    fn from(v: serde_json::Value) -> Self {
        Payload::Json(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_preserved_exactly() {
        let payload = Payload::from("hello");
        let wire = payload.to_wire(Format::Json).unwrap();
        assert_eq!(wire, b"hello");
        assert_eq!(Payload::from_wire(&wire, DataType::String, Format::Json), payload);
    }

    #[test]
    fn test_bytes_are_opaque() {
        let raw = vec![0u8, 159, 146, 150, 255];
        let payload = Payload::from(raw.clone());
        let wire = payload.to_wire(Format::Cbor).unwrap();
        assert_eq!(wire, raw);
        assert_eq!(Payload::from_wire(&wire, DataType::Bytes, Format::Cbor), payload);
    }

    #[test]
    fn test_json_over_cbor() {
        let payload = Payload::from(serde_json::json!({ "temp": 21.5, "ok": true }));
        let wire = payload.to_wire(Format::Cbor).unwrap();
        assert_eq!(Payload::from_wire(&wire, DataType::Json, Format::Cbor), payload);
    }

    #[test]
    fn test_cbor_scalars_decoded_with_sender_format() {
        // Single-byte CBOR negatives and short strings start with bytes that
        // also begin JSON documents.
        for value in [
            serde_json::json!(-20),
            serde_json::json!(-17),
            serde_json::json!(-3),
            serde_json::json!(-14),
            serde_json::json!("sixchr"),
            serde_json::json!("fourteen chars"),
            serde_json::json!("twenty characters!!!"),
            serde_json::json!(true),
            serde_json::json!(null),
        ] {
            let payload = Payload::Json(value);
            let wire = payload.to_wire(Format::Cbor).unwrap();
            assert_eq!(
                Payload::from_wire(&wire, DataType::Json, Format::Cbor),
                payload
            );
        }
    }

    #[test]
    fn test_json_scalars_round_trip() {
        for value in [serde_json::json!(-20), serde_json::json!("text"), serde_json::json!(3.5)] {
            let payload = Payload::Json(value);
            let wire = payload.to_wire(Format::Json).unwrap();
            assert_eq!(
                Payload::from_wire(&wire, DataType::Json, Format::Json),
                payload
            );
        }
    }

    #[test]
    fn test_mismatched_wire_falls_back_to_bytes() {
        let invalid_utf8 = [0xffu8, 0xfe];
        assert_eq!(
            Payload::from_wire(&invalid_utf8, DataType::String, Format::Json),
            Payload::Bytes(invalid_utf8.to_vec())
        );
        assert_eq!(
            Payload::from_wire(b"{broken", DataType::Json, Format::Json),
            Payload::Bytes(b"{broken".to_vec())
        );
    }

    #[test]
    fn test_data_type() {
        assert_eq!(Payload::from("x").data_type(), DataType::String);
        assert_eq!(Payload::from(vec![1u8]).type_name(), "bytes");
        assert_eq!(
            Payload::json(&vec![1, 2]).unwrap(),
            Payload::Json(serde_json::json!([1, 2]))
        );
    }
}
