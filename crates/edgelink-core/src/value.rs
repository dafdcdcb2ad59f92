//! Typed carrier for a single resource value.
//!
//! `CommandValue` is what drivers hand back for reads and what the
//! dispatcher hands to drivers for writes. Raw register payloads travel as
//! [`ValuePayload::Binary`] tagged with their wire type until the dispatch
//! transform maps them to the profile's declared result type.

use serde::{Deserialize, Serialize};

use crate::error::{SvcError, SvcResult};
use crate::models::ResourceKind;
use crate::wire::WireType;

/// Tagged value payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ValuePayload {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Raw bytes from a register read, not yet transformed.
    Binary { wire: WireType, bytes: Vec<u8> },
}

/// A single resource value with its production timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandValue {
    /// Name of the resource this value belongs to.
    pub resource: String,
    /// Unix milliseconds at which the value was produced.
    pub origin: i64,
    pub payload: ValuePayload,
}

impl CommandValue {
    pub fn new_bool(resource: impl Into<String>, origin: i64, value: bool) -> Self {
        Self {
            resource: resource.into(),
            origin,
            payload: ValuePayload::Bool(value),
        }
    }

    pub fn new_i64(resource: impl Into<String>, origin: i64, value: i64) -> Self {
        Self {
            resource: resource.into(),
            origin,
            payload: ValuePayload::Int(value),
        }
    }

    pub fn new_f64(resource: impl Into<String>, origin: i64, value: f64) -> Self {
        Self {
            resource: resource.into(),
            origin,
            payload: ValuePayload::Float(value),
        }
    }

    pub fn new_string(resource: impl Into<String>, origin: i64, value: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            origin,
            payload: ValuePayload::Str(value.into()),
        }
    }

    pub fn new_binary(
        resource: impl Into<String>,
        origin: i64,
        wire: WireType,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            resource: resource.into(),
            origin,
            payload: ValuePayload::Binary { wire, bytes },
        }
    }

    /// Parse a client-supplied string into a value of the declared kind.
    ///
    /// Integers accept an optional leading sign; floats accept decimal and
    /// exponent forms; booleans accept `true`/`false` in any case; strings
    /// pass through; Json payloads must parse as JSON and are carried
    /// verbatim.
    pub fn parse(
        resource: impl Into<String>,
        origin: i64,
        kind: ResourceKind,
        raw: &str,
    ) -> SvcResult<Self> {
        let resource = resource.into();
        let payload = match kind {
            ResourceKind::Integer => {
                let v: i64 = raw.trim().parse().map_err(|_| {
                    SvcError::bad_request(format!("{}: {:?} is not an integer", resource, raw))
                })?;
                ValuePayload::Int(v)
            }
            ResourceKind::Float => {
                let v: f64 = raw.trim().parse().map_err(|_| {
                    SvcError::bad_request(format!("{}: {:?} is not a float", resource, raw))
                })?;
                if !v.is_finite() {
                    return Err(SvcError::bad_request(format!(
                        "{}: non-finite float {:?}",
                        resource, raw
                    )));
                }
                ValuePayload::Float(v)
            }
            ResourceKind::Bool => match raw.trim().to_ascii_lowercase().as_str() {
                "true" => ValuePayload::Bool(true),
                "false" => ValuePayload::Bool(false),
                _ => {
                    return Err(SvcError::bad_request(format!(
                        "{}: {:?} is not a boolean",
                        resource, raw
                    )))
                }
            },
            ResourceKind::String => ValuePayload::Str(raw.to_string()),
            ResourceKind::Json => {
                serde_json::from_str::<serde_json::Value>(raw).map_err(|e| {
                    SvcError::bad_request(format!("{}: invalid json payload: {}", resource, e))
                })?;
                ValuePayload::Str(raw.to_string())
            }
        };
        Ok(Self {
            resource,
            origin,
            payload,
        })
    }

    /// Big-endian encoding of the numeric payload, 8 bytes wide.
    ///
    /// Wire encoders slice the tail that matches the target register width.
    pub fn numeric_value(&self) -> Option<[u8; 8]> {
        match &self.payload {
            ValuePayload::Int(v) => Some(v.to_be_bytes()),
            ValuePayload::Float(v) => Some(v.to_bits().to_be_bytes()),
            ValuePayload::Bool(v) => {
                let mut buf = [0u8; 8];
                buf[7] = *v as u8;
                Some(buf)
            }
            ValuePayload::Str(_) | ValuePayload::Binary { .. } => None,
        }
    }

    /// Render the value for a Core Data reading.
    pub fn value_string(&self) -> String {
        match &self.payload {
            ValuePayload::Bool(v) => v.to_string(),
            ValuePayload::Int(v) => v.to_string(),
            ValuePayload::Float(v) => v.to_string(),
            ValuePayload::Str(v) => v.clone(),
            ValuePayload::Binary { bytes, .. } => to_hex(bytes),
        }
    }
}

/// Lowercase hex rendering of raw bytes.
pub fn to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{:02x}", b);
    }
    out
}

/// Parse a hex string of 2n digits into bytes.
pub fn from_hex(s: &str) -> SvcResult<Vec<u8>> {
    let s = s.trim();
    if !s.is_ascii() {
        return Err(SvcError::bad_request(format!(
            "invalid hex payload {:?}",
            s
        )));
    }
    if s.len() % 2 != 0 {
        return Err(SvcError::bad_request(format!(
            "hex payload has odd length {}",
            s.len()
        )));
    }
    (0..s.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&s[i..i + 2], 16)
                .map_err(|_| SvcError::bad_request(format!("invalid hex payload {:?}", s)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_string_round_trip() {
        for (kind, raw) in [
            (ResourceKind::Integer, "300"),
            (ResourceKind::Integer, "-17"),
            (ResourceKind::Float, "23.75"),
            (ResourceKind::Bool, "true"),
            (ResourceKind::Bool, "false"),
            (ResourceKind::String, "CVM-C10"),
        ] {
            let cv = CommandValue::parse("R", 0, kind, raw).unwrap();
            assert_eq!(cv.value_string(), raw, "kind {:?}", kind);
        }
    }

    #[test]
    fn integer_accepts_leading_sign() {
        let cv = CommandValue::parse("R", 0, ResourceKind::Integer, "+42").unwrap();
        assert_eq!(cv.payload, ValuePayload::Int(42));
    }

    #[test]
    fn float_accepts_exponent_form() {
        let cv = CommandValue::parse("R", 0, ResourceKind::Float, "2.5e3").unwrap();
        assert_eq!(cv.payload, ValuePayload::Float(2500.0));
        assert!(CommandValue::parse("R", 0, ResourceKind::Float, "inf").is_err());
    }

    #[test]
    fn boolean_any_case() {
        for raw in ["true", "True", "TRUE"] {
            let cv = CommandValue::parse("R", 0, ResourceKind::Bool, raw).unwrap();
            assert_eq!(cv.payload, ValuePayload::Bool(true));
        }
        assert!(CommandValue::parse("R", 0, ResourceKind::Bool, "yes").is_err());
    }

    #[test]
    fn bad_scalars_are_bad_requests() {
        assert!(matches!(
            CommandValue::parse("R", 0, ResourceKind::Integer, "12.5"),
            Err(SvcError::BadRequest(_))
        ));
        assert!(matches!(
            CommandValue::parse("R", 0, ResourceKind::Json, "{not json"),
            Err(SvcError::BadRequest(_))
        ));
    }

    #[test]
    fn numeric_value_is_big_endian() {
        let cv = CommandValue::new_i64("R", 0, 300);
        assert_eq!(
            cv.numeric_value().unwrap(),
            [0, 0, 0, 0, 0, 0, 0x01, 0x2C]
        );

        let cv = CommandValue::new_f64("R", 0, 1.0);
        assert_eq!(cv.numeric_value().unwrap(), 1.0f64.to_bits().to_be_bytes());

        let cv = CommandValue::new_string("R", 0, "x");
        assert!(cv.numeric_value().is_none());
    }

    #[test]
    fn hex_codec() {
        assert_eq!(to_hex(&[0xDE, 0xAD, 0x01]), "dead01");
        assert_eq!(from_hex("dead01").unwrap(), vec![0xDE, 0xAD, 0x01]);
        assert!(from_hex("abc").is_err());
        assert!(from_hex("zz").is_err());
        assert!(from_hex("ßß").is_err());
    }
}
