//! Wire value transformation.
//!
//! Drivers that move raw register payloads hand them back as
//! `ValuePayload::Binary` tagged with the wire type; this module maps them
//! to the profile's declared result type, and encodes typed values back to
//! register bytes for writes.
//!
//! Swap policy: byte-swap exchanges adjacent bytes, word-swap exchanges
//! adjacent 16-bit words. Both are involutions and commute, so decode
//! followed by encode with the same flags is the identity.

use edgelink_core::models::{DeviceResource, ResourceKind};
use edgelink_core::value::{from_hex, to_hex, CommandValue, ValuePayload};
use edgelink_core::wire::{WireSpec, WireType};
use edgelink_core::{SvcError, SvcResult};

/// Apply the configured swaps to a register payload.
pub fn swap_bytes(data: &[u8], byte_swap: bool, word_swap: bool) -> Vec<u8> {
    let mut out = data.to_vec();
    if byte_swap {
        for chunk in out.chunks_exact_mut(2) {
            chunk.swap(0, 1);
        }
    }
    if word_swap {
        let mut i = 0;
        while i + 4 <= out.len() {
            out.swap(i, i + 2);
            out.swap(i + 1, i + 3);
            i += 4;
        }
    }
    out
}

/// Map a driver value to the resource's declared result type.
///
/// Binary payloads go through the full wire table; already-typed payloads
/// only take the widen/truncate leg.
pub fn decode(value: CommandValue, resource: &DeviceResource) -> SvcResult<CommandValue> {
    let CommandValue {
        resource: name,
        origin,
        payload,
    } = value;

    let kind = resource.value.kind;
    let payload = match payload {
        ValuePayload::Binary { wire, bytes } => decode_binary(&name, wire, &bytes, resource)?,
        other => coerce(&name, other, kind)?,
    };
    Ok(CommandValue {
        resource: name,
        origin,
        payload,
    })
}

fn decode_binary(
    name: &str,
    wire: WireType,
    bytes: &[u8],
    resource: &DeviceResource,
) -> SvcResult<ValuePayload> {
    let (byte_swap, word_swap) = swap_flags(resource);

    let decoded = match wire {
        WireType::Uint16 | WireType::Int16 | WireType::Uint32 | WireType::Int32
        | WireType::Uint64 | WireType::Int64 => {
            let data = checked(name, bytes, wire)?;
            let data = swap_bytes(&data, byte_swap, word_swap);
            ValuePayload::Int(decode_int(wire, &data))
        }
        WireType::Float32 | WireType::Float64 => {
            let data = checked(name, bytes, wire)?;
            let data = swap_bytes(&data, byte_swap, word_swap);
            ValuePayload::Float(decode_float(wire, &data))
        }
        WireType::Bool => ValuePayload::Bool(bytes.iter().any(|b| *b != 0)),
        WireType::String => ValuePayload::Str(
            bytes
                .iter()
                .filter(|b| (0x20..=0x7F).contains(*b))
                .map(|b| *b as char)
                .collect(),
        ),
        WireType::Array => ValuePayload::Str(to_hex(bytes)),
    };
    coerce(name, decoded, resource.value.kind).map(|payload| round(payload, resource))
}

/// Final leg of the mapping table: fit the decoded payload to the
/// profile's result type, widening integers and truncating floats.
fn coerce(name: &str, payload: ValuePayload, kind: ResourceKind) -> SvcResult<ValuePayload> {
    let payload = match (payload, kind) {
        (ValuePayload::Int(v), ResourceKind::Integer) => ValuePayload::Int(v),
        (ValuePayload::Int(v), ResourceKind::Float) => ValuePayload::Float(v as f64),
        (ValuePayload::Float(v), ResourceKind::Float) => ValuePayload::Float(v),
        (ValuePayload::Float(v), ResourceKind::Integer) => ValuePayload::Int(v.trunc() as i64),
        (ValuePayload::Bool(v), ResourceKind::Bool) => ValuePayload::Bool(v),
        (ValuePayload::Str(v), ResourceKind::String | ResourceKind::Json) => ValuePayload::Str(v),
        (payload, kind) => {
            return Err(SvcError::server(format!(
                "resource {}: driver produced {:?} but profile declares {:?}",
                name, payload, kind
            )))
        }
    };
    Ok(payload)
}

/// Round float results to the profile's precision, when declared.
fn round(payload: ValuePayload, resource: &DeviceResource) -> ValuePayload {
    match (payload, resource.value.precision) {
        (ValuePayload::Float(v), Some(precision)) if precision >= 0 => {
            let factor = 10f64.powi(precision);
            ValuePayload::Float((v * factor).round() / factor)
        }
        (payload, _) => payload,
    }
}

fn swap_flags(resource: &DeviceResource) -> (bool, bool) {
    let flag = |key: &str| {
        resource
            .attributes
            .get(key)
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    };
    (flag("IsByteSwap"), flag("IsWordSwap"))
}

fn checked(name: &str, bytes: &[u8], wire: WireType) -> SvcResult<Vec<u8>> {
    let width = wire.width().expect("numeric wire types have a width");
    if bytes.len() < width {
        return Err(SvcError::server(format!(
            "resource {}: short register payload, expected {} bytes got {}",
            name,
            width,
            bytes.len()
        )));
    }
    Ok(bytes[..width].to_vec())
}

fn decode_int(wire: WireType, data: &[u8]) -> i64 {
    match wire {
        WireType::Uint16 => u16::from_be_bytes([data[0], data[1]]) as i64,
        WireType::Int16 => i16::from_be_bytes([data[0], data[1]]) as i64,
        WireType::Uint32 => u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as i64,
        WireType::Int32 => i32::from_be_bytes([data[0], data[1], data[2], data[3]]) as i64,
        WireType::Uint64 => u64::from_be_bytes(data[..8].try_into().unwrap()) as i64,
        WireType::Int64 => i64::from_be_bytes(data[..8].try_into().unwrap()),
        _ => unreachable!("decode_int called with non-integer wire type"),
    }
}

fn decode_float(wire: WireType, data: &[u8]) -> f64 {
    match wire {
        WireType::Float32 => f32::from_be_bytes([data[0], data[1], data[2], data[3]]) as f64,
        WireType::Float64 => f64::from_be_bytes(data[..8].try_into().unwrap()),
        _ => unreachable!("decode_float called with non-float wire type"),
    }
}

/// Encode a typed value into register bytes for a write, honouring the
/// descriptor's width and swap flags.
pub fn encode(value: &CommandValue, spec: &WireSpec) -> SvcResult<Vec<u8>> {
    let bytes = match (&value.payload, spec.value_type) {
        (ValuePayload::Int(v), WireType::Uint16 | WireType::Int16) => {
            (*v as u16).to_be_bytes().to_vec()
        }
        (ValuePayload::Int(v), WireType::Uint32 | WireType::Int32) => {
            (*v as u32).to_be_bytes().to_vec()
        }
        (ValuePayload::Int(v), WireType::Uint64 | WireType::Int64) => {
            (*v as u64).to_be_bytes().to_vec()
        }
        (ValuePayload::Int(v), WireType::Float32) => (*v as f32).to_be_bytes().to_vec(),
        (ValuePayload::Int(v), WireType::Float64) => (*v as f64).to_be_bytes().to_vec(),
        (ValuePayload::Float(v), WireType::Float32) => (*v as f32).to_be_bytes().to_vec(),
        (ValuePayload::Float(v), WireType::Float64) => v.to_be_bytes().to_vec(),
        (ValuePayload::Float(v), WireType::Uint16 | WireType::Int16) => {
            (v.trunc() as i64 as u16).to_be_bytes().to_vec()
        }
        (ValuePayload::Float(v), WireType::Uint32 | WireType::Int32) => {
            (v.trunc() as i64 as u32).to_be_bytes().to_vec()
        }
        (ValuePayload::Float(v), WireType::Uint64 | WireType::Int64) => {
            (v.trunc() as i64 as u64).to_be_bytes().to_vec()
        }
        (ValuePayload::Bool(v), WireType::Bool) => vec![0, *v as u8],
        (ValuePayload::Str(v), WireType::String) => {
            let mut bytes = v.as_bytes().to_vec();
            if bytes.len() > spec.byte_len() {
                return Err(SvcError::bad_request(format!(
                    "resource {}: string longer than {} bytes",
                    value.resource,
                    spec.byte_len()
                )));
            }
            bytes.resize(spec.byte_len(), 0);
            bytes
        }
        (ValuePayload::Str(v), WireType::Array) => {
            let mut bytes = from_hex(v)?;
            if bytes.len() > spec.byte_len() {
                return Err(SvcError::bad_request(format!(
                    "resource {}: payload longer than {} registers",
                    value.resource, spec.count
                )));
            }
            bytes.resize(spec.byte_len(), 0);
            bytes
        }
        (payload, wire) => {
            return Err(SvcError::bad_request(format!(
                "resource {}: cannot write {:?} to {:?} register",
                value.resource, payload, wire
            )))
        }
    };

    if spec.value_type.is_numeric() {
        Ok(swap_bytes(&bytes, spec.byte_swap, spec.word_swap))
    } else {
        Ok(bytes)
    }
}
