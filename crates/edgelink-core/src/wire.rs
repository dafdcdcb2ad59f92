//! Typed wire descriptors parsed from driver attributes.
//!
//! Profiles describe register-level access through free-form string
//! attributes. Those are parsed and validated exactly once, when a profile
//! enters the cache, so the dispatch hot path and the drivers work with
//! typed descriptors instead of string maps.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{SvcError, SvcResult};
use crate::models::DeviceResource;

/// Register table a resource lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrimaryTable {
    HoldingRegister,
    InputRegister,
    Coil,
    DiscreteInput,
}

impl PrimaryTable {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "HoldingRegister" => Some(Self::HoldingRegister),
            "InputRegister" => Some(Self::InputRegister),
            "Coil" => Some(Self::Coil),
            "DiscreteInput" => Some(Self::DiscreteInput),
            _ => None,
        }
    }
}

/// Value type as encoded on the wire, big-endian unless swapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WireType {
    Uint16,
    Int16,
    Uint32,
    Int32,
    Uint64,
    Int64,
    Float32,
    Float64,
    Bool,
    String,
    Array,
}

impl WireType {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "UINT16" => Some(Self::Uint16),
            "INT16" => Some(Self::Int16),
            "UINT32" => Some(Self::Uint32),
            "INT32" => Some(Self::Int32),
            "UINT64" => Some(Self::Uint64),
            "INT64" => Some(Self::Int64),
            "FLOAT32" => Some(Self::Float32),
            "FLOAT64" => Some(Self::Float64),
            "BOOL" => Some(Self::Bool),
            "STRING" => Some(Self::String),
            "ARRAY" => Some(Self::Array),
            _ => None,
        }
    }

    /// Payload width in bytes; `None` for string/array types whose length
    /// comes from the `Length` attribute.
    pub fn width(&self) -> Option<usize> {
        match self {
            Self::Uint16 | Self::Int16 | Self::Bool => Some(2),
            Self::Uint32 | Self::Int32 | Self::Float32 => Some(4),
            Self::Uint64 | Self::Int64 | Self::Float64 => Some(8),
            Self::String | Self::Array => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        !matches!(self, Self::Bool | Self::String | Self::Array)
    }
}

/// Typed register access descriptor for one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireSpec {
    pub table: PrimaryTable,
    pub address: u16,
    /// Number of 16-bit registers covered by one read.
    pub count: u16,
    pub value_type: WireType,
    pub byte_swap: bool,
    pub word_swap: bool,
}

impl WireSpec {
    /// Parse the wire descriptor out of a resource's attribute map.
    ///
    /// Returns `Ok(None)` when the resource carries no register attributes
    /// at all (non-register drivers); `Err` when they are present but
    /// malformed, which fails the profile load.
    pub fn from_resource(resource: &DeviceResource) -> SvcResult<Option<Self>> {
        let attrs = &resource.attributes;
        let Some(table) = attrs.get("PrimaryTable") else {
            return Ok(None);
        };
        let table = PrimaryTable::parse(table).ok_or_else(|| {
            SvcError::server(format!(
                "resource {}: invalid PrimaryTable {:?}",
                resource.name, table
            ))
        })?;

        let address = parse_attr::<u16>(attrs, "StartingAddress", &resource.name)?;

        let value_type = attrs
            .get("ValueType")
            .and_then(|s| WireType::parse(s))
            .ok_or_else(|| {
                SvcError::server(format!(
                    "resource {}: missing or invalid ValueType",
                    resource.name
                ))
            })?;

        let count = match value_type.width() {
            Some(bytes) => (bytes / 2) as u16,
            None => parse_attr::<u16>(attrs, "Length", &resource.name)?,
        };
        if count == 0 {
            return Err(SvcError::server(format!(
                "resource {}: zero register count",
                resource.name
            )));
        }

        Ok(Some(Self {
            table,
            address,
            count,
            value_type,
            byte_swap: flag_attr(attrs, "IsByteSwap"),
            word_swap: flag_attr(attrs, "IsWordSwap"),
        }))
    }

    /// Expected payload size in bytes.
    pub fn byte_len(&self) -> usize {
        self.count as usize * 2
    }
}

fn parse_attr<T: std::str::FromStr>(
    attrs: &HashMap<String, String>,
    key: &str,
    resource: &str,
) -> SvcResult<T> {
    attrs
        .get(key)
        .and_then(|s| s.trim().parse::<T>().ok())
        .ok_or_else(|| {
            SvcError::server(format!(
                "resource {}: missing or invalid {} attribute",
                resource, key
            ))
        })
}

fn flag_attr(attrs: &HashMap<String, String>, key: &str) -> bool {
    attrs
        .get(key)
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}
