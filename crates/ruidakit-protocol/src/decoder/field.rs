//! Parameter sub-decoder
//!
//! Accumulates the bytes of a single field and converts them once the field
//! is complete. Fixed-width kinds complete after their byte count, strings at
//! the terminating zero, and TBD fields at the end of the reply packet or
//! when the caller flushes them.

use crate::codec;
use crate::tables::{self, AddressTable, FieldKind, FieldSpec};
use serde::Serialize;
use std::fmt;

/// A decoded parameter value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Uint(u64),
    /// Millimetres, percent, mm/s, kHz or ms depending on the field
    Float(f64),
    Bool(bool),
    Text(String),
    /// Memory or index address
    Address(u16),
    /// Raw bytes of a field with unknown layout
    Bytes(Vec<u8>),
}

impl ParamValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            Self::Uint(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Uint(v) => Some(*v),
            Self::Int(v) if *v >= 0 => Some(*v as u64),
            Self::Address(a) => Some(u64::from(*a)),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{}", v),
            Self::Uint(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{:.3}", v),
            Self::Bool(v) => write!(f, "{}", v),
            Self::Text(s) => write!(f, "{}", s),
            Self::Address(a) => write!(f, "{:04X}", a),
            Self::Bytes(b) => write!(f, "{}", codec::hex_string(b)),
        }
    }
}

/// A completed field: its value and how it prints
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedField {
    pub spec: FieldSpec,
    pub value: ParamValue,
    pub text: String,
}

#[derive(Debug, Clone)]
pub(crate) struct FieldDecoder {
    spec: FieldSpec,
    data: Vec<u8>,
}

impl FieldDecoder {
    pub(crate) fn new(spec: FieldSpec) -> Self {
        Self {
            spec,
            data: Vec::new(),
        }
    }

    pub(crate) fn is_open_ended(&self) -> bool {
        self.spec.kind == FieldKind::Tbd
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Feed one data byte
    ///
    /// `remaining` is the number of bytes left in the current packet after
    /// this one, when known.
    pub(crate) fn push(&mut self, datum: u8, remaining: Option<usize>) -> Option<DecodedField> {
        match self.spec.kind {
            FieldKind::CString => {
                if datum == 0 {
                    return Some(self.finish());
                }
                self.data.push(datum);
                None
            }
            FieldKind::Tbd => {
                self.data.push(datum);
                if remaining == Some(0) {
                    Some(self.finish())
                } else {
                    None
                }
            }
            kind => {
                self.data.push(datum);
                match kind.byte_count() {
                    Some(n) if self.data.len() >= n => Some(self.finish()),
                    _ => None,
                }
            }
        }
    }

    /// Convert whatever has been accumulated
    pub(crate) fn finish(&mut self) -> DecodedField {
        let data = std::mem::take(&mut self.data);
        let (value, text) = convert(self.spec, &data);
        DecodedField {
            spec: self.spec,
            value,
            text,
        }
    }
}

fn address_of(data: &[u8]) -> u16 {
    let hi = data.first().copied().unwrap_or(0);
    let lo = data.get(1).copied().unwrap_or(0);
    (u16::from(hi) << 8) | u16::from(lo)
}

fn string8(data: &[u8]) -> String {
    let (a, b) = data.split_at(data.len().min(5));
    let mut bytes = Vec::with_capacity(8);
    for half in [a, b] {
        let packed = codec::decode_uint(half) as u32;
        bytes.extend_from_slice(&packed.to_be_bytes());
    }
    String::from_utf8_lossy(&bytes)
        .trim_end_matches('\0')
        .to_string()
}

fn convert(spec: FieldSpec, data: &[u8]) -> (ParamValue, String) {
    let prefix = spec.prefix;
    match spec.kind {
        FieldKind::Int7 | FieldKind::Int14 | FieldKind::Int35 => {
            let v = codec::decode_int(data);
            (ParamValue::Int(v), format!("{}{}", prefix, v))
        }
        FieldKind::Uint7 | FieldKind::Uint14 | FieldKind::Uint35 => {
            let v = codec::decode_uint(data);
            (ParamValue::Uint(v), format!("{}{}", prefix, v))
        }
        FieldKind::Hex7 | FieldKind::Hex14 | FieldKind::Hex35 => {
            let v = codec::decode_uint(data);
            let width = data.len().max(1) * 2;
            (
                ParamValue::Uint(v),
                format!("{}0x{:0width$X}", prefix, v, width = width),
            )
        }
        FieldKind::Bool => {
            let v = data.first().is_some_and(|&b| b != 0);
            (ParamValue::Bool(v), format!("{}{}", prefix, v))
        }
        FieldKind::Switch => {
            let v = data.first().is_some_and(|&b| b != 0);
            let state = if v { "ON" } else { "OFF" };
            (ParamValue::Bool(v), format!("{}{}", prefix, state))
        }
        FieldKind::CString => {
            let s = String::from_utf8_lossy(data).to_string();
            let text = format!("{}{}", prefix, s);
            (ParamValue::Text(s), text)
        }
        FieldKind::String8 => {
            let s = string8(data);
            let text = format!("{}\"{}\"", prefix, s);
            (ParamValue::Text(s), text)
        }
        FieldKind::Rapid => {
            let code = data.first().copied().unwrap_or(0);
            let name = tables::RAPID_OPTIONS
                .iter()
                .find(|(k, _)| *k == code)
                .map(|(_, n)| (*n).to_string())
                .unwrap_or_else(|| format!("RAPID_0x{:02X}", code));
            let text = format!("{}{}", prefix, name);
            (ParamValue::Text(name), text)
        }
        FieldKind::Color => {
            let v = codec::decode_uint(data);
            (ParamValue::Uint(v), format!("{}#{:06X}", prefix, v))
        }
        FieldKind::Coord | FieldKind::RelCoord => {
            let v = codec::decode_coord(data);
            (ParamValue::Float(v), format!("{}{:.3}mm", prefix, v))
        }
        FieldKind::Power => {
            let v = codec::decode_power(data);
            (ParamValue::Float(v), format!("{}{:.1}%", prefix, v))
        }
        FieldKind::Speed => {
            let v = codec::decode_int(data) as f64 / 1000.0;
            (ParamValue::Float(v), format!("{}{:.3}mm/s", prefix, v))
        }
        FieldKind::Frequency => {
            let v = codec::decode_int(data) as f64 / 1000.0;
            (ParamValue::Float(v), format!("{}{:.3}kHz", prefix, v))
        }
        FieldKind::Time => {
            let v = codec::decode_int(data) as f64 / 1000.0;
            (ParamValue::Float(v), format!("{}{:.3}ms", prefix, v))
        }
        FieldKind::CardId => {
            let id = codec::decode_uint(data);
            let name = tables::card_name(id)
                .map(str::to_string)
                .unwrap_or_else(|| format!("Unknown: 0x{:08X}", id));
            let text = format!("{}{}", prefix, name);
            (ParamValue::Text(name), text)
        }
        FieldKind::Memory | FieldKind::Index => {
            let table = if spec.kind == FieldKind::Memory {
                AddressTable::Memory
            } else {
                AddressTable::Index
            };
            let address = address_of(data);
            let label = table
                .lookup(address)
                .map(|e| e.label)
                .unwrap_or(tables::UNKNOWN_ADDRESS.label);
            (
                ParamValue::Address(address),
                format!("{}{:04X}:{}", prefix, address, label),
            )
        }
        FieldKind::FileSum => {
            let v = codec::decode_uint(data);
            (
                ParamValue::Uint(v),
                format!("{}0x{:010X} ({})", prefix, v, v),
            )
        }
        FieldKind::Tbd => {
            let text = format!("{}{}", prefix, codec::hex_string(data));
            (ParamValue::Bytes(data.to_vec()), text)
        }
    }
}
