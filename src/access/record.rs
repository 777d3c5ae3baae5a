use anyhow::{anyhow, bail, Result};
use byteorder::{ByteOrder, LittleEndian};

use super::schema::{DataType, Schema};
use crate::storage::PageNumber;

/// Tombstone marker of a free slot.
pub const TOMBSTONE_FREE: u8 = 0x00;

/// Tombstone marker of an occupied slot.
pub const TOMBSTONE_OCCUPIED: u8 = 0x01;

/// Identifies a record slot: which heap page it lives on and which slot
/// within that page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordId {
    pub page: PageNumber,
    pub slot: usize,
}

/// A typed attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i32),
    Float(f32),
    Bool(bool),
    String(String),
}

impl Value {
    /// The data type this value packs into.
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Int(_) => DataType::Int,
            Value::Float(_) => DataType::Float,
            Value::Bool(_) => DataType::Bool,
            Value::String(_) => DataType::String,
        }
    }
}

/// A fixed width record: its slot identity plus the raw slot bytes.
///
/// Byte 0 of the buffer is the tombstone marker; the rest is the packed
/// attribute payload. The two regions are only reachable through their
/// dedicated views, so nothing ever indexes across the boundary by hand.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Where the record lives on the heap, once it has been placed there.
    pub id: Option<RecordId>,

    data: Vec<u8>,
}

impl Record {
    /// Create an empty record for the given schema: tombstone free, zeroed
    /// payload.
    pub fn new(schema: &Schema) -> Self {
        Self {
            id: None,
            data: vec![0; schema.record_size()],
        }
    }

    /// Rebuild a record from the raw bytes of a heap slot.
    pub(crate) fn from_slot(id: RecordId, slot: &[u8]) -> Self {
        Self {
            id: Some(id),
            data: slot.to_vec(),
        }
    }

    /// Whether the tombstone marks the record as occupied.
    pub fn is_occupied(&self) -> bool {
        self.data[0] == TOMBSTONE_OCCUPIED
    }

    /// Flip the tombstone marker without touching the payload.
    pub fn set_occupied(&mut self, occupied: bool) {
        self.data[0] = if occupied {
            TOMBSTONE_OCCUPIED
        } else {
            TOMBSTONE_FREE
        };
    }

    /// The raw slot bytes, tombstone included.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// The packed attribute payload, tombstone excluded.
    pub fn payload(&self) -> &[u8] {
        &self.data[1..]
    }

    /// Mutable view of the packed attribute payload.
    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.data[1..]
    }

    /// Extract an attribute of the record and return it as a typed value.
    ///
    /// String values are trimmed at their first NUL byte.
    pub fn get_attr(&self, schema: &Schema, attnum: usize) -> Result<Value> {
        let attr = schema
            .attrs
            .get(attnum)
            .ok_or_else(|| anyhow!("attribute {} does not exist on schema", attnum))?;

        let offset = schema.attr_offset(attnum);
        let bytes = &self.data[offset..offset + attr.byte_width()];

        match attr.data_type {
            DataType::Int => Ok(Value::Int(LittleEndian::read_i32(bytes))),
            DataType::Float => Ok(Value::Float(LittleEndian::read_f32(bytes))),
            DataType::Bool => Ok(Value::Bool(bytes[0] != 0)),
            DataType::String => {
                let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
                Ok(Value::String(
                    std::str::from_utf8(&bytes[..end])?.to_string(),
                ))
            }
        }
    }

    /// Pack a typed value into an attribute of the record.
    ///
    /// String values shorter than the declared length are NUL padded;
    /// longer ones are truncated to it.
    pub fn set_attr(&mut self, schema: &Schema, attnum: usize, value: &Value) -> Result<()> {
        let attr = schema
            .attrs
            .get(attnum)
            .ok_or_else(|| anyhow!("attribute {} does not exist on schema", attnum))?;

        if value.data_type() != attr.data_type {
            bail!(
                "attribute {} holds {:?} values, got {:?}",
                attr.name,
                attr.data_type,
                value.data_type()
            );
        }

        let offset = schema.attr_offset(attnum);
        let bytes = &mut self.data[offset..offset + attr.byte_width()];

        match value {
            Value::Int(v) => LittleEndian::write_i32(bytes, *v),
            Value::Float(v) => LittleEndian::write_f32(bytes, *v),
            Value::Bool(v) => bytes[0] = *v as u8,
            Value::String(s) => {
                for b in bytes.iter_mut() {
                    *b = 0;
                }
                let raw = s.as_bytes();
                let len = raw.len().min(attr.type_length);
                bytes[..len].copy_from_slice(&raw[..len]);
            }
        }
        Ok(())
    }
}
