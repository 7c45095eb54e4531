//! Core type aliases and value types for rustkv
//!
//! This module defines the foundational types shared by the codecs and the
//! store layer.

use bitflags::bitflags;

// ============================================================================
// Numeric Type Aliases
// ============================================================================

/// Logical table identifier; encoded as a varint prefix on every key.
pub type TableId = u64;

/// The reserved table id exposing the full flat keyspace.
pub const ROOT_TABLE: TableId = 0;

/// Transaction nesting level. 0 = none, 1 = read-only, >= 2 writable.
pub type TxnLevel = u32;

// ============================================================================
// Sort Order
// ============================================================================

/// Per-field sort direction inside an encoded key.
///
/// A descending field is written as the bitwise complement of every byte of
/// its ascending encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    /// True for descending order.
    pub fn is_desc(&self) -> bool {
        matches!(self, SortOrder::Desc)
    }
}

// ============================================================================
// Value Type
// ============================================================================

/// Dynamic scalar value as seen by the codecs.
///
/// These are the value kinds a SQL row can hold. `TypedBlob` carries an
/// application-defined subtype alongside the bytes; in keys it orders like a
/// plain blob.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// NULL value
    #[default]
    Null,
    /// Integer value (64-bit signed)
    Integer(i64),
    /// Real/float value (64-bit IEEE 754)
    Real(f64),
    /// Text value (UTF-8 string)
    Text(String),
    /// Binary large object
    Blob(Vec<u8>),
    /// Blob with an application subtype
    TypedBlob { subtype: u32, data: Vec<u8> },
}

impl Value {
    /// Check if value is NULL
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Byte length of the raw content (0 for NULL and numerics).
    pub fn bytes(&self) -> usize {
        match self {
            Value::Null | Value::Integer(_) | Value::Real(_) => 0,
            Value::Text(s) => s.len(),
            Value::Blob(b) => b.len(),
            Value::TypedBlob { data, .. } => data.len(),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Blob(v.to_vec())
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Value::Null,
        }
    }
}

// ============================================================================
// Store Open Flags
// ============================================================================

bitflags! {
    /// Flags passed when opening a store.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenFlags: u32 {
        const READONLY  = 0x0001;
        const READWRITE = 0x0002;
        const CREATE    = 0x0004;
        /// Hint that the store will be bulk-loaded in key order.
        const BULKLOAD  = 0x0008;
    }
}

impl Default for OpenFlags {
    fn default() -> Self {
        OpenFlags::READWRITE | OpenFlags::CREATE
    }
}

// ============================================================================
// Tests
// ============================================================================
