//! rustkv - ordered key/value storage core for a SQL engine
//!
//! The layer beneath a SQL virtual machine: codecs that turn row values
//! into byte strings that sort the way SQL compares them, and a cursor
//! based store abstraction with nested transactions over pluggable
//! in-memory engines.

pub mod codec;
pub mod env;
pub mod error;
pub mod kv;
pub mod num;
pub mod types;

// Re-export main public types
pub use error::{Error, ErrorCode, Result};

// Re-export codec entry points
pub use codec::{
    decode_key, encode_key, encode_row, encode_values, short_key, Col, Collation, KeyField,
    KeyInfo, KeyReader, RowReader,
};

// Re-export the numeric model
pub use num::{Num, NumParseFlags};

// Re-export the store layer
pub use env::Env;
pub use kv::{
    Caps, ControlOp, Cursor, KvCursor, KvStore, SafetyLevel, SeekDir, SeekResult, Storage,
    TableCursor,
};
pub use types::{OpenFlags, SortOrder, TableId, Value, ROOT_TABLE};
