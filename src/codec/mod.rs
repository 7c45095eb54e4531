//! Key, row, varint, and collation codecs
//!
//! Everything the storage layer persists goes through this module: keys
//! through the order-preserving key codec, row payloads through the
//! self-describing row codec, and both share the ordered varint format.

pub mod collation;
pub mod key;
pub mod row;
pub mod varint;

pub use collation::Collation;
pub use key::{decode_key, encode_field, encode_key, short_key, KeyField, KeyInfo, KeyReader};
pub use row::{encode_row, encode_values, Col, RowReader};
