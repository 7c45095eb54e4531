//! Table-namespace cursor layer
//!
//! All tables share one flat keyspace; a table's keys are simply the keys
//! that begin with `varint(table_id)`. This layer prefixes probes with the
//! table id, strips it from keys handed back, and turns a prefix change
//! during iteration into end-of-table, so a table scan terminates at the
//! table boundary on its own.
//!
//! The reserved root table exposes the flat keyspace unprefixed; its
//! end-of-keyspace probes use `"\x00"` for first and the varint of the
//! largest table id for last.

use crate::codec::key::{encode_key, KeyInfo};
use crate::codec::varint::write_varint;
use crate::error::{Error, ErrorCode, Result};
use crate::kv::{KvCursor, SeekDir, SeekResult};
use crate::types::{TableId, Value, ROOT_TABLE};

/// Cursor confined to a single logical table.
pub struct TableCursor<C: KvCursor> {
    cur: C,
    table_id: TableId,
    prefix: Vec<u8>,
}

impl<C: KvCursor> TableCursor<C> {
    /// Wrap a store cursor for one table.
    pub fn new(cur: C, table_id: TableId) -> TableCursor<C> {
        let mut prefix = Vec::new();
        if table_id != ROOT_TABLE {
            write_varint(table_id, &mut prefix);
        }
        TableCursor {
            cur,
            table_id,
            prefix,
        }
    }

    /// The table this cursor is confined to.
    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    /// Give back the wrapped cursor.
    pub fn into_inner(self) -> C {
        self.cur
    }

    /// True when the cursor is positioned on an entry of this table.
    fn on_table(&mut self) -> Result<bool> {
        match self.cur.key() {
            Ok(k) => Ok(k.starts_with(&self.prefix)),
            Err(e) if e.code() == ErrorCode::Misuse => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Seek to already-encoded key fields (no table prefix) within the
    /// table.
    pub fn seek(&mut self, fields: &[u8], dir: SeekDir) -> Result<SeekResult> {
        let mut probe = self.prefix.clone();
        probe.extend_from_slice(fields);
        let r = self.cur.seek(&probe, dir)?;
        match r {
            SeekResult::Found => Ok(SeekResult::Found),
            SeekResult::NotFound => Ok(SeekResult::NotFound),
            SeekResult::Inexact => {
                if self.on_table()? {
                    Ok(SeekResult::Inexact)
                } else {
                    Ok(SeekResult::NotFound)
                }
            }
        }
    }

    /// Encode field values and seek to them.
    pub fn seek_values(
        &mut self,
        values: &[Value],
        info: &KeyInfo,
        dir: SeekDir,
    ) -> Result<SeekResult> {
        let fields = encode_key(ROOT_TABLE, values, info)?;
        self.seek(&fields, dir)
    }

    /// Position at the first or last entry of the table.
    pub fn seek_end(&mut self, last: bool) -> Result<bool> {
        if self.table_id == ROOT_TABLE {
            let r = if last {
                let mut probe = Vec::new();
                write_varint(i64::MAX as u64, &mut probe);
                self.cur.seek(&probe, SeekDir::Le)?
            } else {
                self.cur.seek(b"\x00", SeekDir::Ge)?
            };
            return Ok(r != SeekResult::NotFound);
        }
        let r = if last {
            let mut probe = self.prefix.clone();
            probe.push(0xFF);
            self.cur.seek(&probe, SeekDir::Le)?
        } else {
            self.cur.seek(&self.prefix, SeekDir::Ge)?
        };
        if r == SeekResult::NotFound {
            return Ok(false);
        }
        self.on_table()
    }

    /// Position at the first entry of the table.
    pub fn first(&mut self) -> Result<bool> {
        self.seek_end(false)
    }

    /// Position at the last entry of the table.
    pub fn last(&mut self) -> Result<bool> {
        self.seek_end(true)
    }

    /// Advance; false at the table boundary.
    pub fn next(&mut self) -> Result<bool> {
        if !self.cur.next()? {
            return Ok(false);
        }
        self.on_table()
    }

    /// Step back; false at the table boundary.
    pub fn prev(&mut self) -> Result<bool> {
        if !self.cur.prev()? {
            return Ok(false);
        }
        self.on_table()
    }

    /// Current key with the table prefix stripped.
    pub fn key(&mut self) -> Result<&[u8]> {
        let plen = self.prefix.len();
        let k = self.cur.key()?;
        if !k.starts_with(&self.prefix) {
            return Err(Error::with_message(
                ErrorCode::Misuse,
                "cursor is outside its table",
            ));
        }
        Ok(&k[plen..])
    }

    /// Current key including the table prefix, as stored. Row decoding
    /// consumes this form.
    pub fn full_key(&mut self) -> Result<&[u8]> {
        self.cur.key()
    }

    /// Current value bytes.
    pub fn data(&mut self, offset: usize, len: Option<usize>) -> Result<&[u8]> {
        self.cur.data(offset, len)
    }

    /// Delete the entry under the cursor (phantom semantics of the
    /// underlying cursor apply).
    pub fn delete(&mut self) -> Result<()> {
        self.cur.delete()
    }

    /// Forget the current position.
    pub fn reset(&mut self) {
        self.cur.reset()
    }

    /// Forwarded change flag for cached decoders.
    pub fn row_changed(&mut self) -> bool {
        self.cur.row_changed()
    }
}

// ============================================================================
// Tests
// ============================================================================
