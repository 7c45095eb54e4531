//! Store and cursor abstraction
//!
//! A store is a single flat keyspace of byte-string keys ordered by
//! unsigned memcmp, with nested transactions and a 32-bit meta cookie.
//! Cursors iterate the keyspace; the table layer (`kv::table`) confines a
//! cursor to one logical table.
//!
//! Transaction levels: the store keeps an integer level `L >= 0`. `L = 0`
//! means no transaction, `L = 1` a read-only snapshot, and every level
//! above that a nested writable sub-transaction receiving all writes.
//! `rollback(i)` discards the work of levels strictly above `i`;
//! `revert(i)` additionally discards level `i`'s own work while leaving it
//! open, which is how a savepoint is rolled back without being released.

pub mod mem;
pub mod table;
pub mod trace;

#[cfg(feature = "engine-lsm")]
pub mod lsm;

use std::sync::Arc;

use bitflags::bitflags;

use crate::env::Env;
use crate::error::{Error, ErrorCode, Result};
use crate::types::{OpenFlags, TxnLevel};

pub use mem::{MemCursor, MemStore};
#[cfg(feature = "engine-lsm")]
pub use lsm::{LsmCursor, LsmStore};
pub use table::TableCursor;

// ============================================================================
// Seek directions and results
// ============================================================================

/// Direction of a cursor seek relative to the probe key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekDir {
    /// Exact match only.
    Eq,
    /// Smallest entry >= probe.
    Ge,
    /// Largest entry <= probe.
    Le,
    /// Like `Le`, but the engine may position at any entry <= probe when a
    /// cheap answer is available, not necessarily the greatest one.
    LeFast,
}

/// Outcome of a seek.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekResult {
    /// Positioned on an exact match.
    Found,
    /// Positioned on the nearest entry in the seek direction.
    Inexact,
    /// No entry in the seek direction.
    NotFound,
}

bitflags! {
    /// What a store implementation can do.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Caps: u32 {
        const READ     = 0x01;
        const WRITE    = 0x02;
        const ITERATE  = 0x04;
        const TRANSACT = 0x08;
    }
}

/// Engine tuning knobs. Engines answer `NotFound` for knobs they do not
/// implement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlOp {
    /// Preferred page size hint.
    PageSize(usize),
    /// Durability/sync level.
    Safety(SafetyLevel),
    /// Flush buffered writes into the engine's long-term structure now.
    Checkpoint,
    /// One-shot hint that the next batch of writes arrives in key order.
    FastInsert,
}

/// Durability level for `ControlOp::Safety`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafetyLevel {
    Off,
    Normal,
    Full,
}

// ============================================================================
// Store and cursor traits
// ============================================================================

/// Contract every storage engine implements.
///
/// All writes go through `replace` and `KvCursor::delete`; both buffers
/// passed to `replace` are only borrowed for the duration of the call.
pub trait KvStore {
    /// Engine name, used for selection and tracing.
    fn name(&self) -> &'static str;

    /// Capability set of this store.
    fn capabilities(&self) -> Caps;

    /// Insert or overwrite the entry for `key`.
    fn replace(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Current transaction level.
    fn txn_level(&self) -> TxnLevel;

    /// Open transactions until the level reaches `level`; no-op when the
    /// current level is already at or above it.
    fn begin(&self, level: TxnLevel) -> Result<()>;

    /// Prepare to commit everything above `level`.
    fn commit_phase_one(&self, level: TxnLevel) -> Result<()>;

    /// Irreversibly apply the prepared commit, lowering the level to
    /// `level`.
    fn commit_phase_two(&self, level: TxnLevel) -> Result<()>;

    /// Two-phase commit in one call.
    fn commit(&self, level: TxnLevel) -> Result<()> {
        self.commit_phase_one(level)?;
        self.commit_phase_two(level)
    }

    /// Discard the work of every level above `level` and drop to it.
    fn rollback(&self, level: TxnLevel) -> Result<()>;

    /// Discard the work of `level` and everything above it, but leave the
    /// transaction open at `level`: a savepoint rollback that keeps the
    /// savepoint. Requires a writable level (`level >= 2`).
    fn revert(&self, level: TxnLevel) -> Result<()> {
        if level < 2 {
            return Err(Error::with_message(
                ErrorCode::Misuse,
                "revert requires a writable transaction level",
            ));
        }
        if self.txn_level() < level {
            return Ok(());
        }
        self.rollback(level - 1)?;
        self.begin(level)
    }

    /// Read the 32-bit schema cookie.
    fn get_meta(&self) -> Result<u32>;

    /// Durably (under commit) set the 32-bit schema cookie.
    fn put_meta(&self, value: u32) -> Result<()>;

    /// Engine-specific knobs.
    fn control(&self, op: ControlOp) -> Result<()>;

    /// Close the store. Fails with `Misuse` while cursors are open or a
    /// transaction is active.
    fn close(&self) -> Result<()>;
}

/// Positioned iterator over a store's keyspace.
///
/// `key`/`data` views are valid until the next movement. After `delete`
/// the cursor is in a phantom state: `next`/`prev` move to the entry that
/// followed/preceded the deleted one, while `key`/`data` fail with
/// `Misuse` until the cursor moves.
pub trait KvCursor {
    /// Position at `key` per `dir`.
    fn seek(&mut self, key: &[u8], dir: SeekDir) -> Result<SeekResult>;

    /// Position at the first entry; false when the store is empty.
    fn first(&mut self) -> Result<bool>;

    /// Position at the last entry; false when the store is empty.
    fn last(&mut self) -> Result<bool>;

    /// Advance; false when no entry remains.
    fn next(&mut self) -> Result<bool>;

    /// Step back; false when no entry remains.
    fn prev(&mut self) -> Result<bool>;

    /// Current key bytes.
    fn key(&mut self) -> Result<&[u8]>;

    /// Current value bytes, from `offset`, at most `len` bytes (all
    /// remaining when `len` is `None`).
    fn data(&mut self, offset: usize, len: Option<usize>) -> Result<&[u8]>;

    /// Remove the entry under the cursor, leaving the cursor phantom.
    fn delete(&mut self) -> Result<()>;

    /// Forget the current position and cached views; the cursor behaves as
    /// freshly opened.
    fn reset(&mut self);

    /// True once since the last call if the cursor's position or the bytes
    /// under it may have changed; decoders use this to drop caches.
    fn row_changed(&mut self) -> bool;
}

// ============================================================================
// Engine dispatch
// ============================================================================

/// A concrete store, dispatched monomorphically at the connection
/// boundary.
pub enum Storage {
    Mem(MemStore),
    #[cfg(feature = "engine-lsm")]
    Lsm(LsmStore),
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Storage::Mem(_) => f.write_str("Storage::Mem(..)"),
            #[cfg(feature = "engine-lsm")]
            Storage::Lsm(_) => f.write_str("Storage::Lsm(..)"),
        }
    }
}

/// Cursor counterpart of [`Storage`].
pub enum Cursor {
    Mem(MemCursor),
    #[cfg(feature = "engine-lsm")]
    Lsm(LsmCursor),
}

impl Storage {
    /// Open a store by engine name through the environment's registry.
    pub fn open(env: &Arc<Env>, engine: Option<&str>, flags: OpenFlags) -> Result<Storage> {
        let name = engine.unwrap_or_else(|| env.default_engine());
        if !env.has_engine(name) {
            return Err(Error::with_message(
                ErrorCode::NotFound,
                format!("unknown storage engine '{}'", name),
            ));
        }
        match name {
            "mem" => Ok(Storage::Mem(MemStore::open(env.clone(), flags))),
            #[cfg(feature = "engine-lsm")]
            "lsm" => Ok(Storage::Lsm(LsmStore::open(env.clone(), flags))),
            _ => Err(Error::with_message(
                ErrorCode::NotFound,
                format!("unknown storage engine '{}'", name),
            )),
        }
    }

    /// Open a cursor over this store.
    pub fn open_cursor(&self) -> Result<Cursor> {
        match self {
            Storage::Mem(s) => Ok(Cursor::Mem(s.open_cursor()?)),
            #[cfg(feature = "engine-lsm")]
            Storage::Lsm(s) => Ok(Cursor::Lsm(s.open_cursor()?)),
        }
    }
}

macro_rules! forward_store {
    ($self:ident, $s:ident => $body:expr) => {
        match $self {
            Storage::Mem($s) => $body,
            #[cfg(feature = "engine-lsm")]
            Storage::Lsm($s) => $body,
        }
    };
}

impl KvStore for Storage {
    fn name(&self) -> &'static str {
        forward_store!(self, s => s.name())
    }
    fn capabilities(&self) -> Caps {
        forward_store!(self, s => s.capabilities())
    }
    fn replace(&self, key: &[u8], value: &[u8]) -> Result<()> {
        forward_store!(self, s => s.replace(key, value))
    }
    fn txn_level(&self) -> TxnLevel {
        forward_store!(self, s => s.txn_level())
    }
    fn begin(&self, level: TxnLevel) -> Result<()> {
        forward_store!(self, s => s.begin(level))
    }
    fn commit_phase_one(&self, level: TxnLevel) -> Result<()> {
        forward_store!(self, s => s.commit_phase_one(level))
    }
    fn commit_phase_two(&self, level: TxnLevel) -> Result<()> {
        forward_store!(self, s => s.commit_phase_two(level))
    }
    fn rollback(&self, level: TxnLevel) -> Result<()> {
        forward_store!(self, s => s.rollback(level))
    }
    fn revert(&self, level: TxnLevel) -> Result<()> {
        forward_store!(self, s => s.revert(level))
    }
    fn get_meta(&self) -> Result<u32> {
        forward_store!(self, s => s.get_meta())
    }
    fn put_meta(&self, value: u32) -> Result<()> {
        forward_store!(self, s => s.put_meta(value))
    }
    fn control(&self, op: ControlOp) -> Result<()> {
        forward_store!(self, s => s.control(op))
    }
    fn close(&self) -> Result<()> {
        forward_store!(self, s => s.close())
    }
}

macro_rules! forward_cursor {
    ($self:ident, $c:ident => $body:expr) => {
        match $self {
            Cursor::Mem($c) => $body,
            #[cfg(feature = "engine-lsm")]
            Cursor::Lsm($c) => $body,
        }
    };
}

impl KvCursor for Cursor {
    fn seek(&mut self, key: &[u8], dir: SeekDir) -> Result<SeekResult> {
        forward_cursor!(self, c => c.seek(key, dir))
    }
    fn first(&mut self) -> Result<bool> {
        forward_cursor!(self, c => c.first())
    }
    fn last(&mut self) -> Result<bool> {
        forward_cursor!(self, c => c.last())
    }
    fn next(&mut self) -> Result<bool> {
        forward_cursor!(self, c => c.next())
    }
    fn prev(&mut self) -> Result<bool> {
        forward_cursor!(self, c => c.prev())
    }
    fn key(&mut self) -> Result<&[u8]> {
        forward_cursor!(self, c => c.key())
    }
    fn data(&mut self, offset: usize, len: Option<usize>) -> Result<&[u8]> {
        forward_cursor!(self, c => c.data(offset, len))
    }
    fn delete(&mut self) -> Result<()> {
        forward_cursor!(self, c => c.delete())
    }
    fn reset(&mut self) {
        forward_cursor!(self, c => c.reset())
    }
    fn row_changed(&mut self) -> bool {
        forward_cursor!(self, c => c.row_changed())
    }
}
