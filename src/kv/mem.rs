//! In-memory ordered-map engine
//!
//! The default store: an ordered map plus per-level undo logs. Each
//! writable transaction level records the prior state of every key it is
//! the first to touch; commit folds a level's log into its parent, and
//! rollback replays logs innermost-first. A generation counter lets
//! cursors notice writes made underneath them and re-fetch lazily.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::{Arc, Mutex};

use crate::env::Env;
use crate::error::{Error, ErrorCode, Result};
use crate::kv::trace::TraceInfo;
use crate::kv::{Caps, ControlOp, KvCursor, KvStore, SeekDir, SeekResult};
use crate::types::{OpenFlags, TxnLevel};

const ENGINE_NAME: &str = "mem";

// ============================================================================
// Store internals
// ============================================================================

/// Undo state for one writable transaction level.
struct UndoLog {
    /// Prior value for each key first touched at this level; `None` means
    /// the key did not exist.
    entries: HashMap<Vec<u8>, Option<Vec<u8>>>,
    /// Meta cookie at the time the level opened.
    meta: u32,
}

struct MemInner {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
    /// One log per level >= 2, innermost last.
    undo: Vec<UndoLog>,
    level: TxnLevel,
    prepared: Option<TxnLevel>,
    meta: u32,
    /// Bumped on every mutation; cursors compare against it.
    generation: u64,
    /// Resulting level of every rollback, in order. Cursors use the tail
    /// of this log to detect that the level they were opened under was
    /// rolled away.
    rollbacks: Vec<TxnLevel>,
    open_cursors: usize,
    closed: bool,
    readonly: bool,
}

impl MemInner {
    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::with_message(ErrorCode::Misuse, "store is closed"));
        }
        Ok(())
    }

    fn check_writable(&self) -> Result<()> {
        self.check_open()?;
        if self.readonly {
            return Err(Error::new(ErrorCode::ReadOnly));
        }
        Ok(())
    }

    /// Record the prior state of `key` in the innermost undo log.
    fn record_undo(&mut self, key: &[u8]) {
        let prior = self.data.get(key).cloned();
        if let Some(log) = self.undo.last_mut() {
            log.entries.entry(key.to_vec()).or_insert(prior);
        }
    }

    fn put(&mut self, key: &[u8], value: &[u8]) {
        self.record_undo(key);
        self.data.insert(key.to_vec(), value.to_vec());
        self.generation += 1;
    }

    fn remove(&mut self, key: &[u8]) {
        self.record_undo(key);
        self.data.remove(key);
        self.generation += 1;
    }
}

// ============================================================================
// MemStore
// ============================================================================

/// Handle to an in-memory store.
pub struct MemStore {
    inner: Arc<Mutex<MemInner>>,
    env: Arc<Env>,
}

impl MemStore {
    /// Open a fresh store.
    pub fn open(env: Arc<Env>, flags: OpenFlags) -> MemStore {
        MemStore {
            inner: Arc::new(Mutex::new(MemInner {
                data: BTreeMap::new(),
                undo: Vec::new(),
                level: 0,
                prepared: None,
                meta: 0,
                generation: 0,
                rollbacks: Vec::new(),
                open_cursors: 0,
                closed: false,
                readonly: flags.contains(OpenFlags::READONLY),
            })),
            env,
        }
    }

    /// Open a cursor over this store.
    pub fn open_cursor(&self) -> Result<MemCursor> {
        let (opened_level, rollback_idx, gen) = {
            let mut inner = self.inner.lock().unwrap();
            inner.check_open()?;
            inner.open_cursors += 1;
            (inner.level, inner.rollbacks.len(), inner.generation)
        };
        self.env.trace(TraceInfo::cursor(ENGINE_NAME, "open"));
        Ok(MemCursor {
            inner: self.inner.clone(),
            env: self.env.clone(),
            pos: Pos::BeforeFirst,
            seen_gen: gen,
            opened_level,
            rollback_idx,
            row_changed: true,
        })
    }
}

impl KvStore for MemStore {
    fn name(&self) -> &'static str {
        ENGINE_NAME
    }

    fn capabilities(&self) -> Caps {
        let mut caps = Caps::READ | Caps::ITERATE | Caps::TRANSACT;
        if !self.inner.lock().unwrap().readonly {
            caps |= Caps::WRITE;
        }
        caps
    }

    /// Upsert. Outside a writable transaction (level < 2) the write
    /// applies immediately and cannot be rolled back.
    fn replace(&self, key: &[u8], value: &[u8]) -> Result<()> {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.check_writable()?;
            inner.put(key, value);
        }
        self.env
            .trace(TraceInfo::write(ENGINE_NAME, key, "replace"));
        Ok(())
    }

    fn txn_level(&self) -> TxnLevel {
        self.inner.lock().unwrap().level
    }

    fn begin(&self, level: TxnLevel) -> Result<()> {
        let reached = {
            let mut inner = self.inner.lock().unwrap();
            inner.check_open()?;
            if inner.level >= level {
                return Ok(());
            }
            if inner.readonly && level >= 2 {
                return Err(Error::new(ErrorCode::ReadOnly));
            }
            while inner.level < level {
                inner.level += 1;
                if inner.level >= 2 {
                    let meta = inner.meta;
                    inner.undo.push(UndoLog {
                        entries: HashMap::new(),
                        meta,
                    });
                }
            }
            inner.level
        };
        self.env.trace(TraceInfo::txn(ENGINE_NAME, "begin", reached));
        Ok(())
    }

    fn commit_phase_one(&self, level: TxnLevel) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.check_open()?;
        if inner.level <= level {
            return Ok(());
        }
        inner.prepared = Some(level);
        Ok(())
    }

    fn commit_phase_two(&self, level: TxnLevel) -> Result<()> {
        let reached = {
            let mut inner = self.inner.lock().unwrap();
            inner.check_open()?;
            inner.prepared = None;
            if inner.level <= level {
                return Ok(());
            }
            while inner.level > level {
                if inner.level >= 2 {
                    let log = inner
                        .undo
                        .pop()
                        .ok_or_else(|| Error::new(ErrorCode::Internal))?;
                    if let Some(parent) = inner.undo.last_mut() {
                        for (k, prior) in log.entries {
                            parent.entries.entry(k).or_insert(prior);
                        }
                    }
                }
                inner.level -= 1;
            }
            inner.level
        };
        self.env
            .trace(TraceInfo::txn(ENGINE_NAME, "commit", reached));
        Ok(())
    }

    fn rollback(&self, level: TxnLevel) -> Result<()> {
        let reached = {
            let mut inner = self.inner.lock().unwrap();
            inner.check_open()?;
            inner.prepared = None;
            if inner.level <= level {
                return Ok(());
            }
            while inner.level > level {
                if inner.level >= 2 {
                    let log = inner
                        .undo
                        .pop()
                        .ok_or_else(|| Error::new(ErrorCode::Internal))?;
                    for (k, prior) in log.entries {
                        match prior {
                            Some(v) => inner.data.insert(k, v),
                            None => inner.data.remove(&k),
                        };
                    }
                    inner.meta = log.meta;
                }
                inner.level -= 1;
            }
            inner.generation += 1;
            inner.rollbacks.push(level);
            inner.level
        };
        self.env
            .trace(TraceInfo::txn(ENGINE_NAME, "rollback", reached));
        Ok(())
    }

    fn get_meta(&self) -> Result<u32> {
        let inner = self.inner.lock().unwrap();
        inner.check_open()?;
        Ok(inner.meta)
    }

    fn put_meta(&self, value: u32) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.check_writable()?;
        inner.meta = value;
        Ok(())
    }

    fn control(&self, _op: ControlOp) -> Result<()> {
        // No tunable knobs.
        Err(Error::new(ErrorCode::NotFound))
    }

    fn close(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.check_open()?;
        if inner.open_cursors > 0 {
            return Err(Error::with_message(
                ErrorCode::Misuse,
                "cursors still open",
            ));
        }
        if inner.level > 0 {
            return Err(Error::with_message(
                ErrorCode::Misuse,
                "transaction still open",
            ));
        }
        inner.closed = true;
        Ok(())
    }
}

// ============================================================================
// MemCursor
// ============================================================================

/// Cursor position. After a delete the cursor keeps only the deleted key
/// as an anchor; the successor/predecessor is resolved lazily on the next
/// movement.
enum Pos {
    BeforeFirst,
    AfterLast,
    At { key: Vec<u8>, value: Vec<u8> },
    Phantom { anchor: Vec<u8> },
}

/// Cursor over a [`MemStore`].
pub struct MemCursor {
    inner: Arc<Mutex<MemInner>>,
    env: Arc<Env>,
    pos: Pos,
    seen_gen: u64,
    opened_level: TxnLevel,
    rollback_idx: usize,
    row_changed: bool,
}

impl MemCursor {
    /// Fail if a rollback has discarded the level this cursor was opened
    /// under.
    fn check_valid(&mut self, inner: &MemInner) -> Result<()> {
        inner.check_open()?;
        if self.rollback_idx < inner.rollbacks.len() {
            let floor = inner.rollbacks[self.rollback_idx..]
                .iter()
                .min()
                .copied()
                .unwrap_or(TxnLevel::MAX);
            self.rollback_idx = inner.rollbacks.len();
            if self.opened_level > floor {
                self.pos = Pos::BeforeFirst;
                return Err(Error::with_message(
                    ErrorCode::Misuse,
                    "cursor invalidated by rollback below its transaction level",
                ));
            }
        }
        Ok(())
    }

    /// Re-fetch the bytes under the cursor if the store changed.
    fn revalidate(&mut self, inner: &MemInner) {
        if self.seen_gen == inner.generation {
            return;
        }
        self.seen_gen = inner.generation;
        self.row_changed = true;
        if let Pos::At { key, value } = &mut self.pos {
            match inner.data.get(key.as_slice()) {
                Some(v) => {
                    if v != value {
                        *value = v.clone();
                    }
                }
                None => {
                    let anchor = std::mem::take(key);
                    self.pos = Pos::Phantom { anchor };
                }
            }
        }
    }

    fn set_at(&mut self, key: Vec<u8>, value: Vec<u8>, gen: u64) {
        self.pos = Pos::At { key, value };
        self.seen_gen = gen;
        self.row_changed = true;
    }
}

impl KvCursor for MemCursor {
    fn seek(&mut self, key: &[u8], dir: SeekDir) -> Result<SeekResult> {
        let inner_arc = Arc::clone(&self.inner);
        let result = {
            let mut guard = inner_arc.lock().unwrap();
            let inner = &mut *guard;
            self.check_valid(inner)?;
            self.row_changed = true;
            self.seen_gen = inner.generation;
            match dir {
                SeekDir::Eq => match inner.data.get(key) {
                    Some(v) => {
                        self.pos = Pos::At {
                            key: key.to_vec(),
                            value: v.clone(),
                        };
                        SeekResult::Found
                    }
                    None => {
                        self.pos = Pos::Phantom {
                            anchor: key.to_vec(),
                        };
                        SeekResult::NotFound
                    }
                },
                SeekDir::Ge => {
                    match inner
                        .data
                        .range::<[u8], _>((Bound::Included(key), Bound::Unbounded))
                        .next()
                    {
                        Some((k, v)) => {
                            let exact = k.as_slice() == key;
                            self.pos = Pos::At {
                                key: k.clone(),
                                value: v.clone(),
                            };
                            if exact {
                                SeekResult::Found
                            } else {
                                SeekResult::Inexact
                            }
                        }
                        None => {
                            self.pos = Pos::AfterLast;
                            SeekResult::NotFound
                        }
                    }
                }
                SeekDir::Le | SeekDir::LeFast => {
                    match inner
                        .data
                        .range::<[u8], _>((Bound::Unbounded, Bound::Included(key)))
                        .next_back()
                    {
                        Some((k, v)) => {
                            let exact = k.as_slice() == key;
                            self.pos = Pos::At {
                                key: k.clone(),
                                value: v.clone(),
                            };
                            if exact {
                                SeekResult::Found
                            } else {
                                SeekResult::Inexact
                            }
                        }
                        None => {
                            self.pos = Pos::BeforeFirst;
                            SeekResult::NotFound
                        }
                    }
                }
            }
        };
        self.env.trace(TraceInfo::seek(ENGINE_NAME, key, "seek"));
        Ok(result)
    }

    fn first(&mut self) -> Result<bool> {
        let inner_arc = Arc::clone(&self.inner);
        let mut guard = inner_arc.lock().unwrap();
        let inner = &mut *guard;
        self.check_valid(inner)?;
        let gen = inner.generation;
        match inner.data.iter().next() {
            Some((k, v)) => {
                self.set_at(k.clone(), v.clone(), gen);
                Ok(true)
            }
            None => {
                self.pos = Pos::BeforeFirst;
                self.row_changed = true;
                Ok(false)
            }
        }
    }

    fn last(&mut self) -> Result<bool> {
        let inner_arc = Arc::clone(&self.inner);
        let mut guard = inner_arc.lock().unwrap();
        let inner = &mut *guard;
        self.check_valid(inner)?;
        let gen = inner.generation;
        match inner.data.iter().next_back() {
            Some((k, v)) => {
                self.set_at(k.clone(), v.clone(), gen);
                Ok(true)
            }
            None => {
                self.pos = Pos::AfterLast;
                self.row_changed = true;
                Ok(false)
            }
        }
    }

    fn next(&mut self) -> Result<bool> {
        let inner_arc = Arc::clone(&self.inner);
        let mut guard = inner_arc.lock().unwrap();
        let inner = &mut *guard;
        self.check_valid(inner)?;
        self.revalidate(inner);
        let gen = inner.generation;
        let bound: Option<Vec<u8>> = match &self.pos {
            Pos::BeforeFirst => None,
            Pos::AfterLast => return Ok(false),
            Pos::At { key, .. } => Some(key.clone()),
            Pos::Phantom { anchor } => Some(anchor.clone()),
        };
        let entry = match &bound {
            None => inner.data.iter().next(),
            Some(b) => inner
                .data
                .range::<[u8], _>((Bound::Excluded(b.as_slice()), Bound::Unbounded))
                .next(),
        };
        match entry {
            Some((k, v)) => {
                self.set_at(k.clone(), v.clone(), gen);
                Ok(true)
            }
            None => {
                self.pos = Pos::AfterLast;
                self.row_changed = true;
                Ok(false)
            }
        }
    }

    fn prev(&mut self) -> Result<bool> {
        let inner_arc = Arc::clone(&self.inner);
        let mut guard = inner_arc.lock().unwrap();
        let inner = &mut *guard;
        self.check_valid(inner)?;
        self.revalidate(inner);
        let gen = inner.generation;
        let bound: Option<Vec<u8>> = match &self.pos {
            Pos::AfterLast => None,
            Pos::BeforeFirst => return Ok(false),
            Pos::At { key, .. } => Some(key.clone()),
            Pos::Phantom { anchor } => Some(anchor.clone()),
        };
        let entry = match &bound {
            None => inner.data.iter().next_back(),
            Some(b) => inner
                .data
                .range::<[u8], _>((Bound::Unbounded, Bound::Excluded(b.as_slice())))
                .next_back(),
        };
        match entry {
            Some((k, v)) => {
                self.set_at(k.clone(), v.clone(), gen);
                Ok(true)
            }
            None => {
                self.pos = Pos::BeforeFirst;
                self.row_changed = true;
                Ok(false)
            }
        }
    }

    fn key(&mut self) -> Result<&[u8]> {
        {
            let inner_arc = Arc::clone(&self.inner);
            let mut guard = inner_arc.lock().unwrap();
            let inner = &mut *guard;
            self.check_valid(inner)?;
            self.revalidate(inner);
        }
        match &self.pos {
            Pos::At { key, .. } => Ok(key),
            _ => Err(Error::with_message(
                ErrorCode::Misuse,
                "cursor is not positioned on an entry",
            )),
        }
    }

    fn data(&mut self, offset: usize, len: Option<usize>) -> Result<&[u8]> {
        {
            let inner_arc = Arc::clone(&self.inner);
            let mut guard = inner_arc.lock().unwrap();
            let inner = &mut *guard;
            self.check_valid(inner)?;
            self.revalidate(inner);
        }
        match &self.pos {
            Pos::At { value, .. } => {
                let start = offset.min(value.len());
                let end = match len {
                    Some(n) => (start + n).min(value.len()),
                    None => value.len(),
                };
                Ok(&value[start..end])
            }
            _ => Err(Error::with_message(
                ErrorCode::Misuse,
                "cursor is not positioned on an entry",
            )),
        }
    }

    fn delete(&mut self) -> Result<()> {
        let inner_arc = Arc::clone(&self.inner);
        let anchor = {
            let mut guard = inner_arc.lock().unwrap();
            let inner = &mut *guard;
            self.check_valid(inner)?;
            inner.check_writable()?;
            self.revalidate(inner);
            let key = match &self.pos {
                Pos::At { key, .. } => key.clone(),
                _ => {
                    return Err(Error::with_message(
                        ErrorCode::Misuse,
                        "cursor is not positioned on an entry",
                    ))
                }
            };
            inner.remove(&key);
            self.seen_gen = inner.generation;
            self.row_changed = true;
            self.pos = Pos::Phantom {
                anchor: key.clone(),
            };
            key
        };
        self.env
            .trace(TraceInfo::write(ENGINE_NAME, &anchor, "delete"));
        Ok(())
    }

    fn reset(&mut self) {
        self.pos = Pos::BeforeFirst;
        self.row_changed = true;
    }

    fn row_changed(&mut self) -> bool {
        {
            let inner_arc = Arc::clone(&self.inner);
            let mut guard = inner_arc.lock().unwrap();
            let inner = &mut *guard;
            if self.check_valid(inner).is_err() {
                self.row_changed = true;
            } else {
                self.revalidate(inner);
            }
        }
        std::mem::replace(&mut self.row_changed, false)
    }
}

impl Drop for MemCursor {
    fn drop(&mut self) {
        let mut inner = self.inner.lock().unwrap();
        inner.open_cursors = inner.open_cursors.saturating_sub(1);
    }
}

// ============================================================================
// Tests
// ============================================================================
