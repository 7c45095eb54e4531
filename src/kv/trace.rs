//! Store tracing facilities
//!
//! Tracing allows observing store activity (seeks, writes, transaction
//! control, cursor lifecycle) through a callback on the environment.

use std::sync::Arc;

// ============================================================================
// Trace Flags
// ============================================================================

bitflags::bitflags! {
    /// Flags to control which events are traced
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TraceFlags: u32 {
        /// Trace seeks and scans
        const SEEK   = 0x01;
        /// Trace replace/delete
        const WRITE  = 0x02;
        /// Trace begin/commit/rollback
        const TXN    = 0x04;
        /// Trace cursor open/close
        const CURSOR = 0x08;
    }
}

impl Default for TraceFlags {
    fn default() -> Self {
        TraceFlags::empty()
    }
}

// ============================================================================
// Trace Event
// ============================================================================

/// Type of trace event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceEvent {
    /// A cursor seek was performed
    Seek,
    /// An entry was written or deleted
    Write,
    /// Transaction level changed
    Txn,
    /// A cursor was opened or closed
    Cursor,
}

impl TraceEvent {
    /// Get the flag corresponding to this event
    pub fn flag(&self) -> TraceFlags {
        match self {
            TraceEvent::Seek => TraceFlags::SEEK,
            TraceEvent::Write => TraceFlags::WRITE,
            TraceEvent::Txn => TraceFlags::TXN,
            TraceEvent::Cursor => TraceFlags::CURSOR,
        }
    }
}

// ============================================================================
// Trace Info
// ============================================================================

/// Information passed to trace callbacks
#[derive(Debug, Clone)]
pub struct TraceInfo {
    /// Type of event
    pub event: TraceEvent,
    /// Engine the event happened on
    pub engine: &'static str,
    /// Human-readable description; keys are rendered in hex
    pub detail: String,
}

impl TraceInfo {
    /// Create a SEEK trace event
    pub fn seek(engine: &'static str, key: &[u8], what: &str) -> Self {
        Self {
            event: TraceEvent::Seek,
            engine,
            detail: format!("{} x'{}'", what, hex::encode(key)),
        }
    }

    /// Create a WRITE trace event
    pub fn write(engine: &'static str, key: &[u8], what: &str) -> Self {
        Self {
            event: TraceEvent::Write,
            engine,
            detail: format!("{} x'{}'", what, hex::encode(key)),
        }
    }

    /// Create a TXN trace event
    pub fn txn(engine: &'static str, what: &str, level: u32) -> Self {
        Self {
            event: TraceEvent::Txn,
            engine,
            detail: format!("{} -> level {}", what, level),
        }
    }

    /// Create a CURSOR trace event
    pub fn cursor(engine: &'static str, what: &str) -> Self {
        Self {
            event: TraceEvent::Cursor,
            engine,
            detail: what.to_string(),
        }
    }
}

/// Callback invoked for each traced event.
pub type TraceCallback = Arc<dyn Fn(&TraceInfo) + Send + Sync>;

// ============================================================================
// Tests
// ============================================================================
