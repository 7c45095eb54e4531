//! Runtime environment
//!
//! An `Env` bundles the process services the store layer consumes:
//! registered collations, registered storage engines, and the trace hook.
//! Every entry point takes an explicit environment; a single shared
//! default instance exists only at the top-level API for callers that do
//! not need their own.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use lazy_static::lazy_static;

use crate::codec::collation::Collation;
use crate::error::{Error, ErrorCode, Result};
use crate::kv::trace::{TraceCallback, TraceFlags, TraceInfo};

/// Shared runtime environment.
pub struct Env {
    collations: RwLock<HashMap<String, Collation>>,
    engines: Vec<&'static str>,
    default_engine: &'static str,
    trace: Mutex<Option<(TraceFlags, TraceCallback)>>,
}

impl Env {
    /// Environment with the built-in collations and engines.
    pub fn new() -> Env {
        let mut collations = HashMap::new();
        for coll in [Collation::Binary, Collation::NoCase, Collation::RTrim] {
            collations.insert(coll.name().to_string(), coll);
        }
        let mut engines = vec!["mem"];
        #[cfg(feature = "engine-lsm")]
        engines.push("lsm");
        Env {
            collations: RwLock::new(collations),
            engines,
            default_engine: "mem",
            trace: Mutex::new(None),
        }
    }

    /// The process-wide default environment.
    pub fn default_env() -> Arc<Env> {
        lazy_static! {
            static ref DEFAULT: Arc<Env> = Arc::new(Env::new());
        }
        DEFAULT.clone()
    }

    // ========================================================================
    // Collations
    // ========================================================================

    /// Register a collation under its own name, replacing any previous
    /// registration.
    pub fn register_collation(&self, coll: Collation) {
        self.collations
            .write()
            .unwrap()
            .insert(coll.name().to_string(), coll);
    }

    /// Look up a collation by name (case-sensitive).
    pub fn collation(&self, name: &str) -> Result<Collation> {
        self.collations
            .read()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| {
                Error::with_message(ErrorCode::NotFound, format!("no collation '{}'", name))
            })
    }

    // ========================================================================
    // Engines
    // ========================================================================

    /// Name of the engine used when none is requested.
    pub fn default_engine(&self) -> &'static str {
        self.default_engine
    }

    /// True if an engine with this name is registered.
    pub fn has_engine(&self, name: &str) -> bool {
        self.engines.contains(&name)
    }

    /// Registered engine names.
    pub fn engines(&self) -> &[&'static str] {
        &self.engines
    }

    // ========================================================================
    // Tracing
    // ========================================================================

    /// Install a trace callback for the given event mask; `None` clears.
    pub fn set_trace(&self, mask: TraceFlags, callback: Option<TraceCallback>) {
        let mut slot = self.trace.lock().unwrap();
        *slot = callback.map(|cb| (mask, cb));
    }

    /// Emit a trace event if its flag is enabled.
    pub fn trace(&self, info: TraceInfo) {
        let slot = self.trace.lock().unwrap();
        if let Some((mask, cb)) = slot.as_ref() {
            if mask.contains(info.event.flag()) {
                cb(&info);
            }
        }
    }
}

impl Default for Env {
    fn default() -> Self {
        Env::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_builtin_collations() {
        let env = Env::new();
        assert!(env.collation("BINARY").is_ok());
        assert!(env.collation("NOCASE").is_ok());
        assert!(env.collation("missing").is_err());
    }

    #[test]
    fn test_register_collation() {
        let env = Env::new();
        env.register_collation(Collation::Custom {
            name: "UPPER".into(),
            sort_key: Arc::new(|s| s.to_ascii_uppercase().into_bytes()),
        });
        assert_eq!(env.collation("UPPER").unwrap().name(), "UPPER");
    }

    #[test]
    fn test_engines_registered() {
        let env = Env::new();
        assert!(env.has_engine("mem"));
        assert_eq!(env.default_engine(), "mem");
        #[cfg(feature = "engine-lsm")]
        assert!(env.has_engine("lsm"));
    }

    #[test]
    fn test_trace_mask_filters_events() {
        let env = Env::new();
        static HITS: AtomicUsize = AtomicUsize::new(0);
        env.set_trace(
            TraceFlags::TXN,
            Some(Arc::new(|_| {
                HITS.fetch_add(1, Ordering::SeqCst);
            })),
        );
        env.trace(TraceInfo::txn("mem", "begin", 2));
        env.trace(TraceInfo::write("mem", b"k", "replace"));
        assert_eq!(HITS.load(Ordering::SeqCst), 1);
    }
}
