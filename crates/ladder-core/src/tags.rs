//! Tag database: the single source of truth for all process state.
//!
//! Every piece of runtime state lives here as an ordinary named tag, including
//! the hidden memory of timers, counters and one-shots and the scheduler's
//! system counters. A [`TagStore::snapshot`] therefore captures the complete
//! state of a running program.
//!
//! Each operation takes the store lock exactly once. Sequences of operations
//! are not transactional: a concurrent reader may observe a timer's
//! accumulator updated before its done bit.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

// ---------------------------------------------------------------------------
// System tags
// ---------------------------------------------------------------------------

/// Prefix reserved for tags owned by the scheduler.
pub const SYSTEM_PREFIX: &str = "_SYSTEM";

/// Duration of the most recent scan cycle in milliseconds.
pub const SCAN_TIME: &str = "_SYSTEM.SCAN_TIME";
/// True while a scheduler is executing scan cycles.
pub const RUNNING: &str = "_SYSTEM.RUNNING";
/// Set when a scan cycle faults.
pub const ERROR: &str = "_SYSTEM.ERROR";
/// Number of completed scan cycles; continues across stop/start.
pub const CYCLE_COUNT: &str = "_SYSTEM.CYCLE_COUNT";

pub fn system_tags() -> &'static [&'static str] {
    &[SCAN_TIME, RUNNING, ERROR, CYCLE_COUNT]
}

pub fn is_system_tag(name: &str) -> bool {
    name.starts_with(SYSTEM_PREFIX)
}

// ---------------------------------------------------------------------------
// TagValue
// ---------------------------------------------------------------------------

/// Value of a single tag. Ladder addressing is soft, so every variant can be
/// read back as any of the others.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagValue {
    Bool(bool),
    Int(i64),
    Real(f64),
}

impl TagValue {
    pub fn as_bool(self) -> bool {
        match self {
            TagValue::Bool(b) => b,
            TagValue::Int(i) => i != 0,
            TagValue::Real(r) => r != 0.0,
        }
    }

    pub fn as_int(self) -> i64 {
        match self {
            TagValue::Bool(b) => i64::from(b),
            TagValue::Int(i) => i,
            TagValue::Real(r) => r as i64,
        }
    }

    pub fn as_real(self) -> f64 {
        match self {
            TagValue::Bool(b) => {
                if b {
                    1.0
                } else {
                    0.0
                }
            }
            TagValue::Int(i) => i as f64,
            TagValue::Real(r) => r,
        }
    }

    pub fn type_name(self) -> &'static str {
        match self {
            TagValue::Bool(_) => "bool",
            TagValue::Int(_) => "int",
            TagValue::Real(_) => "real",
        }
    }
}

impl Default for TagValue {
    fn default() -> Self {
        TagValue::Bool(false)
    }
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::Bool(b) => write!(f, "{b}"),
            TagValue::Int(i) => write!(f, "{i}"),
            TagValue::Real(r) => write!(f, "{r:.2}"),
        }
    }
}

impl From<bool> for TagValue {
    fn from(b: bool) -> Self {
        TagValue::Bool(b)
    }
}

impl From<i64> for TagValue {
    fn from(i: i64) -> Self {
        TagValue::Int(i)
    }
}

impl From<f64> for TagValue {
    fn from(r: f64) -> Self {
        TagValue::Real(r)
    }
}

// ---------------------------------------------------------------------------
// TagStore
// ---------------------------------------------------------------------------

/// Shared, thread-safe handle to a tag database. Cloning the handle shares
/// the underlying map.
#[derive(Debug, Clone)]
pub struct TagStore {
    inner: Arc<Mutex<HashMap<String, TagValue>>>,
}

impl Default for TagStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TagStore {
    pub fn new() -> Self {
        let mut tags = HashMap::new();
        tags.insert(SCAN_TIME.to_string(), TagValue::Real(0.0));
        tags.insert(RUNNING.to_string(), TagValue::Bool(false));
        tags.insert(ERROR.to_string(), TagValue::Bool(false));
        tags.insert(CYCLE_COUNT.to_string(), TagValue::Int(0));
        Self {
            inner: Arc::new(Mutex::new(tags)),
        }
    }

    // A panic while holding the lock cannot leave the map half-written:
    // every critical section is a single insert, lookup or retain.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, TagValue>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set(&self, name: &str, value: impl Into<TagValue>) {
        self.lock().insert(name.to_string(), value.into());
    }

    /// Read a tag, returning `default` when it has never been written.
    pub fn get(&self, name: &str, default: impl Into<TagValue>) -> TagValue {
        self.lock().get(name).copied().unwrap_or_else(|| default.into())
    }

    pub fn get_bool(&self, name: &str, default: bool) -> bool {
        self.get(name, default).as_bool()
    }

    pub fn get_int(&self, name: &str, default: i64) -> i64 {
        self.get(name, default).as_int()
    }

    pub fn get_real(&self, name: &str, default: f64) -> f64 {
        self.get(name, default).as_real()
    }

    pub fn exists(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    /// Create `name` with `initial` unless it already exists. Returns true if
    /// the tag was created.
    pub fn create_if_absent(&self, name: &str, initial: impl Into<TagValue>) -> bool {
        let mut tags = self.lock();
        if tags.contains_key(name) {
            return false;
        }
        tags.insert(name.to_string(), initial.into());
        true
    }

    /// Full copy of every tag, ordered by name.
    pub fn snapshot(&self) -> BTreeMap<String, TagValue> {
        self.lock()
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }

    /// Remove every non-system tag. System tags keep their current values.
    pub fn clear_user_tags(&self) {
        self.lock().retain(|name, _| is_system_tag(name));
    }

    /// Replace the store contents with `snapshot`.
    ///
    /// User tags are replaced wholesale. System counters present in the
    /// snapshot are restored, except `_SYSTEM.RUNNING`, which is always false
    /// afterwards. Unknown `_SYSTEM` names in the snapshot are ignored.
    pub fn restore(&self, snapshot: &BTreeMap<String, TagValue>) {
        let mut tags = self.lock();
        tags.retain(|name, _| is_system_tag(name));
        for (name, value) in snapshot {
            if is_system_tag(name) {
                if name != RUNNING && tags.contains_key(name) {
                    tags.insert(name.clone(), *value);
                }
            } else {
                tags.insert(name.clone(), *value);
            }
        }
        tags.insert(RUNNING.to_string(), TagValue::Bool(false));
    }

    pub fn user_tag_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .lock()
            .keys()
            .filter(|name| !is_system_tag(name))
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_tags_exist_after_construction() {
        let store = TagStore::new();
        for name in system_tags() {
            assert!(store.exists(name), "missing {name}");
        }
        assert_eq!(store.get(SCAN_TIME, 1.0), TagValue::Real(0.0));
        assert_eq!(store.get(CYCLE_COUNT, 7_i64), TagValue::Int(0));
        assert!(!store.get_bool(RUNNING, true));
        assert!(!store.get_bool(ERROR, true));
    }

    #[test]
    fn get_unset_returns_caller_default() {
        let store = TagStore::new();
        assert!(!store.exists("NEVER_WRITTEN"));
        assert!(store.get_bool("NEVER_WRITTEN", true));
        assert!(!store.get_bool("NEVER_WRITTEN", false));
        assert_eq!(store.get_int("NEVER_WRITTEN.ACC", 42), 42);
        assert!(!store.exists("NEVER_WRITTEN"));
    }

    #[test]
    fn set_overwrites_and_get_reads_back() {
        let store = TagStore::new();
        store.set("MOTOR", true);
        assert!(store.get_bool("MOTOR", false));
        store.set("MOTOR", false);
        assert!(!store.get_bool("MOTOR", true));
        store.set("SPEED", 12.5);
        assert_eq!(store.get_real("SPEED", 0.0), 12.5);
    }

    #[test]
    fn create_if_absent_does_not_overwrite() {
        let store = TagStore::new();
        assert!(store.create_if_absent("T.ACC", 0_i64));
        store.set("T.ACC", 5_i64);
        assert!(!store.create_if_absent("T.ACC", 0_i64));
        assert_eq!(store.get_int("T.ACC", 0), 5);
    }

    #[test]
    fn clear_user_tags_keeps_exactly_system_tags() {
        let store = TagStore::new();
        store.set(CYCLE_COUNT, 17_i64);
        store.set(SCAN_TIME, 3.25);
        store.set("START", true);
        store.set("TIMER.DN", true);
        store.set("COUNT.ACC", 3_i64);

        store.clear_user_tags();

        let snap = store.snapshot();
        let mut names: Vec<&str> = snap.keys().map(|k| k.as_str()).collect();
        names.sort();
        let mut expected = system_tags().to_vec();
        expected.sort();
        assert_eq!(names, expected);
        assert_eq!(snap[CYCLE_COUNT], TagValue::Int(17));
        assert_eq!(snap[SCAN_TIME], TagValue::Real(3.25));
    }

    #[test]
    fn snapshot_is_an_independent_copy() {
        let store = TagStore::new();
        store.set("A", true);
        let snap = store.snapshot();
        store.set("A", false);
        assert_eq!(snap["A"], TagValue::Bool(true));
    }

    #[test]
    fn restore_replaces_user_tags_and_clears_running() {
        let store = TagStore::new();
        store.set("OLD", true);
        store.set(RUNNING, true);

        let mut snap = BTreeMap::new();
        snap.insert("NEW".to_string(), TagValue::Int(4));
        snap.insert(CYCLE_COUNT.to_string(), TagValue::Int(99));
        snap.insert(RUNNING.to_string(), TagValue::Bool(true));
        snap.insert("_SYSTEM.BOGUS".to_string(), TagValue::Bool(true));
        store.restore(&snap);

        assert!(!store.exists("OLD"));
        assert_eq!(store.get_int("NEW", 0), 4);
        assert_eq!(store.get_int(CYCLE_COUNT, 0), 99);
        assert!(!store.get_bool(RUNNING, true));
        assert!(!store.exists("_SYSTEM.BOGUS"));
    }

    #[test]
    fn clones_share_state() {
        let store = TagStore::new();
        let other = store.clone();
        other.set("SHARED", true);
        assert!(store.get_bool("SHARED", false));
    }

    #[test]
    fn concurrent_writers_do_not_lose_tags() {
        let store = TagStore::new();
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let s = store.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        s.set(&format!("T{t}.B{i}"), true);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.user_tag_names().len(), 400);
    }

    #[test]
    fn value_conversions() {
        assert!(TagValue::Int(2).as_bool());
        assert!(!TagValue::Real(0.0).as_bool());
        assert_eq!(TagValue::Bool(true).as_int(), 1);
        assert_eq!(TagValue::Real(2.9).as_int(), 2);
        assert_eq!(TagValue::Int(3).as_real(), 3.0);
    }

    #[test]
    fn untagged_json_round_trip_keeps_variant() {
        let json = r#"{"a": true, "b": 3, "c": 1.5}"#;
        let map: BTreeMap<String, TagValue> = serde_json::from_str(json).unwrap();
        assert_eq!(map["a"], TagValue::Bool(true));
        assert_eq!(map["b"], TagValue::Int(3));
        assert_eq!(map["c"], TagValue::Real(1.5));
    }
}
