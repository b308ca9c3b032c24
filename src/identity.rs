//! The identity map: one live row instance per persisted row.
//!
//! Entries are weak. The bean that owns a row keeps it alive; once the caller
//! lets go of the bean the row is freed and its entry goes stale. A stale entry
//! is dropped when it is next looked up, and a sweep every `sweep_interval`
//! insertions clears the ones nobody asks for again.

use core::hash::{BuildHasherDefault, Hash, Hasher};
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::cell::RefCell;

use seahash::SeaHasher;
use tracing::debug;

use crate::bean::RowRef;
use crate::row::Row;
use crate::value::{Columns, Value};

pub type OtherHasher = BuildHasherDefault<SeaHasher>;

/// Key of a row within its table.
///
/// A single-column primary key is used as is; a composite key is reduced to a
/// seahash of its column/value pairs in column order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PkHash {
    Scalar(Value),
    Composite(u64),
}

impl PkHash {
    pub fn of(primary_key: &Columns) -> Option<PkHash> {
        match primary_key.len() {
            0 => None,
            1 => primary_key.values().next().cloned().map(PkHash::Scalar),
            _ => {
                let mut hasher = SeaHasher::new();
                for (column, value) in primary_key {
                    column.hash(&mut hasher);
                    value.hash(&mut hasher);
                }
                Some(PkHash::Composite(hasher.finish()))
            }
        }
    }
}

type Entries = HashMap<PkHash, Weak<RefCell<Row>>, OtherHasher>;

#[derive(Debug)]
pub struct IdentityMap {
    entries: HashMap<String, Entries, OtherHasher>,
    sweep_interval: usize,
    sets_since_sweep: usize,
}

impl IdentityMap {
    pub fn new(sweep_interval: usize) -> Self {
        Self {
            entries: HashMap::default(),
            sweep_interval: sweep_interval.max(1),
            sets_since_sweep: 0,
        }
    }

    pub fn get(&mut self, table: &str, key: &PkHash) -> Option<RowRef> {
        let entries = self.entries.get_mut(table)?;
        match entries.get(key).map(Weak::upgrade) {
            Some(Some(row)) => Some(row),
            Some(None) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn set(&mut self, table: &str, key: PkHash, row: &RowRef) {
        self.entries
            .entry(table.to_owned())
            .or_default()
            .insert(key, Rc::downgrade(row));
        self.sets_since_sweep += 1;
        if self.sets_since_sweep >= self.sweep_interval {
            self.sweep();
        }
    }

    pub fn remove(&mut self, table: &str, key: &PkHash) {
        if let Some(entries) = self.entries.get_mut(table) {
            entries.remove(key);
        }
    }

    /// Drops every entry whose row has been freed. Returns how many were dropped.
    pub fn sweep(&mut self) -> usize {
        self.sets_since_sweep = 0;
        let mut dropped = 0;
        for entries in self.entries.values_mut() {
            let before = entries.len();
            entries.retain(|_, row| row.strong_count() > 0);
            dropped += before - entries.len();
        }
        self.entries.retain(|_, entries| !entries.is_empty());
        debug!(dropped, "swept identity map");
        dropped
    }

    /// Number of entries whose row is still alive.
    pub fn len(&self) -> usize {
        self.entries
            .values()
            .flat_map(|entries| entries.values())
            .filter(|row| row.strong_count() > 0)
            .count()
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Number of entries held, stale ones included.
    pub fn capacity_used(&self) -> usize {
        self.entries.values().map(HashMap::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::RowState;

    fn row() -> RowRef {
        Rc::new(RefCell::new(Row::new("person", vec!["id".into()], RowState::Loaded)))
    }
    fn key(i: i64) -> PkHash {
        let mut pk = Columns::new();
        pk.insert("id".into(), Value::from(i));
        PkHash::of(&pk).unwrap()
    }

    #[test]
    fn single_column_keys_are_scalar() {
        assert_eq!(key(4), PkHash::Scalar(Value::Integer(4)));
        assert!(PkHash::of(&Columns::new()).is_none());
    }

    #[test]
    fn composite_keys_hash_deterministically() {
        let mut a = Columns::new();
        a.insert("x".into(), Value::from(1));
        a.insert("y".into(), Value::from("b"));
        let mut b = Columns::new();
        b.insert("y".into(), Value::from("b"));
        b.insert("x".into(), Value::from(1));
        assert_eq!(PkHash::of(&a), PkHash::of(&b));
        b.insert("y".into(), Value::from("c"));
        assert_ne!(PkHash::of(&a), PkHash::of(&b));
    }

    #[test]
    fn returns_the_same_instance_while_alive() {
        let mut map = IdentityMap::new(100);
        let kept = row();
        map.set("person", key(1), &kept);
        let found = map.get("person", &key(1)).unwrap();
        assert!(Rc::ptr_eq(&kept, &found));
        assert!(map.get("person", &key(2)).is_none());
        assert!(map.get("team", &key(1)).is_none());
    }

    #[test]
    fn stale_entries_heal_on_get() {
        let mut map = IdentityMap::new(100);
        map.set("person", key(1), &row());
        assert_eq!(map.capacity_used(), 1);
        assert!(map.get("person", &key(1)).is_none());
        assert_eq!(map.capacity_used(), 0);
    }

    #[test]
    fn periodic_sweep_bounds_dead_entries() {
        let mut map = IdentityMap::new(3);
        let kept = row();
        map.set("person", key(0), &kept);
        map.set("person", key(1), &row());
        assert_eq!(map.capacity_used(), 2);
        map.set("person", key(2), &row());
        // the third set triggered a sweep
        assert_eq!(map.capacity_used(), 1);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn remove_evicts() {
        let mut map = IdentityMap::new(100);
        let kept = row();
        map.set("person", key(1), &kept);
        map.remove("person", &key(1));
        assert!(map.get("person", &key(1)).is_none());
        assert!(map.is_empty());
    }
}
