//! The typed key-space
//!
//! A single mapping from key bytes to a tagged value plus an optional
//! absolute expiration. Expiration is lazy: every read path checks the
//! deadline first and removes a dead entry before answering, so an expired
//! key is never observable.

pub mod geo;
pub mod glob;
pub mod stream;
pub mod value;
pub mod zset;

use std::collections::{HashMap, VecDeque};

use crate::store::glob::glob_match;
use crate::store::stream::Stream;
use crate::store::value::Value;
use crate::store::zset::SortedSet;
use crate::utils::now_ms;

/// Marker for an operation that hit a key holding the wrong value kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WrongType;

/// A stored value with its expiration deadline (`0` = never expires).
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub value: Value,
    pub expires_at_ms: u64,
}

impl Entry {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            expires_at_ms: 0,
        }
    }

    fn is_expired(&self, now: u64) -> bool {
        self.expires_at_ms != 0 && now >= self.expires_at_ms
    }
}

/// The process-wide key → value mapping.
#[derive(Debug, Default)]
pub struct Store {
    map: HashMap<Vec<u8>, Entry>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the entry if its deadline has passed. Called on every access.
    fn expire_if_due(&mut self, key: &[u8]) {
        let now = now_ms();
        if let Some(entry) = self.map.get(key)
            && entry.is_expired(now)
        {
            self.map.remove(key);
        }
    }

    pub fn get(&mut self, key: &[u8]) -> Option<&Value> {
        self.expire_if_due(key);
        self.map.get(key).map(|e| &e.value)
    }

    pub fn get_mut(&mut self, key: &[u8]) -> Option<&mut Value> {
        self.expire_if_due(key);
        self.map.get_mut(key).map(|e| &mut e.value)
    }

    /// Insert or replace `key` with `value`; `expires_at_ms` of 0 means the
    /// entry never expires.
    pub fn insert(&mut self, key: Vec<u8>, value: Value, expires_at_ms: u64) {
        self.map.insert(
            key,
            Entry {
                value,
                expires_at_ms,
            },
        );
    }

    /// Insert a pre-built entry (RDB load path). Entries already past their
    /// deadline are skipped.
    pub fn load_entry(&mut self, key: Vec<u8>, entry: Entry) {
        if !entry.is_expired(now_ms()) {
            self.map.insert(key, entry);
        }
    }

    pub fn remove(&mut self, key: &[u8]) -> bool {
        self.expire_if_due(key);
        self.map.remove(key).is_some()
    }

    pub fn exists(&mut self, key: &[u8]) -> bool {
        self.expire_if_due(key);
        self.map.contains_key(key)
    }

    /// The kind name `TYPE` reports; "none" for a missing key.
    pub fn type_name(&mut self, key: &[u8]) -> &'static str {
        match self.get(key) {
            Some(value) => value.type_name(),
            None => "none",
        }
    }

    /// All live keys matching the glob `pattern`.
    pub fn keys(&mut self, pattern: &[u8]) -> Vec<Vec<u8>> {
        let now = now_ms();
        self.map.retain(|_, entry| !entry.is_expired(now));
        self.map
            .keys()
            .filter(|key| glob_match(pattern, key))
            .cloned()
            .collect()
    }

    /// The string under `key`, or `Ok(None)` when missing/expired.
    pub fn get_string(&mut self, key: &[u8]) -> Result<Option<&Vec<u8>>, WrongType> {
        match self.get(key) {
            Some(Value::Str(s)) => Ok(Some(s)),
            Some(_) => Err(WrongType),
            None => Ok(None),
        }
    }

    /// The list under `key`, created empty if the key is absent.
    pub fn list_entry(&mut self, key: &[u8]) -> Result<&mut VecDeque<Vec<u8>>, WrongType> {
        self.expire_if_due(key);
        let entry = self
            .map
            .entry(key.to_vec())
            .or_insert_with(|| Entry::new(Value::List(VecDeque::new())));
        match &mut entry.value {
            Value::List(list) => Ok(list),
            _ => Err(WrongType),
        }
    }

    /// The existing list under `key`, without creating one.
    pub fn list(&mut self, key: &[u8]) -> Result<Option<&mut VecDeque<Vec<u8>>>, WrongType> {
        match self.get_mut(key) {
            Some(Value::List(list)) => Ok(Some(list)),
            Some(_) => Err(WrongType),
            None => Ok(None),
        }
    }

    /// The stream under `key`, created empty if the key is absent.
    pub fn stream_entry(&mut self, key: &[u8]) -> Result<&mut Stream, WrongType> {
        self.expire_if_due(key);
        let entry = self
            .map
            .entry(key.to_vec())
            .or_insert_with(|| Entry::new(Value::Stream(Stream::new())));
        match &mut entry.value {
            Value::Stream(stream) => Ok(stream),
            _ => Err(WrongType),
        }
    }

    /// The existing stream under `key`, without creating one.
    pub fn stream(&mut self, key: &[u8]) -> Result<Option<&Stream>, WrongType> {
        match self.get(key) {
            Some(Value::Stream(stream)) => Ok(Some(stream)),
            Some(_) => Err(WrongType),
            None => Ok(None),
        }
    }

    /// The sorted set under `key`, created empty if the key is absent.
    pub fn zset_entry(&mut self, key: &[u8]) -> Result<&mut SortedSet, WrongType> {
        self.expire_if_due(key);
        let entry = self
            .map
            .entry(key.to_vec())
            .or_insert_with(|| Entry::new(Value::SortedSet(SortedSet::new())));
        match &mut entry.value {
            Value::SortedSet(zset) => Ok(zset),
            _ => Err(WrongType),
        }
    }

    /// The existing sorted set under `key`, without creating one.
    pub fn zset(&mut self, key: &[u8]) -> Result<Option<&SortedSet>, WrongType> {
        match self.get(key) {
            Some(Value::SortedSet(zset)) => Ok(Some(zset)),
            Some(_) => Err(WrongType),
            None => Ok(None),
        }
    }

    /// Remove `key` if it holds an empty list. Lists emptied by pops
    /// disappear from the keyspace.
    pub fn drop_if_empty_list(&mut self, key: &[u8]) {
        if let Some(Value::List(list)) = self.get(key)
            && list.is_empty()
        {
            self.map.remove(key);
        }
    }

    /// Remove `key` if it holds an empty sorted set.
    pub fn drop_if_empty_zset(&mut self, key: &[u8]) {
        if let Some(Value::SortedSet(zset)) = self.get(key)
            && zset.is_empty()
        {
            self.map.remove(key);
        }
    }

    /// Number of live entries; test and INFO helper.
    pub fn len(&mut self) -> usize {
        let now = now_ms();
        self.map.retain(|_, entry| !entry.is_expired(now));
        self.map.len()
    }
}

/// Normalize an inclusive `[start, stop]` index range with Python-style
/// negatives against a collection of `len` items. `None` means the range is
/// empty after normalization.
pub fn normalize_range(start: i64, stop: i64, len: usize) -> Option<(usize, usize)> {
    if len == 0 {
        return None;
    }
    let len = len as i64;
    let mut start = if start < 0 { start + len } else { start };
    let mut stop = if stop < 0 { stop + len } else { stop };
    if start < 0 {
        start = 0;
    }
    if stop >= len {
        stop = len - 1;
    }
    if start >= len || start > stop || stop < 0 {
        return None;
    }
    Some((start as usize, stop as usize))
}
