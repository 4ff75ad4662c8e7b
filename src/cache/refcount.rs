use std::collections::HashMap;

use crate::command::fingerprint::CacheKey;
use crate::foundation::error::{MapAnimError, MapAnimResult};

/// Map from [`CacheKey`] to an artifact with a reference count per key.
///
/// `put` stores (or overwrites) and counts one reference; `retain` counts one more reference to an
/// artifact already stored; `release` gives one back. Nothing is removed until
/// [`RefCounter::take_unreferenced`] is called by the owning cache's sweep.
#[derive(Debug)]
pub struct RefCounter<V> {
    entries: HashMap<CacheKey, V>,
    refs: HashMap<CacheKey, u64>,
}

impl<V> Default for RefCounter<V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            refs: HashMap::new(),
        }
    }
}

impl<V> RefCounter<V> {
    /// Empty counter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Artifact stored for `key`.
    pub fn get(&self, key: CacheKey) -> Option<&V> {
        self.entries.get(&key)
    }

    /// Whether an artifact is stored for `key`.
    pub fn contains(&self, key: CacheKey) -> bool {
        self.entries.contains_key(&key)
    }

    /// Store `value` and count one reference. Returns the new count.
    pub fn put(&mut self, key: CacheKey, value: V) -> u64 {
        self.entries.insert(key, value);
        let n = self.refs.entry(key).or_insert(0);
        *n += 1;
        tracing::trace!(%key, refs = *n, "put");
        *n
    }

    /// Count one more reference to an existing artifact. Returns the new count.
    pub fn retain(&mut self, key: CacheKey) -> MapAnimResult<u64> {
        if !self.entries.contains_key(&key) {
            return Err(MapAnimError::cache(format!("retain of unknown key {key}")));
        }
        let n = self.refs.entry(key).or_insert(0);
        *n += 1;
        tracing::trace!(%key, refs = *n, "retain");
        Ok(*n)
    }

    /// Give back one reference. Returns the new count.
    ///
    /// Unknown keys and counts already at zero are errors: either means a load/unload pairing
    /// bug in the caller.
    pub fn release(&mut self, key: CacheKey) -> MapAnimResult<u64> {
        let Some(n) = self.refs.get_mut(&key) else {
            return Err(MapAnimError::cache(format!("release of unknown key {key}")));
        };
        if *n == 0 {
            return Err(MapAnimError::cache(format!(
                "release of key {key} with no outstanding references"
            )));
        }
        *n -= 1;
        tracing::trace!(%key, refs = *n, "release");
        Ok(*n)
    }

    /// Current reference count of `key`, or `None` when the key is unknown.
    pub fn ref_count(&self, key: CacheKey) -> Option<u64> {
        self.refs.get(&key).copied()
    }

    /// Number of stored artifacts.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stored keys, in no particular order.
    pub fn keys(&self) -> impl Iterator<Item = CacheKey> + '_ {
        self.entries.keys().copied()
    }

    /// Remove and return every entry without outstanding references, except those `keep` holds
    /// on to.
    pub fn take_unreferenced(&mut self, keep: impl Fn(CacheKey) -> bool) -> Vec<(CacheKey, V)> {
        let dead = self
            .entries
            .keys()
            .copied()
            .filter(|k| !keep(*k) && self.refs.get(k).copied().unwrap_or(0) == 0)
            .collect::<Vec<_>>();

        let mut out = Vec::with_capacity(dead.len());
        for key in dead {
            self.refs.remove(&key);
            if let Some(v) = self.entries.remove(&key) {
                out.push((key, v));
            }
        }
        out
    }
}

#[cfg(test)]
#[path = "../../tests/unit/cache/refcount.rs"]
mod tests;
