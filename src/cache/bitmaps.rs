use crate::cache::refcount::RefCounter;
use crate::command::fingerprint::CacheKey;
use crate::foundation::core::Bitmap;
use crate::foundation::error::MapAnimResult;

/// Composed frames (and 3D views) held in memory, plus the permanent "no data" bitmap stored
/// under [`CacheKey::NO_DATA`].
#[derive(Debug, Default)]
pub struct BitmapCache {
    bitmaps: RefCounter<Bitmap>,
}

impl BitmapCache {
    /// Empty cache (no sentinel yet).
    pub fn new() -> Self {
        Self::default()
    }

    /// Bitmap stored for `key`.
    pub fn get(&self, key: CacheKey) -> Option<&Bitmap> {
        self.bitmaps.get(key)
    }

    /// Whether a bitmap is stored for `key`.
    pub fn contains(&self, key: CacheKey) -> bool {
        self.bitmaps.contains(key)
    }

    /// Store a bitmap and count one reference.
    pub fn put(&mut self, key: CacheKey, bitmap: Bitmap) -> u64 {
        self.bitmaps.put(key, bitmap)
    }

    /// Count one more reference to an existing bitmap.
    pub fn retain(&mut self, key: CacheKey) -> MapAnimResult<u64> {
        self.bitmaps.retain(key)
    }

    /// Give back one reference.
    pub fn release(&mut self, key: CacheKey) -> MapAnimResult<u64> {
        self.bitmaps.release(key)
    }

    /// Current reference count of `key`.
    pub fn ref_count(&self, key: CacheKey) -> Option<u64> {
        self.bitmaps.ref_count(key)
    }

    /// Replace the "no data" bitmap.
    pub fn set_sentinel(&mut self, bitmap: Bitmap) {
        self.bitmaps.put(CacheKey::NO_DATA, bitmap);
    }

    /// The "no data" bitmap, once set.
    pub fn sentinel(&self) -> Option<&Bitmap> {
        self.bitmaps.get(CacheKey::NO_DATA)
    }

    /// Number of stored bitmaps, the sentinel included.
    pub fn len(&self) -> usize {
        self.bitmaps.len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.bitmaps.is_empty()
    }

    /// Stored keys.
    pub fn keys(&self) -> impl Iterator<Item = CacheKey> + '_ {
        self.bitmaps.keys()
    }

    /// Drop every bitmap without outstanding references. The sentinel is never dropped.
    pub fn sweep(&mut self) -> usize {
        let removed = self.bitmaps.take_unreferenced(CacheKey::is_no_data).len();
        tracing::debug!(removed, kept = self.bitmaps.len(), "bitmap cache sweep");
        removed
    }
}

#[cfg(test)]
#[path = "../../tests/unit/cache/bitmaps.rs"]
mod tests;
