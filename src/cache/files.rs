use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use crate::cache::refcount::RefCounter;
use crate::command::fingerprint::CacheKey;
use crate::foundation::core::ImageSize;
use crate::foundation::error::MapAnimResult;

/// Extension of rendered layer images.
pub const LAYER_EXT: &str = "ppm";
/// Extension of the alpha mask written next to a layer image.
pub const MASK_EXT: &str = "pgm";

/// Path of the artifact produced for `key` inside `dir`: `dir/<key>.<ext>`.
pub fn artifact_path(dir: &Path, key: CacheKey, ext: &str) -> PathBuf {
    dir.join(format!("{key}.{ext}"))
}

/// Rendered layer files on disk, with the size each was rendered at.
#[derive(Debug, Default)]
pub struct FileCache {
    files: RefCounter<PathBuf>,
    sizes: HashMap<CacheKey, ImageSize>,
}

impl FileCache {
    /// Empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// File stored for `key`.
    pub fn get(&self, key: CacheKey) -> Option<&Path> {
        self.files.get(key).map(PathBuf::as_path)
    }

    /// Size the file for `key` was rendered at.
    pub fn size(&self, key: CacheKey) -> Option<ImageSize> {
        self.sizes.get(&key).copied()
    }

    /// Whether `key` has a file of `size` that still exists on disk.
    pub fn is_fresh(&self, key: CacheKey, size: ImageSize) -> bool {
        self.size(key) == Some(size) && self.get(key).is_some_and(Path::exists)
    }

    /// Store a rendered file and count one reference.
    pub fn put(&mut self, key: CacheKey, path: PathBuf, size: ImageSize) -> u64 {
        self.sizes.insert(key, size);
        self.files.put(key, path)
    }

    /// Count one more reference to an existing file.
    pub fn retain(&mut self, key: CacheKey) -> MapAnimResult<u64> {
        self.files.retain(key)
    }

    /// Give back one reference.
    pub fn release(&mut self, key: CacheKey) -> MapAnimResult<u64> {
        self.files.release(key)
    }

    /// Current reference count of `key`.
    pub fn ref_count(&self, key: CacheKey) -> Option<u64> {
        self.files.ref_count(key)
    }

    /// Number of stored files.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Stored keys.
    pub fn keys(&self) -> impl Iterator<Item = CacheKey> + '_ {
        self.files.keys()
    }

    /// Delete every file without outstanding references, its `.pgm` mask sidecar when the file is
    /// a `.ppm`, and its recorded size. Returns the number of entries removed.
    pub fn sweep(&mut self) -> usize {
        let dead = self.files.take_unreferenced(|_| false);
        for (key, path) in &dead {
            self.sizes.remove(key);
            remove_artifact(path);
            if path.extension().is_some_and(|e| e == LAYER_EXT) {
                remove_artifact(&path.with_extension(MASK_EXT));
            }
        }
        tracing::debug!(removed = dead.len(), kept = self.files.len(), "file cache sweep");
        dead.len()
    }
}

pub(crate) fn remove_artifact(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to remove artifact"),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/cache/files.rs"]
mod tests;
