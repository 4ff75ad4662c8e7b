//! Reference-counted content caches.
//!
//! Entries are never evicted implicitly: the refcount and an explicit `sweep` are the only
//! authorities on liveness.

/// In-memory frame bitmaps.
pub mod bitmaps;
/// Rendered layer files on disk.
pub mod files;
/// Key to artifact map with per-key reference counts.
pub mod refcount;

pub use bitmaps::BitmapCache;
pub use files::{FileCache, artifact_path};
pub use refcount::RefCounter;
