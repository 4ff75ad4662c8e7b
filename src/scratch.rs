use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Context as _;

use crate::foundation::error::MapAnimResult;

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

/// Working directory for rendered artifacts, removed with its contents on drop.
///
/// Directories adopted with [`ScratchDir::at`] are only removed when this value created them.
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
    remove_on_drop: bool,
}

impl ScratchDir {
    /// Create a fresh, uniquely named directory under the system temp dir.
    pub fn create() -> MapAnimResult<Self> {
        let base = std::env::temp_dir();
        loop {
            let path = base.join(format!(
                "mapanim_{}_{}_{}",
                std::process::id(),
                std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .map(|d| d.as_nanos())
                    .unwrap_or(0),
                NEXT_ID.fetch_add(1, Ordering::Relaxed)
            ));
            match std::fs::create_dir(&path) {
                Ok(()) => {
                    tracing::debug!(path = %path.display(), "created scratch dir");
                    return Ok(Self {
                        path,
                        remove_on_drop: true,
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(anyhow::Error::new(e)
                        .context(format!("create scratch dir '{}'", path.display()))
                        .into());
                }
            }
        }
    }

    /// Use `path`, creating it (and its parents) when missing.
    pub fn at(path: impl Into<PathBuf>) -> MapAnimResult<Self> {
        let path = path.into();
        let existed = path.is_dir();
        std::fs::create_dir_all(&path)
            .with_context(|| format!("create scratch dir '{}'", path.display()))?;
        Ok(Self {
            path,
            remove_on_drop: !existed,
        })
    }

    /// Keep the directory on drop.
    pub fn keep(&mut self) {
        self.remove_on_drop = false;
    }

    /// Directory path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if !self.remove_on_drop {
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!(path = %self.path.display(), error = %e, "scratch dir not removed");
        }
    }
}

#[cfg(test)]
#[path = "../tests/unit/scratch.rs"]
mod tests;
