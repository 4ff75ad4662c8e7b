//! The two batch stages of a load: rendering commands to files, then composing files into frames.

/// Bounded batch dispatcher and stop controls.
pub mod batch;
/// Stage composing rendered layers into frame bitmaps.
pub mod composer;
/// Stage rendering commands into layer files.
pub mod renderer;

use std::path::Path;

use crate::command::fingerprint::CacheKey;
use crate::foundation::core::{ImageSize, Rgb8};

/// Settings shared by both stages of one load.
#[derive(Clone, Copy, Debug)]
pub struct StageParams<'a> {
    /// Directory receiving artifacts.
    pub dir: &'a Path,
    /// Target image size.
    pub size: ImageSize,
    /// Background color.
    pub bgcolor: Rgb8,
    /// Re-execute requests even when a fresh artifact is cached.
    pub force: bool,
    /// Worker count (and batch size).
    pub nprocs: usize,
}

/// Result of running one stage.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StageOutcome {
    /// `false` when a stop request cut the stage short.
    pub completed: bool,
    /// Keys whose reference count this stage incremented, once per increment.
    pub retained: Vec<CacheKey>,
}
