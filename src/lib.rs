//! mapanim turns sequences of map rendering commands into animation frames.
//!
//! Each frame is either a stack of 2D layers, rendered by external display programs and then
//! composited, or a 3D view rendered directly. The pipeline:
//!
//! - Describe frames with [`BitmapProvider::set_cmds`] and [`BitmapProvider::set_cmds_3d`]
//! - [`BitmapProvider::load`] renders unique commands, then composes stacks, in bounded batches
//! - Read frames with [`BitmapProvider::get_bitmap`]
//!
//! Rendered files and frame bitmaps are cached by content key and reference-counted, so an
//! unchanged frame is never rendered twice.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod foundation;

pub mod cache;
pub mod command;
/// Placeholder bitmaps for missing and failed frames.
pub mod placeholder;
/// Load progress notifications.
pub mod progress;
/// Frame provider orchestrating both stages.
pub mod provider;
pub mod render;
/// Artifact working directory.
pub mod scratch;
pub mod tools;

pub use crate::foundation::core::{Bitmap, ImageSize, Rgb8};
pub use crate::foundation::error::{MapAnimError, MapAnimResult};

pub use crate::cache::{BitmapCache, FileCache, RefCounter};
pub use crate::command::fingerprint::{CacheKey, hash_cmd, hash_cmds, hash_stack};
pub use crate::command::request::{CmdKind, CompositeRequest, Region, RenderCmd, RenderRequest};
pub use crate::placeholder::PlaceholderFactory;
pub use crate::progress::{EventLog, NullSink, PipelineEvent, ProgressSink, TracingSink};
pub use crate::provider::{BitmapProvider, LoadOpts, LoadStats, ProviderOpts, SweepStats};
pub use crate::render::batch::StopHandle;
pub use crate::scratch::ScratchDir;
pub use crate::tools::process::{CommandTools, ToolOpts};
pub use crate::tools::{CompositeJob, Render2dJob, Render3dJob, RenderTools, ToolStatus};
