//! External rendering collaborators.
//!
//! The pipeline never draws pixels itself: layers are rendered, 3D views produced and stacks
//! composited by external programs. [`RenderTools`] is the seam between the batch stages and
//! those programs; [`process::CommandTools`] is the production implementation.

/// Child-process implementation of [`RenderTools`].
pub mod process;

use std::path::PathBuf;

use crate::command::request::{Region, RenderCmd};
use crate::foundation::core::{ImageSize, Rgb8};

/// Render one 2D layer command to `output` (plus a `.pgm` mask sidecar when `transparent`).
#[derive(Clone, Debug, PartialEq)]
pub struct Render2dJob {
    /// Display command to run.
    pub cmd: RenderCmd,
    /// Region the layer is drawn in; `None` uses the ambient region.
    pub region: Option<Region>,
    /// Output image size.
    pub size: ImageSize,
    /// Background color.
    pub bgcolor: Rgb8,
    /// Draw over a transparent background.
    pub transparent: bool,
    /// Image file to write.
    pub output: PathBuf,
}

/// Render one 3D view command to `output` (opaque PPM).
#[derive(Clone, Debug, PartialEq)]
pub struct Render3dJob {
    /// `m.nviz.image` command to run.
    pub cmd: RenderCmd,
    /// Session-wide 3D view region.
    pub view_region: Option<Region>,
    /// Output image size.
    pub size: ImageSize,
    /// Background color.
    pub bgcolor: Rgb8,
    /// Image file to write. The program receives it without extension.
    pub output: PathBuf,
}

/// Blend rendered layer images with their masks into one opaque image.
///
/// Inputs are listed in the order the compositor draws them.
#[derive(Clone, Debug, PartialEq)]
pub struct CompositeJob {
    /// Layer images.
    pub inputs: Vec<PathBuf>,
    /// Alpha masks, aligned with `inputs`.
    pub masks: Vec<PathBuf>,
    /// Layer opacities, aligned with `inputs`.
    pub opacities: Vec<f64>,
    /// Background color under the lowest layer.
    pub bgcolor: Rgb8,
    /// Output image size.
    pub size: ImageSize,
    /// Image file to write.
    pub output: PathBuf,
}

/// Outcome of one collaborator invocation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ToolStatus {
    /// Exit code; `None` when the program could not be started, was killed, or died by signal.
    pub code: Option<i32>,
    /// Captured error output (or the reason the program could not run).
    pub diagnostics: String,
}

impl ToolStatus {
    /// A successful run.
    pub fn ok() -> Self {
        Self {
            code: Some(0),
            diagnostics: String::new(),
        }
    }

    /// A run that never produced an exit code.
    pub fn failed(diagnostics: impl Into<String>) -> Self {
        Self {
            code: None,
            diagnostics: diagnostics.into(),
        }
    }

    /// Whether the program exited with code 0.
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Invocation contracts of the external rendering programs.
///
/// Implementations are called concurrently from worker threads, one call per job. They must not
/// panic on failure: every failure is reported through [`ToolStatus`].
pub trait RenderTools: Send + Sync {
    /// Render a 2D layer.
    fn render_2d(&self, job: &Render2dJob) -> ToolStatus;

    /// Render a 3D view.
    fn render_3d(&self, job: &Render3dJob) -> ToolStatus;

    /// Composite a layer stack.
    fn composite(&self, job: &CompositeJob) -> ToolStatus;
}
