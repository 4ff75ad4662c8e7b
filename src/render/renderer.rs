use std::path::PathBuf;
use std::sync::Arc;

use crate::cache::files::{FileCache, LAYER_EXT, MASK_EXT, artifact_path, remove_artifact};
use crate::command::request::{CmdKind, Region, RenderRequest};
use crate::foundation::error::MapAnimResult;
use crate::progress::{PipelineEvent, ProgressSink};
use crate::render::batch::{BatchRunner, StageControl};
use crate::render::{StageOutcome, StageParams};
use crate::tools::{Render2dJob, Render3dJob, RenderTools};

/// Renders unique [`RenderRequest`]s into the file cache.
///
/// 2D layers are drawn with transparency (image plus mask sidecar); 3D views are drawn opaque.
pub struct BatchRenderer {
    tools: Arc<dyn RenderTools>,
    control: Arc<StageControl>,
}

impl BatchRenderer {
    /// Create a renderer invoking `tools`, stoppable through `control`.
    pub fn new(tools: Arc<dyn RenderTools>, control: Arc<StageControl>) -> Self {
        Self { tools, control }
    }

    /// Number of `requests` that [`Self::render`] would execute.
    pub fn dry_run(
        &self,
        files: &FileCache,
        requests: &[RenderRequest],
        params: &StageParams<'_>,
    ) -> usize {
        requests
            .iter()
            .filter(|r| needs_render(files, r, params))
            .count()
    }

    /// Render every request without a fresh cached file and store the results.
    ///
    /// Cached files are retained instead of re-rendered unless `params.force` is set. Individual
    /// failures are logged and leave their key unpopulated.
    #[tracing::instrument(skip_all, fields(requests = requests.len(), nprocs = params.nprocs))]
    pub fn render(
        &self,
        files: &mut FileCache,
        requests: &[RenderRequest],
        view_region: Option<&Region>,
        params: &StageParams<'_>,
        sink: &mut dyn ProgressSink,
    ) -> MapAnimResult<StageOutcome> {
        let _running = self.control.begin();
        let runner = BatchRunner::new(params.nprocs, "render")?;
        let mut retained = Vec::new();
        let mut todo = Vec::new();
        for req in requests {
            if needs_render(files, req, params) {
                todo.push(req.clone());
            } else {
                files.retain(req.key())?;
                retained.push(req.key());
            }
        }

        let total = todo.len();
        let hits = retained.len();
        let tools = self.tools.as_ref();
        let size = params.size;
        let mut failed = 0usize;

        let completed = runner.run(
            todo,
            &self.control,
            |req| render_one(tools, req, view_region, params),
            |batch, done| {
                for (req, output) in batch {
                    match output {
                        Some(path) => {
                            files.put(req.key(), path, size);
                            retained.push(req.key());
                        }
                        None => failed += 1,
                    }
                }
                sink.on_event(&PipelineEvent::RenderingContinues {
                    current: done,
                    total,
                });
                Ok(())
            },
        )?;

        tracing::info!(total, hits, failed, completed, "render stage finished");
        Ok(StageOutcome {
            completed,
            retained,
        })
    }
}

fn needs_render(files: &FileCache, req: &RenderRequest, params: &StageParams<'_>) -> bool {
    params.force || !files.is_fresh(req.key(), params.size)
}

fn render_one(
    tools: &dyn RenderTools,
    req: &RenderRequest,
    view_region: Option<&Region>,
    params: &StageParams<'_>,
) -> Option<PathBuf> {
    let output = artifact_path(params.dir, req.key(), LAYER_EXT);
    let status = match req.kind() {
        CmdKind::Layer2d => tools.render_2d(&Render2dJob {
            cmd: req.cmd().clone(),
            region: req.region().cloned(),
            size: params.size,
            bgcolor: params.bgcolor,
            transparent: true,
            output: output.clone(),
        }),
        CmdKind::View3d => tools.render_3d(&Render3dJob {
            cmd: req.cmd().clone(),
            view_region: view_region.cloned(),
            size: params.size,
            bgcolor: params.bgcolor,
            output: output.clone(),
        }),
    };

    if status.success() && output.exists() {
        return Some(output);
    }

    tracing::warn!(
        cmd = %req.cmd(),
        code = ?status.code,
        diagnostics = %status.diagnostics,
        "rendering failed"
    );
    if req.kind() == CmdKind::Layer2d {
        remove_artifact(&output);
        remove_artifact(&output.with_extension(MASK_EXT));
    }
    None
}
