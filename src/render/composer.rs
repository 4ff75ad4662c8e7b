use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cache::bitmaps::BitmapCache;
use crate::cache::files::{FileCache, LAYER_EXT, MASK_EXT, artifact_path, remove_artifact};
use crate::command::request::CompositeRequest;
use crate::foundation::core::Bitmap;
use crate::foundation::error::MapAnimResult;
use crate::placeholder::PlaceholderFactory;
use crate::progress::{PipelineEvent, ProgressSink};
use crate::render::batch::{BatchRunner, StageControl};
use crate::render::{StageOutcome, StageParams};
use crate::tools::{CompositeJob, RenderTools};

/// Composes rendered layer files into frame bitmaps.
///
/// A stack that cannot be composed (missing layer file, compositor failure, unreadable output)
/// still gets a bitmap: the "Failed to render" placeholder.
pub struct BatchComposer {
    tools: Arc<dyn RenderTools>,
    control: Arc<StageControl>,
    placeholders: Arc<PlaceholderFactory>,
}

impl BatchComposer {
    /// Create a composer invoking `tools`, stoppable through `control`.
    pub fn new(
        tools: Arc<dyn RenderTools>,
        control: Arc<StageControl>,
        placeholders: Arc<PlaceholderFactory>,
    ) -> Self {
        Self {
            tools,
            control,
            placeholders,
        }
    }

    /// Number of `stacks` that [`Self::compose`] would execute.
    pub fn dry_run(
        &self,
        bitmaps: &BitmapCache,
        stacks: &[CompositeRequest],
        params: &StageParams<'_>,
    ) -> usize {
        stacks
            .iter()
            .filter(|s| needs_compose(bitmaps, s, params))
            .count()
    }

    /// Compose every stack without a cached bitmap of the target size.
    ///
    /// `stacks` must not repeat a key.
    #[tracing::instrument(skip_all, fields(stacks = stacks.len(), nprocs = params.nprocs))]
    pub fn compose(
        &self,
        files: &FileCache,
        bitmaps: &mut BitmapCache,
        stacks: &[CompositeRequest],
        params: &StageParams<'_>,
        sink: &mut dyn ProgressSink,
    ) -> MapAnimResult<StageOutcome> {
        let _running = self.control.begin();
        let runner = BatchRunner::new(params.nprocs, "compose")?;
        let mut retained = Vec::new();
        let mut todo = Vec::new();
        for stack in stacks {
            if needs_compose(bitmaps, stack, params) {
                todo.push(stack.clone());
            } else {
                bitmaps.retain(stack.key())?;
                retained.push(stack.key());
            }
        }

        let total = todo.len();
        let hits = retained.len();
        let tools = self.tools.as_ref();
        let mut failed = 0usize;

        let completed = runner.run(
            todo,
            &self.control,
            |stack| compose_one(tools, files, stack, params),
            |batch, done| {
                for (stack, bitmap) in batch {
                    let bitmap = bitmap.unwrap_or_else(|| {
                        failed += 1;
                        self.placeholders.failed(params.size)
                    });
                    bitmaps.put(stack.key(), bitmap);
                    retained.push(stack.key());
                }
                sink.on_event(&PipelineEvent::CompositionContinues {
                    current: done,
                    total,
                });
                Ok(())
            },
        )?;

        tracing::info!(total, hits, failed, completed, "composite stage finished");
        Ok(StageOutcome {
            completed,
            retained,
        })
    }
}

fn needs_compose(
    bitmaps: &BitmapCache,
    stack: &CompositeRequest,
    params: &StageParams<'_>,
) -> bool {
    params.force
        || bitmaps
            .get(stack.key())
            .is_none_or(|b| b.size() != params.size)
}

/// Job handed to the compositor: inputs, masks and opacities run bottom layer first, the reverse
/// of the stack order.
pub(crate) fn composite_job(
    stack: &CompositeRequest,
    layer_files: Vec<PathBuf>,
    params: &StageParams<'_>,
) -> CompositeJob {
    let inputs = layer_files.into_iter().rev().collect::<Vec<_>>();
    let masks = inputs.iter().map(|p| p.with_extension(MASK_EXT)).collect();
    let opacities = stack.opacities().iter().rev().copied().collect();
    CompositeJob {
        inputs,
        masks,
        opacities,
        bgcolor: params.bgcolor,
        size: params.size,
        output: artifact_path(params.dir, stack.key(), LAYER_EXT),
    }
}

fn compose_one(
    tools: &dyn RenderTools,
    files: &FileCache,
    stack: &CompositeRequest,
    params: &StageParams<'_>,
) -> Option<Bitmap> {
    let layer_files = stack
        .layers()
        .iter()
        .map(|l| files.get(l.key()).filter(|p| p.exists()).map(Path::to_path_buf))
        .collect::<Option<Vec<_>>>();
    let Some(layer_files) = layer_files else {
        tracing::warn!(key = %stack.key(), "composite skipped, a layer has no rendered file");
        return None;
    };

    let job = composite_job(stack, layer_files, params);
    let status = tools.composite(&job);
    if !status.success() {
        tracing::warn!(
            key = %stack.key(),
            code = ?status.code,
            diagnostics = %status.diagnostics,
            "composite failed"
        );
        remove_artifact(&job.output);
        return None;
    }

    let decoded = Bitmap::decode_file(&job.output);
    remove_artifact(&job.output);
    match decoded {
        Ok(bitmap) => Some(bitmap),
        Err(e) => {
            tracing::warn!(key = %stack.key(), error = %e, "composite output unreadable");
            None
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/composer.rs"]
mod tests;
