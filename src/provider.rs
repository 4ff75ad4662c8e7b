use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cache::bitmaps::BitmapCache;
use crate::cache::files::{FileCache, remove_artifact};
use crate::command::fingerprint::{CacheKey, hash_cmd, hash_cmds};
use crate::command::request::{CmdKind, CompositeRequest, Region, RenderCmd, RenderRequest};
use crate::foundation::core::{Bitmap, ImageSize, Rgb8};
use crate::foundation::error::{MapAnimError, MapAnimResult};
use crate::placeholder::PlaceholderFactory;
use crate::progress::{PipelineEvent, ProgressSink};
use crate::render::StageParams;
use crate::render::batch::StopHandle;
use crate::render::composer::BatchComposer;
use crate::render::renderer::BatchRenderer;
use crate::scratch::ScratchDir;
use crate::tools::{Render2dJob, RenderTools};

/// Options fixed when a [`BitmapProvider`] is created.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ProviderOpts {
    /// Initial target image size.
    pub size: ImageSize,
    /// Directory receiving artifacts. `None` creates a temporary one.
    pub scratch_dir: Option<PathBuf>,
}

/// Options of one [`BitmapProvider::load`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct LoadOpts {
    /// Re-render and re-compose everything, ignoring cached artifacts.
    pub force: bool,
    /// Background color of renders and composites.
    pub bgcolor: Rgb8,
    /// Concurrent external program invocations per stage.
    pub nprocs: usize,
}

impl Default for LoadOpts {
    fn default() -> Self {
        Self {
            force: false,
            bgcolor: Rgb8::WHITE,
            nprocs: 4,
        }
    }
}

/// Outcome of one [`BitmapProvider::load`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoadStats {
    /// Requests the render stage had to execute.
    pub rendering_total: usize,
    /// Stacks the composite stage had to execute (0 when it did not run).
    pub composition_total: usize,
    /// `false` when a stop request cut the load short.
    pub completed: bool,
}

/// Entries removed by [`BitmapProvider::sweep`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Layer files deleted.
    pub files: usize,
    /// Bitmaps dropped.
    pub bitmaps: usize,
}

#[derive(Debug, Default)]
struct Session {
    composites: Vec<CompositeRequest>,
    unique: Vec<RenderRequest>,
    views_3d: Vec<RenderRequest>,
    region_3d: Option<Region>,
    retained_files: Vec<CacheKey>,
    retained_bitmaps: Vec<CacheKey>,
}

impl Session {
    fn recompute_unique(&mut self) {
        let mut seen = HashSet::new();
        self.unique = self
            .composites
            .iter()
            .flat_map(|c| c.layers())
            .filter(|r| seen.insert(r.key()))
            .cloned()
            .collect();
    }

    fn render_requests(&self) -> Vec<RenderRequest> {
        let mut seen = self.unique.iter().map(|r| r.key()).collect::<HashSet<_>>();
        let mut out = self.unique.clone();
        out.extend(
            self.views_3d
                .iter()
                .filter(|r| seen.insert(r.key()))
                .cloned(),
        );
        out
    }

    fn unique_stacks(&self) -> Vec<CompositeRequest> {
        let mut seen = HashSet::new();
        self.composites
            .iter()
            .filter(|c| seen.insert(c.key()))
            .cloned()
            .collect()
    }
}

/// Produces one bitmap per animation frame from external rendering commands.
///
/// Frames are either stacks of 2D layer commands, composited after rendering, or 3D view
/// commands whose render is the frame. Rendered files and frame bitmaps are cached by content
/// key and reference-counted per load, so reloading unchanged frames executes nothing.
///
/// Lifecycle: [`set_cmds`](Self::set_cmds) / [`set_cmds_3d`](Self::set_cmds_3d), then
/// [`load`](Self::load), then [`unload`](Self::unload) before setting new commands, and
/// [`sweep`](Self::sweep) to reclaim what no session references anymore.
pub struct BitmapProvider {
    size: ImageSize,
    files: FileCache,
    bitmaps: BitmapCache,
    tools: Arc<dyn RenderTools>,
    placeholders: Arc<PlaceholderFactory>,
    renderer: BatchRenderer,
    composer: BatchComposer,
    stop: StopHandle,
    session: Session,
    // Dropped last: removes the artifacts still referenced by the caches.
    scratch: ScratchDir,
}

impl BitmapProvider {
    /// Create a provider invoking `tools`.
    pub fn new(tools: Arc<dyn RenderTools>, opts: ProviderOpts) -> MapAnimResult<Self> {
        opts.size.validate()?;
        let scratch = match opts.scratch_dir {
            Some(dir) => ScratchDir::at(dir)?,
            None => ScratchDir::create()?,
        };
        let placeholders = Arc::new(PlaceholderFactory::new());
        let stop = StopHandle::new();
        let renderer = BatchRenderer::new(tools.clone(), stop.render().clone());
        let composer = BatchComposer::new(
            tools.clone(),
            stop.compose().clone(),
            placeholders.clone(),
        );

        let mut bitmaps = BitmapCache::new();
        bitmaps.set_sentinel(placeholders.no_data(opts.size));

        Ok(Self {
            size: opts.size,
            files: FileCache::new(),
            bitmaps,
            tools,
            placeholders,
            renderer,
            composer,
            stop,
            session: Session::default(),
            scratch,
        })
    }

    /// Append frames made of 2D layer stacks.
    ///
    /// Every stack is listed top layer first and must have one layer per entry of `opacities`.
    /// `regions`, when given, holds one optional region per stack.
    pub fn set_cmds(
        &mut self,
        stacks: Vec<Vec<RenderCmd>>,
        opacities: Vec<f64>,
        regions: Option<Vec<Option<Region>>>,
    ) -> MapAnimResult<()> {
        let regions = match regions {
            Some(r) if r.len() != stacks.len() => {
                return Err(MapAnimError::validation(format!(
                    "{} stacks but {} regions",
                    stacks.len(),
                    r.len()
                )));
            }
            Some(r) => r,
            None => vec![None; stacks.len()],
        };

        let composites = stacks
            .into_iter()
            .zip(regions)
            .map(|(cmds, region)| CompositeRequest::new(cmds, opacities.clone(), region))
            .collect::<MapAnimResult<Vec<_>>>()?;

        tracing::debug!(stacks = composites.len(), "set_cmds");
        self.session.composites.extend(composites);
        self.session.recompute_unique();
        Ok(())
    }

    /// Replace the frames rendered as 3D views, all in the session-wide `view_region`.
    pub fn set_cmds_3d(
        &mut self,
        cmds: Vec<RenderCmd>,
        view_region: Option<Region>,
    ) -> MapAnimResult<()> {
        if let Some(c) = cmds.iter().find(|c| c.kind() != CmdKind::View3d) {
            return Err(MapAnimError::validation(format!(
                "not a 3D view command: {c}"
            )));
        }
        tracing::debug!(views = cmds.len(), "set_cmds_3d");
        self.session.views_3d = cmds
            .into_iter()
            .map(|cmd| RenderRequest::new(cmd, None))
            .collect();
        self.session.region_3d = view_region;
        Ok(())
    }

    /// Give back every reference taken by `load` since the last unload and forget the commands.
    ///
    /// # Panics
    ///
    /// When a cache no longer holds a reference this session took, which means the caches were
    /// modified outside the provider's bookkeeping.
    pub fn unload(&mut self) {
        let session = std::mem::take(&mut self.session);
        for key in &session.retained_files {
            self.files
                .release(*key)
                .unwrap_or_else(|e| panic!("file cache out of sync on unload: {e}"));
        }
        for key in &session.retained_bitmaps {
            self.bitmaps
                .release(*key)
                .unwrap_or_else(|e| panic!("bitmap cache out of sync on unload: {e}"));
        }
        tracing::debug!(
            files = session.retained_files.len(),
            bitmaps = session.retained_bitmaps.len(),
            "unloaded"
        );
    }

    /// Render and compose every frame of the current commands.
    ///
    /// Progress is reported to `sink`. Only invalid options or a worker pool that cannot be
    /// built are errors; failed frames show a placeholder and a stop request is reported through
    /// [`LoadStats::completed`].
    #[tracing::instrument(skip(self, sink), fields(size = %self.size))]
    pub fn load(
        &mut self,
        opts: &LoadOpts,
        sink: &mut dyn ProgressSink,
    ) -> MapAnimResult<LoadStats> {
        if opts.nprocs == 0 {
            return Err(MapAnimError::validation("nprocs must be >= 1"));
        }
        let params = StageParams {
            dir: self.scratch.path(),
            size: self.size,
            bgcolor: opts.bgcolor,
            force: opts.force,
            nprocs: opts.nprocs,
        };
        let mut stats = LoadStats::default();

        let requests = self.session.render_requests();
        stats.rendering_total = self.renderer.dry_run(&self.files, &requests, &params);
        sink.on_event(&PipelineEvent::RenderingStarted {
            total: stats.rendering_total,
        });

        if opts.force || self.bitmaps.sentinel().is_none_or(|b| b.size() != self.size) {
            self.bitmaps
                .set_sentinel(self.placeholders.no_data(self.size));
        }

        // Composition is open for stop requests from the start of rendering.
        let compose_control = self.stop.compose().clone();
        let _composing = compose_control.begin();

        let rendered = self.renderer.render(
            &mut self.files,
            &requests,
            self.session.region_3d.as_ref(),
            &params,
            sink,
        );
        let rendered = match rendered {
            Ok(outcome) => outcome,
            Err(e) => {
                sink.on_event(&PipelineEvent::RenderingFinished);
                sink.on_event(&PipelineEvent::PipelineFinished);
                return Err(e);
            }
        };
        self.session.retained_files.extend(rendered.retained);
        sink.on_event(&PipelineEvent::RenderingFinished);
        if !rendered.completed {
            sink.on_event(&PipelineEvent::PipelineFinished);
            return Ok(stats);
        }
        stats.completed = true;

        if !self.session.composites.is_empty() {
            let stacks = self.session.unique_stacks();
            stats.composition_total = self.composer.dry_run(&self.bitmaps, &stacks, &params);
            sink.on_event(&PipelineEvent::CompositionStarted {
                total: stats.composition_total,
            });
            let composed = self.composer.compose(
                &self.files,
                &mut self.bitmaps,
                &stacks,
                &params,
                sink,
            );
            sink.on_event(&PipelineEvent::CompositionFinished);
            let composed = match composed {
                Ok(outcome) => outcome,
                Err(e) => {
                    sink.on_event(&PipelineEvent::PipelineFinished);
                    return Err(e);
                }
            };
            self.session.retained_bitmaps.extend(composed.retained);
            stats.completed = composed.completed;
        }

        for view in &self.session.views_3d {
            let key = view_key(view.cmd());
            if !opts.force && self.bitmaps.get(key).is_some_and(|b| b.size() == self.size) {
                self.bitmaps.retain(key)?;
            } else {
                let Some(path) = self
                    .files
                    .get(view.key())
                    .filter(|_| self.files.is_fresh(view.key(), self.size))
                else {
                    tracing::warn!(cmd = %view.cmd(), "3D view has no rendered file");
                    continue;
                };
                match Bitmap::decode_file(path) {
                    Ok(bitmap) => {
                        self.bitmaps.put(key, bitmap);
                    }
                    Err(e) => {
                        tracing::warn!(cmd = %view.cmd(), error = %e, "3D view unreadable");
                        continue;
                    }
                }
            }
            self.session.retained_bitmaps.push(key);
        }

        sink.on_event(&PipelineEvent::PipelineFinished);
        tracing::info!(
            rendered = stats.rendering_total,
            composed = stats.composition_total,
            completed = stats.completed,
            "load finished"
        );
        Ok(stats)
    }

    /// Handle for stopping a running [`load`](Self::load) from another thread.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Stop the running load at its next batch boundary. A request that comes too late for the
    /// render stage stops composition after its first batch. Ignored when no load is running.
    pub fn request_stop(&self) -> bool {
        self.stop.request_stop()
    }

    /// Bitmap stored for `key`, or the "no data" bitmap.
    pub fn get_bitmap(&self, key: CacheKey) -> Bitmap {
        match self.bitmaps.get(key) {
            Some(b) => b.clone(),
            None => self
                .bitmaps
                .sentinel()
                .cloned()
                .unwrap_or_else(|| self.placeholders.no_data(self.size)),
        }
    }

    /// Target size for subsequent loads. Cached artifacts of other sizes are redone on the next
    /// load.
    pub fn window_size_changed(&mut self, width: u32, height: u32) -> MapAnimResult<()> {
        self.size = ImageSize::new(width, height)?;
        tracing::debug!(size = %self.size, "window size changed");
        Ok(())
    }

    /// Current target size.
    pub fn size(&self) -> ImageSize {
        self.size
    }

    /// Bitmap keys of the current frames: composite stacks in `set_cmds` order, then 3D views.
    pub fn frame_keys(&self) -> Vec<CacheKey> {
        self.session
            .composites
            .iter()
            .map(CompositeRequest::key)
            .chain(self.session.views_3d.iter().map(|v| view_key(v.cmd())))
            .collect()
    }

    /// Render a decoration (legend, scale bar, ...) over a transparent background, cropped to
    /// its content.
    #[tracing::instrument(skip(self), fields(cmd = %cmd))]
    pub fn load_overlay(&self, cmd: &RenderCmd) -> MapAnimResult<Bitmap> {
        let output = overlay_path(self.scratch.path(), cmd);
        let status = self.tools.render_2d(&Render2dJob {
            cmd: cmd.clone(),
            region: None,
            size: self.size,
            bgcolor: Rgb8::BLACK,
            transparent: true,
            output: output.clone(),
        });
        if !status.success() || !output.exists() {
            remove_artifact(&output);
            return Err(MapAnimError::render(format!(
                "overlay '{cmd}' failed: {}",
                status.diagnostics
            )));
        }
        let decoded = Bitmap::decode_file(&output);
        remove_artifact(&output);
        autocrop(&decoded?)
    }

    /// Drop every cached artifact no session references anymore.
    pub fn sweep(&mut self) -> SweepStats {
        let stats = SweepStats {
            files: self.files.sweep(),
            bitmaps: self.bitmaps.sweep(),
        };
        tracing::debug!(?stats, "swept caches");
        stats
    }

    /// Rendered layer files.
    pub fn file_cache(&self) -> &FileCache {
        &self.files
    }

    /// Frame bitmaps.
    pub fn bitmap_cache(&self) -> &BitmapCache {
        &self.bitmaps
    }

    /// Directory receiving artifacts.
    pub fn scratch_dir(&self) -> &Path {
        self.scratch.path()
    }

    /// Keep the artifact directory when the provider is dropped.
    pub fn keep_scratch_dir(&mut self) {
        self.scratch.keep();
    }
}

/// Bitmap key of a 3D view frame.
pub fn view_key(cmd: &RenderCmd) -> CacheKey {
    hash_cmds(std::slice::from_ref(cmd), None)
}

fn overlay_path(dir: &Path, cmd: &RenderCmd) -> PathBuf {
    crate::cache::files::artifact_path(dir, hash_cmd(cmd, None), "png")
}

/// Crop to the bounding box of pixels that are not fully transparent. A fully transparent
/// bitmap is returned as is.
pub(crate) fn autocrop(bitmap: &Bitmap) -> MapAnimResult<Bitmap> {
    let (w, h) = (bitmap.width(), bitmap.height());
    let visible = |x, y| bitmap.pixel(x, y).is_some_and(|px| px[3] != 0);
    let row_has_content = |y| (0..w).any(|x| visible(x, y));
    let col_has_content = |x| (0..h).any(|y| visible(x, y));

    let Some(top) = (0..h).find(|&y| row_has_content(y)) else {
        return Ok(bitmap.clone());
    };
    let bottom = (0..h).rev().find(|&y| row_has_content(y)).unwrap_or(top);
    let left = (0..w).find(|&x| col_has_content(x)).unwrap_or(0);
    let right = (0..w).rev().find(|&x| col_has_content(x)).unwrap_or(left);
    bitmap.cropped(left, top, right - left + 1, bottom - top + 1)
}

#[cfg(test)]
#[path = "../tests/unit/provider.rs"]
mod tests;
