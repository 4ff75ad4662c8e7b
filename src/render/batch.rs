use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, mpsc};

use crate::foundation::error::{MapAnimError, MapAnimResult};

/// Cooperative stop flag of one stage.
///
/// A stop request is only recorded while the stage is open and is observed between batches.
/// Openings nest; the flag is cleared when the outermost one closes.
#[derive(Debug, Default)]
pub struct StageControl {
    open: AtomicUsize,
    stop: AtomicBool,
}

impl StageControl {
    /// Whether the stage is open for stop requests.
    pub fn is_running(&self) -> bool {
        self.open.load(Ordering::Acquire) > 0
    }

    /// Ask the running stage to stop after its current batch. Returns `false` (and does nothing)
    /// when the stage is idle.
    pub fn request_stop(&self) -> bool {
        if !self.is_running() {
            return false;
        }
        self.stop.store(true, Ordering::Release);
        true
    }

    fn take_stop(&self) -> bool {
        self.stop.swap(false, Ordering::AcqRel)
    }

    /// Open the stage for stop requests until the guard drops.
    pub(crate) fn begin(&self) -> RunningGuard<'_> {
        if self.open.fetch_add(1, Ordering::AcqRel) == 0 {
            self.stop.store(false, Ordering::Release);
        }
        RunningGuard(self)
    }
}

pub(crate) struct RunningGuard<'a>(&'a StageControl);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        if self.0.open.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.stop.store(false, Ordering::Release);
        }
    }
}

/// Cloneable handle for stopping a running `load` from another thread.
#[derive(Clone, Debug, Default)]
pub struct StopHandle {
    render: Arc<StageControl>,
    compose: Arc<StageControl>,
}

impl StopHandle {
    /// Create a handle with idle stage controls.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop whichever stage is running at its next batch boundary. Returns whether a running
    /// stage received the request.
    pub fn request_stop(&self) -> bool {
        let rendering = self.render.request_stop();
        let composing = self.compose.request_stop();
        rendering || composing
    }

    pub(crate) fn render(&self) -> &Arc<StageControl> {
        &self.render
    }

    pub(crate) fn compose(&self) -> &Arc<StageControl> {
        &self.compose
    }
}

/// Dispatches jobs on a dedicated pool in batches of at most `nprocs`, one worker per job.
///
/// A batch is drained completely (in dispatch order) before the next one starts. Workers only
/// compute; results are handed to the caller's `on_batch` on the calling thread.
pub(crate) struct BatchRunner {
    pool: rayon::ThreadPool,
    nprocs: usize,
}

impl BatchRunner {
    pub(crate) fn new(nprocs: usize, stage: &'static str) -> MapAnimResult<Self> {
        if nprocs == 0 {
            return Err(MapAnimError::validation("nprocs must be >= 1"));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(nprocs)
            .thread_name(move |i| format!("mapanim-{stage}-{i}"))
            .build()
            .map_err(|e| {
                MapAnimError::render(format!("failed to build {stage} worker pool: {e}"))
            })?;
        Ok(Self { pool, nprocs })
    }

    /// Run `work` over `jobs`. `on_batch` receives each drained batch and the running count of
    /// finished jobs. Returns `false` when a stop request cut the run short.
    pub(crate) fn run<J, T, W, F>(
        &self,
        jobs: Vec<J>,
        control: &StageControl,
        work: W,
        mut on_batch: F,
    ) -> MapAnimResult<bool>
    where
        J: Sync,
        T: Send,
        W: Fn(&J) -> Option<T> + Sync,
        F: FnMut(Vec<(J, Option<T>)>, usize) -> MapAnimResult<()>,
    {
        let _running = control.begin();
        let mut done = 0usize;
        let mut pending = jobs.into_iter().peekable();

        while pending.peek().is_some() {
            let batch = pending.by_ref().take(self.nprocs).collect::<Vec<_>>();
            let receivers = self.dispatch(&batch, &work);
            let results = batch
                .into_iter()
                .zip(receivers)
                .map(|(job, rx)| (job, rx.recv().ok().flatten()))
                .collect::<Vec<_>>();
            done += results.len();
            on_batch(results, done)?;

            if pending.peek().is_some() && control.take_stop() {
                tracing::info!(done, "stop requested, remaining batches skipped");
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn dispatch<J, T, W>(&self, batch: &[J], work: &W) -> Vec<mpsc::Receiver<Option<T>>>
    where
        J: Sync,
        T: Send,
        W: Fn(&J) -> Option<T> + Sync,
    {
        let mut receivers = Vec::with_capacity(batch.len());
        self.pool.scope(|s| {
            for job in batch {
                let (tx, rx) = mpsc::sync_channel(1);
                receivers.push(rx);
                s.spawn(move |_| {
                    // The receiver outlives the scope.
                    let _ = tx.send(work(job));
                });
            }
        });
        receivers
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/batch.rs"]
mod tests;
