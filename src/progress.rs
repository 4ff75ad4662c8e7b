/// Stage notifications emitted by [`crate::BitmapProvider::load`].
///
/// Ordering contract: `RenderingStarted`, zero or more `RenderingContinues`, `RenderingFinished`;
/// then, when rendering completed and there are composites, `CompositionStarted`, zero or more
/// `CompositionContinues`, `CompositionFinished`; `PipelineFinished` always comes last.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// Rendering is about to start; `total` requests need execution.
    RenderingStarted {
        /// Requests that will be executed.
        total: usize,
    },
    /// A render batch was drained.
    RenderingContinues {
        /// Requests executed so far.
        current: usize,
        /// Requests to execute in this stage.
        total: usize,
    },
    /// The render stage ended (completed or stopped).
    RenderingFinished,
    /// Composition is about to start; `total` stacks need execution.
    CompositionStarted {
        /// Stacks that will be composed.
        total: usize,
    },
    /// A composite batch was drained.
    CompositionContinues {
        /// Stacks composed so far.
        current: usize,
        /// Stacks to compose in this stage.
        total: usize,
    },
    /// The composite stage ended (completed or stopped).
    CompositionFinished,
    /// `load` is returning.
    PipelineFinished,
}

/// Observer of pipeline progress.
///
/// Events are delivered on the thread that called `load`, after each batch has been drained and
/// its results stored.
pub trait ProgressSink: Send {
    /// Receive one event.
    fn on_event(&mut self, event: &PipelineEvent);
}

impl<F> ProgressSink for F
where
    F: FnMut(&PipelineEvent) + Send,
{
    fn on_event(&mut self, event: &PipelineEvent) {
        self(event)
    }
}

/// Sink that ignores every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn on_event(&mut self, _event: &PipelineEvent) {}
}

/// Sink that records events in order, for tests and diagnostics.
#[derive(Clone, Debug, Default)]
pub struct EventLog {
    events: Vec<PipelineEvent>,
}

impl EventLog {
    /// Empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded events in delivery order.
    pub fn events(&self) -> &[PipelineEvent] {
        &self.events
    }

    /// Forget recorded events.
    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl ProgressSink for EventLog {
    fn on_event(&mut self, event: &PipelineEvent) {
        self.events.push(*event);
    }
}

/// Sink that reports progress through `tracing` at info level.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn on_event(&mut self, event: &PipelineEvent) {
        match *event {
            PipelineEvent::RenderingStarted { total } => {
                tracing::info!(total, "rendering map layers")
            }
            PipelineEvent::RenderingContinues { current, total } => {
                tracing::info!(current, total, "rendering map layers")
            }
            PipelineEvent::CompositionStarted { total } => {
                tracing::info!(total, "overlaying map layers")
            }
            PipelineEvent::CompositionContinues { current, total } => {
                tracing::info!(current, total, "overlaying map layers")
            }
            PipelineEvent::RenderingFinished
            | PipelineEvent::CompositionFinished
            | PipelineEvent::PipelineFinished => tracing::debug!(?event, "stage finished"),
        }
    }
}
