use std::sync::atomic::{AtomicU64, Ordering};

use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::BoardConfig;
use crate::coordinator::{Coordinator, Inbound, Registration};
use crate::error::{BoardError, BoardFailure, BoardResult};
use crate::job::{JobId, JobOptions, Status};
use crate::table::JobTable;
use crate::ui::capabilities::{capabilities_available, AnsiCapabilities, Capabilities};
use crate::ui::theme::resolve_color_enabled;
use crate::ui::{OutputSink, PlainRenderer, Renderer, TerminalRenderer};
use crate::update::Update;

const INBOX_CAPACITY: usize = 256;

/// Picks the cursor-addressing renderer when the sink is a terminal whose
/// capabilities support it, and the line-per-change fallback otherwise.
pub fn renderer_for(
    config: &BoardConfig,
    sink: OutputSink,
    capabilities: Box<dyn Capabilities>,
) -> Box<dyn Renderer> {
    let color_enabled = resolve_color_enabled(config.output_mode, sink.is_terminal());
    if sink.is_terminal() && capabilities_available(capabilities.as_ref()) {
        Box::new(TerminalRenderer::new(
            sink,
            capabilities,
            config.progress_formatter.clone(),
            color_enabled,
        ))
    } else {
        Box::new(PlainRenderer::new(sink, color_enabled))
    }
}

/// Front door to a running status board.
pub struct Board {
    registrations: mpsc::Sender<Inbound>,
    next_id: AtomicU64,
    update_capacity: usize,
    failures: Option<mpsc::UnboundedReceiver<BoardFailure>>,
    task: JoinHandle<BoardResult<()>>,
}

impl Board {
    /// Starts a board drawing to standard output. Must be called from
    /// inside a tokio runtime.
    pub fn create(config: BoardConfig) -> BoardResult<Self> {
        let renderer = renderer_for(
            &config,
            OutputSink::stdout(config.output_mode),
            Box::new(AnsiCapabilities::from_env()),
        );
        Self::with_renderer(config, renderer)
    }

    pub fn with_renderer(config: BoardConfig, renderer: Box<dyn Renderer>) -> BoardResult<Self> {
        config.validate()?;
        let runtime = Handle::try_current()
            .map_err(|error| BoardError::config("runtime", error.to_string()))?;

        let (registrations, registration_rx) = mpsc::channel(config.registration_capacity);
        let (failure_tx, failure_rx) = mpsc::unbounded_channel();
        let coordinator = Coordinator::new(&config, renderer, failure_tx);
        let task = runtime.spawn(coordinator.run(registration_rx, INBOX_CAPACITY));
        debug!(
            dim_after_ms = config.dim_after.as_millis() as u64,
            refresh_ms = config.refresh_interval.as_millis() as u64,
            "status board started"
        );

        Ok(Self {
            registrations,
            next_id: AtomicU64::new(1),
            update_capacity: config.update_capacity,
            failures: Some(failure_rx),
            task,
        })
    }

    /// Registers a new job at the bottom of the board.
    pub async fn add_job(&self, options: JobOptions) -> BoardResult<JobHandle> {
        let id = JobId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, updates) = broadcast::channel(self.update_capacity);
        self.registrations
            .send(Inbound::Register(Registration {
                id,
                options,
                updates,
            }))
            .await
            .map_err(|_| BoardError::Closed)?;
        Ok(JobHandle { id, sender })
    }

    /// Failures the coordinator recovered from. Can be taken once.
    pub fn failures(&mut self) -> Option<mpsc::UnboundedReceiver<BoardFailure>> {
        self.failures.take()
    }

    /// Copy of the job table as the coordinator currently holds it.
    pub async fn snapshot(&self) -> BoardResult<JobTable> {
        let (reply, response) = oneshot::channel();
        self.registrations
            .send(Inbound::Snapshot(reply))
            .await
            .map_err(|_| BoardError::Closed)?;
        response.await.map_err(|_| BoardError::Closed)
    }

    /// Flushes pending updates, draws the final frame and stops the board.
    pub async fn shutdown(self) -> BoardResult<()> {
        // A closed channel means the coordinator already stopped; its
        // result is still in the task.
        let _ = self.registrations.send(Inbound::Shutdown).await;
        self.task
            .await
            .map_err(|error| BoardError::render(format!("coordinator task failed: {error}")))?
    }
}

/// Producer side of one job. Dropping it (or calling [`JobHandle::close`])
/// completes the job.
#[derive(Debug)]
pub struct JobHandle {
    id: JobId,
    sender: broadcast::Sender<Update>,
}

impl JobHandle {
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Queues an update. Never waits: when the job's queue is full the
    /// oldest queued update is discarded.
    pub fn send(&self, update: impl Into<Update>) -> BoardResult<()> {
        let update = update.into();
        if update.is_internal() {
            return Err(BoardError::invalid_update(
                "dim markers are reserved for the board",
            ));
        }
        self.sender
            .send(update)
            .map(|_| ())
            .map_err(|_| BoardError::Closed)
    }

    /// Queues an update received in its JSON form.
    pub fn send_json(&self, raw: &str) -> BoardResult<()> {
        self.send(Update::from_json(raw)?)
    }

    pub fn text(&self, summary: impl Into<String>) -> BoardResult<()> {
        self.send(Update::Text(summary.into()))
    }

    pub fn status(&self, status: Status) -> BoardResult<()> {
        self.send(Update::Status(status))
    }

    pub fn prefix(&self, prefix: Option<String>) -> BoardResult<()> {
        self.send(Update::Prefix(prefix))
    }

    pub fn start_progress(&self, target: u64) -> BoardResult<()> {
        self.send(Update::StartProgress(target))
    }

    pub fn tick(&self) -> BoardResult<()> {
        self.send(Update::tick())
    }

    pub fn tick_by(&self, amount: u64) -> BoardResult<()> {
        self.send(Update::Tick(amount))
    }

    pub fn complete_progress(&self) -> BoardResult<()> {
        self.send(Update::CompleteProgress)
    }

    pub fn clear_progress(&self) -> BoardResult<()> {
        self.send(Update::ClearProgress)
    }

    pub fn close(self) {}
}
