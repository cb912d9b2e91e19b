use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use super::*;
use crate::job::Status;
use crate::progress::ProgressFormatter;
use crate::ui::{AnsiCapabilities, OutputSink, SharedBuffer, TerminalRenderer};

#[derive(Debug, Default)]
struct Recorded {
    frames: Vec<JobTable>,
    retired: usize,
    finished: bool,
}

#[derive(Clone, Default)]
struct RecordingRenderer(Arc<Mutex<Recorded>>);

impl Renderer for RecordingRenderer {
    fn render(&mut self, _old: &JobTable, new: &JobTable, _now: Instant) -> BoardResult<()> {
        self.0.lock().expect("recorded").frames.push(new.clone());
        Ok(())
    }

    fn retired(&mut self, count: usize) {
        self.0.lock().expect("recorded").retired += count;
    }

    fn finish(&mut self) -> BoardResult<()> {
        self.0.lock().expect("recorded").finished = true;
        Ok(())
    }
}

struct Harness {
    coordinator: Coordinator,
    recorded: RecordingRenderer,
    failures: mpsc::UnboundedReceiver<BoardFailure>,
    start: Instant,
}

impl Harness {
    fn new(dim_after_ms: u64, refresh_ms: u64) -> Self {
        let config = BoardConfig::default()
            .with_dim_after(Duration::from_millis(dim_after_ms))
            .with_refresh_interval(Duration::from_millis(refresh_ms));
        let recorded = RecordingRenderer::default();
        let (failure_tx, failures) = mpsc::unbounded_channel();
        let coordinator = Coordinator::new(&config, Box::new(recorded.clone()), failure_tx);
        Self {
            coordinator,
            recorded,
            failures,
            start: Instant::now(),
        }
    }

    fn at(&self, ms: u64) -> Instant {
        self.start + Duration::from_millis(ms)
    }

    fn register(&mut self, id: u64, options: JobOptions) {
        let now = self.start;
        self.coordinator.register(JobId(id), options, now);
    }

    fn update(&mut self, id: u64, update: impl Into<Update>, ms: u64) {
        let now = self.at(ms);
        self.coordinator
            .handle_update(JobId(id), Some(update.into()), now)
            .expect("update");
    }

    fn close(&mut self, id: u64, ms: u64) {
        let now = self.at(ms);
        self.coordinator
            .handle_update(JobId(id), None, now)
            .expect("close");
    }

    fn tick(&mut self, ms: u64) {
        let now = self.at(ms);
        self.coordinator.on_timer(now).expect("timer");
    }

    fn job(&self, id: u64) -> Option<&crate::job::Job> {
        self.coordinator.table().get(JobId(id))
    }

    fn line(&self, id: u64) -> usize {
        self.job(id).map(|job| job.line).unwrap_or(0)
    }

    fn frames(&self) -> Vec<JobTable> {
        self.recorded.0.lock().expect("recorded").frames.clone()
    }
}

#[test]
fn registration_does_not_schedule_a_refresh() {
    let mut harness = Harness::new(100, 10);
    harness.register(1, JobOptions::new());
    assert!(!harness.coordinator.refresh_pending());
    assert_eq!(harness.coordinator.next_wake(), None);
    assert_eq!(harness.line(1), 1);
}

#[test]
fn job_stays_active_inside_dim_window_and_dims_at_its_end() {
    let mut harness = Harness::new(100, 10);
    harness.register(1, JobOptions::new());
    harness.update(1, "building", 0);
    assert_eq!(harness.coordinator.next_wake(), Some(harness.at(10)));

    harness.tick(10);
    assert!(harness.job(1).is_some_and(|job| job.active));
    harness.tick(99);
    assert!(harness.job(1).is_some_and(|job| job.active));
    harness.tick(100);
    assert!(harness.job(1).is_some_and(|job| !job.active));
}

#[test]
fn later_update_supersedes_pending_dim_marker() {
    let mut harness = Harness::new(100, 10);
    harness.register(1, JobOptions::new());
    harness.update(1, "one", 0);
    harness.update(1, "two", 60);

    harness.tick(100);
    assert!(harness.job(1).is_some_and(|job| job.active));
    harness.tick(160);
    assert!(harness.job(1).is_some_and(|job| !job.active));
}

#[test]
fn each_job_keeps_at_most_one_pending_dim_wake() {
    let mut harness = Harness::new(100, 10);
    harness.register(1, JobOptions::new());
    harness.update(1, "started", 0);
    assert_eq!(harness.coordinator.dim_queue.len(), 1);

    for ms in 1..50 {
        harness.update(1, format!("step {ms}"), ms);
    }
    assert_eq!(harness.coordinator.dim_queue.len(), 1);

    harness.tick(100);
    assert!(harness.job(1).is_some_and(|job| job.active));
    assert_eq!(harness.coordinator.dim_queue.len(), 1);

    harness.tick(149);
    assert!(harness.job(1).is_some_and(|job| !job.active));
    assert!(harness.coordinator.dim_queue.is_empty());
    assert!(harness.coordinator.dim_stamps.is_empty());
}

#[test]
fn refresh_renders_active_job_then_stops_once_idle() {
    let mut harness = Harness::new(100, 10);
    harness.register(1, JobOptions::new());
    harness.update(1, "building", 0);

    harness.tick(10);
    let frames = harness.frames();
    assert_eq!(frames.len(), 1);
    let job = frames[0].get(JobId(1)).expect("job in frame");
    assert_eq!(job.summary, "building");
    assert!(job.active);

    harness.tick(100);
    harness.tick(110);
    assert!(harness.job(1).is_some_and(|job| !job.active));
    assert_eq!(harness.coordinator.next_wake(), None);
}

#[test]
fn pinned_job_moves_to_top_on_first_update() {
    let mut harness = Harness::new(100, 10);
    harness.register(1, JobOptions::new());
    harness.register(2, JobOptions::new().pinned());
    assert_eq!((harness.line(1), harness.line(2)), (1, 2));

    harness.update(2, "deploying", 0);
    assert_eq!((harness.line(1), harness.line(2)), (2, 1));
}

#[test]
fn repeating_the_same_text_does_not_move_a_pinned_job() {
    let mut harness = Harness::new(100, 10);
    harness.register(1, JobOptions::new().pinned());
    harness.register(2, JobOptions::new().pinned());

    harness.update(1, "alpha", 0);
    harness.update(2, "beta", 5);
    assert_eq!((harness.line(1), harness.line(2)), (2, 1));

    for ms in [10, 20, 30] {
        harness.update(1, "alpha", ms);
        assert_eq!(harness.line(1), 2);
    }
    harness.update(1, "alpha again", 40);
    assert_eq!((harness.line(1), harness.line(2)), (1, 2));
}

#[test]
fn completed_job_is_retired_after_dimming() {
    let mut harness = Harness::new(100, 10);
    harness.register(1, JobOptions::new());
    harness.register(2, JobOptions::new());
    harness.update(1, "first", 0);
    harness.update(2, "second", 0);
    harness.close(2, 20);
    assert_eq!((harness.line(1), harness.line(2)), (2, 1));
    assert!(harness.job(2).is_some_and(|job| job.complete && job.active));

    harness.tick(10);
    harness.tick(100);
    harness.tick(120);
    assert!(harness.job(2).is_none());
    assert_eq!(harness.line(1), 1);
    assert_eq!(harness.recorded.0.lock().expect("recorded").retired, 1);

    let last = harness.frames().pop().expect("frame");
    let retired = last.get(JobId(2)).expect("retired job drawn before removal");
    assert!(retired.complete && !retired.active);
}

#[test]
fn invalid_update_is_reported_and_skipped() {
    let mut harness = Harness::new(100, 10);
    harness.register(1, JobOptions::new());
    harness.register(2, JobOptions::new());
    harness.update(2, "healthy", 0);
    let before = harness.coordinator.table().clone();

    harness.update(1, Update::tick(), 5);
    assert_eq!(harness.coordinator.table(), &before);

    let failure = harness.failures.try_recv().expect("failure reported");
    assert_eq!(failure.job, Some(JobId(1)));
    assert_eq!(failure.update, Some(Update::tick()));
    assert!(matches!(failure.error, BoardError::InvalidUpdate { .. }));
    assert_eq!(failure.table.len(), 2);

    harness.update(2, Status::Success, 6);
    assert!(harness
        .job(2)
        .is_some_and(|job| job.status == Status::Success));
}

#[test]
fn updates_for_unknown_or_completed_jobs_are_rejected() {
    let mut harness = Harness::new(100, 10);
    harness.register(1, JobOptions::new());
    harness.update(9, "ghost", 0);
    harness.close(1, 1);
    harness.update(1, "late", 2);

    let errors = std::iter::from_fn(|| harness.failures.try_recv().ok())
        .map(|failure| failure.job)
        .collect::<Vec<Option<JobId>>>();
    assert_eq!(errors, vec![Some(JobId(9)), Some(JobId(1))]);
    assert!(harness.job(1).is_some_and(|job| job.summary.is_empty()));
}

#[test]
fn shutdown_dims_everything_and_finishes_renderer() {
    let mut harness = Harness::new(100, 10);
    harness.register(1, JobOptions::new());
    harness.update(1, "working", 0);
    harness.coordinator.shutdown(harness.at(5));

    let recorded = harness.recorded.0.lock().expect("recorded");
    assert!(recorded.finished);
    let last = recorded.frames.last().expect("final frame");
    assert!(last.jobs().all(|job| !job.active));
    assert_eq!(
        last.get(JobId(1)).map(|job| job.summary.as_str()),
        Some("working")
    );
}

#[test]
fn corrupted_table_is_fatal_and_reported() {
    let mut harness = Harness::new(100, 10);
    harness.register(1, JobOptions::new());
    harness.register(2, JobOptions::new());
    if let Some(job) = harness.coordinator.table.get_mut(JobId(2)) {
        job.line = 1;
    }

    let now = harness.at(0);
    let result = harness
        .coordinator
        .handle_update(JobId(1), Some(Update::text("building")), now);
    assert!(matches!(result, Err(BoardError::TableCorruption { .. })));

    let failure = harness.failures.try_recv().expect("corruption reported");
    assert_eq!(failure.job, Some(JobId(1)));
    assert_eq!(failure.update, Some(Update::text("building")));
    assert!(matches!(failure.error, BoardError::TableCorruption { .. }));

    let refreshed = harness.coordinator.on_timer(harness.at(10));
    assert!(matches!(refreshed, Err(BoardError::TableCorruption { .. })));
    assert!(harness.frames().is_empty());
}

/// Writer whose first write fails, as when the terminal briefly goes away.
struct FailsFirstWrite {
    failed: bool,
    output: SharedBuffer,
}

impl Write for FailsFirstWrite {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.failed {
            self.failed = true;
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "terminal went away"));
        }
        self.output.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.output.flush()
    }
}

#[test]
fn render_failure_is_reported_and_next_refresh_redraws() {
    let output = SharedBuffer::default();
    let sink = OutputSink::new(
        FailsFirstWrite {
            failed: false,
            output: output.clone(),
        },
        true,
    );
    let renderer = TerminalRenderer::new(
        sink,
        Box::new(AnsiCapabilities::new("xterm")),
        ProgressFormatter::default(),
        false,
    );
    let config = BoardConfig::default()
        .with_dim_after(Duration::from_millis(100))
        .with_refresh_interval(Duration::from_millis(10));
    let (failure_tx, mut failures) = mpsc::unbounded_channel();
    let mut coordinator = Coordinator::new(&config, Box::new(renderer), failure_tx);
    let start = Instant::now();
    coordinator.register(JobId(1), JobOptions::new(), start);
    coordinator
        .handle_update(JobId(1), Some(Update::text("building")), start)
        .expect("update");

    coordinator
        .on_timer(start + Duration::from_millis(10))
        .expect("failed frame is not fatal");
    let failure = failures.try_recv().expect("render failure reported");
    assert!(matches!(failure.error, BoardError::RenderFailure { .. }));
    assert!(!output.contents_lossy().contains("building"));

    coordinator
        .on_timer(start + Duration::from_millis(20))
        .expect("timer");
    let mut parser = vt100::Parser::new(5, 40, 0);
    parser.process(&output.contents());
    let first_row = parser
        .screen()
        .rows(0, 40)
        .next()
        .map(|row| row.trim_end().to_owned());
    assert_eq!(first_row.as_deref(), Some("building"));
    assert!(failures.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn run_loop_stops_and_restores_terminal_on_corruption() {
    let config = BoardConfig::default()
        .with_dim_after(Duration::from_millis(100))
        .with_refresh_interval(Duration::from_millis(10));
    let recorded = RecordingRenderer::default();
    let (failure_tx, mut failures) = mpsc::unbounded_channel();
    let mut coordinator = Coordinator::new(&config, Box::new(recorded.clone()), failure_tx);
    coordinator.register(JobId(1), JobOptions::new(), Instant::now());
    coordinator.register(JobId(2), JobOptions::new(), Instant::now());
    if let Some(job) = coordinator.table.get_mut(JobId(2)) {
        job.line = 1;
    }

    let (registrations, registration_rx) = mpsc::channel(4);
    let task = tokio::spawn(coordinator.run(registration_rx, 16));
    let (sender, updates) = broadcast::channel(4);
    registrations
        .send(Inbound::Register(Registration {
            id: JobId(3),
            options: JobOptions::new(),
            updates,
        }))
        .await
        .expect("register");
    sender.send(Update::text("building")).expect("send");

    let result = task.await.expect("join");
    assert!(matches!(result, Err(BoardError::TableCorruption { .. })));
    assert!(recorded.0.lock().expect("recorded").finished);
    let failure = failures.try_recv().expect("corruption reported");
    assert!(matches!(failure.error, BoardError::TableCorruption { .. }));
}

#[tokio::test(start_paused = true)]
async fn run_loop_drains_closed_jobs_before_final_frame() {
    let config = BoardConfig::default()
        .with_dim_after(Duration::from_millis(100))
        .with_refresh_interval(Duration::from_millis(10));
    let recorded = RecordingRenderer::default();
    let (failure_tx, _failures) = mpsc::unbounded_channel();
    let coordinator = Coordinator::new(&config, Box::new(recorded.clone()), failure_tx);
    let (registrations, registration_rx) = mpsc::channel(4);
    let task = tokio::spawn(coordinator.run(registration_rx, 16));

    let (sender, updates) = broadcast::channel(4);
    registrations
        .send(Inbound::Register(Registration {
            id: JobId(1),
            options: JobOptions::new(),
            updates,
        }))
        .await
        .expect("register");
    sender.send(Update::text("building")).expect("send");
    drop(sender);
    registrations.send(Inbound::Shutdown).await.expect("shutdown");
    task.await.expect("join").expect("clean stop");

    let recorded = recorded.0.lock().expect("recorded");
    assert!(recorded.finished);
    let last = recorded.frames.last().expect("final frame");
    let job = last.get(JobId(1)).expect("job");
    assert_eq!(job.summary, "building");
    assert!(job.complete);
}
