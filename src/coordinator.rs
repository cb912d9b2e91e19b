//! The single task that owns the job table.
//!
//! Three sources feed it: registrations (and the shutdown request), the
//! composite update inbox filled by one forwarder per job, and a timer
//! that covers both the refresh deadline and per-job dim deadlines.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::Duration;

use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, warn};

use crate::config::BoardConfig;
use crate::error::{BoardError, BoardFailure, BoardResult};
use crate::job::{JobId, JobOptions};
use crate::lines;
use crate::table::JobTable;
use crate::ui::Renderer;
use crate::update::Update;

pub(crate) struct Registration {
    pub(crate) id: JobId,
    pub(crate) options: JobOptions,
    pub(crate) updates: broadcast::Receiver<Update>,
}

pub(crate) enum Inbound {
    Register(Registration),
    Snapshot(oneshot::Sender<JobTable>),
    Shutdown,
}

/// One job's update, or `None` once its stream has closed.
pub(crate) type Tagged = (JobId, Option<Update>);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct DimWake {
    at: Instant,
    job: JobId,
}

pub struct Coordinator {
    table: JobTable,
    rendered: JobTable,
    renderer: Box<dyn Renderer>,
    dim_after: Duration,
    refresh_interval: Duration,
    refresh_at: Option<Instant>,
    dim_queue: BinaryHeap<Reverse<DimWake>>,
    /// Latest `updated` stamp per job with a wake in `dim_queue`. A job
    /// never has more than one queued wake.
    dim_stamps: HashMap<JobId, Instant>,
    failures: mpsc::UnboundedSender<BoardFailure>,
}

impl Coordinator {
    pub fn new(
        config: &BoardConfig,
        renderer: Box<dyn Renderer>,
        failures: mpsc::UnboundedSender<BoardFailure>,
    ) -> Self {
        Self {
            table: JobTable::new(),
            rendered: JobTable::new(),
            renderer,
            dim_after: config.dim_after,
            refresh_interval: config.refresh_interval,
            refresh_at: None,
            dim_queue: BinaryHeap::new(),
            dim_stamps: HashMap::new(),
            failures,
        }
    }

    pub fn table(&self) -> &JobTable {
        &self.table
    }

    pub fn refresh_pending(&self) -> bool {
        self.refresh_at.is_some()
    }

    /// The earliest instant at which the timer needs to fire.
    pub fn next_wake(&self) -> Option<Instant> {
        let dim = self.dim_queue.peek().map(|Reverse(wake)| wake.at);
        match (self.refresh_at, dim) {
            (Some(refresh), Some(dim)) => Some(refresh.min(dim)),
            (refresh, dim) => refresh.or(dim),
        }
    }

    pub fn register(&mut self, id: JobId, options: JobOptions, now: Instant) {
        lines::register(&mut self.table, id, options, now);
    }

    /// Applies one event from the composite stream. Only table corruption
    /// is returned; other failures are reported and the event is skipped.
    pub fn handle_update(
        &mut self,
        id: JobId,
        update: Option<Update>,
        now: Instant,
    ) -> BoardResult<()> {
        let result = match &update {
            Some(value) => self.apply_update(id, value, now),
            None => self.complete(id, now),
        }
        .and_then(|()| self.table.validate());

        match result {
            Ok(()) => Ok(()),
            Err(error) if error.is_fatal() => {
                self.report(Some(id), update, error.clone());
                Err(error)
            }
            Err(error) => {
                self.report(Some(id), update, error);
                Ok(())
            }
        }
    }

    fn apply_update(&mut self, id: JobId, update: &Update, now: Instant) -> BoardResult<()> {
        let Some(job) = self.table.get(id) else {
            return Err(BoardError::invalid_update(format!("unknown job {id}")));
        };
        if job.complete {
            return Err(BoardError::invalid_update(format!(
                "job {id} already completed"
            )));
        }
        let before = job.clone();
        let mut after = before.clone();
        update.apply(&mut after, now)?;
        let stamp = after.updated;
        if let Some(job) = self.table.get_mut(id) {
            *job = after;
        }

        lines::promote_if_pinned(&mut self.table, id, &before);
        self.schedule_dim(id, stamp);
        self.schedule_refresh(now);
        Ok(())
    }

    fn complete(&mut self, id: JobId, now: Instant) -> BoardResult<()> {
        lines::complete(&mut self.table, id, now)?;
        if let Some(stamp) = self.table.get(id).map(|job| job.updated) {
            self.schedule_dim(id, stamp);
        }
        self.schedule_refresh(now);
        Ok(())
    }

    fn schedule_dim(&mut self, job: JobId, stamp: Instant) {
        if self.dim_stamps.insert(job, stamp).is_none() {
            self.dim_queue.push(Reverse(DimWake {
                at: stamp + self.dim_after,
                job,
            }));
        }
    }

    fn schedule_refresh(&mut self, now: Instant) {
        if self.refresh_at.is_none() {
            self.refresh_at = Some(now + self.refresh_interval);
        }
    }

    /// Runs whatever the timer is due for at `now`.
    pub fn on_timer(&mut self, now: Instant) -> BoardResult<()> {
        self.fire_dim_markers(now);
        if self.refresh_at.is_some_and(|at| at <= now) {
            self.refresh(now)?;
        }
        Ok(())
    }

    fn fire_dim_markers(&mut self, now: Instant) {
        while let Some(Reverse(wake)) = self.dim_queue.peek().copied() {
            if wake.at > now {
                break;
            }
            self.dim_queue.pop();
            let Some(stamp) = self.dim_stamps.get(&wake.job).copied() else {
                continue;
            };
            let due = stamp + self.dim_after;
            if due > now {
                // Touched again since this wake was queued.
                self.dim_queue.push(Reverse(DimWake { at: due, job: wake.job }));
                continue;
            }
            self.dim_stamps.remove(&wake.job);
            let Some(job) = self.table.get_mut(wake.job) else {
                continue;
            };
            let was_active = job.active;
            // The only error path of `apply` is for progress updates.
            let _ = Update::DimMarker(stamp).apply(job, now);
            if was_active && !job.active {
                self.schedule_refresh(now);
            }
        }
    }

    /// Dims expired jobs, redraws, retires finished rows once the frame is
    /// on screen and re-arms the refresh timer while anything is active.
    pub fn refresh(&mut self, now: Instant) -> BoardResult<()> {
        self.refresh_at = None;
        let dim_after = self.dim_after;
        for job in self.table.jobs_mut() {
            if job.active && now.saturating_duration_since(job.updated) >= dim_after {
                job.active = false;
            }
        }
        if let Err(error) = self.table.validate() {
            self.report(None, None, error.clone());
            return Err(error);
        }

        if self.draw(now) {
            let retired = lines::retire(&mut self.table);
            if retired > 0 {
                self.renderer.retired(retired);
                self.rendered = self.table.clone();
            }
        }

        if self.table.any_active() {
            self.schedule_refresh(now);
        } else {
            debug!(jobs = self.table.len(), "board idle, refresh timer stopped");
        }
        Ok(())
    }

    /// A failed frame keeps the last drawn snapshot so the next refresh
    /// redraws everything that was not confirmed on screen.
    fn draw(&mut self, now: Instant) -> bool {
        match self.renderer.render(&self.rendered, &self.table, now) {
            Ok(()) => {
                self.rendered = self.table.clone();
                true
            }
            Err(error) => {
                self.report(None, None, error);
                false
            }
        }
    }

    /// Final redraw with every job dimmed.
    pub fn shutdown(&mut self, now: Instant) {
        for job in self.table.jobs_mut() {
            job.active = false;
        }
        self.refresh_at = None;
        self.dim_queue.clear();
        self.dim_stamps.clear();
        let _ = self.draw(now);
        if let Err(error) = self.renderer.finish() {
            self.report(None, None, error);
        }
    }

    fn report(&self, job: Option<JobId>, update: Option<Update>, error: BoardError) {
        if error.is_fatal() {
            error!(job = ?job.map(|id| id.0), %error, "status board table corrupted");
        } else {
            warn!(job = ?job.map(|id| id.0), ?update, %error, "status board event skipped");
        }
        let _ = self.failures.send(BoardFailure {
            job,
            update,
            table: self.table.clone(),
            error,
        });
    }

    /// Serves the three event sources until shutdown or a fatal error.
    pub(crate) async fn run(
        mut self,
        mut registrations: mpsc::Receiver<Inbound>,
        inbox_capacity: usize,
    ) -> BoardResult<()> {
        let (inbox_tx, mut inbox) = mpsc::channel::<Tagged>(inbox_capacity);
        let (stop_tx, _) = watch::channel(false);

        let outcome = loop {
            let wake = self.next_wake();
            tokio::select! {
                biased;
                inbound = registrations.recv() => match inbound {
                    Some(Inbound::Register(registration)) => {
                        let id = registration.id;
                        self.register(id, registration.options, Instant::now());
                        tokio::spawn(forward_updates(
                            id,
                            registration.updates,
                            inbox_tx.clone(),
                            stop_tx.subscribe(),
                        ));
                    }
                    Some(Inbound::Snapshot(reply)) => {
                        let _ = reply.send(self.table.clone());
                    }
                    Some(Inbound::Shutdown) | None => break Ok(()),
                },
                Some((id, update)) = inbox.recv() => {
                    if let Err(error) = self.handle_update(id, update, Instant::now()) {
                        break Err(error);
                    }
                }
                () = sleep_until_some(wake) => {
                    if let Err(error) = self.on_timer(Instant::now()) {
                        break Err(error);
                    }
                }
            }
        };

        if let Err(error) = outcome {
            let _ = self.renderer.finish();
            return Err(error);
        }

        // Let every forwarder flush what its producer already sent.
        let _ = stop_tx.send(true);
        drop(inbox_tx);
        while let Some((id, update)) = inbox.recv().await {
            if let Err(error) = self.handle_update(id, update, Instant::now()) {
                let _ = self.renderer.finish();
                return Err(error);
            }
        }
        self.shutdown(Instant::now());
        Ok(())
    }
}

async fn sleep_until_some(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

/// Fan-in stage for one job: tags every value with the job id and pushes
/// it into the coordinator's inbox.
async fn forward_updates(
    id: JobId,
    mut updates: broadcast::Receiver<Update>,
    inbox: mpsc::Sender<Tagged>,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;
            _ = stop.changed() => {
                drain_updates(id, &mut updates, &inbox).await;
                return;
            }
            received = updates.recv() => match received {
                Ok(update) => {
                    if inbox.send((id, Some(update))).await.is_err() {
                        return;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!(job = %id, skipped, "update queue overflowed, dropped oldest updates");
                }
                Err(RecvError::Closed) => {
                    let _ = inbox.send((id, None)).await;
                    return;
                }
            },
        }
    }
}

async fn drain_updates(
    id: JobId,
    updates: &mut broadcast::Receiver<Update>,
    inbox: &mpsc::Sender<Tagged>,
) {
    loop {
        match updates.try_recv() {
            Ok(update) => {
                if inbox.send((id, Some(update))).await.is_err() {
                    return;
                }
            }
            Err(TryRecvError::Lagged(skipped)) => {
                debug!(job = %id, skipped, "update queue overflowed, dropped oldest updates");
            }
            Err(TryRecvError::Closed) => {
                let _ = inbox.send((id, None)).await;
                return;
            }
            Err(TryRecvError::Empty) => return,
        }
    }
}

#[cfg(test)]
#[path = "tests/coordinator_tests.rs"]
mod tests;
