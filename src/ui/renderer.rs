use tokio::time::Instant;

use crate::error::BoardResult;
use crate::job::Job;
use crate::progress::ProgressFormatter;
use crate::table::JobTable;

/// Receives table snapshots from the coordinator and puts them on screen.
pub trait Renderer: Send {
    /// Draws every job of `new` that differs from its counterpart in `old`.
    fn render(&mut self, old: &JobTable, new: &JobTable, now: Instant) -> BoardResult<()>;

    /// `count` rows at the top of the board left the table and are now
    /// ordinary scrollback.
    fn retired(&mut self, count: usize);

    fn finish(&mut self) -> BoardResult<()>;
}

/// Jobs that are new in `new` or whose state changed, top to bottom.
pub fn changed_jobs<'a>(old: &JobTable, new: &'a JobTable) -> Vec<&'a Job> {
    new.by_line()
        .into_iter()
        .filter(|job| old.get(job.id) != Some(*job))
        .collect()
}

/// Unstyled text of one board line: prefix, summary and progress.
pub fn compose_line(job: &Job, default_formatter: &ProgressFormatter, now: Instant) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(3);
    if let Some(prefix) = job.prefix.as_deref().filter(|prefix| !prefix.is_empty()) {
        parts.push(prefix.to_owned());
    }
    if !job.summary.is_empty() {
        parts.push(job.summary.clone());
    }
    if let Some(progress) = &job.progress {
        let formatter = job
            .progress_formatter
            .as_ref()
            .unwrap_or(default_formatter);
        let rendered = formatter.format(progress, now);
        if !rendered.is_empty() {
            parts.push(rendered);
        }
    }
    parts.join(" ")
}
