//! Line assignment for jobs on the board.
//!
//! Line 1 is the top-most board row and line N sits directly above the
//! cursor's resting position. Completed jobs cluster at the top in the
//! order they completed, running jobs follow in registration order, and
//! new jobs are appended at the bottom.

use tokio::time::Instant;
use tracing::debug;

use crate::error::{BoardError, BoardResult};
use crate::job::{Job, JobId, JobOptions};
use crate::table::JobTable;

pub fn register(table: &mut JobTable, id: JobId, options: JobOptions, now: Instant) -> usize {
    let line = table.len() + 1;
    table.insert(Job::new(id, line, options, now));
    debug!(job = %id, line, "registered job");
    line
}

fn completed_count(table: &JobTable) -> usize {
    table.jobs().filter(|job| job.complete).count()
}

/// Marks `id` complete and moves it to the bottom of the completed cluster.
pub fn complete(table: &mut JobTable, id: JobId, now: Instant) -> BoardResult<()> {
    let Some(job) = table.get(id) else {
        return Err(BoardError::invalid_update(format!("unknown job {id}")));
    };
    if job.complete {
        return Ok(());
    }
    let current = job.line;
    let target = completed_count(table) + 1;
    if target > current {
        return Err(BoardError::corruption(format!(
            "running job {id} at line {current} sits inside the completed cluster"
        )));
    }

    if target < current {
        for other in table.jobs_mut() {
            if other.line >= target && other.line < current {
                other.line += 1;
            }
        }
    }

    if let Some(job) = table.get_mut(id) {
        job.line = target;
        job.complete = true;
        job.touch(now);
    }
    debug!(job = %id, from = current, to = target, "completed job");
    Ok(())
}

/// Moves a pinned job to the top of the running jobs when the update that
/// produced `before` changed something visible. Returns whether it moved.
pub fn promote_if_pinned(table: &mut JobTable, id: JobId, before: &Job) -> bool {
    let top = completed_count(table) + 1;
    let Some(job) = table.get(id) else {
        return false;
    };
    if !job.pinned || !job.active || job.complete || job.line <= top {
        return false;
    }
    if !job.visible_change(before) {
        return false;
    }

    let current = job.line;
    for other in table.jobs_mut() {
        if other.line >= top && other.line < current {
            other.line += 1;
        }
    }
    if let Some(job) = table.get_mut(id) {
        job.line = top;
    }
    debug!(job = %id, from = current, to = top, "promoted pinned job");
    true
}

/// Drops the completed, dimmed jobs occupying lines `1..=k` and shifts the
/// rest up by `k`. Returns `k`.
pub fn retire(table: &mut JobTable) -> usize {
    let mut retired = 0usize;
    while table
        .job_at_line(retired + 1)
        .is_some_and(Job::is_retirable)
    {
        retired += 1;
    }
    if retired == 0 {
        return 0;
    }

    table.retain(|_, job| job.line > retired);
    for job in table.jobs_mut() {
        job.line -= retired;
    }
    debug!(retired, remaining = table.len(), "retired jobs");
    retired
}

#[cfg(test)]
#[path = "tests/lines_tests.rs"]
mod tests;
