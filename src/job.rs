use std::fmt::{Display, Formatter};

use serde::Deserialize;
use tokio::time::Instant;

use crate::progress::ProgressFormatter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(pub u64);

impl Display for JobId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Normal,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub current: u64,
    pub target: u64,
    pub created: Instant,
}

impl Progress {
    pub fn new(target: u64, created: Instant) -> Self {
        Self {
            current: 0,
            target,
            created,
        }
    }
}

/// Options accepted when a job is added to the board.
#[derive(Debug, Clone, Default)]
pub struct JobOptions {
    pub status: Status,
    pub pinned: bool,
    pub prefix: Option<String>,
    pub progress_formatter: Option<ProgressFormatter>,
}

impl JobOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    pub fn pinned(mut self) -> Self {
        self.pinned = true;
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn with_progress_formatter(mut self, formatter: ProgressFormatter) -> Self {
        self.progress_formatter = Some(formatter);
        self
    }
}

/// Display state of one job. Only the coordinator mutates these.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: JobId,
    pub line: usize,
    pub summary: String,
    pub prefix: Option<String>,
    pub status: Status,
    pub active: bool,
    pub complete: bool,
    pub pinned: bool,
    pub updated: Instant,
    pub progress: Option<Progress>,
    pub progress_formatter: Option<ProgressFormatter>,
}

impl Job {
    pub fn new(id: JobId, line: usize, options: JobOptions, now: Instant) -> Self {
        Self {
            id,
            line,
            summary: String::new(),
            prefix: options.prefix,
            status: options.status,
            active: false,
            complete: false,
            pinned: options.pinned,
            updated: now,
            progress: None,
            progress_formatter: options.progress_formatter,
        }
    }

    pub fn touch(&mut self, now: Instant) {
        self.active = true;
        self.updated = now;
    }

    /// True when anything a reader can see on the job's line differs.
    /// Ignores `updated`, `line` and `active`.
    pub fn visible_change(&self, before: &Job) -> bool {
        self.summary != before.summary
            || self.status != before.status
            || self.progress != before.progress
            || self.prefix != before.prefix
    }

    pub fn is_retirable(&self) -> bool {
        self.complete && !self.active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visible_change_ignores_bookkeeping_fields() {
        let now = Instant::now();
        let before = Job::new(JobId(1), 1, JobOptions::new(), now);
        let mut after = before.clone();
        after.line = 3;
        after.active = true;
        after.updated = now + std::time::Duration::from_millis(40);
        assert!(!after.visible_change(&before));

        after.summary = "compiling".to_owned();
        assert!(after.visible_change(&before));
    }

    #[test]
    fn options_builder_carries_into_new_job() {
        let job = Job::new(
            JobId(7),
            2,
            JobOptions::new()
                .with_status(Status::Warning)
                .with_prefix("api")
                .pinned(),
            Instant::now(),
        );
        assert_eq!(job.status, Status::Warning);
        assert_eq!(job.prefix.as_deref(), Some("api"));
        assert!(job.pinned);
        assert!(!job.active);
        assert!(!job.complete);
    }
}
