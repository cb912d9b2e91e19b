use serde::Deserialize;
use tokio::time::Instant;

use crate::error::{BoardError, BoardResult};
use crate::job::{Job, Progress, Status};

/// Everything a producer can send to its job.
///
/// Serialized form (JSON) uses kebab-case tags, for example
/// `{"text": "building"}`, `{"status": "error"}`, `{"start-progress": 40}`,
/// `{"tick": 3}` or `"clear-progress"`. A tick without an amount (`"tick"`
/// or `{"tick": null}`) advances by one.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "WireUpdate")]
pub enum Update {
    Text(String),
    Status(Status),
    Prefix(Option<String>),
    StartProgress(u64),
    Tick(u64),
    CompleteProgress,
    ClearProgress,
    /// Emitted by the coordinator's dim timer with the `updated` stamp it
    /// was scheduled for. Producers cannot send it.
    #[doc(hidden)]
    DimMarker(Instant),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireUpdate {
    Bare(BareUpdate),
    Tagged(TaggedUpdate),
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
enum BareUpdate {
    Tick,
    CompleteProgress,
    ClearProgress,
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
enum TaggedUpdate {
    Text(String),
    Status(Status),
    Prefix(Option<String>),
    StartProgress(u64),
    Tick(Option<u64>),
}

impl From<WireUpdate> for Update {
    fn from(value: WireUpdate) -> Self {
        match value {
            WireUpdate::Bare(BareUpdate::Tick) => Update::tick(),
            WireUpdate::Bare(BareUpdate::CompleteProgress) => Update::CompleteProgress,
            WireUpdate::Bare(BareUpdate::ClearProgress) => Update::ClearProgress,
            WireUpdate::Tagged(TaggedUpdate::Text(summary)) => Update::Text(summary),
            WireUpdate::Tagged(TaggedUpdate::Status(status)) => Update::Status(status),
            WireUpdate::Tagged(TaggedUpdate::Prefix(prefix)) => Update::Prefix(prefix),
            WireUpdate::Tagged(TaggedUpdate::StartProgress(target)) => {
                Update::StartProgress(target)
            }
            WireUpdate::Tagged(TaggedUpdate::Tick(amount)) => Update::Tick(amount.unwrap_or(1)),
        }
    }
}

impl Update {
    pub fn text(summary: impl Into<String>) -> Self {
        Update::Text(summary.into())
    }

    pub fn tick() -> Self {
        Update::Tick(1)
    }

    /// Parses an update received from outside the process.
    pub fn from_json(raw: &str) -> BoardResult<Self> {
        serde_json::from_str(raw).map_err(|error| BoardError::invalid_update(error.to_string()))
    }

    pub(crate) fn is_internal(&self) -> bool {
        matches!(self, Update::DimMarker(_))
    }

    /// Applies the update to `job`. On error the job is left untouched.
    pub fn apply(&self, job: &mut Job, now: Instant) -> BoardResult<()> {
        match self {
            Update::Text(summary) => {
                job.summary.clone_from(summary);
                job.touch(now);
            }
            Update::Status(status) => {
                job.status = *status;
                job.touch(now);
            }
            Update::Prefix(prefix) => {
                job.prefix.clone_from(prefix);
                job.touch(now);
            }
            Update::StartProgress(target) => {
                job.progress = Some(Progress::new(*target, now));
                job.touch(now);
            }
            Update::Tick(amount) => {
                let progress = progress_of(job, "tick")?;
                progress.current = progress.current.saturating_add(*amount);
                job.touch(now);
            }
            Update::CompleteProgress => {
                let progress = progress_of(job, "complete-progress")?;
                progress.current = progress.target;
                job.touch(now);
            }
            Update::ClearProgress => {
                job.progress = None;
                job.touch(now);
            }
            Update::DimMarker(scheduled_for) => {
                if job.updated == *scheduled_for {
                    job.active = false;
                }
            }
        }
        Ok(())
    }
}

fn progress_of<'a>(job: &'a mut Job, update: &str) -> BoardResult<&'a mut Progress> {
    let id = job.id;
    job.progress.as_mut().ok_or_else(|| {
        BoardError::invalid_update(format!("`{update}` sent to job {id} without progress"))
    })
}

impl From<&str> for Update {
    fn from(value: &str) -> Self {
        Update::Text(value.to_owned())
    }
}

impl From<String> for Update {
    fn from(value: String) -> Self {
        Update::Text(value)
    }
}

impl From<Status> for Update {
    fn from(value: Status) -> Self {
        Update::Status(value)
    }
}
