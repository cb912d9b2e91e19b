use std::fmt::{Display, Formatter};

use crate::job::JobId;
use crate::table::JobTable;
use crate::update::Update;

pub type BoardResult<T> = Result<T, BoardError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardError {
    InvalidUpdate { reason: String },
    TableCorruption { detail: String },
    RenderFailure { detail: String },
    ConfigurationError { field: String, reason: String },
    Closed,
}

impl BoardError {
    pub fn invalid_update(reason: impl Into<String>) -> Self {
        Self::InvalidUpdate {
            reason: reason.into(),
        }
    }

    pub fn corruption(detail: impl Into<String>) -> Self {
        Self::TableCorruption {
            detail: detail.into(),
        }
    }

    pub fn render(detail: impl Into<String>) -> Self {
        Self::RenderFailure {
            detail: detail.into(),
        }
    }

    pub fn config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigurationError {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Errors the coordinator cannot continue past.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BoardError::TableCorruption { .. })
    }
}

impl Display for BoardError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            BoardError::InvalidUpdate { reason } => write!(f, "invalid update: {reason}"),
            BoardError::TableCorruption { detail } => write!(f, "job table corrupted: {detail}"),
            BoardError::RenderFailure { detail } => write!(f, "render failed: {detail}"),
            BoardError::ConfigurationError { field, reason } => {
                write!(f, "invalid board config `{field}`: {reason}")
            }
            BoardError::Closed => write!(f, "status board is closed"),
        }
    }
}

impl std::error::Error for BoardError {}

impl From<std::io::Error> for BoardError {
    fn from(value: std::io::Error) -> Self {
        Self::render(value.to_string())
    }
}

/// A failure raised while the coordinator processed one event, with the
/// table as it stood when the failure happened.
#[derive(Debug, Clone)]
pub struct BoardFailure {
    pub job: Option<JobId>,
    pub update: Option<Update>,
    pub table: JobTable,
    pub error: BoardError,
}

impl Display for BoardFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match (&self.job, &self.update) {
            (Some(job), Some(update)) => write!(
                f,
                "{} (job {job}, update {update:?}, {} jobs on board)",
                self.error,
                self.table.len()
            ),
            (Some(job), None) => write!(
                f,
                "{} (job {job}, {} jobs on board)",
                self.error,
                self.table.len()
            ),
            _ => write!(f, "{} ({} jobs on board)", self.error, self.table.len()),
        }
    }
}

impl std::error::Error for BoardFailure {}
