//! A status board that keeps one in-place terminal line per running job.
//!
//! Producers hold a [`JobHandle`] and push [`Update`]s into it from any task.
//! A single coordinator task owns the job table, decides which line each job
//! occupies, dims jobs that stopped reporting and redraws only the lines
//! that changed.

pub mod board;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod job;
pub mod lines;
pub mod progress;
pub mod table;
pub mod ui;
pub mod update;

pub use board::{renderer_for, Board, JobHandle};
pub use config::BoardConfig;
pub use error::{BoardError, BoardFailure, BoardResult};
pub use job::{Job, JobId, JobOptions, Progress, Status};
pub use progress::{format_progress, ProgressFormatter};
pub use table::JobTable;
pub use update::Update;
