use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::job::Progress;

pub const BAR_WIDTH: usize = 20;
const FILLED: char = '█';
const UNFILLED: char = '░';

type FormatFn = dyn Fn(&Progress, Instant) -> String + Send + Sync;

/// Turns a job's progress into the text appended to its line.
#[derive(Clone)]
pub struct ProgressFormatter(Arc<FormatFn>);

impl ProgressFormatter {
    pub fn new<F>(format: F) -> Self
    where
        F: Fn(&Progress, Instant) -> String + Send + Sync + 'static,
    {
        Self(Arc::new(format))
    }

    pub fn format(&self, progress: &Progress, now: Instant) -> String {
        (self.0)(progress, now)
    }
}

impl Default for ProgressFormatter {
    fn default() -> Self {
        Self::new(format_progress)
    }
}

impl Debug for ProgressFormatter {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("ProgressFormatter(..)")
    }
}

impl PartialEq for ProgressFormatter {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// `None` until both counters are positive.
pub fn completion_ratio(progress: &Progress) -> Option<f64> {
    if progress.current == 0 || progress.target == 0 {
        return None;
    }
    Some((progress.current as f64 / progress.target as f64).min(1.0))
}

pub fn render_bar(ratio: f64, width: usize) -> String {
    let filled = ((ratio.clamp(0.0, 1.0) * width as f64).round() as usize).min(width);
    let mut bar = String::with_capacity(width * FILLED.len_utf8());
    bar.extend(std::iter::repeat(FILLED).take(filled));
    bar.extend(std::iter::repeat(UNFILLED).take(width - filled));
    bar
}

pub fn estimate_remaining(ratio: f64, elapsed: Duration) -> Duration {
    if ratio <= 0.0 {
        return Duration::ZERO;
    }
    let elapsed = elapsed.as_secs_f64();
    Duration::from_secs_f64((elapsed / ratio - elapsed).max(0.0))
}

pub fn format_eta(remaining: Duration) -> String {
    let seconds = remaining.as_secs();
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

pub fn format_progress(progress: &Progress, now: Instant) -> String {
    let Some(ratio) = completion_ratio(progress) else {
        return render_bar(0.0, BAR_WIDTH);
    };
    let elapsed = now.saturating_duration_since(progress.created);
    let percent = (ratio * 100.0).round() as u32;
    format!(
        "{} {percent:>3}% ETA {}",
        render_bar(ratio, BAR_WIDTH),
        format_eta(estimate_remaining(ratio, elapsed))
    )
}
