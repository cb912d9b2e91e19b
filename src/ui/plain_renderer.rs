use std::collections::HashMap;

use tokio::time::Instant;

use crate::error::BoardResult;
use crate::job::{Job, JobId};
use crate::table::JobTable;
use crate::ui::renderer::Renderer;
use crate::ui::sink::OutputSink;
use crate::ui::theme::{styled_text, Theme};

/// Fallback for terminals without cursor addressing: prints a fresh line
/// whenever a job's prefix or summary changes.
pub struct PlainRenderer {
    sink: OutputSink,
    color_enabled: bool,
    theme: Theme,
    seen: HashMap<JobId, (Option<String>, String)>,
}

impl PlainRenderer {
    pub fn new(sink: OutputSink, color_enabled: bool) -> Self {
        Self {
            sink,
            color_enabled,
            theme: Theme::default(),
            seen: HashMap::new(),
        }
    }

    pub fn with_theme(mut self, theme: Theme) -> Self {
        self.theme = theme;
        self
    }

    fn line_for(&self, job: &Job) -> String {
        let summary = if self.color_enabled {
            styled_text(self.theme.status(job.status), &job.summary)
        } else {
            job.summary.clone()
        };
        match job.prefix.as_deref().filter(|prefix| !prefix.is_empty()) {
            Some(prefix) if self.color_enabled => {
                format!("{} {summary}\n", styled_text(self.theme.muted, prefix))
            }
            Some(prefix) => format!("{prefix} {summary}\n"),
            None => format!("{summary}\n"),
        }
    }
}

impl Renderer for PlainRenderer {
    fn render(&mut self, _old: &JobTable, new: &JobTable, _now: Instant) -> BoardResult<()> {
        self.seen.retain(|id, _| new.contains(*id));
        for job in new.by_line() {
            if job.summary.is_empty() {
                continue;
            }
            let pair = (job.prefix.clone(), job.summary.clone());
            if self.seen.get(&job.id) == Some(&pair) {
                continue;
            }
            self.sink.write_atomic(self.line_for(job).as_bytes())?;
            self.seen.insert(job.id, pair);
        }
        Ok(())
    }

    fn retired(&mut self, _count: usize) {}

    fn finish(&mut self) -> BoardResult<()> {
        Ok(())
    }
}
