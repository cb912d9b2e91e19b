use tokio::time::Instant;
use tracing::warn;

use crate::error::{BoardError, BoardResult};
use crate::job::Job;
use crate::progress::ProgressFormatter;
use crate::table::JobTable;
use crate::ui::capabilities::{lookup, Action, Capabilities};
use crate::ui::renderer::{changed_jobs, compose_line, Renderer};
use crate::ui::sink::OutputSink;
use crate::ui::theme::{styled_text, Theme};

/// Redraws changed board rows in place using cursor motion.
///
/// The board occupies the `rows` screen rows directly above the cursor's
/// resting position; the row for line `L` is `rows - L + 1` rows up.
pub struct TerminalRenderer {
    sink: OutputSink,
    capabilities: Box<dyn Capabilities>,
    theme: Theme,
    color_enabled: bool,
    formatter: ProgressFormatter,
    rows: usize,
    cursor_hidden: bool,
}

impl TerminalRenderer {
    pub fn new(
        sink: OutputSink,
        capabilities: Box<dyn Capabilities>,
        formatter: ProgressFormatter,
        color_enabled: bool,
    ) -> Self {
        Self {
            sink,
            capabilities,
            theme: Theme::default(),
            color_enabled,
            formatter,
            rows: 0,
            cursor_hidden: false,
        }
    }

    pub fn with_theme(mut self, theme: Theme) -> Self {
        self.theme = theme;
        self
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    fn seq(&self, action: Action) -> String {
        lookup(self.capabilities.as_ref(), action)
    }

    fn styled(&self, job: &Job, text: &str) -> String {
        if !self.color_enabled {
            return text.to_owned();
        }
        styled_text(self.theme.job(job), text)
    }

    fn grow_to(&mut self, rows: usize) -> BoardResult<()> {
        if rows <= self.rows {
            return Ok(());
        }
        let newlines = "\n".repeat(rows - self.rows);
        self.sink.write_atomic(newlines.as_bytes())?;
        self.rows = rows;
        Ok(())
    }

    fn draw(&self, job: &Job, now: Instant) -> BoardResult<()> {
        let offset = self.rows.saturating_sub(job.line) + 1;
        let offset = u16::try_from(offset).map_err(|_| {
            BoardError::render(format!("line offset {offset} exceeds terminal range"))
        })?;
        let text = compose_line(job, &self.formatter, now);
        let mut sequence = String::new();
        sequence.push_str(&self.seq(Action::SaveCursor));
        sequence.push_str(&self.seq(Action::CursorUp(offset)));
        sequence.push_str(&self.seq(Action::ColumnAddress(0)));
        sequence.push_str(&self.seq(Action::ClearToEol));
        sequence.push_str(&self.styled(job, &text));
        sequence.push_str(&self.seq(Action::RestoreCursor));
        self.sink.write_atomic(sequence.as_bytes())
    }
}

impl Renderer for TerminalRenderer {
    fn render(&mut self, old: &JobTable, new: &JobTable, now: Instant) -> BoardResult<()> {
        self.grow_to(new.len())?;
        if !self.cursor_hidden && !new.is_empty() {
            let hide = self.seq(Action::HideCursor);
            self.sink.write_atomic(hide.as_bytes())?;
            self.cursor_hidden = true;
        }

        let mut first_error = None;
        for job in changed_jobs(old, new) {
            if let Err(error) = self.draw(job, now) {
                warn!(job = %job.id, %error, "failed to draw job line");
                first_error.get_or_insert(error);
            }
        }
        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn retired(&mut self, count: usize) {
        self.rows = self.rows.saturating_sub(count);
    }

    fn finish(&mut self) -> BoardResult<()> {
        if self.cursor_hidden {
            let show = self.seq(Action::ShowCursor);
            self.sink.write_atomic(show.as_bytes())?;
            self.cursor_hidden = false;
        }
        Ok(())
    }
}
