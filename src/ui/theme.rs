use anstyle::{AnsiColor, Color, Style};

use crate::job::{Job, Status};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    #[default]
    Auto,
    Always,
    Never,
}

impl OutputMode {
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some("always") => OutputMode::Always,
            Some("never") => OutputMode::Never,
            _ => OutputMode::Auto,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Theme {
    pub normal: Style,
    pub success: Style,
    pub warning: Style,
    pub error: Style,
    pub muted: Style,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            normal: Style::new(),
            success: Style::new().fg_color(Some(Color::Ansi(AnsiColor::Green))),
            warning: Style::new().fg_color(Some(Color::Ansi(AnsiColor::Yellow))),
            error: Style::new().fg_color(Some(Color::Ansi(AnsiColor::Red))),
            muted: Style::new().fg_color(Some(Color::Ansi(AnsiColor::BrightBlack))),
        }
    }
}

impl Theme {
    pub fn status(&self, status: Status) -> Style {
        match status {
            Status::Normal => self.normal,
            Status::Success => self.success,
            Status::Warning => self.warning,
            Status::Error => self.error,
        }
    }

    /// Status colour, bold while active, italic once complete.
    pub fn job(&self, job: &Job) -> Style {
        let mut style = self.status(job.status);
        if job.active {
            style = style.bold();
        }
        if job.complete {
            style = style.italic();
        }
        style
    }
}

pub fn resolve_color_enabled(mode: OutputMode, is_tty: bool) -> bool {
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }
    match mode {
        OutputMode::Always => true,
        OutputMode::Never => false,
        OutputMode::Auto => is_tty,
    }
}

pub fn styled_text(style: Style, text: &str) -> String {
    format!("{}{}{}", style.render(), text, style.render_reset())
}
