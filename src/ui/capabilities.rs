use std::collections::HashMap;
use std::process::{Command as ProcessCommand, Stdio};
use std::sync::Mutex;

use crossterm::cursor::{Hide, MoveToColumn, MoveUp, RestorePosition, SavePosition, Show};
use crossterm::terminal::{Clear, ClearType};
use crossterm::Command;
use tracing::warn;

use crate::error::{BoardError, BoardResult};

pub const DEFAULT_TERMINAL: &str = "xterm";

/// Abstract terminal actions the renderer needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    CursorUp(u16),
    /// Zero-based column.
    ColumnAddress(u16),
    ClearToEol,
    SaveCursor,
    RestoreCursor,
    HideCursor,
    ShowCursor,
}

impl Action {
    /// terminfo capability name and parameters.
    pub fn capname(&self) -> (&'static str, Option<u16>) {
        match self {
            Action::CursorUp(rows) => ("cuu", Some(*rows)),
            Action::ColumnAddress(column) => ("hpa", Some(*column)),
            Action::ClearToEol => ("el", None),
            Action::SaveCursor => ("sc", None),
            Action::RestoreCursor => ("rc", None),
            Action::HideCursor => ("civis", None),
            Action::ShowCursor => ("cnorm", None),
        }
    }
}

pub trait Capabilities: Send + Sync {
    fn term(&self) -> &str;
    fn sequence(&self, action: Action) -> BoardResult<String>;
}

pub fn terminal_type_from_env() -> String {
    match std::env::var("TERM") {
        Ok(term) if !term.trim().is_empty() => term,
        _ => DEFAULT_TERMINAL.to_owned(),
    }
}

/// Resolves `action`, degrading a failed lookup to an empty sequence.
pub fn lookup(capabilities: &dyn Capabilities, action: Action) -> String {
    match capabilities.sequence(action) {
        Ok(sequence) => sequence,
        Err(error) => {
            warn!(term = capabilities.term(), ?action, %error, "terminal capability lookup failed");
            String::new()
        }
    }
}

/// Whether the cursor-addressing renderer can work with these capabilities.
pub fn capabilities_available(capabilities: &dyn Capabilities) -> bool {
    [Action::CursorUp(1), Action::ClearToEol]
        .into_iter()
        .all(|action| matches!(capabilities.sequence(action), Ok(sequence) if !sequence.is_empty()))
}

/// ANSI sequences as encoded by crossterm. Terminals that cannot move the
/// cursor (`dumb`) have no capabilities.
#[derive(Debug, Clone)]
pub struct AnsiCapabilities {
    term: String,
}

impl AnsiCapabilities {
    pub fn new(term: impl Into<String>) -> Self {
        Self { term: term.into() }
    }

    pub fn from_env() -> Self {
        Self::new(terminal_type_from_env())
    }
}

fn ansi<C: Command>(command: C) -> BoardResult<String> {
    let mut sequence = String::new();
    command
        .write_ansi(&mut sequence)
        .map_err(|_| BoardError::render("failed to encode ANSI sequence"))?;
    Ok(sequence)
}

impl Capabilities for AnsiCapabilities {
    fn term(&self) -> &str {
        &self.term
    }

    fn sequence(&self, action: Action) -> BoardResult<String> {
        if self.term == "dumb" {
            let (capname, _) = action.capname();
            return Err(BoardError::render(format!(
                "terminal type `{}` has no `{capname}` capability",
                self.term
            )));
        }
        match action {
            Action::CursorUp(rows) => ansi(MoveUp(rows)),
            Action::ColumnAddress(column) => ansi(MoveToColumn(column)),
            Action::ClearToEol => ansi(Clear(ClearType::UntilNewLine)),
            Action::SaveCursor => ansi(SavePosition),
            Action::RestoreCursor => ansi(RestorePosition),
            Action::HideCursor => ansi(Hide),
            Action::ShowCursor => ansi(Show),
        }
    }
}

/// How a `tput` lookup is made for one action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TputLookup {
    /// A capability without parameters, emitted `repeat` times.
    Fixed {
        capname: &'static str,
        repeat: usize,
    },
    Parameterised {
        capname: &'static str,
        parameter: u16,
    },
}

impl TputLookup {
    /// Cursor motion the renderer repeats every frame maps onto fixed
    /// capabilities, so the cache holds one entry per capability name.
    pub fn for_action(action: Action) -> Self {
        match action {
            Action::CursorUp(rows) => TputLookup::Fixed {
                capname: "cuu1",
                repeat: usize::from(rows),
            },
            Action::ColumnAddress(0) => TputLookup::Fixed {
                capname: "cr",
                repeat: 1,
            },
            other => match other.capname() {
                (capname, Some(parameter)) => TputLookup::Parameterised { capname, parameter },
                (capname, None) => TputLookup::Fixed { capname, repeat: 1 },
            },
        }
    }
}

/// Capabilities read from the terminfo database through `tput`. Fixed
/// capabilities are cached by name; parameterised ones run `tput` each time.
#[derive(Debug)]
pub struct TputCapabilities {
    term: String,
    cache: Mutex<HashMap<&'static str, String>>,
}

impl TputCapabilities {
    pub fn new(term: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn query(&self, capname: &str, parameter: Option<u16>) -> BoardResult<String> {
        let mut process = ProcessCommand::new("tput");
        process
            .arg("-T")
            .arg(&self.term)
            .arg(capname)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(parameter) = parameter {
            process.arg(parameter.to_string());
        }
        let output = process.output().map_err(|error| {
            BoardError::render(format!("failed to run `tput {capname}`: {error}"))
        })?;
        if !output.status.success() {
            return Err(BoardError::render(format!(
                "`tput -T {} {capname}` failed: {}",
                self.term,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn fixed(&self, capname: &'static str) -> BoardResult<String> {
        if let Ok(cache) = self.cache.lock() {
            if let Some(sequence) = cache.get(capname) {
                return Ok(sequence.clone());
            }
        }
        let sequence = self.query(capname, None)?;
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(capname, sequence.clone());
        }
        Ok(sequence)
    }

    /// Number of capability names resolved so far.
    pub fn cached(&self) -> usize {
        self.cache.lock().map(|cache| cache.len()).unwrap_or(0)
    }
}

impl Capabilities for TputCapabilities {
    fn term(&self) -> &str {
        &self.term
    }

    fn sequence(&self, action: Action) -> BoardResult<String> {
        match TputLookup::for_action(action) {
            TputLookup::Fixed { capname, repeat } => Ok(self.fixed(capname)?.repeat(repeat)),
            TputLookup::Parameterised { capname, parameter } => {
                self.query(capname, Some(parameter))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ansi_capabilities_encode_cursor_motion() {
        let caps = AnsiCapabilities::new("xterm-256color");
        assert_eq!(caps.sequence(Action::CursorUp(3)).expect("cuu"), "\u{1b}[3A");
        assert_eq!(caps.sequence(Action::ColumnAddress(0)).expect("hpa"), "\u{1b}[1G");
        assert_eq!(caps.sequence(Action::ClearToEol).expect("el"), "\u{1b}[K");
        assert!(capabilities_available(&caps));
    }

    #[test]
    fn dumb_terminal_lookups_degrade_to_empty() {
        let caps = AnsiCapabilities::new("dumb");
        assert!(matches!(
            caps.sequence(Action::ClearToEol),
            Err(BoardError::RenderFailure { .. })
        ));
        assert_eq!(lookup(&caps, Action::CursorUp(2)), "");
        assert!(!capabilities_available(&caps));
    }

    #[test]
    fn capnames_follow_terminfo() {
        assert_eq!(Action::CursorUp(4).capname(), ("cuu", Some(4)));
        assert_eq!(Action::ColumnAddress(0).capname(), ("hpa", Some(0)));
        assert_eq!(Action::HideCursor.capname(), ("civis", None));
        assert_eq!(Action::ShowCursor.capname(), ("cnorm", None));
    }

    #[test]
    fn tput_with_unknown_terminal_degrades_to_empty() {
        let caps = TputCapabilities::new("no-such-terminal-type-for-tests");
        assert_eq!(lookup(&caps, Action::ClearToEol), "");
        assert_eq!(caps.cached(), 0);
    }

    #[test]
    fn tput_cursor_motion_shares_one_capability_per_name() {
        for rows in [1u16, 2, 7, 40] {
            assert_eq!(
                TputLookup::for_action(Action::CursorUp(rows)),
                TputLookup::Fixed {
                    capname: "cuu1",
                    repeat: usize::from(rows),
                }
            );
        }
        assert_eq!(
            TputLookup::for_action(Action::ColumnAddress(0)),
            TputLookup::Fixed {
                capname: "cr",
                repeat: 1,
            }
        );
        assert_eq!(
            TputLookup::for_action(Action::ColumnAddress(12)),
            TputLookup::Parameterised {
                capname: "hpa",
                parameter: 12,
            }
        );
        assert_eq!(
            TputLookup::for_action(Action::SaveCursor),
            TputLookup::Fixed {
                capname: "sc",
                repeat: 1,
            }
        );
    }
}
