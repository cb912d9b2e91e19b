use std::io::{IsTerminal, Write};
use std::sync::{Arc, Mutex};

use anstream::{AutoStream, ColorChoice};

use crate::error::{BoardError, BoardResult};
use crate::ui::theme::OutputMode;

/// The shared terminal stream. Every write holds the lock for exactly one
/// caller-sized chunk so escape sequences never interleave.
#[derive(Clone)]
pub struct OutputSink {
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
    is_terminal: bool,
}

impl OutputSink {
    pub fn new<W>(writer: W, is_terminal: bool) -> Self
    where
        W: Write + Send + 'static,
    {
        Self {
            writer: Arc::new(Mutex::new(Box::new(writer))),
            is_terminal,
        }
    }

    /// Standard output. Escape sequences pass through untouched on a
    /// terminal; redirected output is stripped unless colour is forced.
    pub fn stdout(mode: OutputMode) -> Self {
        let is_terminal = std::io::stdout().is_terminal();
        let choice = if is_terminal || mode == OutputMode::Always {
            ColorChoice::AlwaysAnsi
        } else {
            ColorChoice::Never
        };
        Self::new(AutoStream::new(std::io::stdout(), choice), is_terminal)
    }

    /// An in-memory sink plus a handle to read back what was written.
    pub fn buffer() -> (Self, SharedBuffer) {
        let buffer = SharedBuffer::default();
        (Self::new(buffer.clone(), true), buffer)
    }

    pub fn is_terminal(&self) -> bool {
        self.is_terminal
    }

    pub fn write_atomic(&self, bytes: &[u8]) -> BoardResult<()> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| BoardError::render("output sink lock poisoned"))?;
        writer.write_all(bytes)?;
        writer.flush()?;
        Ok(())
    }
}

impl std::fmt::Debug for OutputSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputSink")
            .field("is_terminal", &self.is_terminal)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> Vec<u8> {
        self.0.lock().map(|bytes| bytes.clone()).unwrap_or_default()
    }

    pub fn contents_lossy(&self) -> String {
        String::from_utf8_lossy(&self.contents()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut bytes = self
            .0
            .lock()
            .map_err(|_| std::io::Error::other("buffer lock poisoned"))?;
        bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
