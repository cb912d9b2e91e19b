pub mod capabilities;
pub mod plain_renderer;
pub mod renderer;
pub mod sink;
pub mod terminal;
pub mod theme;

pub use capabilities::{
    capabilities_available, Action, AnsiCapabilities, Capabilities, TputCapabilities, TputLookup,
};
pub use plain_renderer::PlainRenderer;
pub use renderer::Renderer;
pub use sink::{OutputSink, SharedBuffer};
pub use terminal::TerminalRenderer;
pub use theme::{OutputMode, Theme};
