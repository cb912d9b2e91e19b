use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::error::{BoardError, BoardResult};
use crate::progress::ProgressFormatter;
use crate::ui::theme::OutputMode;

pub const DEFAULT_DIM_AFTER: Duration = Duration::from_millis(1000);
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_UPDATE_CAPACITY: usize = 8;
pub const DEFAULT_REGISTRATION_CAPACITY: usize = 32;

#[derive(Debug, Clone)]
pub struct BoardConfig {
    pub dim_after: Duration,
    pub refresh_interval: Duration,
    pub progress_formatter: ProgressFormatter,
    /// Slots in each job's update queue; older updates are dropped first.
    pub update_capacity: usize,
    pub registration_capacity: usize,
    pub output_mode: OutputMode,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            dim_after: DEFAULT_DIM_AFTER,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            progress_formatter: ProgressFormatter::default(),
            update_capacity: DEFAULT_UPDATE_CAPACITY,
            registration_capacity: DEFAULT_REGISTRATION_CAPACITY,
            output_mode: OutputMode::Auto,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    board: BoardSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct BoardSection {
    dim_after_ms: Option<u64>,
    refresh_interval_ms: Option<u64>,
    update_capacity: Option<usize>,
    registration_capacity: Option<usize>,
    color: Option<String>,
}

impl BoardConfig {
    pub fn with_dim_after(mut self, dim_after: Duration) -> Self {
        self.dim_after = dim_after;
        self
    }

    pub fn with_refresh_interval(mut self, refresh_interval: Duration) -> Self {
        self.refresh_interval = refresh_interval;
        self
    }

    pub fn with_progress_formatter(mut self, formatter: ProgressFormatter) -> Self {
        self.progress_formatter = formatter;
        self
    }

    pub fn with_update_capacity(mut self, capacity: usize) -> Self {
        self.update_capacity = capacity;
        self
    }

    pub fn with_output_mode(mut self, mode: OutputMode) -> Self {
        self.output_mode = mode;
        self
    }

    /// Defaults overridden by `STATUSBOARD_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(ms) = parse_var::<u64>(&lookup, "STATUSBOARD_DIM_AFTER_MS") {
            config.dim_after = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "STATUSBOARD_REFRESH_MS") {
            config.refresh_interval = Duration::from_millis(ms);
        }
        if let Some(capacity) = parse_var::<usize>(&lookup, "STATUSBOARD_UPDATE_CAPACITY") {
            config.update_capacity = capacity;
        }
        config.output_mode = OutputMode::parse(lookup("STATUSBOARD_COLOR").as_deref());
        config
    }

    /// Reads the `[board]` table of a TOML document.
    pub fn from_toml(raw: &str) -> BoardResult<Self> {
        let file: ConfigFile =
            toml::from_str(raw).map_err(|error| BoardError::config("toml", error.to_string()))?;
        let section = file.board;
        let mut config = Self::default();
        if let Some(ms) = section.dim_after_ms {
            config.dim_after = Duration::from_millis(ms);
        }
        if let Some(ms) = section.refresh_interval_ms {
            config.refresh_interval = Duration::from_millis(ms);
        }
        if let Some(capacity) = section.update_capacity {
            config.update_capacity = capacity;
        }
        if let Some(capacity) = section.registration_capacity {
            config.registration_capacity = capacity;
        }
        if let Some(color) = section.color.as_deref() {
            config.output_mode = match color {
                "auto" => OutputMode::Auto,
                "always" => OutputMode::Always,
                "never" => OutputMode::Never,
                other => {
                    return Err(BoardError::config(
                        "color",
                        format!("expected auto, always or never, got `{other}`"),
                    ))
                }
            };
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> BoardResult<()> {
        if self.dim_after.is_zero() {
            return Err(BoardError::config("dim_after", "must be positive"));
        }
        if self.refresh_interval.is_zero() {
            return Err(BoardError::config("refresh_interval", "must be positive"));
        }
        if self.update_capacity == 0 {
            return Err(BoardError::config("update_capacity", "must be at least 1"));
        }
        if self.registration_capacity == 0 {
            return Err(BoardError::config(
                "registration_capacity",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparsable board setting");
            None
        }
    }
}
