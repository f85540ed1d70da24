//! Logging configuration for cliprelay.
//!
//! This module provides initialization of the tracing-based logging system and
//! the console glyphs used in log messages, with ASCII fallbacks for terminals
//! that cannot render emoji.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::{Error, Result};

/// Verbosity level for logging output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Suppress all output except errors.
    Quiet,
    /// Normal output level (info and above).
    #[default]
    Normal,
    /// Verbose output (debug and above).
    Verbose,
    /// Very verbose output (trace level).
    Trace,
}

impl Verbosity {
    /// Convert verbosity to tracing level filter.
    #[must_use]
    pub fn to_level_filter(&self) -> Level {
        match self {
            Self::Quiet => Level::ERROR,
            Self::Normal => Level::INFO,
            Self::Verbose => Level::DEBUG,
            Self::Trace => Level::TRACE,
        }
    }
}

/// Initialize the logging system.
///
/// This should be called once at application startup. The logging level can be
/// controlled via:
/// 1. The `verbosity` parameter
/// 2. The `RUST_LOG` environment variable (takes precedence)
///
/// When `log_file` is given, events are also appended to that file without
/// ANSI colors. The returned guard flushes the file writer on drop and must be
/// kept alive for as long as logging is needed.
///
/// # Errors
///
/// Returns an error if the log file's directory cannot be created.
///
/// # Examples
///
/// ```no_run
/// use cliprelay::{init_logging, logging::Verbosity};
///
/// let _guard = init_logging(Verbosity::Normal, None).unwrap();
/// ```
pub fn init_logging(verbosity: Verbosity, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = verbosity.to_level_filter();
    let default_filter = format!("cliprelay={level},cliprelay_desktop={level}");

    // Allow RUST_LOG to override
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&default_filter));

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let (writer, guard) = file_writer(path)?;
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false),
        )
        .with(file_layer);

    // Install the subscriber (ignore error if already set)
    let _ = subscriber.try_init();
    Ok(guard)
}

fn file_writer(path: &Path) -> Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    if !dir.exists() {
        std::fs::create_dir_all(dir).map_err(|source| Error::DirectoryCreate {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    let file_name = path.file_name().unwrap_or_else(|| "cliprelay.log".as_ref());
    let appender = tracing_appender::rolling::never(dir, file_name);
    Ok(tracing_appender::non_blocking(appender))
}

/// Whether log messages may contain emoji.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmojiMode {
    /// Decide from the terminal environment.
    #[default]
    Auto,
    /// Always use emoji.
    Always,
    /// Always use ASCII tags.
    Never,
}

impl EmojiMode {
    /// Resolve the mode against the current process environment.
    #[must_use]
    pub fn resolve(self) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::Auto => terminal_supports_emoji(|key| std::env::var(key).ok()),
        }
    }
}

/// Decide emoji support from environment lookups.
///
/// Windows Terminal always renders emoji; elsewhere the first non-empty locale
/// variable must name a UTF-8 encoding.
#[must_use]
pub fn terminal_supports_emoji(lookup: impl Fn(&str) -> Option<String>) -> bool {
    if lookup("WT_SESSION").is_some() {
        return true;
    }
    ["LC_ALL", "LC_CTYPE", "LANG"]
        .iter()
        .find_map(|key| lookup(key).filter(|v| !v.is_empty()))
        .is_some_and(|locale| {
            let locale = locale.to_ascii_lowercase();
            locale.contains("utf-8") || locale.contains("utf8")
        })
}

/// A console glyph used to tag log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Glyph {
    /// A capture was triggered.
    Target,
    /// Something is starting.
    Start,
    /// A retry is about to happen.
    Retry,
    /// A recoverable problem.
    Warning,
    /// A failure.
    Error,
    /// A success.
    Success,
    /// Hotkey activity.
    Keyboard,
    /// Clipboard activity.
    Clipboard,
    /// Shutdown activity.
    Stop,
    /// Statistics output.
    Stats,
    /// Connection lifecycle.
    Plug,
    /// An unexpected crash.
    Crash,
    /// A restart.
    Restart,
    /// Supervisor activity.
    Guard,
}

impl Glyph {
    /// Render the glyph as emoji or as its ASCII tag.
    #[must_use]
    pub fn render(self, emoji: bool) -> &'static str {
        match (self, emoji) {
            (Self::Target, true) => "🎯",
            (Self::Target, false) => "[TARGET]",
            (Self::Start, true) => "🚀",
            (Self::Start, false) => "[START]",
            (Self::Retry, true) => "🔄",
            (Self::Retry, false) => "[RETRY]",
            (Self::Warning, true) => "⚠️",
            (Self::Warning, false) => "[WARN]",
            (Self::Error, true) => "❌",
            (Self::Error, false) => "[ERROR]",
            (Self::Success, true) => "✅",
            (Self::Success, false) => "[OK]",
            (Self::Keyboard, true) => "⌨️",
            (Self::Keyboard, false) => "[KEY]",
            (Self::Clipboard, true) => "📋",
            (Self::Clipboard, false) => "[CLIP]",
            (Self::Stop, true) => "🛑",
            (Self::Stop, false) => "[STOP]",
            (Self::Stats, true) => "📊",
            (Self::Stats, false) => "[STATS]",
            (Self::Plug, true) => "🔌",
            (Self::Plug, false) => "[CONN]",
            (Self::Crash, true) => "💥",
            (Self::Crash, false) => "[CRASH]",
            (Self::Restart, true) => "🔁",
            (Self::Restart, false) => "[RESTART]",
            (Self::Guard, true) => "🛡️",
            (Self::Guard, false) => "[GUARD]",
        }
    }
}

/// The emoji capability, resolved once and handed to each component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Icons {
    emoji: bool,
}

impl Icons {
    /// Create icons for the given capability.
    #[must_use]
    pub const fn new(emoji: bool) -> Self {
        Self { emoji }
    }

    /// ASCII-only icons.
    #[must_use]
    pub const fn ascii() -> Self {
        Self::new(false)
    }

    /// Whether emoji are rendered.
    #[must_use]
    pub const fn emoji(self) -> bool {
        self.emoji
    }

    /// Render a glyph.
    #[must_use]
    pub fn get(self, glyph: Glyph) -> &'static str {
        glyph.render(self.emoji)
    }
}
