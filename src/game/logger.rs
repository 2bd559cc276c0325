//! Resolution logger
//!
//! Bump-allocating logger shared by the engine, action-set writer and
//! refresh rules. Entries carry a category (`halt`, `rerun`, `apply`, ...)
//! so tests can assert on what a resolution pass did without parsing text.

use bumpalo::Bump;
use serde::{Deserialize, Serialize};
use std::cell::{Ref, RefCell};
use std::ops::Deref;

/// Verbosity level for resolution output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum VerbosityLevel {
    /// Silent - no output
    Silent = 0,
    /// Minimal - only halts and results
    Minimal = 1,
    /// Normal - action sets, refreshes and repairs (default)
    #[default]
    Normal = 2,
    /// Verbose - every rerun, knockback extension and duplicate cleanup
    Verbose = 3,
}

/// Output format for log messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OutputFormat {
    /// Human-readable text output (default)
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Output destination for log messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OutputMode {
    /// Output only to stdout (default)
    #[default]
    Stdout,
    /// Capture only to in-memory buffer (no stdout)
    Memory,
    /// Both stdout and in-memory buffer
    Both,
}

/// Logging settings for callers that drive resolution programmatically
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResolveOptions {
    pub verbosity: VerbosityLevel,
    pub format: OutputFormat,
}

impl ResolveOptions {
    pub fn new(verbosity: VerbosityLevel, format: OutputFormat) -> Self {
        ResolveOptions { verbosity, format }
    }

    /// Stdout logger configured from these options
    pub fn logger(&self) -> ResolveLogger {
        let mut logger = ResolveLogger::with_verbosity(self.verbosity);
        logger.set_output_format(self.format);
        logger
    }
}

/// A captured log entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub level: VerbosityLevel,
    pub message: String,
    /// Event category (e.g. "halt", "apply", "knockback-extend")
    pub category: Option<String>,
}

/// Read-only view of captured entries
pub struct LogGuard<'a> {
    guard: Ref<'a, Vec<LogEntry>>,
}

impl<'a> LogGuard<'a> {
    pub fn iter(&self) -> std::slice::Iter<'_, LogEntry> {
        self.guard.iter()
    }

    pub fn len(&self) -> usize {
        self.guard.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guard.is_empty()
    }

    /// Entries with the given category
    pub fn in_category<'b>(&'b self, category: &'b str) -> impl Iterator<Item = &'b LogEntry> + 'b {
        self.guard
            .iter()
            .filter(move |entry| entry.category.as_deref() == Some(category))
    }
}

impl<'a> Deref for LogGuard<'a> {
    type Target = [LogEntry];

    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

/// Logger used during resolution
///
/// Interior mutability lets the engine log through a shared reference
/// while it owns the simulated state.
pub struct ResolveLogger {
    verbosity: VerbosityLevel,
    output_format: OutputFormat,
    output_mode: OutputMode,

    /// Scratch space for category-prefixed text lines; reset on clear
    format_bump: RefCell<Bump>,

    log_buffer: RefCell<Vec<LogEntry>>,
}

impl ResolveLogger {
    /// Create a new logger with default verbosity (Normal)
    pub fn new() -> Self {
        Self::with_verbosity(VerbosityLevel::default())
    }

    pub fn with_verbosity(verbosity: VerbosityLevel) -> Self {
        ResolveLogger {
            verbosity,
            output_format: OutputFormat::default(),
            output_mode: OutputMode::default(),
            format_bump: RefCell::new(Bump::new()),
            log_buffer: RefCell::new(Vec::new()),
        }
    }

    /// A logger that only captures, for tests and batch runs
    pub fn capturing(verbosity: VerbosityLevel) -> Self {
        let mut logger = Self::with_verbosity(verbosity);
        logger.enable_capture();
        logger
    }

    pub fn set_output_mode(&mut self, mode: OutputMode) {
        self.output_mode = mode;
    }

    pub fn output_mode(&self) -> OutputMode {
        self.output_mode
    }

    /// Capture to memory only (suppresses stdout)
    pub fn enable_capture(&mut self) {
        self.output_mode = OutputMode::Memory;
    }

    pub fn disable_capture(&mut self) {
        self.output_mode = OutputMode::Stdout;
    }

    pub fn is_capturing(&self) -> bool {
        matches!(self.output_mode, OutputMode::Memory | OutputMode::Both)
    }

    /// Print buffered entries allowed by the verbosity, then clear the buffer
    pub fn flush_buffer(&mut self) {
        let buffer = self.log_buffer.borrow();
        for entry in buffer.iter() {
            if entry.level <= self.verbosity {
                self.write_stdout(entry.level, entry.category.as_deref(), &entry.message);
            }
        }
        drop(buffer);
        self.clear_logs();
    }

    pub fn logs(&self) -> LogGuard<'_> {
        LogGuard {
            guard: self.log_buffer.borrow(),
        }
    }

    /// Clone of the captured entries
    pub fn get_logs(&self) -> Vec<LogEntry> {
        self.log_buffer.borrow().clone()
    }

    pub fn clear_logs(&mut self) {
        self.log_buffer.borrow_mut().clear();
        self.format_bump.borrow_mut().reset();
    }

    pub fn set_output_format(&mut self, format: OutputFormat) {
        self.output_format = format;
    }

    pub fn output_format(&self) -> OutputFormat {
        self.output_format
    }

    pub fn verbosity(&self) -> VerbosityLevel {
        self.verbosity
    }

    pub fn set_verbosity(&mut self, verbosity: VerbosityLevel) {
        self.verbosity = verbosity;
    }

    fn write_stdout(&self, level: VerbosityLevel, category: Option<&str>, message: &str) {
        match self.output_format {
            OutputFormat::Json => {
                let line = serde_json::json!({
                    "level": level,
                    "category": category,
                    "message": message,
                });
                println!("{}", line);
            }
            OutputFormat::Text => {
                let bump = self.format_bump.borrow();
                let indent = if level == VerbosityLevel::Minimal { "" } else { "  " };
                let line = match category {
                    Some(category) => bumpalo::format!(in &bump, "{}[{}] {}", indent, category, message),
                    None => bumpalo::format!(in &bump, "{}{}", indent, message),
                };
                println!("{}", line);
            }
        }
    }

    fn record(&self, level: VerbosityLevel, category: Option<&str>, message: &str) {
        if level == VerbosityLevel::Silent {
            return;
        }
        let should_capture = self.is_capturing();
        let should_output = matches!(self.output_mode, OutputMode::Stdout | OutputMode::Both);

        if level > self.verbosity && !should_capture {
            return;
        }

        if should_capture {
            self.log_buffer.borrow_mut().push(LogEntry {
                level,
                message: message.to_string(),
                category: category.map(str::to_string),
            });
        }

        if should_output && level <= self.verbosity {
            self.write_stdout(level, category, message);
        }
    }

    #[inline]
    pub fn minimal(&self, message: &str) {
        self.record(VerbosityLevel::Minimal, None, message);
    }

    #[inline]
    pub fn normal(&self, message: &str) {
        self.record(VerbosityLevel::Normal, None, message);
    }

    #[inline]
    pub fn verbose(&self, message: &str) {
        self.record(VerbosityLevel::Verbose, None, message);
    }

    /// Log a categorized resolution event
    #[inline]
    pub fn event(&self, level: VerbosityLevel, category: &str, message: &str) {
        self.record(level, Some(category), message);
    }
}

impl Default for ResolveLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ResolveLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolveLogger")
            .field("verbosity", &self.verbosity)
            .field("output_mode", &self.output_mode)
            .field("log_count", &self.log_buffer.borrow().len())
            .finish()
    }
}

impl Clone for ResolveLogger {
    fn clone(&self) -> Self {
        ResolveLogger {
            verbosity: self.verbosity,
            output_format: self.output_format,
            output_mode: self.output_mode,
            format_bump: RefCell::new(Bump::new()),
            log_buffer: RefCell::new(Vec::new()),
        }
    }
}

/// Log through an optional logger, skipping the `format!` when verbose logging is compiled out
#[macro_export]
macro_rules! resolve_log {
    ($logger:expr, $level:expr, $category:expr, $($arg:tt)*) => {
        #[cfg(feature = "verbose-logging")]
        {
            if let Some(logger) = $logger {
                logger.event($level, $category, &format!($($arg)*));
            }
        }
        #[cfg(not(feature = "verbose-logging"))]
        {
            let _ = &$logger;
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_options_build_logger() {
        let options: ResolveOptions = serde_json::from_str(r#"{"verbosity": "Verbose", "format": "Json"}"#).unwrap();
        let logger = options.logger();
        assert_eq!(logger.verbosity(), VerbosityLevel::Verbose);
        assert_eq!(logger.output_format(), OutputFormat::Json);
        assert_eq!(ResolveOptions::default().verbosity, VerbosityLevel::Normal);
    }

    #[test]
    fn test_default_logger_prints_without_capturing() {
        let logger = ResolveLogger::default();
        assert_eq!(logger.verbosity(), VerbosityLevel::Normal);
        assert_eq!(logger.output_mode(), OutputMode::Stdout);
        assert!(!logger.is_capturing());
    }

    #[test]
    fn test_halt_and_result_lines_are_captured_in_order() {
        let mut logger = ResolveLogger::with_verbosity(VerbosityLevel::Silent);
        logger.enable_capture();
        logger.event(VerbosityLevel::Minimal, "halt", "beat 2 is waiting on beta");
        logger.event(VerbosityLevel::Minimal, "result", "3 beats, last calculated Some(1), 0 pending");

        let categories: Vec<_> = logger.logs().iter().filter_map(|e| e.category.clone()).collect();
        assert_eq!(categories, vec!["halt".to_string(), "result".to_string()]);

        logger.disable_capture();
        logger.event(VerbosityLevel::Minimal, "halt", "beat 5");
        assert_eq!(logger.get_logs().len(), 2);
        logger.flush_buffer();
        assert!(logger.logs().is_empty());
    }

    #[test]
    fn test_capture_keeps_entries_above_verbosity() {
        let logger = ResolveLogger::capturing(VerbosityLevel::Minimal);
        logger.event(VerbosityLevel::Verbose, "rerun", "beat 3");
        logger.event(VerbosityLevel::Minimal, "halt", "beat 4");
        logger.verbose("detail");

        let logs = logger.logs();
        assert_eq!(logs.len(), 3);
        assert_eq!(logs.in_category("halt").count(), 1);
        assert_eq!(logs[0].category.as_deref(), Some("rerun"));
    }

    #[test]
    fn test_flush_buffer() {
        let mut logger = ResolveLogger::capturing(VerbosityLevel::Silent);
        logger.normal("message 1");
        logger.normal("message 2");
        assert_eq!(logger.logs().len(), 2);

        logger.flush_buffer();
        assert_eq!(logger.logs().len(), 0);
    }

    #[test]
    fn test_disable_capture() {
        let mut logger = ResolveLogger::new();
        logger.enable_capture();
        assert!(logger.is_capturing());

        logger.disable_capture();
        assert!(!logger.is_capturing());
        logger.normal("not captured");
        assert!(logger.logs().is_empty());
    }

    #[test]
    fn test_resolve_log_macro() {
        let logger = ResolveLogger::capturing(VerbosityLevel::Verbose);
        let maybe: Option<&ResolveLogger> = Some(&logger);
        crate::resolve_log!(maybe, VerbosityLevel::Normal, "apply", "user {} beats {}", "alpha", 3);
        #[cfg(feature = "verbose-logging")]
        assert_eq!(logger.logs()[0].message, "user alpha beats 3");
    }
}
