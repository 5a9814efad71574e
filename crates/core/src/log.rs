//! Logger capability: structured key/value messages.

use std::fmt;
use std::sync::Mutex;

use smallvec::SmallVec;

/// Ordered key/value list attached to a log line.
pub type LogParams = SmallVec<[(&'static str, String); 6]>;

/// Structured log sink supplied by the caller.
pub trait Logger: Send + Sync {
    fn info(&self, msg: &str, params: &[(&'static str, String)]);
    fn error(&self, err: &(dyn std::error::Error + 'static), msg: &str, params: &[(&'static str, String)]);
}

/// Renders params as `key=value` pairs; values containing spaces are quoted.
pub struct Fields<'a>(pub &'a [(&'static str, String)]);

impl fmt::Display for Fields<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            if v.is_empty() || v.contains(char::is_whitespace) {
                write!(f, "{}={:?}", k, v)?;
            } else {
                write!(f, "{}={}", k, v)?;
            }
        }
        Ok(())
    }
}

/// Logger backed by `tracing` events.
#[derive(Debug, Clone)]
pub struct TracingLogger {
    name: String,
}

impl TracingLogger {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for TracingLogger {
    fn default() -> Self {
        Self::new("recon")
    }
}

impl Logger for TracingLogger {
    fn info(&self, msg: &str, params: &[(&'static str, String)]) {
        tracing::info!(logger = %self.name, params = %Fields(params), "{}", msg);
    }

    fn error(&self, err: &(dyn std::error::Error + 'static), msg: &str, params: &[(&'static str, String)]) {
        tracing::error!(logger = %self.name, error = %err, params = %Fields(params), "{}", msg);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub level: Level,
    pub msg: String,
    pub params: Vec<(&'static str, String)>,
    pub error: Option<String>,
}

impl LogRecord {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.iter().find(|(k, _)| *k == key).map(|(_, v)| v.as_str())
    }
}

/// Logger that keeps every record in memory; meant for tests and dry runs.
#[derive(Debug, Default)]
pub struct CapturingLogger {
    records: Mutex<Vec<LogRecord>>,
}

impl CapturingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.lock().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.lock().iter().map(|r| r.msg.clone()).collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<LogRecord>> {
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn push(&self, level: Level, err: Option<String>, msg: &str, params: &[(&'static str, String)]) {
        self.lock().push(LogRecord { level, msg: msg.to_string(), params: params.to_vec(), error: err });
    }
}

impl Logger for CapturingLogger {
    fn info(&self, msg: &str, params: &[(&'static str, String)]) {
        self.push(Level::Info, None, msg, params);
    }

    fn error(&self, err: &(dyn std::error::Error + 'static), msg: &str, params: &[(&'static str, String)]) {
        self.push(Level::Error, Some(err.to_string()), msg, params);
    }
}
