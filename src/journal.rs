//! Log events, sinks, and the per-run journal.
//!
//! Components never print. They report through a [`Journal`], which forwards
//! every event to an injected [`LogSink`] and builds the [`OperationResult`]
//! as steps complete. [`Journal::fail`] is the only way to emit an
//! Error-severity event, and it always records exactly one failed step.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::target::KindSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    pub timestamp: DateTime<Local>,
    pub severity: Severity,
    pub message: String,
}

impl LogEvent {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            severity,
            message: message.into(),
        }
    }
}

impl fmt::Display for LogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {} - {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S,%3f"),
            self.severity,
            self.message
        )
    }
}

/// Append-only consumer of log events.
pub trait LogSink {
    fn emit(&self, event: &LogEvent);
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<LogEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LogEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn with_severity(&self, severity: Severity) -> Vec<LogEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.severity == severity)
            .collect()
    }
}

impl LogSink for MemorySink {
    fn emit(&self, event: &LogEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }
    }
}

/// Appends one line per event to a log file.
#[derive(Debug)]
pub struct FileSink {
    file: Mutex<File>,
}

impl FileSink {
    pub fn open(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = fs::OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl LogSink for FileSink {
    fn emit(&self, event: &LogEvent) {
        let line = format!("{event}\n");
        let mut file = match self.file.lock() {
            Ok(file) => file,
            Err(poisoned) => poisoned.into_inner(),
        };
        // A log line that cannot be written is dropped; the run itself goes on.
        let _ = file.write_all(line.as_bytes());
    }
}

/// Forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn emit(&self, event: &LogEvent) {
        match event.severity {
            Severity::Info => tracing::info!("{}", event.message),
            Severity::Warning => tracing::warn!("{}", event.message),
            Severity::Error => tracing::error!("{}", event.message),
        }
    }
}

/// Sends each event to every inner sink, in order.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Box<dyn LogSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: impl LogSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }
}

impl LogSink for FanoutSink {
    fn emit(&self, event: &LogEvent) {
        for sink in &self.sinks {
            sink.emit(event);
        }
    }
}

/// Final outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationStatus {
    Success,
    PartialFailure,
    Failure,
    DryRunCompleted,
    /// The confirmation capability declined a phase
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub step: String,
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResult {
    pub status: OperationStatus,
    pub kinds: KindSet,
    /// Classification found nothing; leftovers may still have been cleaned
    pub nothing_found: bool,
    pub steps: Vec<StepOutcome>,
    pub removed: Vec<PathBuf>,
    pub backed_up: Vec<PathBuf>,
    pub restored: Vec<PathBuf>,
    /// Manifest written by the backup or read by the restore
    pub manifest: Option<PathBuf>,
}

impl OperationResult {
    pub fn failures(&self) -> impl Iterator<Item = &StepOutcome> {
        self.steps.iter().filter(|s| !s.success)
    }
}

/// Collects step outcomes and touched paths for one run.
pub struct Journal<'a> {
    sink: &'a dyn LogSink,
    dry_run: bool,
    steps: Vec<StepOutcome>,
    removed: Vec<PathBuf>,
    backed_up: Vec<PathBuf>,
    restored: Vec<PathBuf>,
}

impl<'a> Journal<'a> {
    pub fn new(sink: &'a dyn LogSink, dry_run: bool) -> Self {
        Self {
            sink,
            dry_run,
            steps: Vec::new(),
            removed: Vec::new(),
            backed_up: Vec::new(),
            restored: Vec::new(),
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn info(&self, message: impl Into<String>) {
        self.sink.emit(&LogEvent::new(Severity::Info, message));
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.sink.emit(&LogEvent::new(Severity::Warning, message));
    }

    /// Logs what a dry run would have done.
    pub fn plan(&self, message: impl fmt::Display) {
        self.info(format!("[DRY RUN] {message}"));
    }

    pub fn succeed(&mut self, step: impl Into<String>, message: impl Into<String>) {
        self.info(message);
        self.steps.push(StepOutcome {
            step: step.into(),
            success: true,
            error: None,
        });
    }

    pub fn fail(&mut self, step: impl Into<String>, error: impl fmt::Display) {
        let step = step.into();
        let error = error.to_string();
        self.sink
            .emit(&LogEvent::new(Severity::Error, format!("{step} failed: {error}")));
        self.steps.push(StepOutcome {
            step,
            success: false,
            error: Some(error),
        });
    }

    pub fn record_removed(&mut self, path: impl Into<PathBuf>) {
        self.removed.push(path.into());
    }

    pub fn record_backed_up(&mut self, path: impl Into<PathBuf>) {
        self.backed_up.push(path.into());
    }

    pub fn record_restored(&mut self, path: impl Into<PathBuf>) {
        self.restored.push(path.into());
    }

    pub fn backed_up(&self) -> &[PathBuf] {
        &self.backed_up
    }

    pub fn has_failures(&self) -> bool {
        self.steps.iter().any(|s| !s.success)
    }

    pub fn finish(self, kinds: KindSet, manifest: Option<PathBuf>, cancelled: bool) -> OperationResult {
        let failed = self.steps.iter().filter(|s| !s.success).count();
        let status = if self.dry_run {
            OperationStatus::DryRunCompleted
        } else if cancelled {
            OperationStatus::Cancelled
        } else if failed == 0 {
            OperationStatus::Success
        } else if failed == self.steps.len() {
            OperationStatus::Failure
        } else {
            OperationStatus::PartialFailure
        };

        OperationResult {
            status,
            nothing_found: kinds.is_unknown(),
            kinds,
            steps: self.steps,
            removed: self.removed,
            backed_up: self.backed_up,
            restored: self.restored,
            manifest,
        }
    }
}
