//! In-memory diagnostic log and the debug snapshot built from it.

use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::schedule::MinuteOfDay;
use crate::unblock::UnblockState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Info,
    Warning,
    Error,
    Success,
}

impl LogKind {
    fn label(self) -> &'static str {
        match self {
            LogKind::Info => "INFO",
            LogKind::Warning => "WARN",
            LogKind::Error => "ERROR",
            LogKind::Success => "OK",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub kind: LogKind,
    /// Component that wrote the entry.
    pub source: String,
    pub message: String,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {}: {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.kind.label(),
            self.source,
            self.message
        )
    }
}

/// Bounded ring of recent entries. Every entry is mirrored to `tracing`.
#[derive(Debug, Clone)]
pub struct DiagnosticLog {
    capacity: usize,
    entries: VecDeque<LogEntry>,
}

impl DiagnosticLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    pub fn record(
        &mut self,
        timestamp: DateTime<Utc>,
        kind: LogKind,
        source: &str,
        message: impl Into<String>,
    ) {
        let message = message.into();
        match kind {
            LogKind::Info | LogKind::Success => tracing::info!(source, "{message}"),
            LogKind::Warning => tracing::warn!(source, "{message}"),
            LogKind::Error => tracing::error!(source, "{message}"),
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(LogEntry {
            timestamp,
            kind,
            source: source.to_string(),
            message,
        });
    }

    /// Up to `n` most recent entries, oldest first.
    pub fn recent(&self, n: usize) -> Vec<LogEntry> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Point-in-time view of the blocker for debugging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticsReport {
    pub generated_at: DateTime<Utc>,
    pub utc_offset_minutes: i32,
    pub minute_of_day: MinuteOfDay,
    pub blocking_required: bool,
    /// Active schedules containing now, one "SID: ..." line each.
    pub matching_schedules: Vec<String>,
    pub schedule_count: usize,
    pub selection_size: usize,
    pub unblock: UnblockState,
    pub onboarding_completed: bool,
    pub last_gateway_error: Option<String>,
    pub recent: Vec<LogEntry>,
}

impl fmt::Display for DiagnosticsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Generated:   {}", self.generated_at.to_rfc3339())?;
        let sign = if self.utc_offset_minutes < 0 { '-' } else { '+' };
        let offset = self.utc_offset_minutes.unsigned_abs();
        writeln!(
            f,
            "Local time:  {} (UTC{sign}{:02}:{:02})",
            self.minute_of_day,
            offset / 60,
            offset % 60
        )?;
        writeln!(f, "Blocking:    {}", if self.blocking_required { "required" } else { "not required" })?;
        match &self.unblock {
            UnblockState::Enforcing => writeln!(f, "Unblock:     none")?,
            UnblockState::Overridden { until, .. } => {
                writeln!(f, "Unblock:     until {}", until.to_rfc3339())?
            }
        }
        writeln!(f, "Schedules:   {}", self.schedule_count)?;
        writeln!(f, "Apps:        {}", self.selection_size)?;
        writeln!(f, "Onboarded:   {}", self.onboarding_completed)?;
        if let Some(err) = &self.last_gateway_error {
            writeln!(f, "Last error:  {err}")?;
        }
        writeln!(f, "Active schedules:")?;
        if self.matching_schedules.is_empty() {
            writeln!(f, "  (none)")?;
        }
        for line in &self.matching_schedules {
            writeln!(f, "  {line}")?;
        }
        if !self.recent.is_empty() {
            writeln!(f, "Recent log:")?;
            for entry in &self.recent {
                writeln!(f, "  {entry}")?;
            }
        }
        Ok(())
    }
}
