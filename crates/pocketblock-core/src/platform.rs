//! Ports to the host platform's companion services.
//!
//! The core never talks to a timer facility, the notification center or the
//! background scheduler directly. It calls these traits, which the embedding
//! process implements. The implementations here cover the CLI and tests.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// What a timer is for. At most one timer per concern is ever outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerConcern {
    Reblock,
}

/// Proof of an armed timer. A fire carrying a handle that is no longer the
/// current one for its concern is stale and must be ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimerHandle {
    pub concern: TimerConcern,
    pub generation: u64,
}

pub trait Timers: Send {
    /// Arm a single-shot timer. Implementations replace any timer already
    /// armed for the same concern.
    fn arm(&mut self, concern: TimerConcern, at: DateTime<Utc>) -> Result<TimerHandle, GatewayError>;

    fn cancel(&mut self, handle: TimerHandle);
}

/// Notification identifiers; scheduling an id again replaces the pending one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// Shortly before the unblock ends.
    ReblockWarning,
    /// When apps are blocked again.
    Reblocked,
}

impl NotificationKind {
    pub fn identifier(self) -> &'static str {
        match self {
            NotificationKind::ReblockWarning => "reblock-warning",
            NotificationKind::Reblocked => "reblocked",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub deliver_at: DateTime<Utc>,
}

pub trait Notifier: Send {
    fn schedule(&mut self, request: NotificationRequest) -> Result<(), GatewayError>;

    fn cancel(&mut self, kind: NotificationKind);
}

pub trait BackgroundTasks: Send {
    /// Ask the OS to keep the process alive (or wake it) until `until`.
    fn request_execution_until(&mut self, until: DateTime<Utc>) -> Result<(), GatewayError>;

    fn cancel(&mut self);
}

/// Timers that record what was armed and never fire on their own.
///
/// The owner fires them by feeding the handle back into the core. Clones
/// share state.
#[derive(Debug, Clone, Default)]
pub struct ManualTimers {
    inner: Arc<Mutex<ManualTimersState>>,
}

#[derive(Debug, Default)]
struct ManualTimersState {
    next_generation: u64,
    armed: BTreeMap<TimerConcern, (TimerHandle, DateTime<Utc>)>,
    fail_next: Option<GatewayError>,
}

impl ManualTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// The currently armed timer for a concern.
    pub fn armed(&self, concern: TimerConcern) -> Option<(TimerHandle, DateTime<Utc>)> {
        self.lock().armed.get(&concern).copied()
    }

    /// Make the next `arm` call fail.
    pub fn fail_next(&self, err: GatewayError) {
        self.lock().fail_next = Some(err);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualTimersState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Timers for ManualTimers {
    fn arm(&mut self, concern: TimerConcern, at: DateTime<Utc>) -> Result<TimerHandle, GatewayError> {
        let mut state = self.lock();
        if let Some(err) = state.fail_next.take() {
            return Err(err);
        }
        state.next_generation += 1;
        let handle = TimerHandle {
            concern,
            generation: state.next_generation,
        };
        state.armed.insert(concern, (handle, at));
        Ok(handle)
    }

    fn cancel(&mut self, handle: TimerHandle) {
        let mut state = self.lock();
        if state.armed.get(&handle.concern).map(|(h, _)| *h) == Some(handle) {
            state.armed.remove(&handle.concern);
        }
    }
}

/// Notifier that only logs and remembers what is pending.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier {
    pending: Arc<Mutex<BTreeMap<NotificationKind, NotificationRequest>>>,
}

impl LogNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> Vec<NotificationRequest> {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }
}

impl Notifier for LogNotifier {
    fn schedule(&mut self, request: NotificationRequest) -> Result<(), GatewayError> {
        tracing::info!(
            id = request.kind.identifier(),
            at = %request.deliver_at,
            "notification scheduled: {}",
            request.title
        );
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(request.kind, request);
        Ok(())
    }

    fn cancel(&mut self, kind: NotificationKind) {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&kind);
    }
}

/// For hosts without a background scheduler; requests are logged and succeed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBackgroundTasks;

impl BackgroundTasks for NoBackgroundTasks {
    fn request_execution_until(&mut self, until: DateTime<Utc>) -> Result<(), GatewayError> {
        tracing::debug!(%until, "background execution not available on this host");
        Ok(())
    }

    fn cancel(&mut self) {}
}
