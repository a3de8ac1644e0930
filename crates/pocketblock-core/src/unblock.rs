//! Temporary-unblock sequencer.
//!
//! ## State Transitions
//!
//! ```text
//!            begin()                      reblock timer / recover() past deadline
//! Enforcing ─────────► Overridden{until} ─────────────────────────────────────────► Enforcing
//!                          │    ▲
//!                          └────┘ begin() again: replaced or rejected, never stacked
//! ```
//!
//! Beginning an unblock persists `until` under `reblockDate` in local storage,
//! arms the single reblock timer, schedules the warning and "reblocked"
//! notifications and asks for background execution. Background timers are
//! not guaranteed to fire, so [`UnblockSequencer::recover`] must run on every
//! foreground and wake-up; it ends a session whose persisted deadline has
//! passed even if this process never saw the timer.
//!
//! The sequencer does not touch the shield. The caller clears it before
//! `begin` and re-evaluates the live registry after the session ends.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, UnblockError};
use crate::platform::{
    BackgroundTasks, NotificationKind, NotificationRequest, Notifier, TimerConcern, TimerHandle,
    Timers,
};
use crate::schedule::ScheduleId;
use crate::storage::{keys, OverridePolicy, SharedStore};

/// Longest session `admit` accepts. Also keeps `until` well inside the range
/// the persisted RFC 3339 deadline can round-trip.
pub const MAX_UNBLOCK_SECS: i64 = 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum UnblockState {
    Enforcing,
    Overridden {
        until: DateTime<Utc>,
        /// Schedules that were active when the session began.
        restore: Vec<ScheduleId>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// The reblock timer fired.
    TimerFired,
    /// A foreground or wake-up found the deadline already passed.
    Recovered,
    /// Ended early on request.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnblockStarted {
    pub until: DateTime<Utc>,
    pub restore: Vec<ScheduleId>,
    /// False when the platform refused the timer; recovery is then the only
    /// way the session ends.
    pub timer_armed: bool,
    /// A running session was replaced.
    pub replaced: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnblockEnded {
    pub until: DateTime<Utc>,
    pub restore: Vec<ScheduleId>,
    pub reason: EndReason,
}

/// Outcome of a recovery check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recovery {
    /// No session, nothing persisted.
    Idle,
    /// The in-memory session is still running.
    StillActive { until: DateTime<Utc> },
    /// A persisted session from an earlier launch is still running and was
    /// picked up again.
    Resumed { until: DateTime<Utc> },
    /// The deadline had passed; the session is over.
    Expired(UnblockEnded),
}

/// Companion-service ports the sequencer drives.
pub struct UnblockPorts {
    pub timers: Box<dyn Timers>,
    pub notifier: Box<dyn Notifier>,
    pub background: Box<dyn BackgroundTasks>,
}

#[derive(Debug, Clone, Copy)]
pub struct UnblockSettings {
    pub policy: OverridePolicy,
    pub warning_lead: Duration,
    pub notifications_enabled: bool,
}

impl Default for UnblockSettings {
    fn default() -> Self {
        Self {
            policy: OverridePolicy::Replace,
            warning_lead: Duration::seconds(60),
            notifications_enabled: true,
        }
    }
}

pub struct UnblockSequencer {
    state: UnblockState,
    reblock_timer: Option<TimerHandle>,
    local: Arc<dyn SharedStore>,
    ports: UnblockPorts,
    settings: UnblockSettings,
}

impl UnblockSequencer {
    pub fn new(local: Arc<dyn SharedStore>, ports: UnblockPorts, settings: UnblockSettings) -> Self {
        Self {
            state: UnblockState::Enforcing,
            reblock_timer: None,
            local,
            ports,
            settings,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> &UnblockState {
        &self.state
    }

    pub fn is_overridden(&self) -> bool {
        matches!(self.state, UnblockState::Overridden { .. })
    }

    pub fn until(&self) -> Option<DateTime<Utc>> {
        match &self.state {
            UnblockState::Overridden { until, .. } => Some(*until),
            UnblockState::Enforcing => None,
        }
    }

    pub fn remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.until().map(|until| (until - now).max(Duration::zero()))
    }

    /// The deadline as persisted, independent of this process's memory.
    pub fn persisted_deadline(&self) -> Option<DateTime<Utc>> {
        let raw = match self.local.get(keys::REBLOCK_DATE) {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!(error = %e, "cannot read reblock deadline");
                return None;
            }
        };
        match DateTime::parse_from_rfc3339(&raw) {
            Ok(at) => Some(at.with_timezone(&Utc)),
            Err(e) => {
                tracing::warn!(value = %raw, error = %e, "ignoring malformed reblock deadline");
                None
            }
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Check whether a session of `duration` may start now and compute its end.
    pub fn admit(&self, now: DateTime<Utc>, duration: Duration) -> Result<DateTime<Utc>> {
        if duration <= Duration::zero() || duration > Duration::seconds(MAX_UNBLOCK_SECS) {
            return Err(UnblockError::InvalidDuration {
                secs: duration.num_seconds(),
                max_secs: MAX_UNBLOCK_SECS,
            }
            .into());
        }
        if let (Some(until), OverridePolicy::Reject) = (self.until(), self.settings.policy) {
            return Err(UnblockError::AlreadyActive { until }.into());
        }
        Ok(now + duration)
    }

    /// Enter (or replace) the overridden state.
    ///
    /// Only a failure to persist the deadline is an error; in that case
    /// nothing has changed. Timer, notification and background failures are
    /// logged and the session still starts.
    pub fn begin(
        &mut self,
        now: DateTime<Utc>,
        until: DateTime<Utc>,
        restore: Vec<ScheduleId>,
    ) -> Result<UnblockStarted> {
        self.local.set(keys::REBLOCK_DATE, &until.to_rfc3339())?;

        let replaced = self.is_overridden();
        let timer_armed = self.arm_reblock_timer(until);
        if self.settings.notifications_enabled {
            self.schedule_notifications(now, until);
        }
        if let Err(e) = self.ports.background.request_execution_until(until) {
            tracing::warn!(error = %e, "background execution request refused");
        }

        self.state = UnblockState::Overridden {
            until,
            restore: restore.clone(),
        };
        tracing::info!(%until, replaced, timer_armed, "unblock started");
        Ok(UnblockStarted {
            until,
            restore,
            timer_armed,
            replaced,
        })
    }

    /// Handle a timer fire. Stale handles (replaced or cancelled timers)
    /// return `None`.
    pub fn on_timer(&mut self, handle: TimerHandle) -> Option<UnblockEnded> {
        if self.reblock_timer != Some(handle) {
            tracing::debug!(?handle, "ignoring stale timer");
            return None;
        }
        self.reblock_timer = None;
        self.finish(EndReason::TimerFired)
    }

    /// Reconcile with the persisted deadline. Run on every foreground and
    /// background wake-up.
    pub fn recover(&mut self, now: DateTime<Utc>) -> Recovery {
        if let Some(until) = self.until() {
            if until <= now {
                return self
                    .finish(EndReason::Recovered)
                    .map(Recovery::Expired)
                    .unwrap_or(Recovery::Idle);
            }
            if self.reblock_timer.is_none() {
                self.arm_reblock_timer(until);
            }
            return Recovery::StillActive { until };
        }

        let Some(until) = self.persisted_deadline() else {
            if let Ok(Some(_)) = self.local.get(keys::REBLOCK_DATE) {
                self.forget_deadline();
            }
            return Recovery::Idle;
        };

        if until <= now {
            tracing::info!(%until, "unblock deadline passed while not running");
            self.forget_deadline();
            return Recovery::Expired(UnblockEnded {
                until,
                restore: Vec::new(),
                reason: EndReason::Recovered,
            });
        }

        tracing::info!(%until, "resuming unblock from an earlier launch");
        self.arm_reblock_timer(until);
        self.state = UnblockState::Overridden {
            until,
            restore: Vec::new(),
        };
        Recovery::Resumed { until }
    }

    /// End the running session before its deadline.
    pub fn end_early(&mut self) -> Result<UnblockEnded> {
        if !self.is_overridden() {
            return Err(UnblockError::NotActive.into());
        }
        self.cancel_notifications();
        self.finish(EndReason::Cancelled)
            .ok_or_else(|| UnblockError::NotActive.into())
    }

    /// Ask for background time for the remainder of the session, e.g. when
    /// the app moves to the background.
    pub fn request_background_time(&mut self) {
        if let Some(until) = self.until() {
            if let Err(e) = self.ports.background.request_execution_until(until) {
                tracing::warn!(error = %e, "background execution request refused");
            }
        }
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn finish(&mut self, reason: EndReason) -> Option<UnblockEnded> {
        let UnblockState::Overridden { until, restore } =
            std::mem::replace(&mut self.state, UnblockState::Enforcing)
        else {
            return None;
        };
        if let Some(handle) = self.reblock_timer.take() {
            self.ports.timers.cancel(handle);
        }
        self.forget_deadline();
        self.ports.background.cancel();
        tracing::info!(%until, ?reason, "unblock ended");
        Some(UnblockEnded {
            until,
            restore,
            reason,
        })
    }

    fn arm_reblock_timer(&mut self, until: DateTime<Utc>) -> bool {
        if let Some(previous) = self.reblock_timer.take() {
            self.ports.timers.cancel(previous);
        }
        match self.ports.timers.arm(TimerConcern::Reblock, until) {
            Ok(handle) => {
                self.reblock_timer = Some(handle);
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, %until, "reblock timer not armed, relying on recovery");
                false
            }
        }
    }

    fn schedule_notifications(&mut self, now: DateTime<Utc>, until: DateTime<Utc>) {
        self.cancel_notifications();
        let warn_at = until - self.settings.warning_lead;
        let mut requests = Vec::with_capacity(2);
        if warn_at > now {
            requests.push(NotificationRequest {
                kind: NotificationKind::ReblockWarning,
                title: "Apps block again soon".into(),
                body: format!(
                    "Your unblock ends in {} seconds.",
                    self.settings.warning_lead.num_seconds()
                ),
                deliver_at: warn_at,
            });
        }
        requests.push(NotificationRequest {
            kind: NotificationKind::Reblocked,
            title: "Apps blocked again".into(),
            body: "Your temporary unblock has ended.".into(),
            deliver_at: until,
        });
        for request in requests {
            if let Err(e) = self.ports.notifier.schedule(request) {
                tracing::warn!(error = %e, "notification not scheduled");
            }
        }
    }

    fn cancel_notifications(&mut self) {
        self.ports.notifier.cancel(NotificationKind::ReblockWarning);
        self.ports.notifier.cancel(NotificationKind::Reblocked);
    }

    fn forget_deadline(&self) {
        if let Err(e) = self.local.remove(keys::REBLOCK_DATE) {
            // A stale past deadline is harmless: the next recovery ends it again.
            tracing::warn!(error = %e, "cannot clear reblock deadline");
        }
    }
}
