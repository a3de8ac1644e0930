//! The main-process orchestrator.
//!
//! `Blocker` owns every piece of app-side state and is constructed explicitly
//! from a [`Config`] and a set of [`Ports`]. It is not thread-safe on its
//! own; [`crate::BlockerService`] serializes access when callbacks arrive
//! from several sources.
//!
//! Enforcement rule: while an unblock is running the shield is clear;
//! otherwise it is applied iff some active schedule contains now.
//! Gateway failures never escape enforcement. They are logged, kept for
//! diagnostics and emitted as [`Event::GatewayFailed`].

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::clock::Clock;
use crate::diagnostics::{DiagnosticLog, DiagnosticsReport, LogKind};
use crate::error::{GatewayError, Result};
use crate::evaluator::{self, Enforcement};
use crate::events::{Event, EventBus, SubscriptionId, UnblockSource};
use crate::gateway::{EnforcementGateway, MonitorSpec};
use crate::platform::{BackgroundTasks, Notifier, TimerHandle, Timers};
use crate::registry::ScheduleRegistry;
use crate::schedule::{Schedule, ScheduleId, TimeBasis};
use crate::selection::{AppSelection, AppToken};
use crate::steps::{StepGoalTracker, StepProgress};
use crate::storage::{keys, Config, SharedStore};
use crate::unblock::{
    Recovery, UnblockEnded, UnblockPorts, UnblockSequencer, UnblockSettings, UnblockStarted,
    UnblockState,
};

const RECENT_LOG_LINES: usize = 20;

/// Everything the blocker talks to outside its own memory.
pub struct Ports {
    /// Store shared with the monitor process.
    pub shared: Arc<dyn SharedStore>,
    /// Store private to this process.
    pub local: Arc<dyn SharedStore>,
    pub gateway: Box<dyn EnforcementGateway>,
    pub timers: Box<dyn Timers>,
    pub notifier: Box<dyn Notifier>,
    pub background: Box<dyn BackgroundTasks>,
    pub clock: Arc<dyn Clock>,
}

/// Result of a [`Blocker::refresh`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshSummary {
    pub monitors_installed: usize,
    pub monitors_removed: usize,
    pub enforcement: Enforcement,
}

pub struct Blocker {
    config: Config,
    shared: Arc<dyn SharedStore>,
    local: Arc<dyn SharedStore>,
    registry: ScheduleRegistry,
    selection: AppSelection,
    gateway: Box<dyn EnforcementGateway>,
    unblock: UnblockSequencer,
    steps: StepGoalTracker,
    clock: Arc<dyn Clock>,
    basis: TimeBasis,
    events: EventBus,
    log: DiagnosticLog,
    last_gateway_error: Option<String>,
}

impl Blocker {
    pub fn new(config: Config, ports: Ports) -> Self {
        let basis = TimeBasis::from_offset_minutes(config.utc_offset_minutes);
        let settings = UnblockSettings {
            policy: config.override_policy,
            warning_lead: Duration::seconds(i64::from(config.warning_lead_secs)),
            notifications_enabled: config.notifications_enabled,
        };
        let unblock = UnblockSequencer::new(
            ports.local.clone(),
            UnblockPorts {
                timers: ports.timers,
                notifier: ports.notifier,
                background: ports.background,
            },
            settings,
        );
        Self {
            registry: ScheduleRegistry::load(ports.shared.clone()),
            selection: AppSelection::load(ports.shared.as_ref()),
            steps: StepGoalTracker::new(config.step_goal),
            log: DiagnosticLog::new(config.diagnostics_capacity),
            shared: ports.shared,
            local: ports.local,
            gateway: ports.gateway,
            clock: ports.clock,
            unblock,
            basis,
            config,
            events: EventBus::new(),
            last_gateway_error: None,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn basis(&self) -> TimeBasis {
        self.basis
    }

    pub fn schedules(&self) -> &[Schedule] {
        self.registry.schedules()
    }

    pub fn selection(&self) -> &AppSelection {
        &self.selection
    }

    pub fn unblock_state(&self) -> &UnblockState {
        self.unblock.state()
    }

    pub fn unblock_remaining(&self) -> Option<Duration> {
        self.unblock.remaining(self.now())
    }

    pub fn step_tracker(&self) -> &StepGoalTracker {
        &self.steps
    }

    /// Does any active schedule contain `at`? Ignores a running unblock.
    pub fn blocking_required_at(&self, at: DateTime<Utc>) -> bool {
        evaluator::is_blocking_required(self.basis.minute_of_day(at), self.registry.schedules())
    }

    /// Active schedules containing `at`.
    pub fn matching_schedules_at(&self, at: DateTime<Utc>) -> Vec<&Schedule> {
        let ids = evaluator::matching_schedules(self.basis.minute_of_day(at), self.registry.schedules());
        ids.into_iter().filter_map(|id| self.registry.get(id)).collect()
    }

    /// The enforcement decision for now, taking a running unblock into account.
    pub fn evaluate(&self) -> Enforcement {
        if self.unblock.is_overridden() {
            return Enforcement::Clear;
        }
        let now = self.now();
        let required = self.blocking_required_at(now);
        tracing::debug!(minute = %self.basis.minute_of_day(now), required, "evaluated");
        Enforcement::from_required(required)
    }

    // ── Schedules ────────────────────────────────────────────────────

    pub fn add_schedule(&mut self, schedule: Schedule) -> Result<ScheduleId> {
        let id = schedule.id();
        if schedule.is_zero_width() {
            self.record(
                LogKind::Warning,
                "schedule",
                format!("{schedule} has equal start and end and never blocks"),
            );
        }
        self.registry.add(schedule.clone())?;
        self.emit(Event::ScheduleAdded {
            id,
            name: schedule.name.clone(),
            at: self.now(),
        });
        if schedule.is_active {
            self.install_monitor(&schedule);
        }
        self.apply_enforcement();
        Ok(id)
    }

    pub fn remove_schedule(&mut self, id: ScheduleId) -> Result<Schedule> {
        let removed = self.registry.remove(id)?;
        self.emit(Event::ScheduleRemoved { id, at: self.now() });
        self.remove_monitor(id);
        self.apply_enforcement();
        Ok(removed)
    }

    pub fn reorder_schedules(&mut self, from: usize, to: usize) -> Result<()> {
        self.registry.reorder(from, to)?;
        self.emit(Event::SchedulesReordered {
            from,
            to,
            at: self.now(),
        });
        self.apply_enforcement();
        Ok(())
    }

    pub fn set_schedule_active(&mut self, id: ScheduleId, active: bool) -> Result<Schedule> {
        let schedule = self.registry.set_active(id, active)?;
        self.emit(Event::ScheduleActiveChanged {
            id,
            active,
            at: self.now(),
        });
        if active {
            self.install_monitor(&schedule);
        } else {
            self.remove_monitor(id);
        }
        self.apply_enforcement();
        Ok(schedule)
    }

    pub fn rename_schedule(&mut self, id: ScheduleId, name: &str) -> Result<Schedule> {
        let schedule = self.registry.rename(id, name)?;
        self.emit(Event::ScheduleRenamed {
            id,
            name: schedule.name.clone(),
            at: self.now(),
        });
        Ok(schedule)
    }

    // ── Selection ────────────────────────────────────────────────────

    /// Replace the global app selection.
    pub fn select_apps(&mut self, tokens: impl IntoIterator<Item = AppToken>) -> Result<()> {
        let selection = AppSelection::new(tokens);
        selection.save(self.shared.as_ref())?;
        self.selection = selection;
        self.emit(Event::SelectionChanged {
            count: self.selection.len(),
            at: self.now(),
        });
        self.apply_enforcement();
        Ok(())
    }

    pub fn clear_selection(&mut self) -> Result<()> {
        self.select_apps(std::iter::empty())
    }

    // ── Enforcement ──────────────────────────────────────────────────

    /// Push the current decision to the gateway. Never fails; a gateway
    /// error is reported and the previous platform state stays.
    pub fn apply_enforcement(&mut self) -> Enforcement {
        let decision = self.evaluate();
        self.push_enforcement(decision);
        decision
    }

    fn push_enforcement(&mut self, decision: Enforcement) {
        let apps = self.selection.tokens().clone();
        match evaluator::enforce(&mut *self.gateway, decision, &apps) {
            Ok(()) => {
                let at = self.now();
                match decision {
                    Enforcement::Shield => self.emit(Event::ShieldApplied {
                        apps: apps.len(),
                        at,
                    }),
                    Enforcement::Clear => self.emit(Event::ShieldCleared { at }),
                }
            }
            Err(e) => {
                let operation = match decision {
                    Enforcement::Shield => "apply_shield",
                    Enforcement::Clear => "clear_shield",
                };
                self.report_gateway_failure(operation, e);
            }
        }
    }

    // ── Temporary unblock ────────────────────────────────────────────

    pub fn request_unblock(&mut self, duration: Duration, source: UnblockSource) -> Result<UnblockStarted> {
        let now = self.now();
        let until = self.unblock.admit(now, duration)?;
        let restore: Vec<ScheduleId> = self.matching_schedules_at(now).iter().map(|s| s.id()).collect();

        self.push_enforcement(Enforcement::Clear);
        let started = match self.unblock.begin(now, until, restore) {
            Ok(started) => started,
            Err(e) => {
                self.record(LogKind::Error, "unblock", format!("could not start unblock: {e}"));
                self.apply_enforcement();
                return Err(e);
            }
        };

        if !started.timer_armed {
            self.record(
                LogKind::Warning,
                "unblock",
                "reblock timer unavailable; apps block again on next foreground",
            );
        }
        self.record(
            LogKind::Success,
            "unblock",
            format!("apps unblocked until {}", self.basis_time(until)),
        );
        self.emit(Event::UnblockStarted {
            until,
            source,
            replaced: started.replaced,
            at: now,
        });
        Ok(started)
    }

    /// End the running unblock now.
    pub fn end_unblock(&mut self) -> Result<UnblockEnded> {
        let ended = self.unblock.end_early()?;
        self.after_unblock(&ended);
        Ok(ended)
    }

    /// The reblock timer fired. Stale handles are ignored.
    pub fn on_reblock_due(&mut self, handle: TimerHandle) -> Option<UnblockEnded> {
        let ended = self.unblock.on_timer(handle)?;
        self.after_unblock(&ended);
        Some(ended)
    }

    fn after_unblock(&mut self, ended: &UnblockEnded) {
        self.steps.start_session();
        self.emit(Event::UnblockEnded {
            reason: ended.reason,
            at: self.now(),
        });
        // the monitor process may have changed schedules meanwhile
        self.reload();
        let decision = self.apply_enforcement();
        let message = match decision {
            Enforcement::Shield => "unblock ended, apps blocked again",
            Enforcement::Clear => "unblock ended, no schedule active",
        };
        self.record(LogKind::Success, "unblock", message);
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Run on launch and whenever the app comes to the foreground.
    pub fn on_foreground(&mut self) -> Recovery {
        self.reload();
        let recovery = self.unblock.recover(self.now());
        match &recovery {
            Recovery::Expired(ended) => {
                self.record(LogKind::Info, "unblock", "unblock deadline passed while away");
                let ended = ended.clone();
                self.after_unblock(&ended);
            }
            Recovery::Resumed { until } => {
                let until = *until;
                self.record(
                    LogKind::Info,
                    "unblock",
                    format!("resumed unblock until {}", self.basis_time(until)),
                );
                self.apply_enforcement();
            }
            Recovery::Idle | Recovery::StillActive { .. } => {
                self.apply_enforcement();
            }
        }
        recovery
    }

    /// The app is moving to the background.
    pub fn on_background(&mut self) {
        if self.unblock.is_overridden() {
            self.unblock.request_background_time();
            tracing::debug!("requested background time for running unblock");
        }
    }

    // ── Steps ────────────────────────────────────────────────────────

    pub fn start_walk(&mut self) {
        self.steps.start_session();
        self.emit(Event::StepProgress {
            steps: 0,
            goal: self.steps.goal(),
            at: self.now(),
        });
    }

    /// Feed a cumulative step count. Reaching the goal starts a step unblock
    /// unless one is already running.
    pub fn on_step_count(&mut self, steps: u32) -> Result<(StepProgress, Option<UnblockStarted>)> {
        let progress = self.steps.observe(steps);
        let at = self.now();
        self.emit(Event::StepProgress {
            steps: progress.steps,
            goal: progress.goal,
            at,
        });
        if !progress.goal_reached {
            return Ok((progress, None));
        }

        self.emit(Event::StepGoalReached {
            steps: progress.steps,
            at,
        });
        if self.unblock.is_overridden() {
            self.record(LogKind::Info, "steps", "step goal reached while already unblocked");
            return Ok((progress, None));
        }
        let minutes = i64::from(self.config.step_unblock_minutes);
        let started = self.request_unblock(Duration::minutes(minutes), UnblockSource::StepGoal)?;
        Ok((progress, Some(started)))
    }

    // ── Debug actions ────────────────────────────────────────────────

    /// Drop the shield without starting an unblock. The next evaluation
    /// puts it back if a schedule is active.
    pub fn unblock_all(&mut self) -> Result<(), GatewayError> {
        if let Err(e) = self.gateway.clear_shield() {
            self.report_gateway_failure("clear_shield", e.clone());
            return Err(e);
        }
        self.emit(Event::ShieldCleared { at: self.now() });
        self.record(LogKind::Warning, "debug", "all apps unblocked until next evaluation");
        Ok(())
    }

    /// Reload shared state, reinstall every monitor and re-apply enforcement.
    pub fn refresh(&mut self) -> RefreshSummary {
        self.reload();
        let mut summary = RefreshSummary {
            monitors_installed: 0,
            monitors_removed: 0,
            enforcement: Enforcement::Clear,
        };
        let schedules = self.registry.schedules().to_vec();
        for schedule in &schedules {
            if schedule.is_active {
                if self.install_monitor(schedule) {
                    summary.monitors_installed += 1;
                }
            } else if self.remove_monitor(schedule.id()) {
                summary.monitors_removed += 1;
            }
        }
        summary.enforcement = self.apply_enforcement();
        self.record(
            LogKind::Info,
            "debug",
            format!(
                "refreshed: {} monitors installed, {} removed",
                summary.monitors_installed, summary.monitors_removed
            ),
        );
        summary
    }

    pub fn diagnostics(&self) -> DiagnosticsReport {
        let now = self.now();
        DiagnosticsReport {
            generated_at: now,
            utc_offset_minutes: self.basis.offset().local_minus_utc() / 60,
            minute_of_day: self.basis.minute_of_day(now),
            blocking_required: self.blocking_required_at(now),
            matching_schedules: self
                .matching_schedules_at(now)
                .iter()
                .map(|s| s.to_string())
                .collect(),
            schedule_count: self.registry.len(),
            selection_size: self.selection.len(),
            unblock: self.unblock.state().clone(),
            onboarding_completed: self.onboarding_completed(),
            last_gateway_error: self.last_gateway_error.clone(),
            recent: self.log.recent(RECENT_LOG_LINES),
        }
    }

    /// Append to the diagnostic log (mirrored to tracing).
    pub fn record(&mut self, kind: LogKind, source: &str, message: impl Into<String>) {
        let now = self.now();
        self.log.record(now, kind, source, message);
    }

    // ── Onboarding ───────────────────────────────────────────────────

    pub fn onboarding_completed(&self) -> bool {
        match self.local.get(keys::ONBOARDING_COMPLETED) {
            Ok(value) => value.as_deref() == Some("true"),
            Err(e) => {
                tracing::warn!(error = %e, "cannot read onboarding flag");
                false
            }
        }
    }

    pub fn set_onboarding_completed(&mut self, completed: bool) -> Result<()> {
        if completed {
            self.local.set(keys::ONBOARDING_COMPLETED, "true")?;
        } else {
            self.local.remove(keys::ONBOARDING_COMPLETED)?;
        }
        self.emit(Event::OnboardingChanged {
            completed,
            at: self.now(),
        });
        Ok(())
    }

    // ── Events ───────────────────────────────────────────────────────

    pub fn subscribe(&mut self, listener: impl Fn(&Event) + Send + 'static) -> SubscriptionId {
        self.events.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    // ── Internal ─────────────────────────────────────────────────────

    /// Re-read registry and selection from the shared store.
    pub fn reload(&mut self) {
        self.registry.reload();
        self.selection = AppSelection::load(self.shared.as_ref());
    }

    fn emit(&self, event: Event) {
        self.events.emit(&event);
    }

    fn install_monitor(&mut self, schedule: &Schedule) -> bool {
        match self.gateway.install_monitor(&MonitorSpec::daily(schedule)) {
            Ok(()) => true,
            Err(e) => {
                self.report_gateway_failure("install_monitor", e);
                false
            }
        }
    }

    fn remove_monitor(&mut self, id: ScheduleId) -> bool {
        match self.gateway.remove_monitor(id) {
            Ok(()) => true,
            Err(e) => {
                self.report_gateway_failure("remove_monitor", e);
                false
            }
        }
    }

    fn report_gateway_failure(&mut self, operation: &str, err: GatewayError) {
        let message = err.to_string();
        self.record(LogKind::Error, "gateway", format!("{operation} failed: {message}"));
        self.last_gateway_error = Some(format!("{operation}: {message}"));
        self.emit(Event::GatewayFailed {
            operation: operation.to_string(),
            message,
            at: self.now(),
        });
    }

    fn basis_time(&self, at: DateTime<Utc>) -> String {
        at.with_timezone(&self.basis.offset()).format("%H:%M:%S").to_string()
    }
}
