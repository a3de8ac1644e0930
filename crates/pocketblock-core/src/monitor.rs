//! Interval-monitor callbacks.
//!
//! Runs in the monitor process, which shares nothing with the app but the
//! shared store. Nothing is cached between callbacks: each one reloads the
//! registry and selection, so a write made by the app is seen on the next
//! callback at the latest.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::error::GatewayError;
use crate::evaluator::matching_schedules;
use crate::gateway::EnforcementGateway;
use crate::registry::ScheduleRegistry;
use crate::schedule::{ScheduleId, TimeBasis};
use crate::selection::AppSelection;
use crate::storage::SharedStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorAction {
    Shielded { apps: usize },
    Cleared,
    /// Another active schedule still covers now; the shield stays.
    KeptForOverlap,
    /// Nothing to enforce.
    NoChange,
}

pub struct MonitorExtension {
    shared: Arc<dyn SharedStore>,
    gateway: Box<dyn EnforcementGateway>,
    clock: Arc<dyn Clock>,
    basis: TimeBasis,
}

impl MonitorExtension {
    pub fn new(
        shared: Arc<dyn SharedStore>,
        gateway: Box<dyn EnforcementGateway>,
        clock: Arc<dyn Clock>,
        basis: TimeBasis,
    ) -> Self {
        Self {
            shared,
            gateway,
            clock,
            basis,
        }
    }

    pub fn interval_did_start(&mut self, window_id: ScheduleId) -> Result<MonitorAction, GatewayError> {
        let registry = ScheduleRegistry::load(self.shared.clone());
        let selection = AppSelection::load(self.shared.as_ref());

        let shield = match registry.get(window_id) {
            Some(schedule) if schedule.is_active => true,
            Some(_) => {
                tracing::debug!(%window_id, "interval started for inactive schedule");
                self.any_blocking(&registry, None)
            }
            None => {
                tracing::info!(%window_id, "interval started for unknown schedule, re-evaluating");
                self.any_blocking(&registry, None)
            }
        };
        if !shield {
            return Ok(MonitorAction::NoChange);
        }

        self.gateway.apply_shield(selection.tokens()).inspect_err(|e| {
            tracing::error!(%window_id, error = %e, "failed to apply shield");
        })?;
        tracing::info!(%window_id, apps = selection.len(), "shield applied");
        Ok(MonitorAction::Shielded {
            apps: selection.len(),
        })
    }

    pub fn interval_did_end(&mut self, window_id: ScheduleId) -> Result<MonitorAction, GatewayError> {
        let registry = ScheduleRegistry::load(self.shared.clone());
        if self.any_blocking(&registry, Some(window_id)) {
            tracing::info!(%window_id, "interval ended but another schedule overlaps");
            return Ok(MonitorAction::KeptForOverlap);
        }

        self.gateway.clear_shield().inspect_err(|e| {
            tracing::error!(%window_id, error = %e, "failed to clear shield");
        })?;
        tracing::info!(%window_id, "shield cleared");
        Ok(MonitorAction::Cleared)
    }

    fn any_blocking(&self, registry: &ScheduleRegistry, except: Option<ScheduleId>) -> bool {
        let now = self.basis.minute_of_day(self.clock.now());
        matching_schedules(now, registry.schedules())
            .into_iter()
            .any(|id| Some(id) != except)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::gateway::InMemoryGateway;
    use crate::schedule::Schedule;
    use crate::selection::AppToken;
    use crate::storage::MemoryStore;
    use chrono::{TimeZone, Utc};

    struct Fixture {
        store: MemoryStore,
        gateway: InMemoryGateway,
        clock: ManualClock,
        monitor: MonitorExtension,
    }

    fn fixture(hour: u32, minute: u32) -> Fixture {
        let store = MemoryStore::new();
        let gateway = InMemoryGateway::new();
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 11, 13, hour, minute, 0).unwrap());
        let monitor = MonitorExtension::new(
            Arc::new(store.clone()),
            Box::new(gateway.clone()),
            Arc::new(clock.clone()),
            TimeBasis::utc(),
        );
        AppSelection::new([AppToken::new("social")]).save(&store).unwrap();
        Fixture {
            store,
            gateway,
            clock,
            monitor,
        }
    }

    fn add(store: &MemoryStore, name: &str, start: &str, end: &str) -> Schedule {
        let mut registry = ScheduleRegistry::load(Arc::new(store.clone()));
        let s = Schedule::new(name, start.parse().unwrap(), end.parse().unwrap());
        registry.add(s.clone()).unwrap();
        s
    }

    #[test]
    fn start_shields_fresh_selection() {
        let mut f = fixture(9, 0);
        let work = add(&f.store, "Work", "09:00", "17:00");
        assert_eq!(
            f.monitor.interval_did_start(work.id()).unwrap(),
            MonitorAction::Shielded { apps: 1 }
        );
        assert_eq!(f.gateway.shielded().len(), 1);

        // the app changes the selection; the next callback sees it
        AppSelection::new([AppToken::new("social"), AppToken::new("games")])
            .save(&f.store)
            .unwrap();
        f.monitor.interval_did_start(work.id()).unwrap();
        assert_eq!(f.gateway.shielded().len(), 2);
    }

    #[test]
    fn unknown_window_falls_back_to_evaluation() {
        let mut f = fixture(12, 0);
        add(&f.store, "Work", "09:00", "17:00");
        assert!(matches!(
            f.monitor.interval_did_start(ScheduleId::new()).unwrap(),
            MonitorAction::Shielded { .. }
        ));

        f.clock.set(Utc.with_ymd_and_hms(2024, 11, 13, 20, 0, 0).unwrap());
        assert_eq!(
            f.monitor.interval_did_start(ScheduleId::new()).unwrap(),
            MonitorAction::NoChange
        );
    }

    #[test]
    fn end_keeps_shield_while_another_schedule_overlaps() {
        let mut f = fixture(12, 0);
        let short = add(&f.store, "Lunch", "11:00", "12:00");
        add(&f.store, "Work", "09:00", "17:00");
        f.gateway.apply_shield(AppSelection::load(&f.store).tokens()).unwrap();

        assert_eq!(
            f.monitor.interval_did_end(short.id()).unwrap(),
            MonitorAction::KeptForOverlap
        );
        assert_eq!(f.gateway.shielded().len(), 1);
    }

    #[test]
    fn end_clears_when_nothing_else_matches() {
        let mut f = fixture(17, 0);
        let work = add(&f.store, "Work", "09:00", "17:00");
        f.gateway.apply_shield(AppSelection::load(&f.store).tokens()).unwrap();
        assert_eq!(f.monitor.interval_did_end(work.id()).unwrap(), MonitorAction::Cleared);
        assert!(f.gateway.shielded().is_empty());
    }

    #[test]
    fn gateway_failure_is_returned() {
        let mut f = fixture(9, 0);
        let work = add(&f.store, "Work", "09:00", "17:00");
        f.gateway
            .fail_next(GatewayError::AuthorizationDenied("revoked".into()));
        assert!(f.monitor.interval_did_start(work.id()).is_err());
    }
}
