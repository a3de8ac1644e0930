//! Enforcement gateway: the only boundary to the platform's shield store and
//! interval monitor.
//!
//! Calls are fire-and-forget from the core's side. Failures come back as
//! [`GatewayError`] so they can be reported, but nothing retries them.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::schedule::{ClockTime, Schedule, ScheduleId};
use crate::selection::AppToken;
use crate::storage::{keys, load_json, save_json, SharedStore};

/// A recurring (or one-off) interval monitor for one schedule window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorSpec {
    pub window_id: ScheduleId,
    pub start: ClockTime,
    pub end: ClockTime,
    pub recurring: bool,
}

impl MonitorSpec {
    /// Daily recurring monitor for a schedule.
    pub fn daily(schedule: &Schedule) -> Self {
        Self {
            window_id: schedule.id(),
            start: schedule.start(),
            end: schedule.end(),
            recurring: true,
        }
    }
}

pub trait EnforcementGateway: Send {
    /// Shield exactly `apps`.
    fn apply_shield(&mut self, apps: &BTreeSet<AppToken>) -> Result<(), GatewayError>;

    fn clear_shield(&mut self) -> Result<(), GatewayError>;

    fn install_monitor(&mut self, spec: &MonitorSpec) -> Result<(), GatewayError>;

    fn remove_monitor(&mut self, window_id: ScheduleId) -> Result<(), GatewayError>;
}

/// One recorded gateway call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum GatewayCall {
    ApplyShield { apps: BTreeSet<AppToken> },
    ClearShield,
    InstallMonitor { spec: MonitorSpec },
    RemoveMonitor { window_id: ScheduleId },
}

/// Platform state as the simulated gateways see it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShieldState {
    pub shielded: BTreeSet<AppToken>,
    pub monitors: BTreeMap<ScheduleId, MonitorSpec>,
}

/// In-process simulated platform. Clones share state, so a test can keep one
/// handle and give the other to the core.
#[derive(Debug, Clone, Default)]
pub struct InMemoryGateway {
    inner: Arc<Mutex<InMemoryState>>,
}

#[derive(Debug, Default)]
struct InMemoryState {
    shield: ShieldState,
    calls: Vec<GatewayCall>,
    fail_next: Option<GatewayError>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shielded(&self) -> BTreeSet<AppToken> {
        self.lock().shield.shielded.clone()
    }

    pub fn monitors(&self) -> BTreeMap<ScheduleId, MonitorSpec> {
        self.lock().shield.monitors.clone()
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Make the next call fail with `err` without changing state.
    pub fn fail_next(&self, err: GatewayError) {
        self.lock().fail_next = Some(err);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, InMemoryState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, call: GatewayCall) -> Result<(), GatewayError> {
        let mut state = self.lock();
        state.calls.push(call.clone());
        if let Some(err) = state.fail_next.take() {
            return Err(err);
        }
        apply_call(&mut state.shield, call);
        Ok(())
    }
}

impl EnforcementGateway for InMemoryGateway {
    fn apply_shield(&mut self, apps: &BTreeSet<AppToken>) -> Result<(), GatewayError> {
        self.record(GatewayCall::ApplyShield { apps: apps.clone() })
    }

    fn clear_shield(&mut self) -> Result<(), GatewayError> {
        self.record(GatewayCall::ClearShield)
    }

    fn install_monitor(&mut self, spec: &MonitorSpec) -> Result<(), GatewayError> {
        self.record(GatewayCall::InstallMonitor { spec: spec.clone() })
    }

    fn remove_monitor(&mut self, window_id: ScheduleId) -> Result<(), GatewayError> {
        self.record(GatewayCall::RemoveMonitor { window_id })
    }
}

/// Simulated platform whose state lives in a [`SharedStore`], so it survives
/// across process launches.
pub struct StoreBackedGateway {
    store: Arc<dyn SharedStore>,
}

impl StoreBackedGateway {
    pub fn new(store: Arc<dyn SharedStore>) -> Self {
        Self { store }
    }

    pub fn state(&self) -> ShieldState {
        ShieldState {
            shielded: load_json(self.store.as_ref(), keys::SHIELDED_APPS).unwrap_or_default(),
            monitors: load_json::<Vec<MonitorSpec>>(self.store.as_ref(), keys::INSTALLED_MONITORS)
                .unwrap_or_default()
                .into_iter()
                .map(|m| (m.window_id, m))
                .collect(),
        }
    }

    fn commit(&self, call: GatewayCall) -> Result<(), GatewayError> {
        let mut state = self.state();
        apply_call(&mut state, call);
        let monitors: Vec<&MonitorSpec> = state.monitors.values().collect();
        save_json(self.store.as_ref(), keys::SHIELDED_APPS, &state.shielded)
            .and_then(|_| save_json(self.store.as_ref(), keys::INSTALLED_MONITORS, &monitors))
            .map_err(|e| GatewayError::Platform(e.to_string()))
    }
}

impl EnforcementGateway for StoreBackedGateway {
    fn apply_shield(&mut self, apps: &BTreeSet<AppToken>) -> Result<(), GatewayError> {
        self.commit(GatewayCall::ApplyShield { apps: apps.clone() })
    }

    fn clear_shield(&mut self) -> Result<(), GatewayError> {
        self.commit(GatewayCall::ClearShield)
    }

    fn install_monitor(&mut self, spec: &MonitorSpec) -> Result<(), GatewayError> {
        self.commit(GatewayCall::InstallMonitor { spec: spec.clone() })
    }

    fn remove_monitor(&mut self, window_id: ScheduleId) -> Result<(), GatewayError> {
        self.commit(GatewayCall::RemoveMonitor { window_id })
    }
}

fn apply_call(state: &mut ShieldState, call: GatewayCall) {
    match call {
        GatewayCall::ApplyShield { apps } => state.shielded = apps,
        GatewayCall::ClearShield => state.shielded.clear(),
        GatewayCall::InstallMonitor { spec } => {
            state.monitors.insert(spec.window_id, spec);
        }
        GatewayCall::RemoveMonitor { window_id } => {
            state.monitors.remove(&window_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn apps(names: &[&str]) -> BTreeSet<AppToken> {
        names.iter().map(|n| AppToken::new(*n)).collect()
    }

    #[test]
    fn shield_calls_are_idempotent() {
        let mut gateway = InMemoryGateway::new();
        let set = apps(&["social", "games"]);

        gateway.apply_shield(&set).unwrap();
        gateway.apply_shield(&set).unwrap();
        assert_eq!(gateway.shielded(), set);

        gateway.clear_shield().unwrap();
        assert!(gateway.shielded().is_empty());
        gateway.clear_shield().unwrap();
        assert!(gateway.shielded().is_empty());
    }

    #[test]
    fn failed_call_leaves_state_untouched() {
        let mut gateway = InMemoryGateway::new();
        gateway.apply_shield(&apps(&["social"])).unwrap();
        gateway.fail_next(GatewayError::AuthorizationDenied("revoked".into()));
        assert!(gateway.clear_shield().is_err());
        assert_eq!(gateway.shielded(), apps(&["social"]));
        assert_eq!(gateway.calls().len(), 2);
    }

    #[test]
    fn store_backed_state_survives_new_instance() {
        let store: Arc<dyn SharedStore> = Arc::new(MemoryStore::new());
        let schedule = Schedule::new(
            "Work",
            "09:00".parse().unwrap(),
            "17:00".parse().unwrap(),
        );
        {
            let mut gateway = StoreBackedGateway::new(store.clone());
            gateway.apply_shield(&apps(&["social"])).unwrap();
            gateway.install_monitor(&MonitorSpec::daily(&schedule)).unwrap();
        }
        let mut gateway = StoreBackedGateway::new(store);
        let state = gateway.state();
        assert_eq!(state.shielded, apps(&["social"]));
        assert!(state.monitors.contains_key(&schedule.id()));

        gateway.remove_monitor(schedule.id()).unwrap();
        gateway.clear_shield().unwrap();
        assert_eq!(gateway.state(), ShieldState::default());
    }
}
