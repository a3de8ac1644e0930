//! Active-block evaluator.
//!
//! Pure fold of the window predicate over a schedule list. It does not know
//! about temporary unblocks; callers check that first.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::gateway::EnforcementGateway;
use crate::schedule::{MinuteOfDay, Schedule, ScheduleId};
use crate::selection::AppToken;

/// True iff at least one active schedule contains `now`.
pub fn is_blocking_required(now: MinuteOfDay, schedules: &[Schedule]) -> bool {
    schedules.iter().any(|s| s.is_blocking_at(now))
}

/// Ids of the active schedules containing `now`, in registry order.
pub fn matching_schedules(now: MinuteOfDay, schedules: &[Schedule]) -> Vec<ScheduleId> {
    schedules
        .iter()
        .filter(|s| s.is_blocking_at(now))
        .map(Schedule::id)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Enforcement {
    Shield,
    Clear,
}

impl Enforcement {
    pub fn from_required(required: bool) -> Self {
        if required {
            Enforcement::Shield
        } else {
            Enforcement::Clear
        }
    }
}

/// Push a decision to the gateway: shield `apps` or clear the shield.
pub fn enforce(
    gateway: &mut dyn EnforcementGateway,
    decision: Enforcement,
    apps: &BTreeSet<AppToken>,
) -> Result<(), GatewayError> {
    match decision {
        Enforcement::Shield => gateway.apply_shield(apps),
        Enforcement::Clear => gateway.clear_shield(),
    }
}
