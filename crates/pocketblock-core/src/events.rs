//! Notifications the blocker emits after each state change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::schedule::ScheduleId;
use crate::unblock::EndReason;

/// What started a temporary unblock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnblockSource {
    User,
    StepGoal,
    Debug,
}

/// Every observable state change in the blocker produces an Event.
/// Front-ends subscribe instead of polling properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    ScheduleAdded {
        id: ScheduleId,
        name: String,
        at: DateTime<Utc>,
    },
    ScheduleRemoved {
        id: ScheduleId,
        at: DateTime<Utc>,
    },
    SchedulesReordered {
        from: usize,
        to: usize,
        at: DateTime<Utc>,
    },
    ScheduleActiveChanged {
        id: ScheduleId,
        active: bool,
        at: DateTime<Utc>,
    },
    ScheduleRenamed {
        id: ScheduleId,
        name: String,
        at: DateTime<Utc>,
    },
    SelectionChanged {
        count: usize,
        at: DateTime<Utc>,
    },
    ShieldApplied {
        apps: usize,
        at: DateTime<Utc>,
    },
    ShieldCleared {
        at: DateTime<Utc>,
    },
    UnblockStarted {
        until: DateTime<Utc>,
        source: UnblockSource,
        replaced: bool,
        at: DateTime<Utc>,
    },
    UnblockEnded {
        reason: EndReason,
        at: DateTime<Utc>,
    },
    StepProgress {
        steps: u32,
        goal: u32,
        at: DateTime<Utc>,
    },
    StepGoalReached {
        steps: u32,
        at: DateTime<Utc>,
    },
    /// A platform call failed. Nothing retries it.
    GatewayFailed {
        operation: String,
        message: String,
        at: DateTime<Utc>,
    },
    OnboardingChanged {
        completed: bool,
        at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Box<dyn Fn(&Event) + Send>;

/// Synchronous fan-out to registered callbacks, in registration order.
#[derive(Default)]
pub struct EventBus {
    next_id: u64,
    listeners: Vec<(SubscriptionId, Listener)>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, listener: impl Fn(&Event) + Send + 'static) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Returns false if the id was not subscribed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(sid, _)| *sid != id);
        self.listeners.len() != before
    }

    pub fn emit(&self, event: &Event) {
        tracing::trace!(?event, "event");
        for (_, listener) in &self.listeners {
            listener(event);
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn listeners_receive_until_unsubscribed() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut bus = EventBus::new();
        let sink = seen.clone();
        let id = bus.subscribe(move |e| sink.lock().unwrap().push(e.clone()));

        let event = Event::ShieldCleared { at: Utc::now() };
        bus.emit(&event);
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.emit(&event);

        assert_eq!(seen.lock().unwrap().as_slice(), &[event]);
    }

    #[test]
    fn serializes_with_type_tag() {
        let at = Utc::now();
        let json = serde_json::to_value(Event::SelectionChanged { count: 3, at }).unwrap();
        assert_eq!(json["type"], "SelectionChanged");
        assert_eq!(json["count"], 3);
    }
}
