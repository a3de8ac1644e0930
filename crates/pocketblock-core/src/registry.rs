//! Schedule registry backed by the shared store.
//!
//! The persisted blob under `SavedSchedules` is the source of truth. Every
//! mutation changes memory first, then writes the whole list; a failed write
//! restores the previous list and returns the error, so memory never drifts
//! from storage. Gateway deltas and re-evaluation are the caller's job (see
//! [`crate::Blocker`]).

use std::sync::Arc;

use crate::error::{Result, ValidationError};
use crate::schedule::{Schedule, ScheduleId};
use crate::storage::{keys, load_json, save_json, SharedStore};

pub struct ScheduleRegistry {
    schedules: Vec<Schedule>,
    store: Arc<dyn SharedStore>,
}

impl ScheduleRegistry {
    /// Load from the store. Missing or undecodable data gives an empty registry.
    pub fn load(store: Arc<dyn SharedStore>) -> Self {
        let schedules = load_json(store.as_ref(), keys::SAVED_SCHEDULES).unwrap_or_default();
        Self { schedules, store }
    }

    /// Re-read the blob, dropping whatever this process held in memory.
    pub fn reload(&mut self) {
        self.schedules = load_json(self.store.as_ref(), keys::SAVED_SCHEDULES).unwrap_or_default();
    }

    pub fn schedules(&self) -> &[Schedule] {
        &self.schedules
    }

    pub fn get(&self, id: ScheduleId) -> Option<&Schedule> {
        self.schedules.iter().find(|s| s.id() == id)
    }

    pub fn len(&self) -> usize {
        self.schedules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schedules.is_empty()
    }

    pub fn active(&self) -> impl Iterator<Item = &Schedule> {
        self.schedules.iter().filter(|s| s.is_active)
    }

    /// Append a schedule.
    pub fn add(&mut self, schedule: Schedule) -> Result<()> {
        self.mutate(|list| {
            list.push(schedule);
            Ok(())
        })
    }

    /// Remove by id, returning the removed schedule.
    pub fn remove(&mut self, id: ScheduleId) -> Result<Schedule> {
        self.mutate(|list| {
            let index = position(list, id)?;
            Ok(list.remove(index))
        })
    }

    /// Move the schedule at `from` so it ends up at index `to`.
    pub fn reorder(&mut self, from: usize, to: usize) -> Result<()> {
        self.mutate(|list| {
            let len = list.len();
            for index in [from, to] {
                if index >= len {
                    return Err(ValidationError::OutOfBounds {
                        collection: "schedules".into(),
                        index,
                        len,
                    }
                    .into());
                }
            }
            let moved = list.remove(from);
            list.insert(to, moved);
            Ok(())
        })
    }

    /// Flip the active flag. Returns the updated schedule.
    pub fn set_active(&mut self, id: ScheduleId, active: bool) -> Result<Schedule> {
        self.mutate(|list| {
            let index = position(list, id)?;
            list[index].is_active = active;
            Ok(list[index].clone())
        })
    }

    pub fn rename(&mut self, id: ScheduleId, name: &str) -> Result<Schedule> {
        self.mutate(|list| {
            let index = position(list, id)?;
            list[index].name = name.to_string();
            Ok(list[index].clone())
        })
    }

    fn mutate<T>(&mut self, change: impl FnOnce(&mut Vec<Schedule>) -> Result<T>) -> Result<T> {
        let previous = self.schedules.clone();
        let out = change(&mut self.schedules)?;
        if let Err(e) = save_json(self.store.as_ref(), keys::SAVED_SCHEDULES, &self.schedules) {
            tracing::error!(error = %e, "failed to persist schedules, rolling back");
            self.schedules = previous;
            return Err(e.into());
        }
        Ok(out)
    }
}

fn position(list: &[Schedule], id: ScheduleId) -> Result<usize> {
    list.iter()
        .position(|s| s.id() == id)
        .ok_or_else(|| ValidationError::UnknownSchedule(id.to_string()).into())
}
