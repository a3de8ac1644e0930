//! Walk-to-unblock step goal.
//!
//! Counts arrive cumulative for the current walk. The goal fires once per
//! session; a new session starts when a walk is (re)started or an unblock ends.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepProgress {
    pub steps: u32,
    pub goal: u32,
    /// True only for the count that first reached the goal.
    pub goal_reached: bool,
}

#[derive(Debug, Clone)]
pub struct StepGoalTracker {
    goal: u32,
    steps: u32,
    fired: bool,
}

impl StepGoalTracker {
    pub fn new(goal: u32) -> Self {
        Self {
            goal: goal.max(1),
            steps: 0,
            fired: false,
        }
    }

    pub fn goal(&self) -> u32 {
        self.goal
    }

    pub fn steps(&self) -> u32 {
        self.steps
    }

    pub fn start_session(&mut self) {
        self.steps = 0;
        self.fired = false;
    }

    pub fn observe(&mut self, steps: u32) -> StepProgress {
        // pedometer streams can restart from zero; keep the highest count seen
        self.steps = self.steps.max(steps);
        let goal_reached = !self.fired && self.steps >= self.goal;
        if goal_reached {
            self.fired = true;
        }
        StepProgress {
            steps: self.steps,
            goal: self.goal,
            goal_reached,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn goal_fires_once_per_session() {
        let mut tracker = StepGoalTracker::new(15);
        assert!(!tracker.observe(3).goal_reached);
        assert!(tracker.observe(15).goal_reached);
        assert!(!tracker.observe(40).goal_reached);

        tracker.start_session();
        assert_eq!(tracker.steps(), 0);
        assert!(tracker.observe(20).goal_reached);
    }

    #[test]
    fn counts_never_go_backwards() {
        let mut tracker = StepGoalTracker::new(15);
        tracker.observe(10);
        let progress = tracker.observe(2);
        assert_eq!(progress.steps, 10);
        assert!(!progress.goal_reached);
    }

    #[test]
    fn zero_goal_is_clamped() {
        let mut tracker = StepGoalTracker::new(0);
        assert_eq!(tracker.goal(), 1);
        assert!(!tracker.observe(0).goal_reached);
        assert!(tracker.observe(1).goal_reached);
    }
}
