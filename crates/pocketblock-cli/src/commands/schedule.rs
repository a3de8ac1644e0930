use clap::Subcommand;
use pocketblock_core::{ClockTime, Schedule};

use crate::common::{open_blocker, resolve_schedule, CliResult};

#[derive(Subcommand)]
pub enum ScheduleAction {
    /// Add a daily window (end before start wraps past midnight)
    Add {
        /// Start time, HH:MM
        start: ClockTime,
        /// End time, HH:MM (exclusive)
        end: ClockTime,
        /// Display name
        #[arg(long, default_value = pocketblock_core::schedule::DEFAULT_SCHEDULE_NAME)]
        name: String,
        /// Create without enabling it
        #[arg(long)]
        inactive: bool,
    },
    /// List schedules in order
    List {
        #[arg(long)]
        json: bool,
    },
    /// Delete a schedule
    Remove {
        /// Schedule id or unique prefix
        id: String,
    },
    /// Move the schedule at FROM to position TO (zero-based)
    Reorder { from: usize, to: usize },
    /// Enable a schedule
    Activate { id: String },
    /// Disable a schedule without deleting it
    Deactivate { id: String },
    /// Change a schedule's name
    Rename { id: String, name: String },
}

pub fn run(action: ScheduleAction) -> CliResult {
    let mut blocker = open_blocker()?;
    match action {
        ScheduleAction::Add {
            start,
            end,
            name,
            inactive,
        } => {
            let mut schedule = Schedule::new(name, start, end);
            schedule.is_active = !inactive;
            if schedule.is_zero_width() {
                eprintln!("warning: start equals end, this schedule never blocks");
            }
            let id = blocker.add_schedule(schedule)?;
            println!("{id}");
        }
        ScheduleAction::List { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(blocker.schedules())?);
            } else if blocker.schedules().is_empty() {
                println!("no schedules");
            } else {
                for (index, schedule) in blocker.schedules().iter().enumerate() {
                    println!(
                        "{index}  {schedule}  {}{}",
                        schedule.name,
                        if schedule.is_active { "" } else { " (inactive)" }
                    );
                }
            }
        }
        ScheduleAction::Remove { id } => {
            let id = resolve_schedule(&blocker, &id)?;
            let removed = blocker.remove_schedule(id)?;
            println!("removed {removed}");
        }
        ScheduleAction::Reorder { from, to } => {
            blocker.reorder_schedules(from, to)?;
            println!("ok");
        }
        ScheduleAction::Activate { id } => {
            let id = resolve_schedule(&blocker, &id)?;
            let schedule = blocker.set_schedule_active(id, true)?;
            println!("activated {schedule}");
        }
        ScheduleAction::Deactivate { id } => {
            let id = resolve_schedule(&blocker, &id)?;
            let schedule = blocker.set_schedule_active(id, false)?;
            println!("deactivated {schedule}");
        }
        ScheduleAction::Rename { id, name } => {
            let id = resolve_schedule(&blocker, &id)?;
            let schedule = blocker.rename_schedule(id, &name)?;
            println!("renamed {schedule} to {}", schedule.name);
        }
    }
    Ok(())
}
