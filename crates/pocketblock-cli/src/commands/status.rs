use clap::Args;
use pocketblock_core::{matching_schedules, ClockTime, UnblockState};
use serde::Serialize;

use crate::common::{open_blocker, CliResult};

#[derive(Args)]
pub struct StatusArgs {
    /// Evaluate at this local time (HH:MM) instead of now
    #[arg(long)]
    at: Option<ClockTime>,
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct StatusReport {
    time: String,
    blocking_required: bool,
    unblocked: bool,
    matching: Vec<String>,
    selected_apps: usize,
}

pub fn run(args: StatusArgs) -> CliResult {
    let blocker = open_blocker()?;
    let minute = match args.at {
        Some(time) => time.minute_of_day(),
        None => blocker.basis().minute_of_day(blocker.now()),
    };
    let matching: Vec<String> = matching_schedules(minute, blocker.schedules())
        .into_iter()
        .filter_map(|id| blocker.schedules().iter().find(|s| s.id() == id))
        .map(|s| format!("{s}  {}", s.name))
        .collect();
    let report = StatusReport {
        time: minute.to_string(),
        blocking_required: !matching.is_empty(),
        unblocked: matches!(blocker.unblock_state(), UnblockState::Overridden { .. }),
        matching,
        selected_apps: blocker.selection().len(),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    println!(
        "{}: {}",
        report.time,
        if report.blocking_required { "blocking" } else { "not blocking" }
    );
    if report.unblocked {
        println!("temporarily unblocked");
    }
    for line in &report.matching {
        println!("  {line}");
    }
    Ok(())
}
