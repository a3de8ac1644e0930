use clap::Args;

use crate::common::{open_blocker, CliResult};

#[derive(Args)]
pub struct StepsArgs {
    /// Cumulative step count for this walk
    count: u32,
}

/// Each invocation is one walk: the count is checked against the goal once.
pub fn run(args: StepsArgs) -> CliResult {
    let mut blocker = open_blocker()?;
    blocker.start_walk();
    let (progress, started) = blocker.on_step_count(args.count)?;
    println!("{}/{} steps", progress.steps, progress.goal);
    match started {
        Some(started) => println!("goal reached, unblocked until {}", started.until.to_rfc3339()),
        None if progress.goal_reached => println!("goal reached, already unblocked"),
        None => {}
    }
    Ok(())
}
