use chrono::Duration;
use clap::Subcommand;
use pocketblock_core::UnblockSource;

use crate::common::{open_blocker, CliResult};

#[derive(Subcommand, Default)]
pub enum DiagnosticsAction {
    /// Print the diagnostics report (default)
    #[default]
    Show,
    /// Print the report as JSON
    Json,
    /// Drop the shield until the next evaluation
    UnblockAll,
    /// Start a 15 second unblock
    UnblockShort,
    /// Reload shared state and reinstall all monitors
    Refresh,
}

pub fn run(action: DiagnosticsAction) -> CliResult {
    let mut blocker = open_blocker()?;
    match action {
        DiagnosticsAction::Show => print!("{}", blocker.diagnostics()),
        DiagnosticsAction::Json => {
            println!("{}", serde_json::to_string_pretty(&blocker.diagnostics())?);
        }
        DiagnosticsAction::UnblockAll => {
            blocker.unblock_all()?;
            println!("all apps unblocked until next evaluation");
        }
        DiagnosticsAction::UnblockShort => {
            let started = blocker.request_unblock(Duration::seconds(15), UnblockSource::Debug)?;
            println!("unblocked until {}", started.until.to_rfc3339());
        }
        DiagnosticsAction::Refresh => {
            let summary = blocker.refresh();
            println!(
                "{} monitors installed, {} removed, enforcement: {:?}",
                summary.monitors_installed, summary.monitors_removed, summary.enforcement
            );
        }
    }
    Ok(())
}
