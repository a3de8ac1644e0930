use std::sync::Arc;

use clap::Subcommand;
use pocketblock_core::{
    Config, MonitorAction as Outcome, MonitorExtension, StoreBackedGateway, SystemClock,
    TimeBasis,
};

use crate::common::{open_stores, CliResult};

/// Stand-in for the separate monitor process. It only touches the shared
/// store and never runs the app's recovery.
#[derive(Subcommand)]
pub enum MonitorAction {
    /// A schedule's interval started
    Start {
        /// Full schedule id
        window_id: String,
    },
    /// A schedule's interval ended
    End { window_id: String },
}

pub fn run(action: MonitorAction) -> CliResult {
    let config = Config::load_or_default();
    let stores = open_stores(&config)?;
    let gateway = StoreBackedGateway::new(stores.shared.clone());
    let mut monitor = MonitorExtension::new(
        stores.shared,
        Box::new(gateway),
        Arc::new(SystemClock),
        TimeBasis::from_offset_minutes(config.utc_offset_minutes),
    );

    let outcome = match action {
        MonitorAction::Start { window_id } => monitor.interval_did_start(window_id.parse()?)?,
        MonitorAction::End { window_id } => monitor.interval_did_end(window_id.parse()?)?,
    };
    match outcome {
        Outcome::Shielded { apps } => println!("shielded {apps} apps"),
        Outcome::Cleared => println!("shield cleared"),
        Outcome::KeptForOverlap => println!("shield kept, another schedule is active"),
        Outcome::NoChange => println!("no change"),
    }
    Ok(())
}
