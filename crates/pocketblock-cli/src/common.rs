//! Wiring shared by the commands: stores, simulated platform, blocker.

use std::sync::Arc;

use pocketblock_core::{
    Blocker, Config, Database, LogNotifier, ManualTimers, NoBackgroundTasks, Ports, Recovery,
    Schedule, ScheduleId, SharedStore, StoreBackedGateway, SystemClock, Timers,
};

pub type CliResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

pub struct Stores {
    pub shared: Arc<dyn SharedStore>,
    pub local: Arc<dyn SharedStore>,
}

pub fn open_stores(config: &Config) -> CliResult<Stores> {
    Ok(Stores {
        shared: Arc::new(Database::open_shared(&config.app_group)?),
        local: Arc::new(Database::open_local()?),
    })
}

/// Build a blocker over the on-disk stores with the given timer port.
///
/// The shield itself lives in the shared store, so it persists between
/// invocations.
pub fn build_blocker(config: Config, timers: Box<dyn Timers>) -> CliResult<Blocker> {
    let stores = open_stores(&config)?;
    let gateway = StoreBackedGateway::new(stores.shared.clone());
    Ok(Blocker::new(
        config,
        Ports {
            shared: stores.shared,
            local: stores.local,
            gateway: Box::new(gateway),
            timers,
            notifier: Box::new(LogNotifier::new()),
            background: Box::new(NoBackgroundTasks),
            clock: Arc::new(SystemClock),
        },
    ))
}

/// Open the blocker and run the launch-time recovery check.
///
/// Timers never fire inside a short-lived invocation; an expired unblock is
/// ended here instead.
pub fn open_blocker() -> CliResult<Blocker> {
    let config = Config::load_or_default();
    let mut blocker = build_blocker(config, Box::new(ManualTimers::new()))?;
    if let Recovery::Expired(ended) = blocker.on_foreground() {
        eprintln!("unblock that ended at {} is over; blocking resumed", ended.until.to_rfc3339());
    }
    Ok(blocker)
}

/// Accept a full schedule id or a unique prefix of one.
pub fn resolve_schedule(blocker: &Blocker, raw: &str) -> CliResult<ScheduleId> {
    if let Ok(id) = raw.parse::<ScheduleId>() {
        return Ok(id);
    }
    let needle = raw.to_ascii_lowercase();
    let matches: Vec<&Schedule> = blocker
        .schedules()
        .iter()
        .filter(|s| s.id().to_string().starts_with(&needle))
        .collect();
    match matches.as_slice() {
        [one] => Ok(one.id()),
        [] => Err(format!("no schedule matches '{raw}'").into()),
        _ => Err(format!("'{raw}' matches {} schedules", matches.len()).into()),
    }
}
