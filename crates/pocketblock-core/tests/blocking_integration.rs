//! Integration tests for the app process and monitor process sharing one
//! on-disk store.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use pocketblock_core::{
    AppToken, Blocker, Clock, Config, Database, Enforcement, InMemoryGateway, LogNotifier,
    ManualClock, ManualTimers, MonitorAction, MonitorExtension, NoBackgroundTasks, Ports,
    Recovery, Schedule, SharedStore, StoreBackedGateway, TimeBasis, TimerConcern, UnblockSource,
    UnblockState,
};

fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 11, 13, h, m, 0).unwrap()
}

fn config() -> Config {
    Config {
        utc_offset_minutes: Some(0),
        ..Config::default()
    }
}

struct App {
    gateway: InMemoryGateway,
    timers: ManualTimers,
    clock: ManualClock,
    blocker: Blocker,
}

fn app(shared: Arc<dyn SharedStore>, local: Arc<dyn SharedStore>, start: DateTime<Utc>) -> App {
    let gateway = InMemoryGateway::new();
    let timers = ManualTimers::new();
    let clock = ManualClock::new(start);
    let blocker = Blocker::new(
        config(),
        Ports {
            shared,
            local,
            gateway: Box::new(gateway.clone()),
            timers: Box::new(timers.clone()),
            notifier: Box::new(LogNotifier::new()),
            background: Box::new(NoBackgroundTasks),
            clock: Arc::new(clock.clone()),
        },
    );
    App {
        gateway,
        timers,
        clock,
        blocker,
    }
}

fn stores(dir: &tempfile::TempDir) -> (Arc<dyn SharedStore>, Arc<dyn SharedStore>) {
    let shared = Database::open_at(&dir.path().join("group.db")).unwrap();
    let local = Database::open_at(&dir.path().join("local.db")).unwrap();
    (Arc::new(shared), Arc::new(local))
}

fn s(name: &str, start: &str, end: &str) -> Schedule {
    Schedule::new(name, start.parse().unwrap(), end.parse().unwrap())
}

#[test]
fn test_overnight_and_daytime_schedules() {
    let dir = tempfile::tempdir().unwrap();
    let (shared, local) = stores(&dir);
    let mut app = app(shared, local, at(0, 30));
    app.blocker.select_apps([AppToken::new("social")]).unwrap();
    app.blocker.add_schedule(s("A", "23:00", "01:00")).unwrap();
    app.blocker.add_schedule(s("B", "09:00", "17:00")).unwrap();

    for (time, expected) in [
        (at(0, 30), Enforcement::Shield),
        (at(12, 0), Enforcement::Shield),
        (at(20, 0), Enforcement::Clear),
        (at(1, 0), Enforcement::Clear),
        (at(23, 0), Enforcement::Shield),
    ] {
        app.clock.set(time);
        assert_eq!(app.blocker.evaluate(), expected, "at {time}");
    }
}

#[test]
fn test_five_minute_unblock_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let (shared, local) = stores(&dir);
    let mut app = app(shared, local.clone(), at(10, 0));
    app.blocker.select_apps([AppToken::new("social")]).unwrap();
    app.blocker.add_schedule(s("Work", "09:00", "17:00")).unwrap();
    assert_eq!(app.gateway.shielded().len(), 1);

    app.blocker
        .request_unblock(Duration::minutes(5), UnblockSource::User)
        .unwrap();
    assert!(app.gateway.shielded().is_empty());
    assert_eq!(
        local.get("reblockDate").unwrap().as_deref(),
        Some(at(10, 5).to_rfc3339().as_str())
    );

    app.clock.set(at(10, 5));
    let (handle, due) = app.timers.armed(TimerConcern::Reblock).unwrap();
    assert_eq!(due, at(10, 5));
    app.blocker.on_reblock_due(handle).unwrap();

    assert_eq!(app.gateway.shielded().len(), 1);
    assert_eq!(app.blocker.unblock_state(), &UnblockState::Enforcing);
    assert!(local.get("reblockDate").unwrap().is_none());
}

#[test]
fn test_unblock_recovered_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    {
        let (shared, local) = stores(&dir);
        let mut first = app(shared, local, at(10, 0));
        first.blocker.select_apps([AppToken::new("social")]).unwrap();
        first.blocker.add_schedule(s("Work", "09:00", "17:00")).unwrap();
        first
            .blocker
            .request_unblock(Duration::minutes(5), UnblockSource::User)
            .unwrap();
        // process killed: the timer never fires
    }

    let (shared, local) = stores(&dir);
    let mut second = app(shared, local, at(10, 2));
    assert_eq!(
        second.blocker.on_foreground(),
        Recovery::Resumed { until: at(10, 5) }
    );
    assert!(second.gateway.shielded().is_empty());

    second.clock.set(at(10, 7));
    assert!(matches!(second.blocker.on_foreground(), Recovery::Expired(_)));
    assert_eq!(second.gateway.shielded().len(), 1);
}

#[test]
fn test_expired_deadline_on_launch_reapplies_live_schedules() {
    let dir = tempfile::tempdir().unwrap();
    let lunch_id;
    {
        let (shared, local) = stores(&dir);
        let mut first = app(shared, local, at(10, 0));
        first.blocker.select_apps([AppToken::new("social")]).unwrap();
        first.blocker.add_schedule(s("Morning", "09:00", "10:30")).unwrap();
        first
            .blocker
            .request_unblock(Duration::minutes(5), UnblockSource::User)
            .unwrap();
        assert!(first.gateway.shielded().is_empty());
    }

    // another writer changes the shared schedules while the app is gone
    {
        let (shared, _) = stores(&dir);
        let other_local: Arc<dyn SharedStore> =
            Arc::new(Database::open_at(&dir.path().join("other.db")).unwrap());
        let mut other = app(shared, other_local, at(11, 0));
        lunch_id = other.blocker.add_schedule(s("Lunch", "11:30", "13:00")).unwrap();
    }

    let (shared, local) = stores(&dir);
    let mut relaunched = app(shared, local.clone(), at(12, 0));
    match relaunched.blocker.on_foreground() {
        Recovery::Expired(ended) => assert_eq!(ended.until, at(10, 5)),
        other => panic!("expected Expired, got {other:?}"),
    }

    assert_eq!(relaunched.blocker.unblock_state(), &UnblockState::Enforcing);
    assert!(local.get("reblockDate").unwrap().is_none());
    assert_eq!(relaunched.gateway.shielded().len(), 1);
    let matching: Vec<_> = relaunched
        .blocker
        .matching_schedules_at(at(12, 0))
        .into_iter()
        .map(|schedule| schedule.id())
        .collect();
    assert_eq!(matching, [lunch_id]);
}

#[test]
fn test_monitor_sees_app_writes_on_next_callback() {
    let dir = tempfile::tempdir().unwrap();
    let (shared, local) = stores(&dir);
    let mut app = app(shared, local, at(9, 0));
    let clock = ManualClock::new(at(9, 0));

    // the monitor opens its own handle on the same file
    let monitor_store: Arc<dyn SharedStore> =
        Arc::new(Database::open_at(&dir.path().join("group.db")).unwrap());
    let monitor_gateway = StoreBackedGateway::new(monitor_store.clone());
    let mut monitor = MonitorExtension::new(
        monitor_store.clone(),
        Box::new(monitor_gateway),
        Arc::new(clock.clone()) as Arc<dyn Clock>,
        TimeBasis::utc(),
    );

    let id = app.blocker.add_schedule(s("Work", "09:00", "17:00")).unwrap();
    app.blocker
        .select_apps([AppToken::new("social"), AppToken::new("games")])
        .unwrap();

    assert_eq!(
        monitor.interval_did_start(id).unwrap(),
        MonitorAction::Shielded { apps: 2 }
    );
    let state = StoreBackedGateway::new(monitor_store.clone()).state();
    assert_eq!(state.shielded.len(), 2);

    // deleted while the end callback was in flight
    app.blocker.remove_schedule(id).unwrap();
    clock.set(at(17, 0));
    assert_eq!(monitor.interval_did_end(id).unwrap(), MonitorAction::Cleared);
    assert!(StoreBackedGateway::new(monitor_store).state().shielded.is_empty());
}

#[test]
fn test_step_goal_unblocks_then_reblocks() {
    let dir = tempfile::tempdir().unwrap();
    let (shared, local) = stores(&dir);
    let mut app = app(shared, local, at(10, 0));
    app.blocker.select_apps([AppToken::new("social")]).unwrap();
    app.blocker.add_schedule(s("Work", "09:00", "17:00")).unwrap();

    app.blocker.start_walk();
    for steps in [4, 9, 14] {
        let (_, started) = app.blocker.on_step_count(steps).unwrap();
        assert!(started.is_none());
    }
    let (_, started) = app.blocker.on_step_count(15).unwrap();
    let started = started.unwrap();
    assert_eq!(started.until, at(10, 5));
    assert!(app.gateway.shielded().is_empty());

    let (handle, _) = app.timers.armed(TimerConcern::Reblock).unwrap();
    app.clock.set(at(10, 5));
    app.blocker.on_reblock_due(handle).unwrap();
    assert_eq!(app.gateway.shielded().len(), 1);

    // a fresh walk can earn another unblock
    let (_, started) = app.blocker.on_step_count(15).unwrap();
    assert!(started.is_some());
}
