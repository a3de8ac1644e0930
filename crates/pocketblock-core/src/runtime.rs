//! Async front for [`Blocker`].
//!
//! Platform callbacks (timer fires, step updates, foreground transitions)
//! arrive from different tasks. They are all turned into [`Command`]s and
//! processed one at a time by [`BlockerService::run`], which owns the
//! blocker. Callers hold a cloneable [`BlockerHandle`].
//!
//! ```ignore
//! let (handle, queue) = command_channel(32, 64);
//! let timers = TokioTimers::new(clock.clone(), &handle);
//! let blocker = Blocker::new(config, Ports { timers: Box::new(timers), .. });
//! tokio::spawn(BlockerService::new(blocker, queue).run());
//! handle.request_unblock(Duration::minutes(5), UnblockSource::User).await?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::blocker::Blocker;
use crate::clock::Clock;
use crate::diagnostics::DiagnosticsReport;
use crate::error::{CoreError, GatewayError, Result};
use crate::events::{Event, UnblockSource};
use crate::platform::{TimerConcern, TimerHandle, Timers};
use crate::schedule::{Schedule, ScheduleId};
use crate::selection::AppToken;
use crate::steps::StepProgress;
use crate::unblock::{Recovery, UnblockEnded, UnblockStarted, UnblockState};

type Job = Box<dyn FnOnce(&mut Blocker) + Send>;

pub enum Command {
    /// Run a closure against the blocker.
    Run(Job),
    /// A reblock timer fired.
    ReblockDue(TimerHandle),
    Shutdown,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Run(_) => f.write_str("Run(..)"),
            Command::ReblockDue(handle) => f.debug_tuple("ReblockDue").field(handle).finish(),
            Command::Shutdown => f.write_str("Shutdown"),
        }
    }
}

/// Receiving half of the command channel, consumed by [`BlockerService::new`].
pub struct CommandQueue {
    rx: mpsc::Receiver<Command>,
    event_tx: broadcast::Sender<Event>,
}

#[derive(Clone)]
pub struct BlockerHandle {
    tx: mpsc::Sender<Command>,
    event_tx: broadcast::Sender<Event>,
}

#[must_use]
pub fn command_channel(command_capacity: usize, event_capacity: usize) -> (BlockerHandle, CommandQueue) {
    let (tx, rx) = mpsc::channel(command_capacity.max(1));
    let (event_tx, _event_rx) = broadcast::channel(event_capacity.max(1));
    (
        BlockerHandle {
            tx,
            event_tx: event_tx.clone(),
        },
        CommandQueue { rx, event_tx },
    )
}

fn stopped() -> CoreError {
    CoreError::Custom("blocker service is not running".to_string())
}

impl BlockerHandle {
    /// Run `f` on the service task and return its result.
    pub async fn call<R, F>(&self, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut Blocker) -> R + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Command::Run(Box::new(move |blocker| {
                let _ = reply_tx.send(f(blocker));
            })))
            .await
            .map_err(|_| stopped())?;
        reply_rx.await.map_err(|_| stopped())
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.tx.send(Command::Shutdown).await.map_err(|_| stopped())
    }

    pub async fn add_schedule(&self, schedule: Schedule) -> Result<ScheduleId> {
        self.call(move |b| b.add_schedule(schedule)).await?
    }

    pub async fn remove_schedule(&self, id: ScheduleId) -> Result<Schedule> {
        self.call(move |b| b.remove_schedule(id)).await?
    }

    pub async fn set_schedule_active(&self, id: ScheduleId, active: bool) -> Result<Schedule> {
        self.call(move |b| b.set_schedule_active(id, active)).await?
    }

    pub async fn select_apps(&self, tokens: Vec<AppToken>) -> Result<()> {
        self.call(move |b| b.select_apps(tokens)).await?
    }

    pub async fn request_unblock(&self, duration: Duration, source: UnblockSource) -> Result<UnblockStarted> {
        self.call(move |b| b.request_unblock(duration, source)).await?
    }

    pub async fn end_unblock(&self) -> Result<UnblockEnded> {
        self.call(|b| b.end_unblock()).await?
    }

    pub async fn start_walk(&self) -> Result<()> {
        self.call(|b| b.start_walk()).await
    }

    pub async fn on_step_count(&self, steps: u32) -> Result<(StepProgress, Option<UnblockStarted>)> {
        self.call(move |b| b.on_step_count(steps)).await?
    }

    pub async fn on_foreground(&self) -> Result<Recovery> {
        self.call(|b| b.on_foreground()).await
    }

    pub async fn on_background(&self) -> Result<()> {
        self.call(|b| b.on_background()).await
    }

    pub async fn unblock_state(&self) -> Result<UnblockState> {
        self.call(|b| b.unblock_state().clone()).await
    }

    pub async fn diagnostics(&self) -> Result<DiagnosticsReport> {
        self.call(|b| b.diagnostics()).await
    }
}

/// Owns the blocker and drains the command queue.
pub struct BlockerService {
    blocker: Blocker,
    rx: mpsc::Receiver<Command>,
}

impl BlockerService {
    pub fn new(mut blocker: Blocker, queue: CommandQueue) -> Self {
        let event_tx = queue.event_tx;
        blocker.subscribe(move |event| {
            // no receivers is fine
            let _ = event_tx.send(event.clone());
        });
        Self {
            blocker,
            rx: queue.rx,
        }
    }

    /// Run recovery, then process commands until shutdown or until every
    /// handle is dropped. Returns the blocker.
    pub async fn run(mut self) -> Blocker {
        self.blocker.on_foreground();
        while let Some(command) = self.rx.recv().await {
            match command {
                Command::Run(job) => job(&mut self.blocker),
                Command::ReblockDue(handle) => {
                    if self.blocker.on_reblock_due(handle).is_none() {
                        tracing::debug!(?handle, "stale reblock timer");
                    }
                }
                Command::Shutdown => break,
            }
        }
        tracing::debug!("blocker service stopped");
        self.blocker
    }
}

/// Timer port backed by tokio sleeps. One task per concern; arming a concern
/// aborts its previous task. Fires are delivered as
/// [`Command::ReblockDue`] through a weak sender, so pending timers do not
/// keep the service alive.
pub struct TokioTimers {
    clock: Arc<dyn Clock>,
    tx: mpsc::WeakSender<Command>,
    next_generation: u64,
    tasks: HashMap<TimerConcern, (TimerHandle, JoinHandle<()>)>,
}

impl TokioTimers {
    pub fn new(clock: Arc<dyn Clock>, handle: &BlockerHandle) -> Self {
        Self {
            clock,
            tx: handle.tx.downgrade(),
            next_generation: 0,
            tasks: HashMap::new(),
        }
    }

    fn delay_until(&self, at: DateTime<Utc>) -> std::time::Duration {
        (at - self.clock.now()).to_std().unwrap_or(std::time::Duration::ZERO)
    }
}

impl Timers for TokioTimers {
    fn arm(&mut self, concern: TimerConcern, at: DateTime<Utc>) -> Result<TimerHandle, GatewayError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| GatewayError::Platform(format!("no async runtime for timers: {e}")))?;
        if let Some((_, task)) = self.tasks.remove(&concern) {
            task.abort();
        }

        self.next_generation += 1;
        let handle = TimerHandle {
            concern,
            generation: self.next_generation,
        };
        let delay = self.delay_until(at);
        let tx = self.tx.clone();
        let task = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(Command::ReblockDue(handle)).await;
            }
        });
        tracing::debug!(?handle, %at, delay_ms = delay.as_millis() as u64, "timer armed");
        self.tasks.insert(concern, (handle, task));
        Ok(handle)
    }

    fn cancel(&mut self, handle: TimerHandle) {
        if self.tasks.get(&handle.concern).map(|(h, _)| *h) == Some(handle) {
            if let Some((_, task)) = self.tasks.remove(&handle.concern) {
                task.abort();
            }
        }
    }
}

impl Drop for TokioTimers {
    fn drop(&mut self) {
        for (_, (_, task)) in self.tasks.drain() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocker::Ports;
    use crate::clock::ManualClock;
    use crate::gateway::InMemoryGateway;
    use crate::platform::{LogNotifier, NoBackgroundTasks};
    use crate::storage::{Config, MemoryStore};
    use chrono::TimeZone;

    fn service() -> (BlockerHandle, InMemoryGateway, JoinHandle<Blocker>) {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 11, 13, 10, 0, 0).unwrap());
        let clock: Arc<dyn Clock> = Arc::new(clock);
        let gateway = InMemoryGateway::new();
        let (handle, queue) = command_channel(8, 32);
        let blocker = Blocker::new(
            Config {
                utc_offset_minutes: Some(0),
                ..Config::default()
            },
            Ports {
                shared: Arc::new(MemoryStore::new()),
                local: Arc::new(MemoryStore::new()),
                gateway: Box::new(gateway.clone()),
                timers: Box::new(TokioTimers::new(clock.clone(), &handle)),
                notifier: Box::new(LogNotifier::new()),
                background: Box::new(NoBackgroundTasks),
                clock,
            },
        );
        let task = tokio::spawn(BlockerService::new(blocker, queue).run());
        (handle, gateway, task)
    }

    #[tokio::test(start_paused = true)]
    async fn reblock_timer_fires_through_service() {
        let (handle, gateway, _task) = service();
        handle.select_apps(vec![AppToken::new("social")]).await.unwrap();
        handle
            .add_schedule(Schedule::new("Work", "09:00".parse().unwrap(), "17:00".parse().unwrap()))
            .await
            .unwrap();
        assert_eq!(gateway.shielded().len(), 1);

        let mut events = handle.subscribe();
        handle
            .request_unblock(Duration::minutes(5), UnblockSource::User)
            .await
            .unwrap();
        assert!(gateway.shielded().is_empty());

        loop {
            match events.recv().await.unwrap() {
                Event::UnblockEnded { .. } => break,
                _ => continue,
            }
        }
        assert_eq!(gateway.shielded().len(), 1);
        assert_eq!(handle.unblock_state().await.unwrap(), UnblockState::Enforcing);
    }

    #[tokio::test(start_paused = true)]
    async fn replacing_unblock_leaves_one_timer() {
        let (handle, _gateway, _task) = service();
        let mut events = handle.subscribe();
        handle
            .request_unblock(Duration::minutes(1), UnblockSource::User)
            .await
            .unwrap();
        handle
            .request_unblock(Duration::minutes(10), UnblockSource::User)
            .await
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_secs(120)).await;
        assert!(matches!(
            handle.unblock_state().await.unwrap(),
            UnblockState::Overridden { .. }
        ));

        let mut ended = 0;
        tokio::time::sleep(std::time::Duration::from_secs(600)).await;
        while let Ok(event) = events.try_recv() {
            if matches!(event, Event::UnblockEnded { .. }) {
                ended += 1;
            }
        }
        assert_eq!(ended, 1);
    }

    #[tokio::test]
    async fn shutdown_returns_blocker() {
        let (handle, _gateway, task) = service();
        handle.shutdown().await.unwrap();
        let blocker = task.await.unwrap();
        assert_eq!(blocker.unblock_state(), &UnblockState::Enforcing);
        assert!(handle.diagnostics().await.is_err());
    }
}
