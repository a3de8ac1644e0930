//! # PocketBlock Core Library
//!
//! Schedule-based app blocking. The user picks a set of apps and defines
//! daily time windows; while an active window contains the current time the
//! apps are shielded. A temporary unblock (asked for directly, or earned by
//! walking) lifts the shield for a bounded time and re-applies it afterwards.
//!
//! ## Architecture
//!
//! - **Schedules**: wall-clock windows with an exclusive end, compared as
//!   minute-of-day integers through a single [`TimeBasis`]
//! - **Storage**: a shared SQLite key/value store (app and monitor process)
//!   plus a private one, and TOML configuration
//! - **Gateway**: the trait boundary to the platform shield and interval
//!   monitors
//! - **Runtime**: a tokio service that serializes every callback onto one task
//!
//! ## Key Components
//!
//! - [`Blocker`]: main-process orchestrator
//! - [`MonitorExtension`]: callbacks for the separate monitor process
//! - [`UnblockSequencer`]: temporary-unblock state machine
//! - [`ScheduleRegistry`]: persisted schedule list
//! - [`BlockerService`]: async command loop around a [`Blocker`]

pub mod blocker;
pub mod clock;
pub mod diagnostics;
pub mod error;
pub mod evaluator;
pub mod events;
pub mod gateway;
pub mod monitor;
pub mod platform;
pub mod registry;
pub mod runtime;
pub mod schedule;
pub mod selection;
pub mod steps;
pub mod storage;
pub mod unblock;

pub use blocker::{Blocker, Ports, RefreshSummary};
pub use clock::{Clock, ManualClock, SystemClock};
pub use diagnostics::{DiagnosticLog, DiagnosticsReport, LogEntry, LogKind};
pub use error::{
    ConfigError, CoreError, GatewayError, Result, StorageError, UnblockError, ValidationError,
};
pub use evaluator::{is_blocking_required, matching_schedules, Enforcement};
pub use events::{Event, EventBus, SubscriptionId, UnblockSource};
pub use gateway::{EnforcementGateway, InMemoryGateway, MonitorSpec, ShieldState, StoreBackedGateway};
pub use monitor::{MonitorAction, MonitorExtension};
pub use platform::{
    BackgroundTasks, LogNotifier, ManualTimers, NoBackgroundTasks, NotificationKind,
    NotificationRequest, Notifier, TimerConcern, TimerHandle, Timers,
};
pub use registry::ScheduleRegistry;
pub use runtime::{command_channel, BlockerHandle, BlockerService, Command, CommandQueue, TokioTimers};
pub use schedule::{is_within_window, ClockTime, MinuteOfDay, Schedule, ScheduleId, TimeBasis};
pub use selection::{AppSelection, AppToken};
pub use steps::{StepGoalTracker, StepProgress};
pub use storage::{Config, Database, MemoryStore, OverridePolicy, SharedStore};
pub use unblock::{
    EndReason, Recovery, UnblockEnded, UnblockSequencer, UnblockStarted, UnblockState,
    MAX_UNBLOCK_SECS,
};
