use std::sync::Arc;

use chrono::{Duration, Utc};
use clap::{Args, Subcommand};
use pocketblock_core::{
    command_channel, BlockerService, Config, Event, SystemClock, TokioTimers, UnblockSource,
    UnblockState,
};

use crate::common::{build_blocker, open_blocker, CliResult};

#[derive(Subcommand)]
pub enum UnblockAction {
    /// Lift the shield for a while
    Start(StartArgs),
    /// Show the running unblock, if any
    Status {
        #[arg(long)]
        json: bool,
    },
    /// End the running unblock now
    End,
}

#[derive(Args)]
pub struct StartArgs {
    /// Length in minutes
    #[arg(long, default_value_t = 5, conflicts_with = "seconds")]
    minutes: u32,
    /// Length in seconds, for short debug unblocks
    #[arg(long)]
    seconds: Option<u32>,
    /// Stay running until apps are blocked again
    #[arg(long)]
    wait: bool,
}

impl StartArgs {
    fn duration(&self) -> Duration {
        match self.seconds {
            Some(secs) => Duration::seconds(i64::from(secs)),
            None => Duration::minutes(i64::from(self.minutes)),
        }
    }
}

pub fn run(action: UnblockAction) -> CliResult {
    match action {
        UnblockAction::Start(args) if args.wait => start_and_wait(args.duration()),
        UnblockAction::Start(args) => {
            let mut blocker = open_blocker()?;
            let started = blocker.request_unblock(args.duration(), UnblockSource::User)?;
            println!("unblocked until {}", started.until.to_rfc3339());
            Ok(())
        }
        UnblockAction::Status { json } => {
            let blocker = open_blocker()?;
            if json {
                println!("{}", serde_json::to_string_pretty(blocker.unblock_state())?);
                return Ok(());
            }
            match (blocker.unblock_state(), blocker.unblock_remaining()) {
                (UnblockState::Overridden { until, .. }, Some(left)) => {
                    println!("unblocked until {} ({}s left)", until.to_rfc3339(), left.num_seconds());
                }
                _ => println!("not unblocked"),
            }
            Ok(())
        }
        UnblockAction::End => {
            let mut blocker = open_blocker()?;
            blocker.end_unblock()?;
            println!("unblock ended");
            Ok(())
        }
    }
}

/// Run the async service so the reblock timer can fire in this process.
fn start_and_wait(duration: Duration) -> CliResult {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async move {
        let (handle, queue) = command_channel(16, 64);
        let timers = TokioTimers::new(Arc::new(SystemClock), &handle);
        let blocker = build_blocker(Config::load_or_default(), Box::new(timers))?;
        let service = tokio::spawn(BlockerService::new(blocker, queue).run());

        let mut events = handle.subscribe();
        let started = handle.request_unblock(duration, UnblockSource::User).await?;
        println!("unblocked until {}", started.until.to_rfc3339());

        loop {
            match events.recv().await {
                Ok(Event::UnblockEnded { reason, .. }) => {
                    println!("blocked again at {} ({reason:?})", Utc::now().to_rfc3339());
                    break;
                }
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "missed events while waiting");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
        handle.shutdown().await?;
        service.await?;
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}
