pub mod apps;
pub mod config;
pub mod diagnostics;
pub mod monitor;
pub mod onboarding;
pub mod schedule;
pub mod status;
pub mod steps;
pub mod unblock;
