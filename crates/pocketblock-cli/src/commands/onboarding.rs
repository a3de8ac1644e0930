use clap::Subcommand;

use crate::common::{open_blocker, CliResult};

#[derive(Subcommand)]
pub enum OnboardingAction {
    /// Print whether onboarding was completed
    Show,
    /// Mark onboarding as completed
    Complete,
    /// Forget onboarding so it runs again
    Reset,
}

pub fn run(action: OnboardingAction) -> CliResult {
    let mut blocker = open_blocker()?;
    match action {
        OnboardingAction::Show => println!("{}", blocker.onboarding_completed()),
        OnboardingAction::Complete => {
            blocker.set_onboarding_completed(true)?;
            println!("onboarding completed");
        }
        OnboardingAction::Reset => {
            blocker.set_onboarding_completed(false)?;
            println!("onboarding reset");
        }
    }
    Ok(())
}
