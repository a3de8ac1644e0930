use clap::Subcommand;
use pocketblock_core::AppToken;

use crate::common::{open_blocker, CliResult};

#[derive(Subcommand)]
pub enum AppsAction {
    /// Replace the selection with the given app tokens
    Select {
        #[arg(required = true)]
        tokens: Vec<String>,
    },
    /// Print the selected tokens
    List {
        #[arg(long)]
        json: bool,
    },
    /// Empty the selection
    Clear,
}

pub fn run(action: AppsAction) -> CliResult {
    let mut blocker = open_blocker()?;
    match action {
        AppsAction::Select { tokens } => {
            blocker.select_apps(tokens.into_iter().map(AppToken::new))?;
            println!("{} apps selected", blocker.selection().len());
        }
        AppsAction::List { json } => {
            if json {
                println!("{}", serde_json::to_string(blocker.selection())?);
            } else {
                for token in blocker.selection().tokens() {
                    println!("{token}");
                }
            }
        }
        AppsAction::Clear => {
            blocker.clear_selection()?;
            println!("selection cleared");
        }
    }
    Ok(())
}
