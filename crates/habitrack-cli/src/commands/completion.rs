use chrono::{DateTime, Utc};
use clap::Subcommand;

use super::context::AppContext;
use super::{print_json, CommandResult};

#[derive(Subcommand)]
pub enum CompletionAction {
    /// List completions (today's by default)
    List {
        /// Only today's completions
        #[arg(long, conflicts_with = "since")]
        today: bool,
        /// Completions at or after this RFC 3339 instant
        #[arg(long)]
        since: Option<DateTime<Utc>>,
    },
}

pub async fn run(action: CompletionAction) -> CommandResult {
    let ctx = AppContext::connect().await?;

    match action {
        CompletionAction::List { since, .. } => {
            let completions = match since {
                Some(since) => ctx.tracker.completions_since(since).await?,
                None => ctx.tracker.completions_today().await?,
            };
            print_json(&completions)?;
        }
    }
    Ok(())
}
