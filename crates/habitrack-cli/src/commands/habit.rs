//! Habit management commands for CLI.

use clap::Subcommand;
use habitrack_core::{Frequency, HabitPatch, NewHabit};
use serde_json::json;

use super::context::AppContext;
use super::{print_json, CommandResult};

#[derive(Subcommand)]
pub enum HabitAction {
    /// Create a new habit
    Add {
        /// Habit title
        title: String,
        /// What doing the habit means
        #[arg(long)]
        description: String,
        /// daily, weekly or monthly
        #[arg(long, default_value = "daily")]
        frequency: Frequency,
    },
    /// List your habits, newest first
    List,
    /// Change a habit's title, description or frequency
    Edit {
        /// Habit ID
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        frequency: Option<Frequency>,
    },
    /// Delete a habit (its completions are kept)
    Delete {
        /// Habit ID
        id: String,
    },
    /// Mark a habit done for today
    Complete {
        /// Habit ID
        id: String,
    },
}

pub async fn run(action: HabitAction) -> CommandResult {
    let ctx = AppContext::connect().await?;
    let tracker = &ctx.tracker;

    match action {
        HabitAction::Add {
            title,
            description,
            frequency,
        } => {
            let habit = tracker
                .create_habit(&NewHabit::new(title, description, frequency))
                .await?;
            print_json(&habit)?;
        }
        HabitAction::List => {
            print_json(&tracker.habits().await?)?;
        }
        HabitAction::Edit {
            id,
            title,
            description,
            frequency,
        } => {
            let patch = HabitPatch {
                title,
                description,
                frequency,
                ..Default::default()
            };
            print_json(&tracker.update_habit(&id, &patch).await?)?;
        }
        HabitAction::Delete { id } => {
            tracker.delete_habit(&id).await?;
            print_json(&json!({ "deleted": id }))?;
        }
        HabitAction::Complete { id } => {
            print_json(&tracker.complete_habit(&id).await?)?;
        }
    }
    Ok(())
}
