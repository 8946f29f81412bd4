use clap::Subcommand;
use habitrack_core::{Config, ConfigError};
use serde_json::json;

use super::{print_json, CommandResult};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show the effective config, environment overrides included
    Show,
    /// Get a config value
    Get {
        /// Config key (e.g. "backend.endpoint", "log.filter")
        key: String,
    },
    /// Set a config value in the config file
    Set {
        /// Config key
        key: String,
        /// New value
        value: String,
    },
    /// Print the config file location
    Path,
}

pub fn run(action: ConfigAction) -> CommandResult {
    match action {
        ConfigAction::Show => {
            print_json(&Config::load()?)?;
        }
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            let value = config
                .get(&key)
                .ok_or_else(|| ConfigError::UnknownKey(key.clone()))?;
            print_json(&json!({ "key": key, "value": value }))?;
        }
        ConfigAction::Set { key, value } => {
            // Edit the file itself so environment overrides are not persisted.
            let path = Config::path()?;
            let mut config = Config::load_from(&path)?;
            config.set(&key, &value)?;
            config.save_to(&path)?;
            print_json(&json!({ "key": key, "value": value }))?;
        }
        ConfigAction::Path => {
            print_json(&Config::path()?)?;
        }
    }
    Ok(())
}
