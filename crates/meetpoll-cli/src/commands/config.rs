use clap::Subcommand;
use meetpoll_core::auth::generate_seed;
use meetpoll_core::Config;

use crate::context::CliResult;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Get a config value
    Get {
        /// Dotted key (e.g. "suggestions.pool_cap", "polls.token_ttl_hours")
        key: String,
    },
    /// Set a config value
    Set {
        /// Dotted key
        key: String,
        /// New value
        value: String,
    },
    /// List all config values
    List,
    /// Generate and store a new token signing seed
    InitSecret {
        /// Replace an existing seed (invalidates issued tokens)
        #[arg(long)]
        force: bool,
    },
    /// Reset config to defaults
    Reset,
}

pub fn run(action: ConfigAction) -> CliResult {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            match config.get(&key) {
                Some(value) => println!("{value}"),
                None => return Err(format!("unknown key: {key}").into()),
            }
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            println!("ok");
        }
        ConfigAction::List => {
            let config = Config::load()?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        ConfigAction::InitSecret { force } => {
            let mut config = Config::load()?;
            if config.auth.signing_seed.is_some() && !force {
                return Err("signing seed already set (use --force to replace it)".into());
            }
            config.auth.signing_seed = Some(generate_seed());
            config.save()?;
            println!("signing seed written to {}", Config::path()?.display());
        }
        ConfigAction::Reset => {
            let config = Config::default();
            config.save()?;
            println!("config reset to defaults");
        }
    }
    Ok(())
}
