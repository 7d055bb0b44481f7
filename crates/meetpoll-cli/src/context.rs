//! Wiring shared by the commands: config, stores and services.

use std::error::Error;
use std::sync::Arc;

use meetpoll_core::integrations::TracingNotifier;
use meetpoll_core::{Config, MeetingDb, PollDb, PollService, TokenAuthorizer};
use serde::Serialize;

pub type CliResult = Result<(), Box<dyn Error>>;

pub fn token_authorizer(config: &Config) -> Result<TokenAuthorizer, Box<dyn Error>> {
    let seed = config.auth.resolve_signing_seed().map_err(|e| {
        format!("{e} (run `meetpoll-cli config init-secret` or set MEETPOLL_SIGNING_SEED)")
    })?;
    Ok(TokenAuthorizer::from_seed(&seed, config.polls.token_ttl())
        .with_legacy_email(config.auth.allow_legacy_email))
}

pub fn poll_service(config: &Config) -> Result<PollService, Box<dyn Error>> {
    Ok(PollService::new(
        Arc::new(PollDb::open()?),
        Arc::new(MeetingDb::open()?),
        Arc::new(TracingNotifier),
        token_authorizer(config)?,
    ))
}

pub fn print_json<T: Serialize>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
