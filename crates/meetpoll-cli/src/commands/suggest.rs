use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::Args;
use meetpoll_core::integrations::{CalendarProvider, FileCalendarProvider, GoogleFreeBusyProvider};
use meetpoll_core::{Config, SuggestionRequest, SuggestionService};

use crate::context::{print_json, CliResult};

#[derive(Args)]
pub struct SuggestArgs {
    /// Participant identity (repeatable)
    #[arg(long = "participant", short = 'p', required = true)]
    pub participants: Vec<String>,
    /// Window start (RFC 3339)
    #[arg(long)]
    pub from: DateTime<Utc>,
    /// Window end (RFC 3339)
    #[arg(long)]
    pub to: DateTime<Utc>,
    /// Meeting length in minutes
    #[arg(long, default_value_t = 30)]
    pub duration: i64,
    /// Step between candidate starts in minutes
    #[arg(long)]
    pub increment: Option<i64>,
    /// Maximum suggestions to return
    #[arg(long)]
    pub max: Option<i64>,
    /// IANA time zone for daypart ranking (e.g. "Europe/Berlin")
    #[arg(long)]
    pub tz: Option<String>,
    /// JSON file mapping identities to busy blocks
    #[arg(long, conflicts_with = "google_tokens")]
    pub busy_file: Option<PathBuf>,
    /// JSON file mapping identities to Google OAuth access tokens
    #[arg(long)]
    pub google_tokens: Option<PathBuf>,
}

pub async fn run(args: SuggestArgs) -> CliResult {
    let config = Config::load()?;
    let provider: Arc<dyn CalendarProvider> = match (&args.busy_file, &args.google_tokens) {
        (Some(path), _) => Arc::new(FileCalendarProvider::load(path)?),
        (None, Some(path)) => {
            let tokens: HashMap<String, String> =
                serde_json::from_str(&std::fs::read_to_string(path)?)?;
            Arc::new(GoogleFreeBusyProvider::new(tokens))
        }
        (None, None) => return Err("one of --busy-file or --google-tokens is required".into()),
    };

    let service = SuggestionService::new(provider, &config.suggestions)?;
    let response = service
        .suggest(SuggestionRequest {
            participants: args.participants,
            duration_minutes: args.duration,
            window_start: args.from,
            window_end: args.to,
            slot_increment_minutes: args.increment,
            max_suggestions: args.max,
            client_timezone: args.tz,
        })
        .await?;

    if !response.participants_missing.is_empty() {
        eprintln!(
            "warning: no calendar data for {}",
            response.participants_missing.join(", ")
        );
    }
    print_json(&response)
}
