use clap::Subcommand;
use meetpoll_core::integrations::MeetingStore;
use meetpoll_core::{Meeting, MeetingDb, NotFoundError};

use crate::context::{print_json, CliResult};

#[derive(Subcommand)]
pub enum MeetingAction {
    /// Create a meeting awaiting a poll
    Create {
        /// Meeting title
        title: String,
        /// Organizer identity
        #[arg(long)]
        organizer: String,
        /// Participant identity (repeatable)
        #[arg(long = "participant", short = 'p')]
        participants: Vec<String>,
        /// Length in minutes
        #[arg(long, default_value_t = 30)]
        duration: i64,
    },
    /// Show a meeting
    Show {
        /// Meeting ID
        id: String,
    },
    /// List meetings
    List,
}

pub async fn run(action: MeetingAction) -> CliResult {
    let db = MeetingDb::open()?;
    match action {
        MeetingAction::Create {
            title,
            organizer,
            participants,
            duration,
        } => {
            if duration <= 0 {
                return Err(format!("duration must be positive (got {duration})").into());
            }
            let meeting = Meeting::new(&title, &organizer, &participants, duration);
            db.insert(&meeting).await?;
            print_json(&meeting)?;
        }
        MeetingAction::Show { id } => {
            let meeting = db
                .get_meeting(&id)
                .await?
                .ok_or(NotFoundError::Meeting(id))?;
            print_json(&meeting)?;
        }
        MeetingAction::List => {
            let summaries: Vec<_> = db.list().await?.iter().map(Meeting::summary).collect();
            print_json(&summaries)?;
        }
    }
    Ok(())
}
