use chrono::{DateTime, Duration, Utc};
use clap::Subcommand;
use meetpoll_core::integrations::MeetingStore;
use meetpoll_core::{Config, CreatePoll, MeetingDb, NotFoundError, TimeInterval, VoteCredentials};

use crate::context::{poll_service, print_json, CliResult};

#[derive(Subcommand)]
pub enum PollAction {
    /// Open a poll for a meeting
    Create {
        /// Meeting ID
        #[arg(long)]
        meeting: String,
        /// Organizer identity (must match the meeting)
        #[arg(long = "as")]
        organizer: String,
        /// Candidate start time, RFC 3339 (repeatable); length comes from the meeting
        #[arg(long = "option", required = true)]
        options: Vec<DateTime<Utc>>,
        /// Voting deadline, RFC 3339
        #[arg(long)]
        deadline: Option<DateTime<Utc>>,
    },
    /// Show a poll
    Show {
        /// Poll ID
        id: String,
        #[command(flatten)]
        credentials: CredentialArgs,
    },
    /// Vote for an option
    Vote {
        /// Poll ID
        id: String,
        /// Option ID
        #[arg(long)]
        option: String,
        #[command(flatten)]
        credentials: CredentialArgs,
    },
    /// Close a poll (organizer only)
    Finalize {
        /// Poll ID
        id: String,
        /// Organizer identity
        #[arg(long = "as")]
        organizer: String,
        /// Winning option; defaults to the most voted
        #[arg(long)]
        option: Option<String>,
    },
    /// Issue a vote token for an invitee (organizer only)
    Token {
        /// Poll ID
        id: String,
        /// Organizer identity
        #[arg(long = "as")]
        organizer: String,
        /// Invitee to issue the token for
        #[arg(long)]
        voter: String,
    },
}

#[derive(clap::Args)]
pub struct CredentialArgs {
    /// Signed vote token
    #[arg(long)]
    token: Option<String>,
    /// Unsigned voter email (legacy)
    #[arg(long)]
    email: Option<String>,
    /// Logged-in identity
    #[arg(long = "session")]
    session: Option<String>,
}

impl CredentialArgs {
    fn into_credentials(self) -> Option<VoteCredentials> {
        if self.token.is_none() && self.email.is_none() && self.session.is_none() {
            return None;
        }
        Some(VoteCredentials {
            token: self.token,
            voter_email: self.email,
            session_identity: self.session,
        })
    }
}

pub async fn run(action: PollAction) -> CliResult {
    let config = Config::load()?;
    let service = poll_service(&config)?;

    match action {
        PollAction::Create {
            meeting,
            organizer,
            options,
            deadline,
        } => {
            let record = MeetingDb::open()?
                .get_meeting(&meeting)
                .await?
                .ok_or(NotFoundError::Meeting(meeting.clone()))?;
            let length = Duration::minutes(record.duration_minutes);
            let slots = options
                .into_iter()
                .map(|start| TimeInterval::new(start, start + length))
                .collect::<Result<Vec<_>, _>>()?;

            let created = service
                .create_poll(CreatePoll {
                    meeting_ref: meeting,
                    organizer,
                    options: slots,
                    deadline,
                })
                .await?;
            print_json(&created)?;
        }
        PollAction::Show { id, credentials } => {
            let credentials = credentials.into_credentials();
            let view = service.get_poll(&id, credentials.as_ref()).await?;
            print_json(&view)?;
        }
        PollAction::Vote {
            id,
            option,
            credentials,
        } => {
            let credentials = credentials
                .into_credentials()
                .ok_or("one of --token, --email or --session is required")?;
            let view = service.vote(&id, &option, &credentials).await?;
            print_json(&view)?;
        }
        PollAction::Finalize {
            id,
            organizer,
            option,
        } => {
            let view = service.finalize(&id, &organizer, option.as_deref()).await?;
            print_json(&view)?;
        }
        PollAction::Token {
            id,
            organizer,
            voter,
        } => {
            let token = service.issue_vote_token(&id, &organizer, &voter).await?;
            println!("{token}");
        }
    }
    Ok(())
}
