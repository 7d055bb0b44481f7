use async_trait::async_trait;
use tracing::info;

use super::traits::Notifier;
use crate::error::CoreError;
use crate::poll::Poll;

/// Notifier that only logs. Delivery is left to whatever consumes the logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn poll_invite(&self, poll: &Poll, recipient: &str, _token: &str) -> Result<(), CoreError> {
        info!(poll_id = poll.id(), recipient, "poll invite");
        Ok(())
    }

    async fn poll_result(&self, poll: &Poll, recipients: &[String]) -> Result<(), CoreError> {
        info!(
            poll_id = poll.id(),
            winning_option_id = poll.winning_option_id().unwrap_or_default(),
            recipients = recipients.len(),
            "poll result"
        );
        Ok(())
    }
}
