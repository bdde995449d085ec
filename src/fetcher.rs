//! Fetches the most recent window of an open mailbox.

use crate::error::{Error, Result};
use crate::mailbox::{MailboxSession, RawMessage, SequenceWindow};
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Fetches up to `window` of the newest messages, newest first.
///
/// The fetch is a single bounded operation. If it does not finish within
/// `fetch_timeout` the window is treated as empty and the session stays
/// usable for logout. An empty mailbox also yields an empty list.
///
/// Messages are ordered by their received date, newest first. Messages
/// without a date sort last; ties go to the higher sequence position.
///
/// # Errors
///
/// Returns an error if the store rejects the fetch or the response cannot
/// be read.
#[instrument(
    name = "fetcher::fetch_recent",
    skip(session),
    fields(total = session.total())
)]
pub async fn fetch_recent(
    session: &mut dyn MailboxSession,
    window: usize,
    fetch_timeout: Duration,
) -> Result<Vec<RawMessage>> {
    let Some(range) = SequenceWindow::latest(session.total(), window) else {
        debug!("Mailbox is empty");
        return Ok(Vec::new());
    };

    let mut messages = match tokio::time::timeout(fetch_timeout, session.fetch(range)).await {
        Ok(result) => result?,
        Err(_) => {
            let err = Error::FetchTimeout {
                range: range.to_string(),
                timeout: fetch_timeout,
            };
            warn!(error = %err, "Fetch timed out, treating window as empty");
            return Ok(Vec::new());
        }
    };

    messages.retain(|message| range.contains(message.sequence));
    sort_newest_first(&mut messages);
    messages.truncate(window);

    debug!(count = messages.len(), range = %range, "Recent window fetched");

    Ok(messages)
}

/// Orders messages newest first. Undated messages go last.
pub fn sort_newest_first(messages: &mut [RawMessage]) {
    messages.sort_by(|a, b| {
        b.date
            .cmp(&a.date)
            .then_with(|| b.sequence.cmp(&a.sequence))
    });
}
